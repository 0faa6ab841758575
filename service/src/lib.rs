//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Group Chat Service
//!
//! Line-oriented, multi-client chat over TCP. Clients connect, receive a
//! welcome block with their session ID, and from then on every line they
//! send is either a slash command or chat that is relayed to everyone else.
//!
//! - Session IDs are unique and strictly increasing for the server lifetime
//! - Broadcasts never block on a slow recipient; it is flagged instead
//! - Teardown runs exactly once per session, whatever triggered it
//! - No global state: the registry is passed to every component that needs it
//!
//! # Architecture
//!
//! ```text
//! ChatServer (listener)
//!     ↓ one task per connection
//! ConnectionHandler ──→ CommandProcessor
//!     ↓                      ↓
//! Broadcaster ──────────→ Registry ──→ Session (outbound queue → writer task)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use confab_service::{ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::new("127.0.0.1:8888".parse()?);
//!     let server = ChatServer::new(config).await?;
//!     server.run_until_ctrl_c().await?;
//!     Ok(())
//! }
//! ```

mod broadcast;
mod codec;
mod command;
mod config;
mod error;
mod handler;
mod metrics;
pub mod protocol;
mod registry;
mod server;
mod session;
mod types;

pub use broadcast::{BroadcastResult, Broadcaster};
pub use codec::{ChatCodec, Inbound};
pub use command::{Command, CommandOutcome, CommandProcessor};
pub use config::{DEFAULT_PORT, ServerConfig};
pub use error::{ChatError, Result};
pub use handler::{ConnectionHandler, HandlerConfig, HandlerContext};
pub use metrics::{MetricsSnapshot, ServerMetrics};
pub use protocol::ChatMessage;
pub use registry::Registry;
pub use server::ChatServer;
pub use session::{Outbound, Session};
pub use types::{ServerSnapshot, SessionId, SessionState};
