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

//! # Confab Chat Client
//!
//! Console client for the confab group chat server. It forwards typed lines
//! to the server and hands every line the server sends to a
//! [`ClientHandler`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use confab_client::{ChatClient, ClientConfig, ConsoleHandler};
//! use std::sync::Arc;
//! use tokio::io::BufReader;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("localhost", 8888);
//!     let client = ChatClient::connect(config).await?;
//!
//!     let input = BufReader::new(tokio::io::stdin());
//!     client.run(input, Arc::new(ConsoleHandler::stdout())).await?;
//!
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
mod handler;

pub use client::{ChatClient, QUIT_COMMAND, is_quit};
pub use config::{ClientConfig, DEFAULT_PORT};
pub use error::{ClientError, Result};
pub use handler::{ClientHandler, ConsoleHandler, DisconnectReason};
