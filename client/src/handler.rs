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

//! Client event handler traits

use crate::ClientError;
use async_trait::async_trait;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

/// Why a client session ended
#[derive(Debug)]
pub enum DisconnectReason {
    /// The user asked to leave
    Quit,
    /// The server closed the connection
    ServerClosed,
    /// The connection failed
    Lost(ClientError),
}

/// Client event handler trait
///
/// Implement this trait to handle events from the chat client.
///
/// # Example
///
/// ```no_run
/// use confab_client::{ClientHandler, DisconnectReason};
/// use async_trait::async_trait;
///
/// struct MyHandler;
///
/// #[async_trait]
/// impl ClientHandler for MyHandler {
///     async fn on_line(&self, line: &str) {
///         println!("{line}");
///     }
/// }
/// ```
#[async_trait]
pub trait ClientHandler: Send + Sync + 'static {
    /// Called for every line the server sends
    async fn on_line(&self, line: &str);

    /// Called once when the session ends, whatever ended it
    async fn on_disconnect(&self, _reason: &DisconnectReason) {}
}

/// Prints server lines to a terminal
pub struct ConsoleHandler<W = io::Stdout> {
    out: Mutex<W>,
}

impl ConsoleHandler {
    /// Console handler writing to standard output
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send + 'static> ConsoleHandler<W> {
    /// Console handler writing to `out`
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn print(&self, line: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        // Nowhere better to report a broken terminal
        let _ = writeln!(out, "{line}").and_then(|()| out.flush());
    }
}

#[async_trait]
impl<W: Write + Send + 'static> ClientHandler for ConsoleHandler<W> {
    async fn on_line(&self, line: &str) {
        self.print(line);
    }

    async fn on_disconnect(&self, reason: &DisconnectReason) {
        match reason {
            DisconnectReason::Quit => {}
            DisconnectReason::ServerClosed => self.print("Lost connection"),
            DisconnectReason::Lost(e) => {
                tracing::debug!(error = %e, "Connection lost");
                self.print("Lost connection");
            }
        }
    }
}
