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

//! Chat client implementation

use crate::{ClientConfig, ClientError, ClientHandler, DisconnectReason, Result};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, info, warn};

/// Line that ends the session
pub const QUIT_COMMAND: &str = "/quit";

/// How long to keep printing server output after `/quit`
const QUIT_GRACE: Duration = Duration::from_millis(500);

/// Longest line accepted from the server
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Whether `line` asks to leave the chat
pub fn is_quit(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case(QUIT_COMMAND)
}

/// Console chat client
///
/// # Example
///
/// ```no_run
/// use confab_client::{ChatClient, ClientConfig, ConsoleHandler};
/// use std::sync::Arc;
/// use tokio::io::BufReader;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = ChatClient::connect(ClientConfig::default()).await?;
///     let input = BufReader::new(tokio::io::stdin());
///     client.run(input, Arc::new(ConsoleHandler::stdout())).await?;
///     Ok(())
/// }
/// ```
pub struct ChatClient {
    peer_addr: SocketAddr,
    lines: FramedRead<OwnedReadHalf, LinesCodec>,
    sink: FramedWrite<OwnedWriteHalf, LinesCodec>,
}

impl ChatClient {
    /// Open a connection to the configured server
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let addr = config.address();
        info!("Connecting to {}...", addr);

        let stream = match timeout(config.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(ClientError::ConnectionTimeout),
        };

        let peer_addr = stream.peer_addr()?;
        info!("Connected to {}", peer_addr);

        let (reader, writer) = stream.into_split();
        Ok(Self {
            peer_addr,
            lines: FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)),
            sink: FramedWrite::new(writer, LinesCodec::new()),
        })
    }

    /// Address of the server this client is connected to
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Chat until the user quits or the connection goes away
    ///
    /// Every non-blank line of `input` is sent to the server. `/quit` is sent
    /// and then the connection is closed locally, as is end of input. Server
    /// lines go to `handler` from a separate task, and `on_disconnect` is
    /// called exactly once at the end.
    pub async fn run<I, H>(self, input: I, handler: Arc<H>) -> Result<()>
    where
        I: AsyncBufRead + Unpin,
        H: ClientHandler,
    {
        let Self {
            lines, mut sink, ..
        } = self;
        let mut reader = tokio::spawn(read_loop(lines, handler.clone()));
        let mut input = input.lines();

        let reason = loop {
            tokio::select! {
                finished = &mut reader => break reader_outcome(finished),
                line = input.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => QUIT_COMMAND.to_string(),
                        Err(e) => break DisconnectReason::Lost(e.into()),
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    // The server only recognizes the bare command word
                    let quit = is_quit(&line);
                    let line = if quit { QUIT_COMMAND.to_string() } else { line };
                    if let Err(e) = sink.send(line).await {
                        break DisconnectReason::Lost(e.into());
                    }
                    if quit {
                        debug!("Quit requested");
                        break DisconnectReason::Quit;
                    }
                }
            }
        };

        if matches!(reason, DisconnectReason::Quit) {
            drain(reader).await;
        }
        if let Err(e) = SinkExt::<String>::close(&mut sink).await {
            debug!(error = %e, "Error closing connection");
        }

        handler.on_disconnect(&reason).await;
        match reason {
            DisconnectReason::Lost(e) => Err(e),
            DisconnectReason::Quit | DisconnectReason::ServerClosed => Ok(()),
        }
    }
}

/// Hand every server line to `handler` until the stream ends
async fn read_loop<H: ClientHandler>(
    mut lines: FramedRead<OwnedReadHalf, LinesCodec>,
    handler: Arc<H>,
) -> DisconnectReason {
    while let Some(line) = lines.next().await {
        match line {
            Ok(line) => handler.on_line(&line).await,
            Err(e) => return DisconnectReason::Lost(e.into()),
        }
    }
    info!("Server closed connection");
    DisconnectReason::ServerClosed
}

fn reader_outcome(
    finished: std::result::Result<DisconnectReason, tokio::task::JoinError>,
) -> DisconnectReason {
    finished.unwrap_or_else(|e| {
        warn!(error = %e, "Reader task failed");
        DisconnectReason::Lost(ClientError::Io(std::io::Error::other(e)))
    })
}

/// Give the server a moment to say goodbye before closing
async fn drain(mut reader: JoinHandle<DisconnectReason>) {
    if timeout(QUIT_GRACE, &mut reader).await.is_err() {
        reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_quit() {
        assert!(is_quit("/quit"));
        assert!(is_quit("/QUIT"));
        assert!(is_quit("  /Quit  "));
        assert!(!is_quit("/quit now"));
        assert!(!is_quit("quit"));
        assert!(!is_quit("/users"));
    }
}
