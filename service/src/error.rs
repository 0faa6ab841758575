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

//! Error types for the chat service

use crate::types::SessionId;
use std::net::SocketAddr;
use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Result type for operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// Chat service error types
#[derive(Debug, Error)]
pub enum ChatError {
    /// The listener could not bind its address; startup is aborted
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Address the server attempted to bind
        address: SocketAddr,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// Accepting a single inbound connection failed
    #[error("Failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),

    /// I/O error on a client stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed input from a client
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The session's outbound queue is saturated
    #[error("Outbound queue for {0} is full")]
    OutboundFull(SessionId),

    /// Session has been closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// A write to the client did not complete in time
    #[error("Write timed out")]
    WriteTimeout,

    /// Server is not running
    #[error("Server not running")]
    ServerNotRunning,

    /// Server was started twice
    #[error("Server already running")]
    AlreadyRunning,

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ChatError {
    /// Check if the error is recoverable
    ///
    /// Recoverable errors leave the server and other sessions untouched;
    /// at most the session that hit them is torn down.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ChatError::Bind { .. } | ChatError::InvalidConfig(_) | ChatError::AlreadyRunning
        )
    }

    /// Check if the error is scoped to a single client connection
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ChatError::Io(_)
                | ChatError::ConnectionClosed
                | ChatError::OutboundFull(_)
                | ChatError::WriteTimeout
        )
    }

    /// Check if the error was caused by malformed client input
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, ChatError::Protocol(_))
    }
}

impl From<LinesCodecError> for ChatError {
    fn from(error: LinesCodecError) -> Self {
        match error {
            LinesCodecError::MaxLineLengthExceeded => {
                ChatError::Protocol("line too long".to_string())
            }
            LinesCodecError::Io(e) => ChatError::Io(e),
        }
    }
}
