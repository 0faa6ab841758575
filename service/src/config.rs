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

//! Server configuration

use crate::{ChatError, Result};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Default TCP port of the chat service
pub const DEFAULT_PORT: u16 = 8888;

/// Smallest outbound queue that still holds the full welcome block
const MIN_OUTBOUND_BUFFER: usize = 8;

/// Server configuration
///
/// This structure contains all configuration options for the chat server.
/// Use the builder pattern methods to customize the configuration.
///
/// # Example
///
/// ```
/// use confab_service::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig::default()
///     .with_max_connections(500)
///     .with_write_timeout(Duration::from_secs(5))
///     .with_max_line_length(1024);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrently registered sessions
    pub max_connections: usize,

    /// Capacity of each session's outbound line queue
    ///
    /// A recipient whose queue fills up is flagged for teardown instead of
    /// stalling the broadcast.
    pub outbound_buffer: usize,

    /// Timeout for a single write to a client socket
    pub write_timeout: Duration,

    /// Longest accepted inbound line, in bytes
    pub max_line_length: usize,

    /// Timeout for graceful shutdown
    ///
    /// Bounds both server shutdown and the flush of a single session's
    /// remaining output during teardown.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_connections: 1000,
            outbound_buffer: 256,
            write_timeout: Duration::from_secs(10),
            max_line_length: 4096,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with the given bind address
    ///
    /// All other settings will use their default values.
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            ..Default::default()
        }
    }

    /// Set the maximum number of concurrent sessions
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the per-session outbound queue capacity
    pub fn with_outbound_buffer(mut self, lines: usize) -> Self {
        self.outbound_buffer = lines;
        self
    }

    /// Set the write timeout duration
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the maximum inbound line length
    pub fn with_max_line_length(mut self, bytes: usize) -> Self {
        self.max_line_length = bytes;
        self
    }

    /// Set the shutdown timeout duration
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(invalid("max_connections must be greater than 0"));
        }

        if self.max_connections > Semaphore::MAX_PERMITS {
            return Err(invalid(format!(
                "max_connections must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }

        if self.outbound_buffer < MIN_OUTBOUND_BUFFER {
            return Err(invalid(format!(
                "outbound_buffer must be at least {MIN_OUTBOUND_BUFFER}"
            )));
        }

        if self.write_timeout.is_zero() {
            return Err(invalid("write_timeout must be greater than 0"));
        }

        if self.max_line_length == 0 {
            return Err(invalid("max_line_length must be greater than 0"));
        }

        if self.shutdown_timeout.is_zero() {
            return Err(invalid("shutdown_timeout must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> ChatError {
    ChatError::InvalidConfig(reason.into())
}
