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


//! Command line arguments for the chat server

use clap::Parser;
use confab_service::{DEFAULT_PORT, ServerConfig};
use std::net::{IpAddr, SocketAddr};

/// Line-oriented group chat server
#[derive(Parser, Debug, Clone)]
#[command(name = "confab-server", author, version, about, long_about = None)]
pub struct Cli {
    /// Address to listen on
    #[arg(long, env = "CONFAB_BIND", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port to listen on. Use 0 for an ephemeral port.
    #[arg(short, long, env = "CONFAB_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Maximum number of simultaneous sessions
    #[arg(long, default_value_t = 1000)]
    pub max_connections: usize,

    /// Longest accepted line in bytes
    #[arg(long, default_value_t = 4096)]
    pub max_line_length: usize,
}

impl Cli {
    /// Build the server configuration these arguments describe
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::new(SocketAddr::new(self.bind, self.port))
            .with_max_connections(self.max_connections)
            .with_max_line_length(self.max_line_length)
    }
}
