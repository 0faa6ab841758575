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


//! Chat server binary
//!
//! Runs until Ctrl-C. Log verbosity follows `RUST_LOG` (default `info`).

mod cli;

use clap::Parser;
use cli::Cli;
use confab_service::ChatServer;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let cli = Cli::parse();
    let server = ChatServer::new(cli.server_config()).await?;
    tracing::info!("Chat server listening on {}", server.bind_address());

    server.run_until_ctrl_c().await?;

    let metrics = server.metrics().snapshot();
    tracing::info!(
        total_sessions = metrics.total_sessions,
        messages_broadcast = metrics.messages_broadcast,
        errors = metrics.total_errors(),
        "Server stopped"
    );
    Ok(())
}
