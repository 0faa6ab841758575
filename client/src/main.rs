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

//! Console chat client binary

use clap::Parser;
use confab_client::{ChatClient, ClientConfig, ClientError, ConsoleHandler, DEFAULT_PORT};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

/// Connect to a confab chat server
#[derive(Parser, Debug)]
#[command(name = "confab", author, version, about, long_about = None)]
struct Cli {
    /// Server hostname or IP address
    #[arg(long, env = "CONFAB_HOST", default_value = "localhost")]
    host: String,

    /// Server port
    #[arg(short, long, env = "CONFAB_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Seconds to wait for the connection
    #[arg(long, default_value_t = 10)]
    connect_timeout: u64,
}

fn init_tracing() {
    // Chat output owns stdout, so only warnings by default
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn chat(config: ClientConfig) -> Result<(), ClientError> {
    println!("Connecting to {}", config.address());
    let client = ChatClient::connect(config).await?;
    println!("Connected!\n");
    println!("Start typing (or /quit to exit):\n");

    let input = BufReader::new(tokio::io::stdin());
    let result = client.run(input, Arc::new(ConsoleHandler::stdout())).await;
    println!("\nDisconnecting...");
    result
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let config = ClientConfig::new(cli.host, cli.port)
        .with_connect_timeout(Duration::from_secs(cli.connect_timeout));

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(chat(config));
    // A pending stdin read would otherwise hold shutdown open
    runtime.shutdown_timeout(Duration::from_millis(100));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(ClientError::ConnectionRefused) => {
            eprintln!("Server not found");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Connection error: {e}");
            ExitCode::FAILURE
        }
    }
}
