// Copyright (c) 2026 Data Mesher
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! data-mesher node entrypoint.

use clap::{Args, Parser, Subcommand, ValueEnum};
use data_mesher::core::data::MergePolicy;
use data_mesher::networking::server::{Server, ServerSettings};
use std::net::Ipv6Addr;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Parser)]
#[command(name = "data-mesher", about = "peer-to-peer name-and-host directory")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a gossip node.
    Server(ServerArgs),
}

#[derive(Args)]
struct ServerArgs {
    /// File to read and write the mesh state to.
    #[arg(long, default_value = "./data_mesher.json")]
    state_file: PathBuf,

    /// File where the hostnames are stored as json lines.
    #[arg(long, default_value = "./data_mesher_dns.json")]
    dns_file: PathBuf,

    /// IPv6 address to bind and advertise.
    #[arg(long)]
    ip: Ipv6Addr,

    /// Port to serve gossip on.
    #[arg(long, default_value_t = 7331)]
    port: u16,

    /// File to read or write the signing key to.
    #[arg(long)]
    key_file: Option<PathBuf>,

    /// Bootstrap peer to connect to, e.g. http://[2001:db8::1]:7331
    #[arg(long = "bootstrap-peer")]
    bootstrap_peer: Vec<String>,

    /// Log verbosity.
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Require a valid admin signature on network settings updates.
    #[arg(long)]
    verify_settings: bool,

    /// Require admin endorsements on hosts of non-public networks.
    #[arg(long)]
    verify_admin_signatures: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
}

fn xdg_config_home() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".config")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Server(args) => server(args).await,
    }
}

async fn server(args: ServerArgs) -> anyhow::Result<()> {
    let level = match args.log_level {
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Info => tracing::Level::INFO,
    };
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .compact()
        .try_init();
    debug!(peers = ?args.bootstrap_peer, "starting node");

    let key_file = args
        .key_file
        .unwrap_or_else(|| xdg_config_home().join("data_mesher").join("key"));

    let mut settings = ServerSettings::new(
        args.ip,
        args.port,
        args.state_file,
        args.dns_file,
        key_file,
    );
    settings.bootstrap_peers = args.bootstrap_peer;
    settings.policy = MergePolicy {
        verify_settings: args.verify_settings,
        verify_admin_signatures: args.verify_admin_signatures,
    };

    let server = Server::bind(settings).await?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        ctrl_c.cancel();
    });

    server.run(cancel).await
}
