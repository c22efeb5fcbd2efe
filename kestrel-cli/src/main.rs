//! kestrel: a line-mode IRC client on top of kestrel-sdk.
//!
//! Prints events as they arrive (or one JSON object per line with
//! `--json`) and reads commands from stdin:
//!
//!   /join <channel> [key]        /part [channel] [reason]
//!   /msg <target> <text>         /notice <target> <text>
//!   /me <text>                   /ctcp <target> <type> [args]
//!   /nick <nick>                 /topic [channel] <topic>
//!   /away [reason]               /names [channel]
//!   /raw <line>                  /quit [reason]
//!
//! Anything else is sent to the most recently joined channel.

mod app;
mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kestrel", about = "Line-mode IRC client")]
pub struct Cli {
    /// IRC server address (host:port)
    #[arg(long, env = "KESTREL_SERVER")]
    server: Option<String>,

    /// Nickname
    #[arg(long, env = "KESTREL_NICK")]
    nick: Option<String>,

    /// Alternate nickname tried once on collision
    #[arg(long)]
    alt_nick: Option<String>,

    /// Username (ident)
    #[arg(long)]
    user: Option<String>,

    /// Real name
    #[arg(long)]
    realname: Option<String>,

    /// Server password
    #[arg(long, env = "KESTREL_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Use TLS (auto-enabled for port 6697)
    #[arg(long)]
    tls: bool,

    /// Skip TLS certificate verification
    #[arg(long)]
    tls_insecure: bool,

    /// Channels to join, comma-separated
    #[arg(long)]
    channels: Option<String>,

    /// Print events as JSON lines instead of text
    #[arg(long)]
    json: bool,

    /// Config file (default: ~/.config/kestrel/cli.toml)
    #[arg(long, env = "KESTREL_CONFIG")]
    config: Option<PathBuf>,

    /// Write the effective settings to the config file before connecting
    #[arg(long)]
    save_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs with KESTREL_LOG_JSON=1, human-readable otherwise. Logs go
    // to stderr so stdout stays clean for events.
    let json_logs = std::env::var("KESTREL_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env()
        .add_directive("kestrel=info".parse()?)
        .add_directive("kestrel_sdk=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let cli = Cli::parse();
    let path = cli.config.clone().unwrap_or_else(config::config_path);
    let file = config::Config::load_from(&path);
    let resolved = config::Resolved::merge(&cli, &file);
    if cli.save_config {
        config::Config::from(&resolved).save_to(&path)?;
        tracing::info!("Saved config to {}", path.display());
    }

    tracing::info!(
        server = %resolved.server,
        nick = %resolved.nick,
        tls = resolved.tls,
        channels = ?resolved.channels,
        "Starting kestrel"
    );
    app::run(resolved).await
}
