//! obsidian-relay
//!
//! A man-in-the-middle proxy for the Minecraft Java Edition protocol.

#![deny(clippy::too_many_lines, missing_docs, clippy::panic)]

use clap::Parser;
use obsidian_relay::listener::Listener;

/// A man-in-the-middle proxy for the Minecraft Java Edition protocol.
#[derive(Parser, Debug)]
#[command(name = "obsidian-relay", version, about)]
struct Cli {
    /// Run without the interactive console (accepted for compatibility; this
    /// build has no interactive console to begin with).
    #[arg(long)]
    headless: bool,

    /// Path to the JSON configuration file.
    #[arg(default_value = "conf.json")]
    conf_path: String,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    obsidian_relay::tracing_init::init();

    let cli = Cli::parse();

    let listener = match Listener::bind(&cli.conf_path).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, conf_path = %cli.conf_path, "failed to start listener");
            return std::process::ExitCode::FAILURE;
        }
    };

    tracing::info!(
        addr = ?listener.local_addr(),
        conf_path = %cli.conf_path,
        "obsidian-relay is running"
    );

    listener
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received shutdown signal");
        })
        .await;

    std::process::ExitCode::SUCCESS
}
