//! ronna-relay: LINE webhook relay for the ろんな persona.

mod config;
mod context;
mod persona;
mod responder;
mod routes;
mod server;
#[cfg(test)]
mod testing;
mod wake;
mod webhook;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Debug, Parser)]
#[command(name = "ronna-relay", version, about = "LINE chat relay for the ろんな persona")]
struct Cli {
    /// Config file (TOML). Defaults to ./ronna.toml when present.
    #[arg(long, global = true, env = "RONNA_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the LINE webhook (default).
    Serve,
    /// Validate config and report which credentials are present.
    Doctor,
    /// Generate one reply locally, without LINE.
    Ask { message: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    init_tracing()?;
    install_panic_hook();
    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "failed to load .env"),
    }

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => server::serve(cli.config).await,
        Command::Doctor => server::doctor(cli.config).await,
        Command::Ask { message } => server::ask(cli.config, &message).await,
    }
}

const DEFAULT_LOG_FILTER: &str =
    "info,ronna_relay=debug,relay_app=debug,relay_line=debug,relay_llm=debug,tower_http=info";

/// `RUST_LOG` selects what is logged, `RONNA_LOG_FORMAT` how (json by default).
fn init_tracing() -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let log_format = std::env::var("RONNA_LOG_FORMAT")
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_else(|_| "json".to_string());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);
    match log_format.as_str() {
        "json" => builder
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(true)
            .init(),
        "pretty" => builder.pretty().init(),
        "compact" => builder.compact().init(),
        other => {
            return Err(anyhow::anyhow!(
                "RONNA_LOG_FORMAT must be json, pretty or compact, got {other:?}"
            ));
        }
    }

    tracing::debug!(%log_format, "tracing initialized");
    Ok(())
}

/// Route panics through tracing before the default hook prints them.
fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info.location().map(ToString::to_string);
        tracing::error!(
            panic_location = location.as_deref().unwrap_or("unknown"),
            panic_payload = %webhook::panic_payload_to_string(info.payload()),
            "panic"
        );
        previous(info);
    }));
}
