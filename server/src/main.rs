//! dynapi server: boots the service or runs a migration command.
//!
//! `dynapi` (or `dynapi serve`) migrates and serves; `migrate`, `status` and
//! `rollback <version>` are operator commands that exit when done.

use clap::{Parser, Subcommand};
use dynapi::{bootstrap, Settings};
use std::net::SocketAddr;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "dynapi", version, about = "Generic table CRUD over HTTP")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending migrations and serve HTTP (default)
    Serve,
    /// Apply pending migrations and exit
    Migrate,
    /// List migrations with their applied state
    Status,
    /// Run the down script of one applied migration
    Rollback {
        /// Migration version to roll back
        version: i64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = Settings::load()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dynapi=info,dynapi_server=info")),
        )
        .init();

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings).await,
        Command::Migrate => migrate(&settings).await,
        Command::Status => status(&settings).await,
        Command::Rollback { version } => bootstrap::rollback(&settings, version)
            .await
            .map_err(Into::into),
    };
    if let Err(e) = &result {
        tracing::error!(error = %e, "exiting");
    }
    result
}

async fn serve(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let state = bootstrap::boot(&settings).await?;
    let app = dynapi::app(state, settings.max_body_bytes);
    let listener = TcpListener::bind(SocketAddr::new(settings.host, settings.port)).await?;
    tracing::info!("dynapi listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn migrate(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let report = bootstrap::migrate(settings).await?;
    println!(
        "applied {} migration(s), {} already applied",
        report.applied.len(),
        report.skipped.len()
    );
    for v in report.applied {
        println!("  applied {}", v);
    }
    Ok(())
}

async fn status(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    for s in bootstrap::status(settings).await? {
        let state = match (&s.applied_at, s.known) {
            (Some(at), true) => format!("applied {}", at),
            (Some(at), false) => format!("applied {} (no longer provided)", at),
            (None, _) => "pending".to_string(),
        };
        println!("{:<16} {:<12} {:<32} {}", s.version, s.source, s.description, state);
    }
    Ok(())
}
