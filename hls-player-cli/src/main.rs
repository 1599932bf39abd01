mod cli;
mod error;
mod player;

use crate::{cli::Args, error::Result, player::Player};
use clap::Parser;
use hls_fetcher::{DirectoryStore, FetchEngine, HttpTransport};
use std::process;
use std::sync::Arc;
use tracing::{Level, error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = args.to_config()?;
    let transport = Arc::new(HttpTransport::new(&config.http)?);
    let store = Arc::new(DirectoryStore::from_config(config.download_dir.as_deref()).await?);
    info!(url = %args.url, dir = %store.path().display(), "Starting playback");

    let (engine, first) = FetchEngine::start(&args.url, config, transport, store).await?;
    let mut player = Player::new(engine.handle().clone(), std::io::stdout(), args.realtime);

    let result = tokio::select! {
        result = player.run(first) => result.map(|_| ()),
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received, stopping...");
            Ok(())
        }
    };

    engine.stop();
    engine.join().await;
    result
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(verbose)
                .with_writer(std::io::stderr),
        )
        .init();
}
