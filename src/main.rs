// Gazette — Application Entry Point
//
// Loads `.env`, initializes structured logging (the filter never emits key
// material), parses CLI arguments and dispatches to the command handler.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use gazette::cli::{execute, Cli};

#[tokio::main]
async fn main() {
    // A missing .env file is fine; DB_KEY may come from the real environment.
    let _ = dotenvy::dotenv();

    // RUST_LOG=gazette=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gazette=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Err(e) = execute(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
