use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use termgate::cli::Cli;
use termgate::web::server::WebServer;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("termgate=info,tower_http=warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.into_config()?;

    println!("{}", "termgate".bold().cyan());
    println!(
        "  shell: {}  threshold: {}  max sessions: {}",
        config.shell,
        config.block_threshold.to_string().yellow(),
        config.max_sessions
    );

    WebServer::new(config).start().await
}
