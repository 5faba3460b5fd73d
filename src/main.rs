//! llm-arbiter HTTP server
//!
//! Starts an Axum web server that arbitrates between candidate model answers.

use clap::Parser;
use llm_arbiter::{
    cli::{Cli, Command, generate_config_template},
    config::Config,
    handlers::{self, AppState},
    models::OpenAiCompatClient,
    telemetry,
};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(&path, template)?;
                println!("Configuration template written to {}", path);
            }
            None => print!("{}", template),
        }
        return Ok(());
    }

    // Load configuration
    let config = Config::from_file(&cli.config)?;

    // Initialize telemetry
    telemetry::init(&config.observability.log_level);

    let api_key = config.provider.load_api_key()?;
    let client = OpenAiCompatClient::from_config(&config.provider, api_key)?;

    tracing::info!(
        base_url = %config.provider.base_url,
        candidates = config.candidates.len(),
        judge_model = %config.judge.model,
        "Starting llm-arbiter on {}:{}",
        config.server.host,
        config.server.port
    );

    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0])),
        config.server.port,
    ));

    let state = AppState::new(Arc::new(config), Arc::new(client))?;
    let app = handlers::router(state);

    tracing::info!("Listening on {}", addr);
    tracing::info!("Arbitrated stream available at http://{}/stream/", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
