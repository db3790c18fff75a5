//! Coedit server entry point.

use coedit::config::Config;
use coedit::server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let config = Config::from_env();
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let app = server::create_app(&config).await?;

    tracing::info!(addr = %addr, "starting coedit server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
