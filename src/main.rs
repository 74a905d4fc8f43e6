use std::sync::Arc;

use tracing::info;
use viincci_rag_mcp::{build_app, config::Config, domain::tools::default_registry, logging, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let registry = Arc::new(default_registry()?);
    let bind_socket = config.bind_socket()?;
    let state = AppState::new(registry, config.identity());
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        server_name = %config.server_name,
        protocol_version = %config.protocol_version,
        "server starting"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
