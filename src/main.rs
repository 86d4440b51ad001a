use std::{net::SocketAddr, sync::Arc};

use mcp_connection::{
    build_app,
    config::Config,
    domain::{catalog::CatalogOptions, CatalogHandler},
    logging,
    session::{HandlerFactory, SessionRegistry},
    AppState,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let catalog = match &config.catalog_path {
        Some(path) => CatalogOptions::load(path)?,
        None => CatalogOptions::default(),
    };
    if let Some(problem) = catalog.problem() {
        return Err(format!("invalid catalog: {problem}").into());
    }

    let factory = HandlerFactory::new(CatalogHandler, catalog, config.connection_options());
    let registry = Arc::new(SessionRegistry::new(Arc::new(factory)));
    let bind_socket = config.bind_socket()?;
    let app = build_app(AppState::new(
        Arc::clone(&registry),
        config.dispatch_timeout,
    ));
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        notification_methods = config.notification_methods.len(),
        "server starting"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let terminated = registry.shutdown().await;
    info!(sessions = terminated, "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
