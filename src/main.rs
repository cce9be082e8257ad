use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use coupon_dispenser::{app, config::Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::load()?;
    info!("Loaded config: {:?}", config);
    if config.max_tracked_ips.is_some() {
        info!("IP ledger bounded to {:?} entries", config.max_tracked_ips);
    }

    let router = app::build_app(&config)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Coupon service listening on http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
