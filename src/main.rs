use std::error::Error;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::Router;
use dotenv::dotenv;
use reqwest::Client;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use allocation_dashboard::api_client::ReqwestAllocationsApi;
use allocation_dashboard::config::AppConfig;
use allocation_dashboard::routes::{AppState, router};
use allocation_dashboard::usecases::dashboard_service::DashboardService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().map_err(|e| {
        error!(error = %e, "Configuration error");
        e
    })?;

    let client = Client::builder().build()?;
    let provider = Arc::new(ReqwestAllocationsApi::new(client, &config.api_url));
    info!(
        api_url = %provider.base_url(),
        offset_hours = config.history_offset_hours,
        "Using allocations API"
    );

    let service = Arc::new(DashboardService::new(
        provider,
        config.usdt_brl_rate,
        config.bucket_options,
    ));

    // The view still starts without data; the error shows up in /summary.
    if let Err(e) = service.refresh().await {
        warn!(error = %e, "Initial allocations fetch failed");
    }

    let app = router(AppState::new(service));
    serve(app, config.bind_address, config.port).await;

    Ok(())
}

async fn serve(app: Router, host: IpAddr, port: u16) {
    // Try to bind to the requested port; if it's in use, try a few subsequent ports.
    let max_attempts: u16 = 10;
    for offset in 0..max_attempts {
        let Some(try_port) = port.checked_add(offset) else {
            break;
        };
        let addr = SocketAddr::new(host, try_port);
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => {
                info!(%addr, "Listening");
                if let Err(e) = axum::serve(listener, app).await {
                    error!(error = %e, "Server failed while serving");
                }
                return;
            }
            Err(e) => {
                warn!(port = try_port, error = %e, "Port unavailable, trying next");
            }
        }
    }
    error!(
        "Failed to bind to any port in range {}..{}",
        port,
        port.saturating_add(max_attempts - 1)
    );
}
