use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use tracing::info;

use common::utils::logging::init_logging_default;
use configs::AppConfig;
use service::items::ItemStore;
use service::retry::RetryPolicy;
use service::suppliers::SupplierService;
use service::upstream::HttpSupplierDirectory;

use crate::access::AccessState;
use crate::routes::{self, AppState};

/// Initialize logging via shared common utils
fn init_logging() {
    init_logging_default();
}

/// Build the shared components from the validated configuration.
pub async fn build_state(cfg: &AppConfig) -> anyhow::Result<AppState> {
    let items_path = std::path::Path::new(&cfg.storage.data_dir).join("items.json");
    let items = ItemStore::new(items_path)
        .await
        .map_err(|e| anyhow::anyhow!("item store init failed: {e}"))?;

    let directory = HttpSupplierDirectory::new(
        cfg.upstream.supplier_base_url.clone(),
        Duration::from_secs(cfg.upstream.connect_timeout_secs),
    )?;
    let suppliers = Arc::new(SupplierService::new(
        Arc::new(directory),
        RetryPolicy::single_retry(cfg.upstream.retry_enabled),
    ));

    let access = AccessState::new(
        cfg.access.api_access_token.clone(),
        cfg.limits.rate_limit_per_day,
    );

    Ok(AppState {
        items,
        suppliers,
        access,
        request_timeout: Duration::from_secs(cfg.limits.request_timeout_secs),
    })
}

/// Public entry: load configuration, assemble the app, bind and serve.
/// Any configuration or registry problem aborts startup; there is no
/// degraded mode.
pub async fn run() -> anyhow::Result<()> {
    dotenv().ok();
    init_logging();

    let cfg = AppConfig::load_and_validate()?;
    common::env::ensure_data_dir(&cfg.storage.data_dir).await?;

    let state = build_state(&cfg).await?;
    let app = routes::build_router(&cfg, state)?;

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port).parse()?;
    info!(%addr, "starting purchasing backend");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
