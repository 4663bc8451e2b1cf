use std::sync::Arc;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::config::Settings;
use crate::host::HostLoop;
use crate::hw::PrinterBus;
use crate::print_manager::ReqwestFetcher;
use crate::registry::PrinterRegistry;
use crate::transport::transport_from_settings;
use crate::utils::host_name;

/// Executes the `serve` command until Ctrl+C.
#[instrument(skip_all, level = "info", fields(mode = %settings.mode))]
pub(crate) async fn run(settings: Settings, bus: Arc<dyn PrinterBus>) -> Result<()> {
    let host = settings.host_name.clone().unwrap_or_else(host_name);
    let transport = transport_from_settings(&settings, &host)?;
    let registry = PrinterRegistry::new(bus, Arc::new(ReqwestFetcher::default()));

    info!(host = %host, "serving printers");
    HostLoop::new(registry, transport, host, settings.status_update_period())
        .run_until(ctrl_c())
        .await?;
    Ok(())
}

async fn ctrl_c() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "cannot listen for Ctrl+C; serving until killed");
        std::future::pending::<()>().await;
    }
}
