use anyhow::Result;
use energy_scheduler::{config, controller, handler, optimizer, telemetry};
use config::Config;
use controller::{EnergyScheduler, OptimizerTask};
use energy_scheduler::domain::SystemClock;
use energy_scheduler::forecast::SiteDataSource;
use std::sync::Arc;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = Config::load()?;

    let handlers = optimizer::order_by_priority(handler::from_config(&cfg), &cfg.site.controller_priority);
    let ids: Vec<&str> = handlers.iter().map(|h| h.id()).collect();
    info!(handlers = ?ids, risk_level = %cfg.site.risk_level, "starting energy scheduler");

    let source = site_data_source(&cfg)?;
    let scheduler = Arc::new(EnergyScheduler::new(
        cfg.clone(),
        source,
        handlers,
        Arc::new(SystemClock),
    )?);

    OptimizerTask::new(scheduler, cfg.scheduler.clone())
        .run(telemetry::shutdown_signal())
        .await;

    warn!("shutdown complete");
    Ok(())
}

#[cfg(feature = "sim")]
fn site_data_source(cfg: &Config) -> Result<Arc<dyn SiteDataSource>> {
    info!("using synthetic site data");
    Ok(Arc::new(energy_scheduler::forecast::SyntheticSite::from_config(cfg).into_engine()))
}

#[cfg(not(feature = "sim"))]
fn site_data_source(_cfg: &Config) -> Result<Arc<dyn SiteDataSource>> {
    anyhow::bail!("no site data source available; build with the `sim` feature")
}
