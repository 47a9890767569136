//! Scheduler runs against the synthetic site
#![cfg(feature = "sim")]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

use energy_scheduler::config::{Config, OptimizerConfig};
use energy_scheduler::controller::{EnergyScheduler, OptimizerState};
use energy_scheduler::domain::FixedClock;
use energy_scheduler::error::OptimizerError;
use energy_scheduler::forecast::{SiteDataSource, SiteInputs, SyntheticSite};
use energy_scheduler::handler;
use energy_scheduler::optimizer::order_by_priority;

fn config() -> Config {
    Config {
        optimizer: OptimizerConfig {
            seed: Some(17),
            ..OptimizerConfig::default()
        },
        ..Config::default()
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 14, 0, 0).unwrap()
}

fn scheduler(config: Config, source: Arc<dyn SiteDataSource>) -> EnergyScheduler {
    let handlers = order_by_priority(handler::from_config(&config), &config.site.controller_priority);
    EnergyScheduler::new(config, source, handlers, Arc::new(FixedClock::new(now()))).unwrap()
}

#[tokio::test]
async fn test_repeated_runs_on_unchanged_inputs_never_regress() {
    let config = config();
    let site = Arc::new(SyntheticSite::from_config(&config).into_engine());
    let scheduler = scheduler(config, site);

    let first = scheduler.reoptimize_schedule().await.unwrap();
    let second = scheduler.reoptimize_schedule().await.unwrap();
    assert!(second.result.cost <= first.result.cost);
    assert_eq!(second.result.candidate.genes[0], first.result.candidate.genes[0]);

    // 6 h of quarters, then 30 h of hours
    assert_eq!(first.result.periods.len(), 24 + 30);
    let status = scheduler.status();
    assert_eq!(status.state, OptimizerState::Idle);
    assert_eq!(status.success_count, 2);
    assert_eq!(status.last_cost, Some(second.result.cost));
}

#[tokio::test]
async fn test_published_schedule_covers_horizon() {
    let config = config();
    let site = Arc::new(SyntheticSite::from_config(&config).into_engine());
    let scheduler = scheduler(config, site);
    let report = scheduler.reoptimize_schedule().await.unwrap();

    let ess = scheduler
        .handlers()
        .iter()
        .find_map(|h| h.as_multi_state())
        .unwrap();
    let schedule = ess.schedule();
    assert_eq!(schedule.len(), report.result.periods.len());
    assert_eq!(schedule.valid_until(), Some(now() + chrono::Duration::hours(36)));
    assert!(!schedule.is_stale(now()));
    assert!(schedule.entries.values().all(|e| e.metadata.is_some()));
}

struct Unavailable;

#[async_trait]
impl SiteDataSource for Unavailable {
    async fn fetch(&self, _now: DateTime<Utc>) -> Result<SiteInputs> {
        anyhow::bail!("meter offline")
    }
}

#[tokio::test]
async fn test_unavailable_site_data_is_reported() {
    let scheduler = scheduler(config(), Arc::new(Unavailable));
    let err = scheduler.reoptimize_schedule().await.unwrap_err();
    assert!(matches!(err, OptimizerError::Forecast(_)));
    assert!(err.to_string().contains("meter offline"));
    assert!(scheduler.previous().is_none());
    assert_eq!(scheduler.status().error_count, 1);
}
