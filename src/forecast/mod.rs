pub mod engine;
pub mod preprocess;
#[cfg(feature = "sim")]
pub mod synthetic;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use engine::*;
pub use preprocess::*;
#[cfg(feature = "sim")]
pub use synthetic::*;

/// Quarter-hourly forecasts starting at `start`; `None` marks a gap.
///
/// Power values are average power [W] of the quarter, prices per MWh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteForecast {
    pub start: DateTime<Utc>,
    pub prices: Vec<Option<f64>>,
    pub production: Vec<Option<i32>>,
    /// Total consumption, including schedulable loads
    pub consumption: Vec<Option<i32>>,
    /// Consumption without schedulable loads; may be empty
    pub unmanaged_consumption: Vec<Option<i32>>,
}

impl SiteForecast {
    /// Prices and consumption must cover the same quarters; production and
    /// unmanaged consumption may be shorter but never longer.
    pub fn validate(&self) -> Result<(), String> {
        if self.prices.len() != self.consumption.len() {
            return Err(format!(
                "{} prices but {} consumption values",
                self.prices.len(),
                self.consumption.len()
            ));
        }
        if self.production.len() > self.consumption.len() {
            return Err(format!(
                "{} production values exceed {} consumption values",
                self.production.len(),
                self.consumption.len()
            ));
        }
        if self.unmanaged_consumption.len() > self.consumption.len() {
            return Err(format!(
                "{} unmanaged consumption values exceed {} consumption values",
                self.unmanaged_consumption.len(),
                self.consumption.len()
            ));
        }
        if let Some(price) = self.prices.iter().flatten().find(|p| !p.is_finite()) {
            return Err(format!("price is not finite: {price}"));
        }
        Ok(())
    }
}

/// Current state and limits of the storage system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StorageSnapshot {
    pub capacity_wh: i32,
    pub soc_percent: i32,
    pub min_soc_percent: i32,
    pub max_charge_power_w: i32,
    pub max_discharge_power_w: i32,
    pub max_grid_buy_power_w: i32,
}

impl StorageSnapshot {
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity_wh < 0 {
            return Err(format!("capacity cannot be negative: {} Wh", self.capacity_wh));
        }
        for (name, percent) in [("soc", self.soc_percent), ("min soc", self.min_soc_percent)] {
            if !(0..=100).contains(&percent) {
                return Err(format!("{name} {percent}% is outside [0, 100]"));
            }
        }
        if self.max_charge_power_w < 0 || self.max_discharge_power_w < 0 || self.max_grid_buy_power_w < 0 {
            return Err("power limits cannot be negative".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteInputs {
    pub forecast: SiteForecast,
    pub storage: StorageSnapshot,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceForecaster: Send + Sync {
    async fn predict_prices(&self, start: DateTime<Utc>) -> Result<Vec<Option<f64>>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductionForecaster: Send + Sync {
    async fn predict_production(&self, start: DateTime<Utc>) -> Result<Vec<Option<i32>>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConsumptionForecaster: Send + Sync {
    async fn predict_consumption(&self, start: DateTime<Utc>) -> Result<Vec<Option<i32>>>;

    async fn predict_unmanaged_consumption(&self, _start: DateTime<Utc>) -> Result<Vec<Option<i32>>> {
        Ok(Vec::new())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageMonitor: Send + Sync {
    async fn read_storage(&self) -> Result<StorageSnapshot>;
}

/// Everything the optimizer needs from the outside world for one run
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SiteDataSource: Send + Sync {
    async fn fetch(&self, now: DateTime<Utc>) -> Result<SiteInputs>;
}
