//! Synthetic site
//!
//! Deterministic daily price, PV and household profiles so the scheduler can
//! run without real forecast providers.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

use super::{
    ConsumptionForecaster, ForecastEngine, PriceForecaster, ProductionForecaster, StorageMonitor, StorageSnapshot,
};
use crate::config::{Config, EssConfig, SyntheticConfig};

#[derive(Debug, Clone)]
pub struct SyntheticSite {
    profile: SyntheticConfig,
    ess: EssConfig,
    max_grid_buy_power_w: i32,
    quarters: usize,
}

fn bump(hour: f64, center: f64, width: f64) -> f64 {
    (-((hour - center) / width).powi(2)).exp()
}

impl SyntheticSite {
    pub fn from_config(config: &Config) -> Self {
        Self {
            profile: config.synthetic.clone(),
            ess: config.ess.clone(),
            max_grid_buy_power_w: config.site.max_grid_buy_power_w,
            quarters: config.horizon.max_hours as usize * 4,
        }
    }

    /// Day-ahead price [per MWh] with morning and evening peaks
    pub fn price_at(&self, t: DateTime<Utc>) -> f64 {
        let hour = hour_of_day(t);
        let price = 80.0 + 70.0 * bump(hour, 8.0, 1.5) + 140.0 * bump(hour, 19.0, 2.0) - 30.0 * bump(hour, 3.0, 2.5);
        (price * 100.0).round() / 100.0
    }

    /// Average PV power [W]; zero between 18:00 and 06:00
    pub fn production_at(&self, t: DateTime<Utc>) -> i32 {
        let hour = hour_of_day(t);
        if !(6.0..18.0).contains(&hour) {
            return 0;
        }
        (f64::from(self.profile.pv_peak_power_w) * (PI * (hour - 6.0) / 12.0).sin()).round() as i32
    }

    /// Average household power [W]
    pub fn consumption_at(&self, t: DateTime<Utc>) -> i32 {
        let hour = hour_of_day(t);
        let base = f64::from(self.profile.base_load_w);
        let load = base + 1_500.0 * bump(hour, 7.5, 1.0) + 2_500.0 * bump(hour, 19.0, 1.5);
        let noise = if self.profile.noise > 0.0 {
            // seeded per quarter so repeated fetches agree
            let mut rng = StdRng::seed_from_u64(self.profile.seed ^ (t.timestamp() / 900) as u64);
            1.0 + self.profile.noise * rng.gen_range(-1.0..=1.0)
        } else {
            1.0
        };
        (load * noise).round().max(0.0) as i32
    }

    pub fn storage(&self) -> StorageSnapshot {
        StorageSnapshot {
            capacity_wh: self.ess.capacity_wh,
            soc_percent: self.ess.initial_soc_percent,
            min_soc_percent: self.ess.min_soc_percent,
            max_charge_power_w: self.ess.max_charge_power_w,
            max_discharge_power_w: self.ess.max_discharge_power_w,
            max_grid_buy_power_w: self.max_grid_buy_power_w,
        }
    }
}

fn hour_of_day(t: DateTime<Utc>) -> f64 {
    f64::from(t.hour()) + f64::from(t.minute()) / 60.0
}

impl SyntheticSite {
    /// Forecast engine whose every collaborator is this site
    pub fn into_engine(self) -> ForecastEngine {
        ForecastEngine::new(
            Box::new(self.clone()),
            Box::new(self.clone()),
            Box::new(self.clone()),
            Box::new(self),
        )
    }

    fn series<T>(&self, start: DateTime<Utc>, value: impl Fn(&Self, DateTime<Utc>) -> T) -> Vec<Option<T>> {
        (0..self.quarters)
            .map(|i| Some(value(self, start + Duration::minutes(15 * i as i64))))
            .collect()
    }
}

#[async_trait]
impl PriceForecaster for SyntheticSite {
    async fn predict_prices(&self, start: DateTime<Utc>) -> Result<Vec<Option<f64>>> {
        Ok(self.series(start, Self::price_at))
    }
}

#[async_trait]
impl ProductionForecaster for SyntheticSite {
    async fn predict_production(&self, start: DateTime<Utc>) -> Result<Vec<Option<i32>>> {
        Ok(self.series(start, Self::production_at))
    }
}

#[async_trait]
impl ConsumptionForecaster for SyntheticSite {
    async fn predict_consumption(&self, start: DateTime<Utc>) -> Result<Vec<Option<i32>>> {
        Ok(self.series(start, Self::consumption_at))
    }
}

#[async_trait]
impl StorageMonitor for SyntheticSite {
    async fn read_storage(&self) -> Result<StorageSnapshot> {
        Ok(self.storage())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::SiteDataSource;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_profiles_follow_time_of_day() {
        let site = SyntheticSite::from_config(&Config::default());
        assert_eq!(site.production_at(at(2, 0)), 0);
        assert!(site.production_at(at(12, 0)) > 5_000);
        assert!(site.price_at(at(19, 0)) > site.price_at(at(3, 0)));
        assert!(site.consumption_at(at(19, 0)) > site.consumption_at(at(3, 0)));
    }

    #[tokio::test]
    async fn test_fetch_is_deterministic() {
        let engine = SyntheticSite::from_config(&Config::default()).into_engine();
        let a = engine.fetch(at(10, 7)).await.unwrap();
        let b = engine.fetch(at(10, 14)).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.forecast.start, at(10, 0));
        assert_eq!(a.forecast.prices.len(), 36 * 4);
        assert_eq!(a.storage.soc_percent, 50);
    }
}
