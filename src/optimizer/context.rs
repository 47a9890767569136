use chrono::{DateTime, Duration, Timelike, Utc};
use std::sync::Arc;

use crate::config::{HorizonConfig, SiteConfig};
use crate::domain::RiskLevel;
use crate::error::OptimizerError;
use crate::forecast::{interpolate_array, join_consumption, pad_production, SiteInputs, StorageSnapshot};
use crate::handler::{Handler, MultiStateHandler};
use crate::power_flow::{round_down_to_quarter, EssCapacity, Period, PeriodDuration, StorageEnvelope};

/// Read-only facts shared by every simulation of one optimizer run
#[derive(Debug, Clone)]
pub struct GlobalSimulationContext {
    pub start_time: DateTime<Utc>,
    pub periods: Vec<Period>,
    /// Handlers in controller priority order
    pub handlers: Vec<Arc<Handler>>,
    pub ess: EssCapacity,
    pub risk_level: RiskLevel,
}

impl GlobalSimulationContext {
    pub fn new(
        start_time: DateTime<Utc>,
        periods: Vec<Period>,
        handlers: Vec<Arc<Handler>>,
        ess: EssCapacity,
        risk_level: RiskLevel,
    ) -> Self {
        Self {
            start_time,
            periods,
            handlers,
            ess,
            risk_level,
        }
    }

    /// Build the context for a run starting at `now` from collaborator inputs.
    ///
    /// Inputs are rejected before anything is simulated: an invalid storage
    /// snapshot, forecasts of mismatched length, non-finite prices or a
    /// period outside the storage envelope all abort the run.
    pub fn from_inputs(
        now: DateTime<Utc>,
        inputs: &SiteInputs,
        handlers: Vec<Arc<Handler>>,
        horizon: &HorizonConfig,
        site: &SiteConfig,
    ) -> Result<Self, OptimizerError> {
        inputs.storage.validate().map_err(OptimizerError::InvalidStorage)?;
        let ess = ess_capacity(&inputs.storage);
        ess.validate().map_err(OptimizerError::InvalidStorage)?;
        inputs
            .forecast
            .validate()
            .map_err(OptimizerError::InsufficientForecast)?;

        let start = round_down_to_quarter(now);
        let periods = build_periods(start, inputs, horizon, site.risk_level);
        if periods.is_empty() {
            return Err(OptimizerError::InsufficientForecast(format!(
                "{} prices, {} consumption values from {}",
                inputs.forecast.prices.len(),
                inputs.forecast.consumption.len(),
                inputs.forecast.start
            )));
        }
        for period in &periods {
            period
                .validate()
                .map_err(|e| OptimizerError::InsufficientForecast(format!("period {}: {e}", period.time())))?;
        }
        Ok(Self::new(start, periods, handlers, ess, site.risk_level))
    }

    pub fn max_price(&self) -> f64 {
        self.periods
            .iter()
            .map(|p| p.price())
            .fold(f64::NEG_INFINITY, f64::max)
            .max(0.0)
    }

    pub fn multi_state_handlers(&self) -> impl Iterator<Item = &MultiStateHandler> + '_ {
        self.handlers.iter().filter_map(|h| h.as_multi_state())
    }

    /// Reason why a search cannot improve on the quick schedule
    pub fn worth_optimizing(&self) -> Result<(), &'static str> {
        if self.periods.is_empty() {
            return Err("no periods");
        }
        if self.periods.iter().all(|p| p.production() == 0 && p.consumption() == 0) {
            return Err("production and consumption are all zero");
        }
        let first = self.periods[0].price();
        if self.periods.iter().all(|p| p.price() == first) {
            return Err("all prices are identical");
        }
        Ok(())
    }
}

/// Storage energies from the current snapshot
pub fn ess_capacity(storage: &StorageSnapshot) -> EssCapacity {
    EssCapacity::from_soc(storage.capacity_wh, storage.min_soc_percent, storage.soc_percent)
}

/// Put handlers listed in `priority` first, in that order; the rest keep
/// their registration order.
pub fn order_by_priority(mut handlers: Vec<Arc<Handler>>, priority: &[String]) -> Vec<Arc<Handler>> {
    handlers.sort_by_key(|h| priority.iter().position(|id| id == h.id()).unwrap_or(priority.len()));
    handlers
}

/// Quarter periods for the near term, widened to hours further out
pub fn build_periods(
    start: DateTime<Utc>,
    inputs: &SiteInputs,
    horizon: &HorizonConfig,
    risk_level: RiskLevel,
) -> Vec<Period> {
    let forecast = &inputs.forecast;
    let prices = interpolate_array(&forecast.prices);
    let consumption = interpolate_array(&join_consumption(
        horizon.consumption_split,
        &forecast.consumption,
        &forecast.unmanaged_consumption,
    ));
    let production = pad_production(&interpolate_array(&forecast.production), consumption.len());

    // forecasts may start before the current quarter
    let skip = ((start - forecast.start).num_minutes() / 15).max(0) as usize;
    let quarters = prices
        .len()
        .min(consumption.len())
        .saturating_sub(skip)
        .min(horizon.max_hours as usize * 4);

    let quarter = PeriodDuration::Quarter;
    let storage = &inputs.storage;
    let max_charge = quarter.to_energy(storage.max_charge_power_w);
    let envelope = StorageEnvelope {
        max_charge,
        max_discharge: quarter.to_energy(storage.max_discharge_power_w),
        grid_charge: risk_level.grid_charge_energy(max_charge),
        max_grid_buy: quarter.to_energy(storage.max_grid_buy_power_w),
    };

    let quarter_period = |i: usize| {
        Period::new(
            0,
            start + Duration::minutes(15 * i as i64),
            quarter,
            prices[skip + i],
            quarter.to_energy(production[skip + i]),
            quarter.to_energy(consumption[skip + i]),
            envelope,
        )
    };

    let quarter_limit = horizon.quarter_hours as usize * 4;
    let mut periods: Vec<Period> = Vec::new();
    let mut i = 0;
    while i < quarters {
        let first = quarter_period(i);
        let widen = i >= quarter_limit && first.time().minute() == 0 && i + 4 <= quarters;
        let period = if widen {
            let parts: Vec<Period> = (i..i + 4).map(&quarter_period).collect();
            i += 4;
            merge_hour(&parts)
        } else {
            i += 1;
            first
        };
        periods.push(period.with_index(periods.len()));
    }
    periods
}

fn merge_hour(quarters: &[Period]) -> Period {
    let envelope = quarters
        .iter()
        .skip(1)
        .fold(*quarters[0].envelope(), |acc, q| acc.combined(q.envelope()));
    Period::new(
        0,
        quarters[0].time(),
        PeriodDuration::Hour,
        quarters.iter().map(|q| q.price()).sum::<f64>() / quarters.len() as f64,
        quarters.iter().map(|q| q.production()).sum(),
        quarters.iter().map(|q| q.consumption()).sum(),
        envelope,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::SiteForecast;
    use crate::handler::{EmergencyReserve, EssControlMode, EssTimeOfUse};
    use chrono::TimeZone;
    use rstest::rstest;

    fn storage() -> StorageSnapshot {
        StorageSnapshot {
            capacity_wh: 10_000,
            soc_percent: 50,
            min_soc_percent: 10,
            max_charge_power_w: 8_000,
            max_discharge_power_w: 8_000,
            max_grid_buy_power_w: 16_000,
        }
    }

    fn inputs(start: DateTime<Utc>, quarters: usize) -> SiteInputs {
        SiteInputs {
            forecast: SiteForecast {
                start,
                prices: (0..quarters).map(|i| Some(100.0 + i as f64)).collect(),
                production: vec![Some(400); quarters / 2],
                consumption: vec![Some(2_000); quarters],
                unmanaged_consumption: Vec::new(),
            },
            storage: storage(),
        }
    }

    #[test]
    fn test_near_term_quarters_then_hours() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let horizon = HorizonConfig {
            quarter_hours: 1,
            ..HorizonConfig::default()
        };
        let periods = build_periods(start, &inputs(start, 14), &horizon, RiskLevel::Medium);
        // 4 quarters, 2 hours, 2 trailing quarters
        let durations: Vec<_> = periods.iter().map(|p| p.duration()).collect();
        assert_eq!(periods.len(), 8);
        assert_eq!(durations[3], PeriodDuration::Quarter);
        assert_eq!(durations[4], PeriodDuration::Hour);
        assert_eq!(durations[5], PeriodDuration::Hour);
        assert_eq!(durations[6], PeriodDuration::Quarter);

        let hour = periods[4];
        assert_eq!(hour.time(), start + Duration::hours(1));
        assert_eq!(hour.consumption(), 2_000);
        assert_eq!(hour.production(), 300);
        assert!((hour.price() - 105.5).abs() < 1e-9);
        assert_eq!(hour.envelope().max_charge, 8_000);
        assert_eq!(periods[5].production(), 0);
        assert!(periods.iter().enumerate().all(|(i, p)| p.index() == i));
    }

    #[test]
    fn test_unaligned_start_widens_on_full_hour() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap();
        let horizon = HorizonConfig {
            quarter_hours: 0,
            ..HorizonConfig::default()
        };
        let periods = build_periods(start, &inputs(start, 10), &horizon, RiskLevel::Medium);
        assert_eq!(periods[0].duration(), PeriodDuration::Quarter);
        assert_eq!(periods[1].duration(), PeriodDuration::Quarter);
        assert_eq!(periods[2].duration(), PeriodDuration::Hour);
        assert_eq!(periods[2].time(), Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap());
    }

    #[test]
    fn test_horizon_is_capped() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let horizon = HorizonConfig {
            quarter_hours: 48,
            max_hours: 2,
            ..HorizonConfig::default()
        };
        assert_eq!(build_periods(start, &inputs(start, 40), &horizon, RiskLevel::Low).len(), 8);
    }

    #[test]
    fn test_quarter_envelope_uses_risk_level() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let periods = build_periods(start, &inputs(start, 4), &HorizonConfig::default(), RiskLevel::High);
        let envelope = periods[0].envelope();
        assert_eq!(envelope.max_charge, 2_000);
        assert_eq!(envelope.grid_charge, 1_818);
        assert_eq!(envelope.max_grid_buy, 4_000);
    }

    #[test]
    fn test_empty_forecast_is_insufficient() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let result = GlobalSimulationContext::from_inputs(
            start,
            &inputs(start, 0),
            vec![],
            &HorizonConfig::default(),
            &SiteConfig::default(),
        );
        assert!(matches!(result, Err(OptimizerError::InsufficientForecast(_))));
    }

    fn context_from(inputs: &SiteInputs) -> Result<GlobalSimulationContext, OptimizerError> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        GlobalSimulationContext::from_inputs(start, inputs, vec![], &HorizonConfig::default(), &SiteConfig::default())
    }

    #[rstest]
    #[case::negative_capacity(StorageSnapshot { capacity_wh: -1_000, ..storage() })]
    #[case::soc_above_full(StorageSnapshot { soc_percent: 150, ..storage() })]
    #[case::negative_soc(StorageSnapshot { soc_percent: -5, ..storage() })]
    #[case::min_soc_above_planned_max(StorageSnapshot { min_soc_percent: 95, ..storage() })]
    #[case::negative_power(StorageSnapshot { max_charge_power_w: -1, ..storage() })]
    fn test_invalid_storage_is_rejected(#[case] snapshot: StorageSnapshot) {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut inputs = inputs(start, 8);
        inputs.storage = snapshot;
        assert!(matches!(context_from(&inputs), Err(OptimizerError::InvalidStorage(_))));
    }

    #[test]
    fn test_non_finite_price_is_rejected() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut inputs = inputs(start, 8);
        inputs.forecast.prices[3] = Some(f64::NAN);
        let err = context_from(&inputs).unwrap_err();
        assert!(matches!(err, OptimizerError::InsufficientForecast(_)));
        assert!(err.to_string().contains("not finite"));
    }

    #[test]
    fn test_mismatched_forecast_lengths_are_rejected() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut inputs = inputs(start, 8);
        inputs.forecast.prices.truncate(6);
        assert!(matches!(context_from(&inputs), Err(OptimizerError::InsufficientForecast(_))));

        let mut inputs = self::inputs(start, 8);
        inputs.forecast.production = vec![Some(400); 12];
        assert!(matches!(context_from(&inputs), Err(OptimizerError::InsufficientForecast(_))));
    }

    #[test]
    fn test_negative_consumption_is_rejected() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut inputs = inputs(start, 8);
        inputs.forecast.consumption[0] = Some(-400);
        let err = context_from(&inputs).unwrap_err();
        assert!(err.to_string().contains("consumption cannot be negative"));
    }

    #[test]
    fn test_worth_optimizing() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut inputs = inputs(start, 8);
        let ctx = GlobalSimulationContext::from_inputs(
            start,
            &inputs,
            vec![],
            &HorizonConfig::default(),
            &SiteConfig::default(),
        )
        .unwrap();
        assert!(ctx.worth_optimizing().is_ok());
        assert_eq!(ctx.ess.initial_energy, 5_000);
        assert_eq!(ctx.ess.min_soc_energy, 1_000);

        inputs.forecast.prices = vec![Some(80.0); 8];
        let ctx = GlobalSimulationContext::from_inputs(
            start,
            &inputs,
            vec![],
            &HorizonConfig::default(),
            &SiteConfig::default(),
        )
        .unwrap();
        assert_eq!(ctx.worth_optimizing(), Err("all prices are identical"));
    }

    #[test]
    fn test_order_by_priority() {
        let handlers = vec![
            Arc::new(Handler::multi_state("ess0", EssTimeOfUse::new(EssControlMode::default()))),
            Arc::new(Handler::multi_state("ess1", EssTimeOfUse::new(EssControlMode::default()))),
            Arc::new(Handler::one_state("reserve", EmergencyReserve::new(20))),
        ];
        let ordered = order_by_priority(handlers, &["reserve".to_string()]);
        let ids: Vec<_> = ordered.iter().map(|h| h.id()).collect();
        assert_eq!(ids, vec!["reserve", "ess0", "ess1"]);
    }
}
