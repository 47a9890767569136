use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};

use super::StorageEnvelope;

/// Length class of a planning period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodDuration {
    Quarter,
    Hour,
}

impl PeriodDuration {
    pub fn periods_per_hour(self) -> i32 {
        match self {
            PeriodDuration::Quarter => 4,
            PeriodDuration::Hour => 1,
        }
    }

    pub fn minutes(self) -> i64 {
        60 / i64::from(self.periods_per_hour())
    }

    pub fn duration(self) -> Duration {
        Duration::minutes(self.minutes())
    }

    /// Power [W] sustained for one period -> energy [Wh]
    pub fn to_energy(self, power_w: i32) -> i32 {
        power_w / self.periods_per_hour()
    }
}

pub fn round_down_to_quarter(t: DateTime<Utc>) -> DateTime<Utc> {
    t.duration_trunc(PeriodDuration::Quarter.duration())
        .unwrap_or(t)
}

/// Immutable facts about one planning slot.
///
/// Energies are per period [Wh]; the price is per MWh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Period {
    index: usize,
    time: DateTime<Utc>,
    duration: PeriodDuration,
    price: f64,
    production: i32,
    consumption: i32,
    envelope: StorageEnvelope,
}

impl Period {
    pub fn new(
        index: usize,
        time: DateTime<Utc>,
        duration: PeriodDuration,
        price: f64,
        production: i32,
        consumption: i32,
        envelope: StorageEnvelope,
    ) -> Self {
        Self {
            index,
            time,
            duration,
            price,
            production,
            consumption,
            envelope,
        }
    }

    /// Position within the horizon
    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn with_index(self, index: usize) -> Self {
        Self { index, ..self }
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn duration(&self) -> PeriodDuration {
        self.duration
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.time + self.duration.duration()
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn production(&self) -> i32 {
        self.production
    }

    /// Unmanaged consumption [Wh]
    pub fn consumption(&self) -> i32 {
        self.consumption
    }

    pub fn envelope(&self) -> &StorageEnvelope {
        &self.envelope
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.price.is_finite() {
            return Err(format!("price is not finite: {}", self.price));
        }
        if self.production < 0 {
            return Err(format!("production cannot be negative: {} Wh", self.production));
        }
        if self.consumption < 0 {
            return Err(format!("consumption cannot be negative: {} Wh", self.consumption));
        }
        self.envelope.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn period(price: f64, consumption: i32) -> Period {
        Period::new(
            3,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            PeriodDuration::Quarter,
            price,
            500,
            consumption,
            StorageEnvelope::symmetric(2250, 4000),
        )
    }

    #[test]
    fn test_energy_conversion() {
        assert_eq!(PeriodDuration::Quarter.to_energy(9000), 2250);
        assert_eq!(PeriodDuration::Hour.to_energy(9000), 9000);
        assert_eq!(PeriodDuration::Hour.minutes(), 60);
    }

    #[test]
    fn test_round_down_to_quarter() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 10, 44, 59).unwrap();
        assert_eq!(
            round_down_to_quarter(t),
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_period_accessors() {
        let period = period(100.0, 800);
        assert_eq!(period.index(), 3);
        assert_eq!(period.end(), Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap());
        assert_eq!(period.production(), 500);
        assert_eq!(period.envelope().max_grid_buy, 4000);

        let moved = period.with_index(0);
        assert_eq!(moved.index(), 0);
        assert_eq!(moved.time(), period.time());
    }

    #[test]
    fn test_period_validation() {
        assert!(period(100.0, 800).validate().is_ok());
        assert!(period(f64::NAN, 800).validate().is_err());
        assert!(period(f64::INFINITY, 800).validate().is_err());
        assert!(period(100.0, -1).validate().is_err());
    }
}
