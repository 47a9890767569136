use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Discrete operating state a controller can hold for one period.
///
/// ESS states follow the time-of-use logic, load states describe deferrable
/// consumers. Single-state handlers report `Active`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum OperatingState {
    /// Cover consumption from the battery, charge from surplus production
    Balancing,
    /// Hold the battery energy; surplus production may still charge it
    DelayDischarge,
    /// Actively charge the battery from the grid
    ChargeGrid,
    /// Deferrable load switched off
    Off,
    /// Deferrable load runs on surplus production only
    Surplus,
    /// Deferrable load runs at full power
    Force,
    Active,
}

/// How much forecast error the operator is willing to risk.
///
/// Lower risk keeps a larger efficiency margin when sizing grid charging.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskLevel {
    /// Round-trip efficiency margin multiplier
    pub fn efficiency_factor(self) -> f64 {
        match self {
            RiskLevel::Low => 1.20,
            RiskLevel::Medium => 1.17,
            RiskLevel::High => 1.10,
        }
    }

    /// Grid charge energy per period after applying the margin
    pub fn grid_charge_energy(self, max_charge_energy: i32) -> i32 {
        (f64::from(max_charge_energy.max(0)) / self.efficiency_factor()).round() as i32
    }
}
