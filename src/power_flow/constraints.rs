use serde::{Deserialize, Serialize};

/// Maximum state of charge the optimizer plans with [%]
pub const ESS_MAX_SOC_PERCENT: i32 = 90;

/// Per-period energy limits of the storage system [Wh]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageEnvelope {
    /// Maximum energy the ESS can charge within the period
    pub max_charge: i32,

    /// Maximum energy the ESS can discharge within the period
    pub max_discharge: i32,

    /// Energy charged per period in CHARGE_GRID, risk margin already applied
    pub grid_charge: i32,

    /// Maximum energy bought from the grid within the period (fuse limit)
    pub max_grid_buy: i32,
}

impl StorageEnvelope {
    pub fn symmetric(max_energy: i32, max_grid_buy: i32) -> Self {
        Self {
            max_charge: max_energy,
            max_discharge: max_energy,
            grid_charge: max_energy,
            max_grid_buy,
        }
    }

    /// Sum of two envelopes, used when merging quarters into an hour
    pub fn combined(&self, other: &StorageEnvelope) -> Self {
        Self {
            max_charge: self.max_charge + other.max_charge,
            max_discharge: self.max_discharge + other.max_discharge,
            grid_charge: self.grid_charge + other.grid_charge,
            max_grid_buy: self.max_grid_buy + other.max_grid_buy,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_charge < 0 || self.max_discharge < 0 {
            return Err("ESS charge/discharge limits cannot be negative".to_string());
        }
        if self.grid_charge < 0 || self.grid_charge > self.max_charge {
            return Err(format!(
                "grid charge energy {} Wh must be within [0, {}]",
                self.grid_charge, self.max_charge
            ));
        }
        if self.max_grid_buy < 0 {
            return Err("max_grid_buy cannot be negative".to_string());
        }
        Ok(())
    }
}

/// Site-wide storage facts [Wh]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EssCapacity {
    pub total_energy: i32,
    /// Energy below the minimum SoC, never scheduled for discharge
    pub min_soc_energy: i32,
    /// Energy at the maximum planned SoC
    pub max_soc_energy: i32,
    /// Energy stored at the start of the horizon
    pub initial_energy: i32,
}

impl EssCapacity {
    pub fn new(total_energy: i32, min_soc_energy: i32, max_soc_energy: i32, initial_energy: i32) -> Self {
        Self {
            total_energy,
            min_soc_energy,
            max_soc_energy,
            initial_energy,
        }
    }

    /// Derive energies from capacity and SoC percentages
    pub fn from_soc(total_energy: i32, min_soc_percent: i32, soc_percent: i32) -> Self {
        let percent_of = |p: i32| (i64::from(total_energy) * i64::from(p.clamp(0, 100)) / 100) as i32;
        Self {
            total_energy,
            min_soc_energy: percent_of(min_soc_percent),
            max_soc_energy: percent_of(ESS_MAX_SOC_PERCENT),
            initial_energy: percent_of(soc_percent),
        }
    }

    /// Chargeable energy starting from `energy`, ignoring power limits
    pub fn headroom(&self, energy: i32) -> i32 {
        (self.max_soc_energy - energy.max(0)).max(0)
    }

    /// Dischargeable energy starting from `energy`, ignoring power limits
    pub fn available(&self, energy: i32) -> i32 {
        (energy.max(0) - self.min_soc_energy).max(0)
    }

    pub fn soc_percent(&self, energy: i32) -> Option<f64> {
        (self.total_energy > 0).then(|| f64::from(energy) * 100.0 / f64::from(self.total_energy))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.total_energy < 0 {
            return Err(format!("ESS capacity cannot be negative: {} Wh", self.total_energy));
        }
        if self.min_soc_energy < 0 || self.min_soc_energy > self.max_soc_energy {
            return Err("min SoC energy must be within [0, max SoC energy]".to_string());
        }
        if self.max_soc_energy > self.total_energy {
            return Err("max SoC energy exceeds capacity".to_string());
        }
        Ok(())
    }
}
