use serde::{Deserialize, Serialize};
use std::fmt;

/// Energy flows of one simulated period [Wh].
///
/// Balance: production + ess + grid = consumption
/// (ess positive = discharge, grid positive = buy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnergyFlow {
    pub production: i32,

    /// Total consumption including managed loads
    pub consumption: i32,

    /// Part of `consumption` added by schedulable loads
    pub managed_consumption: i32,

    pub ess: i32,
    pub grid: i32,

    pub production_to_consumption: i32,
    pub production_to_ess: i32,
    pub production_to_grid: i32,
    pub grid_to_consumption: i32,
    pub grid_to_ess: i32,
    pub ess_to_consumption: i32,
    pub ess_to_grid: i32,
}

impl EnergyFlow {
    /// Split a balanced period into its sub-flows.
    ///
    /// Production serves consumption first, then charges the ESS, the rest is
    /// exported. A discharging ESS serves the remaining consumption first.
    pub fn from_balance(production: i32, consumption: i32, managed_consumption: i32, ess: i32) -> Self {
        let production_to_consumption = production.min(consumption).max(0);
        let surplus = production - production_to_consumption;
        let deficit = consumption - production_to_consumption;

        let mut flow = Self {
            production,
            consumption,
            managed_consumption,
            ess,
            grid: consumption - production - ess,
            production_to_consumption,
            ..Self::default()
        };

        if ess < 0 {
            let charge = -ess;
            flow.production_to_ess = surplus.min(charge);
            flow.grid_to_ess = charge - flow.production_to_ess;
            flow.production_to_grid = surplus - flow.production_to_ess;
            flow.grid_to_consumption = deficit;
        } else {
            flow.ess_to_consumption = ess.min(deficit);
            flow.ess_to_grid = ess - flow.ess_to_consumption;
            flow.grid_to_consumption = deficit - flow.ess_to_consumption;
            flow.production_to_grid = surplus;
        }
        flow
    }

    pub fn verify_energy_balance(&self) -> bool {
        let grid = self.grid_to_consumption + self.grid_to_ess - self.production_to_grid - self.ess_to_grid;
        let ess = self.ess_to_consumption + self.ess_to_grid - self.production_to_ess - self.grid_to_ess;
        self.production + self.ess + self.grid == self.consumption && grid == self.grid && ess == self.ess
    }

    /// Grid cost for a price per MWh; exports earn
    pub fn cost(&self, price: f64) -> f64 {
        f64::from(self.grid) * price / 1_000_000.0
    }
}

impl fmt::Display for EnergyFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EnergyFlow {{ production: {}Wh, consumption: {}Wh, ess: {}Wh, grid: {}Wh, balanced: {} }}",
            self.production,
            self.consumption,
            self.ess,
            self.grid,
            if self.verify_energy_balance() { "✓" } else { "✗" }
        )
    }
}
