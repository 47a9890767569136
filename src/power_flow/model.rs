use serde::{Deserialize, Serialize};

use super::{EnergyFlow, EssCapacity, Period};
use crate::domain::OperatingState;
use crate::error::SimulationError;

/// What the ESS is asked to do within one period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EssDirective {
    Balancing,
    DelayDischarge,
    ChargeGrid,
}

impl EssDirective {
    pub fn from_state(state: OperatingState) -> Option<Self> {
        match state {
            OperatingState::Balancing => Some(EssDirective::Balancing),
            OperatingState::DelayDischarge => Some(EssDirective::DelayDischarge),
            OperatingState::ChargeGrid => Some(EssDirective::ChargeGrid),
            _ => None,
        }
    }
}

/// Mutable energy model of one period while handlers step through it.
///
/// Handlers add consumption, tighten ESS limits and pick a directive; `solve`
/// turns the final model into an [`EnergyFlow`]. The ESS energy is always
/// clamped to the envelope, so no directive can produce an invalid flow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyModel {
    production: i32,
    unmanaged_consumption: i32,
    managed_consumption: i32,
    ess_initial_energy: i32,
    ess_max_charge: i32,
    ess_max_discharge: i32,
    grid_charge: i32,
    max_grid_buy: i32,
    directive: Option<EssDirective>,
    additional_cost: f64,
}

/// Change a single handler step made to the model
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnergyDelta {
    pub managed_consumption: i32,
    pub ess_max_charge: i32,
    pub ess_max_discharge: i32,
    pub directive: Option<EssDirective>,
    pub additional_cost: f64,
}

impl EnergyModel {
    pub fn new(period: &Period, capacity: &EssCapacity, ess_initial_energy: i32) -> Self {
        let envelope = period.envelope();
        Self {
            production: period.production(),
            unmanaged_consumption: period.consumption(),
            managed_consumption: 0,
            ess_initial_energy,
            ess_max_charge: envelope.max_charge.min(capacity.headroom(ess_initial_energy)).max(0),
            ess_max_discharge: envelope
                .max_discharge
                .min(capacity.available(ess_initial_energy))
                .max(0),
            grid_charge: envelope.grid_charge.max(0),
            max_grid_buy: envelope.max_grid_buy.max(0),
            directive: None,
            additional_cost: 0.0,
        }
    }

    pub fn consumption(&self) -> i32 {
        self.unmanaged_consumption + self.managed_consumption
    }

    /// Production not yet used by consumption (negative on deficit)
    pub fn surplus(&self) -> i32 {
        self.production - self.consumption()
    }

    pub fn ess_initial_energy(&self) -> i32 {
        self.ess_initial_energy
    }

    pub fn ess_max_discharge(&self) -> i32 {
        self.ess_max_discharge
    }

    pub fn additional_cost(&self) -> f64 {
        self.additional_cost
    }

    pub fn add_managed_consumption(&mut self, energy: i32) -> Result<(), SimulationError> {
        if energy < 0 {
            return Err(SimulationError::InvalidEnergy {
                what: "managed consumption",
                value: energy,
            });
        }
        self.managed_consumption += energy;
        Ok(())
    }

    pub fn limit_ess_charge(&mut self, max_energy: i32) {
        self.ess_max_charge = self.ess_max_charge.min(max_energy.max(0));
    }

    pub fn limit_ess_discharge(&mut self, max_energy: i32) {
        self.ess_max_discharge = self.ess_max_discharge.min(max_energy.max(0));
    }

    /// Select the ESS directive; returns the energy it currently resolves to
    pub fn apply(&mut self, directive: EssDirective) -> i32 {
        self.directive = Some(directive);
        self.ess_energy()
    }

    pub fn add_cost(&mut self, cost: f64) -> Result<(), SimulationError> {
        if !cost.is_finite() {
            return Err(SimulationError::NonFiniteCost(cost));
        }
        self.additional_cost += cost;
        Ok(())
    }

    /// ESS energy for the selected directive; BALANCING if none was selected
    pub fn ess_energy(&self) -> i32 {
        let net = self.consumption() - self.production;
        let target = match self.directive.unwrap_or(EssDirective::Balancing) {
            EssDirective::Balancing => net,
            EssDirective::DelayDischarge => net.min(0),
            EssDirective::ChargeGrid => (net - self.max_grid_buy).min(-1).max(-self.grid_charge),
        };
        // Charging must not push the grid import above the fuse limit
        let grid_floor = (net - self.max_grid_buy).min(0);
        target
            .clamp(-self.ess_max_charge, self.ess_max_discharge)
            .max(grid_floor)
    }

    pub fn delta_since(&self, before: &EnergyModel) -> EnergyDelta {
        EnergyDelta {
            managed_consumption: self.managed_consumption - before.managed_consumption,
            ess_max_charge: self.ess_max_charge - before.ess_max_charge,
            ess_max_discharge: self.ess_max_discharge - before.ess_max_discharge,
            directive: if self.directive != before.directive {
                self.directive
            } else {
                None
            },
            additional_cost: self.additional_cost - before.additional_cost,
        }
    }

    pub fn solve(&self) -> EnergyFlow {
        EnergyFlow::from_balance(
            self.production,
            self.consumption(),
            self.managed_consumption,
            self.ess_energy(),
        )
    }
}

/// Flow of one period under a single ESS directive
pub fn simulate_flow(
    period: &Period,
    directive: EssDirective,
    ess_initial_energy: i32,
    capacity: &EssCapacity,
) -> EnergyFlow {
    let mut model = EnergyModel::new(period, capacity, ess_initial_energy);
    model.apply(directive);
    model.solve()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power_flow::{PeriodDuration, StorageEnvelope};
    use chrono::{Duration, TimeZone, Utc};

    fn periods(prices: &[f64], production: &[i32], consumption: &[i32], envelope: StorageEnvelope) -> Vec<Period> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap();
        (0..prices.len())
            .map(|i| {
                Period::new(
                    i,
                    start + Duration::minutes(15 * i as i64),
                    PeriodDuration::Quarter,
                    prices[i],
                    production[i],
                    consumption[i],
                    envelope,
                )
            })
            .collect()
    }

    fn run(periods: &[Period], directive: EssDirective, capacity: &EssCapacity) -> Vec<i32> {
        let mut energy = capacity.initial_energy;
        periods
            .iter()
            .map(|period| {
                let flow = simulate_flow(period, directive, energy, capacity);
                assert!(flow.verify_energy_balance());
                energy -= flow.ess;
                flow.ess
            })
            .collect()
    }

    #[test]
    fn test_balancing_and_delay_discharge_sequence() {
        let periods = periods(
            &[120.0, 250.0, 180.0, 200.0],
            &[300, 0, 0, 0],
            &[1173, 2500, 1558, 1160],
            StorageEnvelope::symmetric(2250, 4000),
        );
        let ess = EssCapacity::new(10_000, 0, 9_000, 6_000);
        assert_eq!(run(&periods, EssDirective::Balancing, &ess), vec![873, 2250, 1558, 1160]);
        assert_eq!(run(&periods, EssDirective::DelayDischarge, &ess), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_balancing_runs_empty_then_charges_from_surplus() {
        let periods = periods(
            &[120.0, 250.0, 180.0, 200.0],
            &[0, 0, 0, 1793],
            &[136, 500, 400, 1000],
            StorageEnvelope::symmetric(2250, 4000),
        );
        let ess = EssCapacity::new(10_000, 1_000, 9_000, 1_159);
        assert_eq!(run(&periods, EssDirective::Balancing, &ess), vec![136, 23, 0, -793]);
    }

    #[test]
    fn test_charge_grid_respects_fuse_and_charge_limits() {
        let periods = periods(
            &[40.0, 45.0, 42.0, 38.0],
            &[0, 0, 0, 0],
            &[2592, 3171, 2459, 1500],
            StorageEnvelope::symmetric(2250, 4000),
        );
        let ess = EssCapacity::new(10_000, 0, 9_000, 2_000);
        assert_eq!(
            run(&periods, EssDirective::ChargeGrid, &ess),
            vec![-1408, -829, -1541, -2250]
        );
    }

    #[test]
    fn test_charge_grid_stops_at_max_soc() {
        let period = periods(&[40.0], &[0], &[500], StorageEnvelope::symmetric(2250, 4000))[0];
        let ess = EssCapacity::new(10_000, 0, 9_000, 8_600);
        let flow = simulate_flow(&period, EssDirective::ChargeGrid, 8_600, &ess);
        assert_eq!(flow.ess, -400);
        assert_eq!(flow.grid_to_ess, 400);
    }

    #[test]
    fn test_charge_grid_above_fuse_limit_is_idle() {
        let period = periods(&[40.0], &[0], &[4200], StorageEnvelope::symmetric(2250, 4000))[0];
        let ess = EssCapacity::new(10_000, 0, 9_000, 5_000);
        assert_eq!(simulate_flow(&period, EssDirective::ChargeGrid, 5_000, &ess).ess, 0);
    }

    #[test]
    fn test_delay_discharge_still_charges_from_surplus() {
        let period = periods(&[40.0], &[3000], &[1000], StorageEnvelope::symmetric(2250, 4000))[0];
        let ess = EssCapacity::new(10_000, 0, 9_000, 5_000);
        let flow = simulate_flow(&period, EssDirective::DelayDischarge, 5_000, &ess);
        assert_eq!(flow.ess, -2000);
        assert_eq!(flow.production_to_ess, 2000);
    }

    #[test]
    fn test_model_delta_and_limits() {
        let period = periods(&[40.0], &[0], &[1000], StorageEnvelope::symmetric(2250, 4000))[0];
        let ess = EssCapacity::new(10_000, 0, 9_000, 5_000);
        let mut model = EnergyModel::new(&period, &ess, 5_000);
        let before = model;
        model.add_managed_consumption(500).unwrap();
        model.limit_ess_discharge(300);
        assert_eq!(model.apply(EssDirective::Balancing), 300);
        model.add_cost(0.5).unwrap();
        let delta = model.delta_since(&before);
        assert_eq!(delta.managed_consumption, 500);
        assert_eq!(delta.ess_max_discharge, -1950);
        assert_eq!(delta.directive, Some(EssDirective::Balancing));
        assert!((delta.additional_cost - 0.5).abs() < 1e-12);

        assert!(model.add_managed_consumption(-1).is_err());
        assert!(model.add_cost(f64::INFINITY).is_err());
        assert_eq!(model.solve().grid, 1200);
    }
}
