use serde::{Deserialize, Serialize};

use super::{MultiStateSimulator, PeriodOutcome, StepContext};
use crate::domain::OperatingState;
use crate::error::SimulationError;
use crate::power_flow::{EssDirective, Period};

// Prices closer than this to the horizon maximum count as "the" peak price
const MAX_PRICE_TOLERANCE: f64 = 0.001;

/// Which states the time-of-use controller may be scheduled into
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EssControlMode {
    /// BALANCING, DELAY_DISCHARGE
    DelayDischarge,
    /// BALANCING, DELAY_DISCHARGE, CHARGE_GRID
    #[default]
    ChargeConsumption,
}

impl EssControlMode {
    pub fn states(self) -> &'static [OperatingState] {
        match self {
            EssControlMode::DelayDischarge => &[OperatingState::Balancing, OperatingState::DelayDischarge],
            EssControlMode::ChargeConsumption => &[
                OperatingState::Balancing,
                OperatingState::DelayDischarge,
                OperatingState::ChargeGrid,
            ],
        }
    }
}

/// Time-of-use tariff controller for the site battery
#[derive(Debug, Clone)]
pub struct EssTimeOfUse {
    mode: EssControlMode,
}

impl EssTimeOfUse {
    pub fn new(mode: EssControlMode) -> Self {
        Self { mode }
    }
}

impl MultiStateSimulator for EssTimeOfUse {
    fn available_states(&self, _period: &Period) -> Vec<OperatingState> {
        self.mode.states().to_vec()
    }

    fn default_state(&self) -> OperatingState {
        OperatingState::Balancing
    }

    fn simulate(&self, step: &mut StepContext<'_>, state: OperatingState) -> Result<(), SimulationError> {
        let directive = EssDirective::from_state(state)
            .filter(|_| self.mode.states().contains(&state))
            .ok_or(SimulationError::UnsupportedState(state))?;
        step.model.apply(directive);
        Ok(())
    }

    fn post_process(&self, outcome: &PeriodOutcome<'_>, state: OperatingState) -> OperatingState {
        post_process_state(outcome, state)
    }
}

/// Replace a scheduled ESS state by the state that describes what the
/// simulation actually did.
pub fn post_process_state(outcome: &PeriodOutcome<'_>, state: OperatingState) -> OperatingState {
    let ess = &outcome.context.ess;
    let flow = outcome.flow;
    let price = outcome.period.price();
    let max_price = outcome.context.max_price();

    match state {
        OperatingState::DelayDischarge => {
            if outcome.ess_initial_energy <= ess.min_soc_energy {
                // battery already empty
                OperatingState::Balancing
            } else if flow.ess < 0 && flow.grid_to_ess == 0 {
                // only charging from surplus production
                OperatingState::Balancing
            } else if max_price - price < MAX_PRICE_TOLERANCE {
                OperatingState::Balancing
            } else {
                state
            }
        }
        OperatingState::ChargeGrid => {
            if flow.ess <= 0 && flow.grid_to_ess <= 0 {
                // no grid charging, at most charging from surplus
                OperatingState::Balancing
            } else if outcome.ess_initial_energy > ess.max_soc_energy {
                OperatingState::DelayDischarge
            } else if price > 0.0 && max_price / price < outcome.context.risk_level.efficiency_factor() {
                // spread too small to pay for the round trip
                OperatingState::DelayDischarge
            } else {
                state
            }
        }
        other => other,
    }
}
