//! Schedulable handlers
//!
//! A handler adapts one controller to the optimizer: it lists the states the
//! controller can take in a period, simulates a period in a given state and
//! stores the schedule the optimizer publishes for it.

pub mod ess;
pub mod load;
pub mod reserve;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::domain::{OperatingState, Schedule};
use crate::error::SimulationError;
use crate::optimizer::GlobalSimulationContext;
use crate::power_flow::{EnergyDelta, EnergyFlow, EnergyModel, Period};

pub use ess::{EssControlMode, EssTimeOfUse};
pub use load::FlexibleLoad;
pub use reserve::EmergencyReserve;

/// Mutable view handed to a handler for one period
pub struct StepContext<'a> {
    pub context: &'a GlobalSimulationContext,
    pub period: &'a Period,
    pub model: &'a mut EnergyModel,
    /// Running per-handler counter carried across periods (e.g. energy delivered so far)
    pub memory: &'a mut i64,
}

/// Simulated facts of a finished period, used to post-process states
pub struct PeriodOutcome<'a> {
    pub context: &'a GlobalSimulationContext,
    pub period: &'a Period,
    pub flow: &'a EnergyFlow,
    pub ess_initial_energy: i32,
}

/// Controller with a search dimension
pub trait MultiStateSimulator: Send + Sync + fmt::Debug {
    /// Ordered states available in `period`; never empty
    fn available_states(&self, period: &Period) -> Vec<OperatingState>;

    fn default_state(&self) -> OperatingState;

    fn simulate(&self, step: &mut StepContext<'_>, state: OperatingState) -> Result<(), SimulationError>;

    /// Replace the planned state with a better fitting one once the winning
    /// schedule is known
    fn post_process(&self, _outcome: &PeriodOutcome<'_>, state: OperatingState) -> OperatingState {
        state
    }
}

/// Controller that always runs the same logic
pub trait OneStateSimulator: Send + Sync + fmt::Debug {
    fn simulate(&self, step: &mut StepContext<'_>) -> Result<(), SimulationError>;
}

#[derive(Debug)]
pub struct OneStateHandler {
    id: String,
    simulator: Box<dyn OneStateSimulator>,
}

#[derive(Debug)]
pub struct MultiStateHandler {
    id: String,
    simulator: Box<dyn MultiStateSimulator>,
    schedule: RwLock<Arc<Schedule>>,
}

#[derive(Debug)]
pub enum Handler {
    OneState(OneStateHandler),
    MultiState(MultiStateHandler),
}

impl MultiStateHandler {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn available_states(&self, period: &Period) -> Vec<OperatingState> {
        let states = self.simulator.available_states(period);
        if states.is_empty() {
            vec![self.simulator.default_state()]
        } else {
            states
        }
    }

    pub fn default_state(&self) -> OperatingState {
        self.simulator.default_state()
    }

    /// Currently published schedule
    pub fn schedule(&self) -> Arc<Schedule> {
        self.schedule.read().clone()
    }

    pub fn apply_schedule(&self, schedule: Schedule) {
        let merged = schedule.merged_onto(&self.schedule());
        debug!(handler = %self.id, entries = merged.len(), "schedule applied");
        *self.schedule.write() = Arc::new(merged);
    }

    /// State planned for `now`; the default state when nothing is planned
    pub fn current_state(&self, now: DateTime<Utc>) -> OperatingState {
        self.schedule()
            .state_at(now)
            .unwrap_or_else(|| self.simulator.default_state())
    }

    pub fn post_process(&self, outcome: &PeriodOutcome<'_>, state: OperatingState) -> OperatingState {
        self.simulator.post_process(outcome, state)
    }
}

impl Handler {
    pub fn one_state(id: impl Into<String>, simulator: impl OneStateSimulator + 'static) -> Self {
        Handler::OneState(OneStateHandler {
            id: id.into(),
            simulator: Box::new(simulator),
        })
    }

    pub fn multi_state(id: impl Into<String>, simulator: impl MultiStateSimulator + 'static) -> Self {
        Handler::MultiState(MultiStateHandler {
            id: id.into(),
            simulator: Box::new(simulator),
            schedule: RwLock::new(Arc::new(Schedule::empty(DateTime::<Utc>::MIN_UTC))),
        })
    }

    pub fn id(&self) -> &str {
        match self {
            Handler::OneState(h) => &h.id,
            Handler::MultiState(h) => &h.id,
        }
    }

    pub fn as_multi_state(&self) -> Option<&MultiStateHandler> {
        match self {
            Handler::OneState(_) => None,
            Handler::MultiState(h) => Some(h),
        }
    }

    pub fn available_states(&self, period: &Period) -> Vec<OperatingState> {
        match self {
            Handler::OneState(_) => vec![OperatingState::Active],
            Handler::MultiState(h) => h.available_states(period),
        }
    }

    pub fn default_state(&self) -> OperatingState {
        match self {
            Handler::OneState(_) => OperatingState::Active,
            Handler::MultiState(h) => h.default_state(),
        }
    }

    /// Simulate one period in `state`.
    ///
    /// On failure the model and memory are restored, so the handler
    /// contributes nothing to the period.
    pub fn step(
        &self,
        context: &GlobalSimulationContext,
        period: &Period,
        model: &mut EnergyModel,
        memory: &mut i64,
        state: OperatingState,
    ) -> Result<EnergyDelta, SimulationError> {
        let before = *model;
        let memory_before = *memory;
        let result = {
            let mut step = StepContext {
                context,
                period,
                model: &mut *model,
                memory: &mut *memory,
            };
            match self {
                Handler::OneState(h) => h.simulator.simulate(&mut step),
                Handler::MultiState(h) => h.simulator.simulate(&mut step, state),
            }
        };
        match result {
            Ok(()) => Ok(model.delta_since(&before)),
            Err(e) => {
                *model = before;
                *memory = memory_before;
                Err(e)
            }
        }
    }

    /// Swap in a new schedule; single-state handlers have nothing to store
    pub fn apply_schedule(&self, schedule: Schedule) {
        if let Handler::MultiState(h) = self {
            h.apply_schedule(schedule);
        }
    }

    pub fn current_state(&self, now: DateTime<Utc>) -> OperatingState {
        match self {
            Handler::OneState(_) => OperatingState::Active,
            Handler::MultiState(h) => h.current_state(now),
        }
    }
}

/// Handlers of the configured site, in configuration order
pub fn from_config(config: &Config) -> Vec<Arc<Handler>> {
    let mut handlers = Vec::new();
    if let Some(reserve_soc) = config.site.reserve_soc_percent {
        handlers.push(Arc::new(Handler::one_state(
            "ctrlEmergencyReserve0",
            EmergencyReserve::new(reserve_soc),
        )));
    }
    handlers.push(Arc::new(Handler::multi_state(
        "ctrlEssTimeOfUse0",
        EssTimeOfUse::new(config.site.ess_control_mode),
    )));
    for load in &config.loads {
        handlers.push(Arc::new(Handler::multi_state(
            load.id.clone(),
            FlexibleLoad::from_config(load),
        )));
    }
    handlers
}
