use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

use super::{Candidate, GlobalSimulationContext, ScheduleCodec};
use crate::domain::{OperatingState, PeriodMetadata, Schedule, ScheduleEntry};
use crate::error::CodecError;
use crate::handler::{Handler, PeriodOutcome};
use crate::power_flow::{EnergyFlow, EnergyModel, PeriodDuration};

/// Cost added for every failed handler step; large enough that a failing
/// candidate never beats a working one
pub const SIMULATION_FAILURE_PENALTY: f64 = 1_000.0;

/// Simulated facts of one period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodResult {
    pub time: DateTime<Utc>,
    pub duration: PeriodDuration,
    pub price: f64,
    pub ess_initial_energy: i32,
    pub flow: EnergyFlow,
    /// States as chosen by the candidate, per multi-state handler
    pub states: Vec<OperatingState>,
}

/// Outcome of simulating one candidate over the whole horizon
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub cost: f64,
    pub created_at: DateTime<Utc>,
    pub candidate: Candidate,
    /// Multi-state handler ids in candidate column order
    pub handler_ids: Vec<String>,
    pub periods: Vec<PeriodResult>,
    /// Post-processed schedules with metadata, by handler id
    pub schedules: BTreeMap<String, Schedule>,
}

impl SimulationResult {
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.periods.first().map(|p| p.time)
    }

    /// ESS energy at the start of every period
    pub fn ess_energies(&self) -> Vec<i32> {
        self.periods.iter().map(|p| p.ess_initial_energy).collect()
    }

    /// Schedules as chosen by the candidate, before post-processing.
    ///
    /// Re-encoding these on an unchanged horizon reproduces the candidate.
    pub fn planned_schedules(&self) -> BTreeMap<String, Schedule> {
        self.handler_ids
            .iter()
            .enumerate()
            .map(|(h, id)| {
                let entries = self
                    .periods
                    .iter()
                    .filter_map(|p| {
                        let state = *p.states.get(h)?;
                        Some((
                            p.time,
                            ScheduleEntry {
                                duration: p.duration,
                                state,
                                metadata: None,
                            },
                        ))
                    })
                    .collect();
                (id.clone(), Schedule::new(self.created_at, entries))
            })
            .collect()
    }

    /// ESS charge (negative) or discharge per period
    pub fn ess_flows(&self) -> Vec<i32> {
        self.periods.iter().map(|p| p.flow.ess).collect()
    }
}

/// Fitness function: replays the horizon through all handlers in priority
/// order and sums the grid cost
pub struct Simulator<'a> {
    context: &'a GlobalSimulationContext,
    codec: &'a ScheduleCodec,
}

impl<'a> Simulator<'a> {
    pub fn new(context: &'a GlobalSimulationContext, codec: &'a ScheduleCodec) -> Self {
        Self { context, codec }
    }

    /// Total cost; lower is better
    pub fn cost(&self, candidate: &Candidate) -> Result<f64, CodecError> {
        self.run(candidate, None)
    }

    pub fn simulate(&self, candidate: &Candidate, created_at: DateTime<Utc>) -> Result<SimulationResult, CodecError> {
        let mut periods = Vec::with_capacity(self.context.periods.len());
        let cost = self.run(candidate, Some(&mut periods))?;
        let schedules = self.schedules(&periods, created_at);
        Ok(SimulationResult {
            cost,
            created_at,
            candidate: candidate.clone(),
            handler_ids: self.codec.handler_ids().to_vec(),
            periods,
            schedules,
        })
    }

    fn run(&self, candidate: &Candidate, mut record: Option<&mut Vec<PeriodResult>>) -> Result<f64, CodecError> {
        let ctx = self.context;
        let states = if self.codec.handler_count() == 0 {
            vec![Vec::new(); ctx.periods.len()]
        } else {
            self.codec.decode(candidate)?
        };

        let mut energy = ctx.ess.initial_energy;
        let mut memory = vec![0i64; ctx.handlers.len()];
        let mut cost = 0.0;
        for (period, period_states) in ctx.periods.iter().zip(states) {
            let mut model = EnergyModel::new(period, &ctx.ess, energy);
            let mut multi = period_states.iter();
            for (handler, memory) in ctx.handlers.iter().zip(memory.iter_mut()) {
                let state = match handler.as_ref() {
                    Handler::OneState(_) => OperatingState::Active,
                    Handler::MultiState(h) => multi.next().copied().unwrap_or_else(|| h.default_state()),
                };
                if let Err(e) = handler.step(ctx, period, &mut model, memory, state) {
                    warn!(
                        handler = handler.id(),
                        period = %period.time(),
                        state = %state,
                        error = %e,
                        "handler simulation failed"
                    );
                    cost += SIMULATION_FAILURE_PENALTY;
                }
            }
            let flow = model.solve();
            cost += flow.cost(period.price()) + model.additional_cost();
            if let Some(periods) = record.as_deref_mut() {
                periods.push(PeriodResult {
                    time: period.time(),
                    duration: period.duration(),
                    price: period.price(),
                    ess_initial_energy: energy,
                    flow,
                    states: period_states,
                });
            }
            energy -= flow.ess;
        }
        Ok(cost)
    }

    fn schedules(&self, periods: &[PeriodResult], created_at: DateTime<Utc>) -> BTreeMap<String, Schedule> {
        let ctx = self.context;
        ctx.multi_state_handlers()
            .enumerate()
            .map(|(h, handler)| {
                let entries = ctx
                    .periods
                    .iter()
                    .zip(periods)
                    .map(|(period, result)| {
                        let outcome = PeriodOutcome {
                            context: ctx,
                            period,
                            flow: &result.flow,
                            ess_initial_energy: result.ess_initial_energy,
                        };
                        let state = handler.post_process(&outcome, result.states[h]);
                        (
                            period.time(),
                            ScheduleEntry {
                                duration: period.duration(),
                                state,
                                metadata: Some(PeriodMetadata {
                                    price: period.price(),
                                    ess_initial_energy: result.ess_initial_energy,
                                    energy_flow: result.flow,
                                }),
                            },
                        )
                    })
                    .collect();
                (handler.id().to_string(), Schedule::new(created_at, entries))
            })
            .collect()
    }
}
