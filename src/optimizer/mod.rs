//! Schedule optimization
//!
//! One run: a quick schedule (all defaults, or the previous winner on the
//! current horizon) followed by a bounded evolutionary search seeded from
//! the same candidates.

pub mod codec;
pub mod context;
pub mod deadline;
pub mod engine;
pub mod export;
pub mod population;
pub mod simulator;

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::info;

use crate::config::OptimizerConfig;
use crate::error::OptimizerError;

pub use codec::{Candidate, GeneBounds, GenotypeLayout, ScheduleCodec};
pub use context::{build_periods, ess_capacity, order_by_priority, GlobalSimulationContext};
pub use deadline::execution_limit;
pub use engine::{EvolutionEngine, SearchOutcome, StopReason};
pub use export::{export_result, export_schedule, log_lines, ScheduleRow};
pub use population::{
    build_initial_population, pinned_genes, variations_of_all_states_default, variations_of_previous_result,
};
pub use simulator::{PeriodResult, SimulationResult, Simulator, SIMULATION_FAILURE_PENALTY};

/// Best result of a search with the engine statistics
#[derive(Debug, Clone)]
pub struct Optimization {
    pub result: SimulationResult,
    pub outcome: SearchOutcome,
}

fn ensure_handlers(context: &GlobalSimulationContext) -> Result<(), OptimizerError> {
    if context.handlers.is_empty() {
        return Err(OptimizerError::Configuration(
            "no schedulable handlers registered".to_string(),
        ));
    }
    Ok(())
}

/// Deterministic fallback schedule, cheap enough to apply before searching
pub fn quick_schedule(
    context: &GlobalSimulationContext,
    previous: Option<&SimulationResult>,
    config: &OptimizerConfig,
    created_at: DateTime<Utc>,
) -> Result<SimulationResult, OptimizerError> {
    ensure_handlers(context)?;
    let codec = ScheduleCodec::new(context);
    let candidate = if codec.is_degenerate() {
        Candidate::new(vec![Vec::new(); codec.period_count()])
    } else {
        build_initial_population(&codec, previous, config)
            .into_iter()
            .next()
            .unwrap_or_else(|| codec.all_default())
    };
    Ok(Simulator::new(context, &codec).simulate(&candidate, created_at)?)
}

/// Evolutionary search; `None` when there is nothing to choose
pub fn search(
    context: &GlobalSimulationContext,
    previous: Option<&SimulationResult>,
    config: &OptimizerConfig,
    limit: Duration,
    created_at: DateTime<Utc>,
) -> Result<Option<Optimization>, OptimizerError> {
    ensure_handlers(context)?;
    config.validate().map_err(OptimizerError::Configuration)?;
    let codec = ScheduleCodec::new(context);
    let pinned = pinned_genes(&codec, previous, config);
    let Some(layout) = codec.layout(pinned.as_deref()) else {
        return Ok(None);
    };
    let initial = build_initial_population(&codec, previous, config);
    let simulator = Simulator::new(context, &codec);
    info!(
        periods = codec.period_count(),
        handlers = codec.handler_count(),
        population = initial.len(),
        limit_ms = limit.as_millis() as u64,
        "search started"
    );

    let outcome = EvolutionEngine::new(config, layout).run(initial, limit, |candidate| {
        simulator.cost(candidate).unwrap_or(f64::INFINITY)
    });
    let Some(outcome) = outcome else {
        return Ok(None);
    };
    info!(
        generations = outcome.generations,
        evaluations = outcome.evaluations,
        stop_reason = %outcome.stop_reason,
        cost = outcome.cost,
        "search finished"
    );
    let result = simulator.simulate(&outcome.best, created_at)?;
    Ok(Some(Optimization { result, outcome }))
}

/// Hand every handler its schedule of `result`; returns how many were updated
pub fn publish(context: &GlobalSimulationContext, result: &SimulationResult) -> usize {
    let mut updated = 0;
    for handler in &context.handlers {
        if let Some(schedule) = result.schedules.get(handler.id()) {
            handler.apply_schedule(schedule.clone());
            updated += 1;
        }
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OperatingState, RiskLevel};
    use crate::handler::{EssControlMode, EssTimeOfUse, Handler};
    use crate::power_flow::{EssCapacity, Period, PeriodDuration, StorageEnvelope};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::sync::Arc;

    fn context(handlers: Vec<Arc<Handler>>) -> GlobalSimulationContext {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let prices = [50.0, 400.0, 50.0, 400.0];
        let periods = (0..4)
            .map(|i| {
                Period::new(
                    i,
                    start + ChronoDuration::minutes(15 * i as i64),
                    PeriodDuration::Quarter,
                    prices[i],
                    0,
                    2_000,
                    StorageEnvelope::symmetric(2250, 4400),
                )
            })
            .collect();
        GlobalSimulationContext::new(
            start,
            periods,
            handlers,
            EssCapacity::new(10_000, 0, 9_000, 0),
            RiskLevel::Medium,
        )
    }

    fn ess() -> Arc<Handler> {
        Arc::new(Handler::multi_state(
            "ess",
            EssTimeOfUse::new(EssControlMode::ChargeConsumption),
        ))
    }

    fn config() -> OptimizerConfig {
        OptimizerConfig {
            seed: Some(1),
            ..OptimizerConfig::default()
        }
    }

    #[test]
    fn test_no_handlers_is_configuration_error() {
        let ctx = context(vec![]);
        let now = ctx.start_time;
        assert!(matches!(
            quick_schedule(&ctx, None, &config(), now),
            Err(OptimizerError::Configuration(_))
        ));
        assert!(matches!(
            search(&ctx, None, &config(), Duration::from_secs(1), now),
            Err(OptimizerError::Configuration(_))
        ));
    }

    #[test]
    fn test_out_of_range_probability_is_rejected() {
        let ctx = context(vec![ess()]);
        let config = OptimizerConfig {
            mutation_probability: 1.5,
            crossover_probability: -0.1,
            ..config()
        };
        let err = search(&ctx, None, &config, Duration::from_secs(1), ctx.start_time).unwrap_err();
        assert!(matches!(err, OptimizerError::Configuration(_)));
    }

    #[test]
    fn test_quick_schedule_is_all_default() {
        let ctx = context(vec![ess()]);
        let result = quick_schedule(&ctx, None, &config(), ctx.start_time).unwrap();
        assert_eq!(result.candidate, Candidate::new(vec![vec![0]; 4]));
        // empty battery: everything from the grid
        assert!((result.cost - 2_000.0 * 900.0 / 1_000_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_search_beats_quick_schedule() {
        let ctx = context(vec![ess()]);
        let quick = quick_schedule(&ctx, None, &config(), ctx.start_time).unwrap();
        let optimization = search(&ctx, None, &config(), Duration::from_secs(30), ctx.start_time)
            .unwrap()
            .unwrap();
        assert!(optimization.result.cost < quick.cost);
        assert!((optimization.result.cost - 0.425).abs() < 1e-9);

        let schedule = &optimization.result.schedules["ess"];
        assert_eq!(schedule.state_at(ctx.start_time), Some(OperatingState::ChargeGrid));
        assert_eq!(publish(&ctx, &optimization.result), 1);
        assert_eq!(ctx.handlers[0].current_state(ctx.start_time), OperatingState::ChargeGrid);
    }

    #[test]
    fn test_single_state_only_has_nothing_to_search() {
        let ctx = context(vec![Arc::new(Handler::one_state(
            "reserve",
            crate::handler::EmergencyReserve::new(10),
        ))]);
        assert!(search(&ctx, None, &config(), Duration::from_secs(1), ctx.start_time)
            .unwrap()
            .is_none());
        let quick = quick_schedule(&ctx, None, &config(), ctx.start_time).unwrap();
        assert_eq!(quick.periods.len(), 4);
        assert!(quick.schedules.is_empty());
    }
}
