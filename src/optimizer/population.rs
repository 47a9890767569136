//! Seeds for generation zero
//!
//! Handlers are combined over their state indices: the first handler varies
//! slowest, each handler enumerates its default index first and then the
//! other indices in ascending order. Output order is stable for equal inputs.

use itertools::Itertools;

use super::{Candidate, ScheduleCodec, SimulationResult};
use crate::config::OptimizerConfig;

/// State index combinations, one entry per multi-state handler
fn combinations(codec: &ScheduleCodec) -> Vec<Vec<u32>> {
    if codec.is_degenerate() {
        return Vec::new();
    }
    (0..codec.handler_count())
        .map(|h| {
            let default = codec.default_index(0, h);
            std::iter::once(default)
                .chain((0..codec.max_cardinality(h) as u32).filter(move |i| *i != default))
                .collect::<Vec<_>>()
        })
        .multi_cartesian_product()
        .collect()
}

/// Gene of `combination` for a cell, the default where the handler has fewer
/// states in that period
fn gene(codec: &ScheduleCodec, period: usize, handler: usize, combination: &[u32]) -> u32 {
    let value = combination[handler];
    if (value as usize) < codec.cardinality(period, handler) {
        value
    } else {
        codec.default_index(period, handler)
    }
}

/// Every handler holds one state index over the whole horizon
pub fn variations_of_all_states_default(codec: &ScheduleCodec) -> Vec<Candidate> {
    combinations(codec)
        .into_iter()
        .map(|combination| {
            Candidate::new(
                (0..codec.period_count())
                    .map(|p| {
                        (0..codec.handler_count())
                            .map(|h| gene(codec, p, h, &combination))
                            .collect()
                    })
                    .collect(),
            )
        })
        .unique()
        .collect()
}

/// Variations around the previous winner.
///
/// The first candidate reproduces the previous result on the current
/// horizon. The others keep its period 0 and, when `pin` is set, every later
/// period it still covers; the remaining periods follow the combinations.
pub fn variations_of_previous_result(
    codec: &ScheduleCodec,
    previous: &SimulationResult,
    pin: bool,
) -> Vec<Candidate> {
    let planned = previous.planned_schedules();
    let (Some(partial), Some(warm)) = (codec.encode_partial(&planned), codec.encode(&planned)) else {
        return Vec::new();
    };

    let mut variations = vec![warm.clone()];

    for combination in combinations(codec) {
        let genes = (0..codec.period_count())
            .map(|p| {
                (0..codec.handler_count())
                    .map(|h| match partial[p][h] {
                        _ if p == 0 => warm.genes[0][h],
                        Some(covered) if pin => covered,
                        _ => gene(codec, p, h, &combination),
                    })
                    .collect()
            })
            .collect();
        variations.push(Candidate::new(genes));
    }
    variations.into_iter().unique().collect()
}

/// Generation zero, at most `population_size` distinct candidates.
///
/// With a previous result, its variations come first (if warm starting) and
/// period 0 of every candidate is pinned to the running state (if pinning).
pub fn build_initial_population(
    codec: &ScheduleCodec,
    previous: Option<&SimulationResult>,
    config: &OptimizerConfig,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    if let Some(previous) = previous.filter(|_| config.warm_start) {
        candidates.extend(variations_of_previous_result(codec, previous, config.pin_current_period));
    }
    candidates.extend(variations_of_all_states_default(codec));

    if let Some(genes) = pinned_genes(codec, previous, config) {
        for candidate in &mut candidates {
            codec.pin(candidate, &genes);
        }
    }
    candidates
        .into_iter()
        .unique()
        .take(config.population_size)
        .collect()
}

/// Period-0 genes the search must keep, if any
pub fn pinned_genes(
    codec: &ScheduleCodec,
    previous: Option<&SimulationResult>,
    config: &OptimizerConfig,
) -> Option<Vec<u32>> {
    previous
        .filter(|_| config.pin_current_period)
        .and_then(|previous| codec.pinned_genes(&previous.planned_schedules()))
}
