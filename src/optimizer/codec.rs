//! Candidate <-> schedule mapping
//!
//! A candidate is an integer matrix `[period][handler]` holding the index of
//! the chosen state within the handler's available states for that period.
//! Only multi-state handlers have a column; single-state handlers always run
//! their only state.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::GlobalSimulationContext;
use crate::domain::{OperatingState, Schedule, ScheduleEntry};
use crate::error::CodecError;
use crate::power_flow::PeriodDuration;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub genes: Vec<Vec<u32>>,
}

impl Candidate {
    pub fn new(genes: Vec<Vec<u32>>) -> Self {
        Self { genes }
    }

    pub fn period_count(&self) -> usize {
        self.genes.len()
    }
}

/// Inclusive bounds of one gene
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneBounds {
    pub min: u32,
    pub max: u32,
}

/// Per-cell bounds of the candidate matrix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenotypeLayout {
    pub bounds: Vec<Vec<GeneBounds>>,
}

impl GenotypeLayout {
    pub fn contains(&self, candidate: &Candidate) -> bool {
        candidate.genes.len() == self.bounds.len()
            && candidate.genes.iter().zip(&self.bounds).all(|(genes, bounds)| {
                genes.len() == bounds.len()
                    && genes
                        .iter()
                        .zip(bounds)
                        .all(|(g, b)| (b.min..=b.max).contains(g))
            })
    }

    pub fn random<R: Rng>(&self, rng: &mut R) -> Candidate {
        Candidate::new(
            self.bounds
                .iter()
                .map(|row| row.iter().map(|b| rng.gen_range(b.min..=b.max)).collect())
                .collect(),
        )
    }
}

#[derive(Debug, Clone)]
struct PeriodSlot {
    time: DateTime<Utc>,
    duration: PeriodDuration,
    /// Available states per multi-state handler
    states: Vec<Vec<OperatingState>>,
    defaults: Vec<u32>,
}

/// Mapping between candidates and per-handler schedules of one context
#[derive(Debug, Clone)]
pub struct ScheduleCodec {
    handler_ids: Vec<String>,
    slots: Vec<PeriodSlot>,
}

impl ScheduleCodec {
    pub fn new(context: &GlobalSimulationContext) -> Self {
        let handlers: Vec<_> = context.multi_state_handlers().collect();
        let slots = context
            .periods
            .iter()
            .map(|period| {
                let states: Vec<Vec<OperatingState>> =
                    handlers.iter().map(|h| h.available_states(period)).collect();
                let defaults = handlers
                    .iter()
                    .zip(&states)
                    .map(|(h, states)| index_of(states, h.default_state()).unwrap_or(0))
                    .collect();
                PeriodSlot {
                    time: period.time(),
                    duration: period.duration(),
                    states,
                    defaults,
                }
            })
            .collect();
        Self {
            handler_ids: handlers.iter().map(|h| h.id().to_string()).collect(),
            slots,
        }
    }

    pub fn handler_ids(&self) -> &[String] {
        &self.handler_ids
    }

    pub fn handler_count(&self) -> usize {
        self.handler_ids.len()
    }

    pub fn period_count(&self) -> usize {
        self.slots.len()
    }

    /// Nothing to search: no periods or no multi-state handlers
    pub fn is_degenerate(&self) -> bool {
        self.slots.is_empty() || self.handler_ids.is_empty()
    }

    pub fn cardinality(&self, period: usize, handler: usize) -> usize {
        self.slots[period].states[handler].len()
    }

    /// Highest cardinality of a handler over the horizon
    pub fn max_cardinality(&self, handler: usize) -> usize {
        self.slots
            .iter()
            .map(|s| s.states[handler].len())
            .max()
            .unwrap_or(1)
    }

    pub fn default_index(&self, period: usize, handler: usize) -> u32 {
        self.slots[period].defaults[handler]
    }

    /// Bounds `[0, cardinality - 1]` per cell; period 0 collapses to the
    /// pinned genes if given
    pub fn layout(&self, pinned: Option<&[u32]>) -> Option<GenotypeLayout> {
        if self.is_degenerate() {
            return None;
        }
        let bounds = self
            .slots
            .iter()
            .enumerate()
            .map(|(p, slot)| {
                slot.states
                    .iter()
                    .enumerate()
                    .map(|(h, states)| match pinned.and_then(|genes| genes.get(h)) {
                        Some(&gene) if p == 0 => GeneBounds { min: gene, max: gene },
                        _ => GeneBounds {
                            min: 0,
                            max: states.len().saturating_sub(1) as u32,
                        },
                    })
                    .collect()
            })
            .collect();
        Some(GenotypeLayout { bounds })
    }

    /// Candidate with every handler in its default state
    pub fn all_default(&self) -> Candidate {
        Candidate::new(self.slots.iter().map(|s| s.defaults.clone()).collect())
    }

    /// States chosen by `candidate`, `[period][handler]`.
    ///
    /// Fails if the shape does not match or a gene is not an index into the
    /// handler's states for that period.
    pub fn decode(&self, candidate: &Candidate) -> Result<Vec<Vec<OperatingState>>, CodecError> {
        self.check_shape(candidate)?;
        candidate
            .genes
            .iter()
            .zip(&self.slots)
            .enumerate()
            .map(|(period, (genes, slot))| {
                genes
                    .iter()
                    .zip(&slot.states)
                    .enumerate()
                    .map(|(handler, (&index, states))| {
                        states.get(index as usize).copied().ok_or(CodecError::StateIndex {
                            period,
                            handler,
                            index,
                            cardinality: states.len(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect()
    }

    /// Per-handler schedules without simulation metadata
    pub fn decode_schedules(
        &self,
        candidate: &Candidate,
        created_at: DateTime<Utc>,
    ) -> Result<BTreeMap<String, Schedule>, CodecError> {
        let states = self.decode(candidate)?;
        Ok(self
            .handler_ids
            .iter()
            .enumerate()
            .map(|(h, id)| {
                let entries = self
                    .slots
                    .iter()
                    .zip(&states)
                    .map(|(slot, row)| {
                        (
                            slot.time,
                            ScheduleEntry {
                                duration: slot.duration,
                                state: row[h],
                                metadata: None,
                            },
                        )
                    })
                    .collect();
                (id.clone(), Schedule::new(created_at, entries))
            })
            .collect())
    }

    /// Genes of every cell the schedules cover; `None` where a schedule has
    /// no entry or its state is not available in that period
    pub fn encode_partial(&self, schedules: &BTreeMap<String, Schedule>) -> Option<Vec<Vec<Option<u32>>>> {
        if self.is_degenerate() {
            return None;
        }
        Some(
            self.slots
                .iter()
                .map(|slot| {
                    self.handler_ids
                        .iter()
                        .enumerate()
                        .map(|(h, id)| {
                            schedules
                                .get(id)
                                .and_then(|s| s.state_at(slot.time))
                                .and_then(|state| index_of(&slot.states[h], state))
                        })
                        .collect()
                })
                .collect(),
        )
    }

    /// Candidate for the given schedules; uncovered cells take the default
    /// index
    pub fn encode(&self, schedules: &BTreeMap<String, Schedule>) -> Option<Candidate> {
        let partial = self.encode_partial(schedules)?;
        Some(Candidate::new(
            partial
                .into_iter()
                .zip(&self.slots)
                .map(|(row, slot)| {
                    row.into_iter()
                        .zip(&slot.defaults)
                        .map(|(gene, default)| gene.unwrap_or(*default))
                        .collect()
                })
                .collect(),
        ))
    }

    /// Period-0 genes from the previous schedules, default where absent
    pub fn pinned_genes(&self, previous: &BTreeMap<String, Schedule>) -> Option<Vec<u32>> {
        self.encode(previous).and_then(|c| c.genes.into_iter().next())
    }

    pub fn pin(&self, candidate: &mut Candidate, genes: &[u32]) {
        if let Some(first) = candidate.genes.first_mut() {
            for (gene, pinned) in first.iter_mut().zip(genes) {
                *gene = *pinned;
            }
        }
    }

    fn check_shape(&self, candidate: &Candidate) -> Result<(), CodecError> {
        if candidate.genes.len() != self.slots.len() {
            return Err(CodecError::PeriodCount {
                expected: self.slots.len(),
                actual: candidate.genes.len(),
            });
        }
        for (period, genes) in candidate.genes.iter().enumerate() {
            if genes.len() != self.handler_ids.len() {
                return Err(CodecError::HandlerCount {
                    period,
                    expected: self.handler_ids.len(),
                    actual: genes.len(),
                });
            }
        }
        Ok(())
    }
}

fn index_of(states: &[OperatingState], state: OperatingState) -> Option<u32> {
    states.iter().position(|s| *s == state).map(|i| i as u32)
}
