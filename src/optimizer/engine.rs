//! Generational search over candidate matrices
//!
//! Tournament selection, row-uniform crossover, per-gene mutation and
//! elitism, minimizing cost. Candidates of a generation are scored in
//! parallel; everything that consumes randomness runs on one seeded RNG, so
//! a fixed seed gives the same best candidate regardless of thread count.

use itertools::Itertools;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use strum::Display;
use tracing::debug;

use super::{Candidate, GenotypeLayout};
use crate::config::OptimizerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    Deadline,
    SteadyFitness,
    MaxGenerations,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best: Candidate,
    pub cost: f64,
    pub generations: usize,
    pub evaluations: usize,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone)]
struct Scored {
    candidate: Candidate,
    cost: f64,
}

pub struct EvolutionEngine<'a> {
    config: &'a OptimizerConfig,
    layout: GenotypeLayout,
    rng: StdRng,
    cache: HashMap<Candidate, f64>,
    crossover_probability: f64,
    mutation_probability: f64,
}

/// Probability usable by `gen_bool`; anything outside [0, 1] is clamped and
/// NaN never fires
fn probability(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

impl<'a> EvolutionEngine<'a> {
    pub fn new(config: &'a OptimizerConfig, layout: GenotypeLayout) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            layout,
            rng,
            cache: HashMap::new(),
            crossover_probability: probability(config.crossover_probability),
            mutation_probability: probability(config.mutation_probability),
        }
    }

    /// Search until the time limit, the steady-fitness limit or the
    /// generation limit is hit. Limits are checked between generations; the
    /// initial population is always scored.
    pub fn run<F>(&mut self, initial: Vec<Candidate>, limit: Duration, fitness: F) -> Option<SearchOutcome>
    where
        F: Fn(&Candidate) -> f64 + Sync,
    {
        let deadline = Instant::now() + limit;
        let size = self.config.population_size.max(2);

        let mut population: Vec<Candidate> = initial
            .into_iter()
            .filter(|c| self.layout.contains(c))
            .take(size)
            .collect();
        while population.len() < size {
            population.push(self.layout.random(&mut self.rng));
        }

        let mut ranked = self.evaluate(population, &fitness);
        let mut best = ranked.first()?.clone();
        let mut generations = 0;
        let mut steady = 0;

        let stop_reason = loop {
            if Instant::now() >= deadline {
                break StopReason::Deadline;
            }
            if steady >= self.config.steady_generations {
                break StopReason::SteadyFitness;
            }
            if generations >= self.config.max_generations {
                break StopReason::MaxGenerations;
            }

            let offspring = self.breed(&ranked, size);
            ranked = self.evaluate(offspring, &fitness);
            generations += 1;

            if ranked[0].cost < best.cost {
                best = ranked[0].clone();
                steady = 0;
                debug!(generation = generations, cost = best.cost, "new best candidate");
            } else {
                steady += 1;
            }
        };

        Some(SearchOutcome {
            best: best.candidate,
            cost: best.cost,
            generations,
            evaluations: self.cache.len(),
            stop_reason,
        })
    }

    /// Score candidates (uncached ones in parallel) and sort by cost; ties
    /// keep population order
    fn evaluate<F>(&mut self, population: Vec<Candidate>, fitness: &F) -> Vec<Scored>
    where
        F: Fn(&Candidate) -> f64 + Sync,
    {
        let pending: Vec<&Candidate> = population
            .iter()
            .filter(|c| !self.cache.contains_key(*c))
            .unique()
            .collect();
        let costs: Vec<f64> = pending.par_iter().map(|&c| fitness(c)).collect();
        for (candidate, cost) in pending.into_iter().zip(costs) {
            self.cache.insert(candidate.clone(), cost);
        }

        let mut ranked: Vec<Scored> = population
            .into_iter()
            .map(|candidate| {
                let cost = self.cache.get(&candidate).copied().unwrap_or(f64::INFINITY);
                Scored { candidate, cost }
            })
            .collect();
        ranked.sort_by_key(|s| OrderedFloat(s.cost));
        ranked
    }

    fn breed(&mut self, ranked: &[Scored], size: usize) -> Vec<Candidate> {
        let elites = self.config.elite_count.min(ranked.len());
        let mut next: Vec<Candidate> = ranked[..elites].iter().map(|s| s.candidate.clone()).collect();
        while next.len() < size {
            let a = self.tournament(ranked).clone();
            let b = self.tournament(ranked).clone();
            let (mut first, mut second) = if self.rng.gen_bool(self.crossover_probability) {
                self.crossover(&a, &b)
            } else {
                (a, b)
            };
            self.mutate(&mut first);
            self.mutate(&mut second);
            next.push(first);
            if next.len() < size {
                next.push(second);
            }
        }
        next
    }

    /// Best of `tournament_size` random picks; `ranked` is sorted, so the
    /// lowest index wins
    fn tournament<'r>(&mut self, ranked: &'r [Scored]) -> &'r Candidate {
        let mut winner = self.rng.gen_range(0..ranked.len());
        for _ in 1..self.config.tournament_size.max(1) {
            winner = winner.min(self.rng.gen_range(0..ranked.len()));
        }
        &ranked[winner].candidate
    }

    /// Swap whole periods between the parents with probability 1/2 each
    fn crossover(&mut self, a: &Candidate, b: &Candidate) -> (Candidate, Candidate) {
        let mut first = a.clone();
        let mut second = b.clone();
        for (row_a, row_b) in first.genes.iter_mut().zip(second.genes.iter_mut()) {
            if self.rng.gen_bool(0.5) {
                std::mem::swap(row_a, row_b);
            }
        }
        (first, second)
    }

    fn mutate(&mut self, candidate: &mut Candidate) {
        for (row, bounds) in candidate.genes.iter_mut().zip(&self.layout.bounds) {
            for (gene, b) in row.iter_mut().zip(bounds) {
                if b.min < b.max && self.rng.gen_bool(self.mutation_probability) {
                    *gene = self.rng.gen_range(b.min..=b.max);
                }
            }
        }
    }
}
