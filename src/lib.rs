//! Energy Scheduler
//!
//! Computes rolling operating plans for the schedulable controllers of a site:
//! for every period of the planning horizon, which state each controller holds
//! so that the grid cost over the horizon is minimal.

pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod handler;
pub mod optimizer;
pub mod power_flow;
pub mod telemetry;

pub use error::{CodecError, OptimizerError, SimulationError};
