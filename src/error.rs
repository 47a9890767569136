use thiserror::Error;

use crate::domain::OperatingState;

/// Candidate shape does not match the simulation context
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("candidate has {actual} periods, expected {expected}")]
    PeriodCount { expected: usize, actual: usize },
    #[error("candidate period {period} has {actual} genes, expected {expected}")]
    HandlerCount {
        period: usize,
        expected: usize,
        actual: usize,
    },
    #[error("gene {index} of handler {handler} in period {period} exceeds its {cardinality} states")]
    StateIndex {
        period: usize,
        handler: usize,
        index: u32,
        cardinality: usize,
    },
}

/// A single handler failed to simulate one period
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("invalid {what} energy: {value} Wh")]
    InvalidEnergy { what: &'static str, value: i32 },
    #[error("state {0} is not supported by this handler")]
    UnsupportedState(OperatingState),
    #[error("non-finite cost contribution: {0}")]
    NonFiniteCost(f64),
    #[error("handler failure: {0}")]
    Handler(String),
}

/// Run-level failures of the optimizer
#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("insufficient forecast: {0}")]
    InsufficientForecast(String),
    #[error("invalid storage snapshot: {0}")]
    InvalidStorage(String),
    #[error("site data unavailable: {0:#}")]
    Forecast(anyhow::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("optimization task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
