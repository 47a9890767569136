//! Period & energy-flow model
//!
//! Immutable per-period facts and the pure mapping from (period, directive,
//! storage state) to the resulting storage and grid energies.

pub mod constraints;
pub mod inputs;
pub mod model;
pub mod snapshot;

pub use constraints::{EssCapacity, StorageEnvelope, ESS_MAX_SOC_PERCENT};
pub use inputs::{round_down_to_quarter, Period, PeriodDuration};
pub use model::{simulate_flow, EnergyDelta, EnergyModel, EssDirective};
pub use snapshot::EnergyFlow;
