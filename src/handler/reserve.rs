use super::{OneStateSimulator, StepContext};
use crate::error::SimulationError;

/// Keeps an emergency reserve in the battery by limiting discharge.
///
/// Has no states of its own; it must run before the ESS handler in the
/// controller priority so the ESS sees the tightened limit.
#[derive(Debug, Clone)]
pub struct EmergencyReserve {
    reserve_soc_percent: u8,
}

impl EmergencyReserve {
    pub fn new(reserve_soc_percent: u8) -> Self {
        Self {
            reserve_soc_percent: reserve_soc_percent.min(100),
        }
    }

    pub fn reserve_energy(&self, total_energy: i32) -> i32 {
        (i64::from(total_energy) * i64::from(self.reserve_soc_percent) / 100) as i32
    }
}

impl OneStateSimulator for EmergencyReserve {
    fn simulate(&self, step: &mut StepContext<'_>) -> Result<(), SimulationError> {
        let reserve = self.reserve_energy(step.context.ess.total_energy);
        let available = step.model.ess_initial_energy() - reserve;
        step.model.limit_ess_discharge(available);
        Ok(())
    }
}
