use chrono::{DateTime, Days, NaiveTime, TimeZone, Utc};

use super::{MultiStateSimulator, StepContext};
use crate::config::FlexibleLoadConfig;
use crate::domain::OperatingState;
use crate::error::SimulationError;
use crate::power_flow::Period;

const LOAD_STATES: [OperatingState; 3] = [OperatingState::Off, OperatingState::Surplus, OperatingState::Force];

/// Deferrable consumer (EV charger, heat pump) that needs a fixed amount of
/// energy within a daily availability window.
#[derive(Debug, Clone)]
pub struct FlexibleLoad {
    power_w: i32,
    energy_target_wh: i32,
    /// UTC times of day; `until <= from` wraps midnight
    window: Option<(NaiveTime, NaiveTime)>,
}

impl FlexibleLoad {
    pub fn new(power_w: i32, energy_target_wh: i32) -> Self {
        Self {
            power_w: power_w.max(0),
            energy_target_wh: energy_target_wh.max(0),
            window: None,
        }
    }

    pub fn from_config(config: &FlexibleLoadConfig) -> Self {
        let load = Self::new(config.power_w, config.energy_target_wh);
        match config.window() {
            Some((from, until)) => load.with_window(from, until),
            None => load,
        }
    }

    /// Restrict operation to `[from, until)` every day
    pub fn with_window(mut self, from: NaiveTime, until: NaiveTime) -> Self {
        self.window = Some((from, until));
        self
    }

    /// Window occurrences that can touch `period`: the ones opening the day
    /// before, the same day and the day after the period starts
    fn occurrences(&self, period: &Period) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        let Some((from, until)) = self.window else {
            return Vec::new();
        };
        let day = period.time().date_naive();
        [day.checked_sub_days(Days::new(1)), Some(day), day.checked_add_days(Days::new(1))]
            .into_iter()
            .flatten()
            .filter_map(|day| {
                let close_day = if until <= from {
                    day.checked_add_days(Days::new(1))?
                } else {
                    day
                };
                Some((
                    Utc.from_utc_datetime(&day.and_time(from)),
                    Utc.from_utc_datetime(&close_day.and_time(until)),
                ))
            })
            .collect()
    }

    pub fn is_available(&self, period: &Period) -> bool {
        if self.window.is_none() {
            return true;
        }
        self.occurrences(period)
            .iter()
            .any(|&(open, close)| period.time() < close && period.end() > open)
    }

    /// True if the window closes within `period` or the horizon ends with it
    fn closes_in(&self, period: &Period, horizon_len: usize) -> bool {
        let window_closes = self
            .occurrences(period)
            .iter()
            .any(|&(_, close)| period.time() < close && period.end() >= close);
        window_closes || period.index() + 1 == horizon_len
    }
}

impl MultiStateSimulator for FlexibleLoad {
    fn available_states(&self, period: &Period) -> Vec<OperatingState> {
        if self.is_available(period) {
            LOAD_STATES.to_vec()
        } else {
            vec![OperatingState::Off]
        }
    }

    fn default_state(&self) -> OperatingState {
        OperatingState::Off
    }

    fn simulate(&self, step: &mut StepContext<'_>, state: OperatingState) -> Result<(), SimulationError> {
        if !self.is_available(step.period) {
            return match state {
                OperatingState::Off => Ok(()),
                other => Err(SimulationError::UnsupportedState(other)),
            };
        }

        let delivered = i32::try_from(*step.memory).unwrap_or(i32::MAX);
        let remaining = (self.energy_target_wh - delivered).max(0);
        let max_energy = step.period.duration().to_energy(self.power_w).min(remaining);
        let energy = match state {
            OperatingState::Off => 0,
            OperatingState::Surplus => step.model.surplus().clamp(0, max_energy),
            OperatingState::Force => max_energy,
            other => return Err(SimulationError::UnsupportedState(other)),
        };
        step.model.add_managed_consumption(energy)?;
        *step.memory += i64::from(energy);

        let unmet = remaining - energy;
        if unmet > 0 && self.closes_in(step.period, step.context.periods.len()) {
            step.model
                .add_cost(f64::from(unmet) * step.context.max_price() / 1_000_000.0)?;
        }
        Ok(())
    }
}
