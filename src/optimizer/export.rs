//! Displayable views of a finished schedule

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::{GlobalSimulationContext, SimulationResult};
use crate::domain::{OperatingState, Schedule};
use crate::power_flow::{EssCapacity, PeriodDuration};

/// One row of the exported time series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleRow {
    pub time: DateTime<Utc>,
    pub duration: PeriodDuration,
    pub price: f64,
    pub production: i32,
    pub consumption: i32,
    pub managed_consumption: i32,
    pub ess: i32,
    pub grid: i32,
    pub soc_percent: Option<f64>,
    pub states: BTreeMap<String, OperatingState>,
}

/// Time series of a simulation result with the published (post-processed)
/// state of every multi-state handler
pub fn export_result(result: &SimulationResult, context: &GlobalSimulationContext) -> Vec<ScheduleRow> {
    result
        .periods
        .iter()
        .map(|period| ScheduleRow {
            time: period.time,
            duration: period.duration,
            price: period.price,
            production: period.flow.production,
            consumption: period.flow.consumption,
            managed_consumption: period.flow.managed_consumption,
            ess: period.flow.ess,
            grid: period.flow.grid,
            soc_percent: context.ess.soc_percent(period.ess_initial_energy),
            states: result
                .schedules
                .iter()
                .filter_map(|(id, schedule)| Some((id.clone(), schedule.state_at(period.time)?)))
                .collect(),
        })
        .collect()
}

/// Time series of a published schedule; entries without metadata are skipped
pub fn export_schedule(handler_id: &str, schedule: &Schedule, capacity: &EssCapacity) -> Vec<ScheduleRow> {
    schedule
        .entries
        .iter()
        .filter_map(|(time, entry)| {
            let metadata = entry.metadata?;
            let flow = metadata.energy_flow;
            Some(ScheduleRow {
                time: *time,
                duration: entry.duration,
                price: metadata.price,
                production: flow.production,
                consumption: flow.consumption,
                managed_consumption: flow.managed_consumption,
                ess: flow.ess,
                grid: flow.grid,
                soc_percent: capacity.soc_percent(metadata.ess_initial_energy),
                states: BTreeMap::from([(handler_id.to_string(), entry.state)]),
            })
        })
        .collect()
}

/// Tab separated replay log, one header line then one line per period
pub fn log_lines(result: &SimulationResult, context: &GlobalSimulationContext) -> Vec<String> {
    let ids: Vec<&String> = result.schedules.keys().collect();
    let mut lines = Vec::with_capacity(result.periods.len() + 1);
    let mut header = String::from("OPTIMIZER\tTime\tPrice\tProduction\tConsumption\tEss\tGrid\tSoC");
    for id in &ids {
        header.push('\t');
        header.push_str(id);
    }
    lines.push(header);

    for row in export_result(result, context) {
        let mut line = format!(
            "OPTIMIZER\t{}\t{:.2}\t{}\t{}\t{}\t{}\t{}",
            row.time.format("%H:%M"),
            row.price,
            row.production,
            row.consumption,
            row.ess,
            row.grid,
            row.soc_percent.map(|s| format!("{s:.0}")).unwrap_or_else(|| "-".to_string())
        );
        for id in &ids {
            line.push('\t');
            match row.states.get(*id) {
                Some(state) => line.push_str(&state.to_string()),
                None => line.push('-'),
            }
        }
        lines.push(line);
    }
    lines
}
