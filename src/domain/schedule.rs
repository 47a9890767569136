use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::OperatingState;
use crate::power_flow::{EnergyFlow, PeriodDuration};

/// Per-handler plan: period start -> state (plus simulation metadata).
///
/// Keys are absolute timestamps, so successive publishes overwrite and extend
/// each other without duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub entries: BTreeMap<DateTime<Utc>, ScheduleEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub duration: PeriodDuration,
    pub state: OperatingState,
    pub metadata: Option<PeriodMetadata>,
}

/// What the simulation predicted for the period
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodMetadata {
    pub price: f64,
    pub ess_initial_energy: i32,
    pub energy_flow: EnergyFlow,
}

impl Schedule {
    pub fn new(created_at: DateTime<Utc>, entries: BTreeMap<DateTime<Utc>, ScheduleEntry>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at,
            entries,
        }
    }

    pub fn empty(created_at: DateTime<Utc>) -> Self {
        Self::new(created_at, BTreeMap::new())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry of the period containing `t`
    pub fn entry_at(&self, t: DateTime<Utc>) -> Option<(DateTime<Utc>, &ScheduleEntry)> {
        self.entries
            .range(..=t)
            .next_back()
            .filter(|(start, entry)| t < **start + entry.duration.duration())
            .map(|(start, entry)| (*start, entry))
    }

    pub fn state_at(&self, t: DateTime<Utc>) -> Option<OperatingState> {
        self.entry_at(t).map(|(_, entry)| entry.state)
    }

    /// End of the last planned period
    pub fn valid_until(&self) -> Option<DateTime<Utc>> {
        self.entries
            .iter()
            .next_back()
            .map(|(start, entry)| *start + entry.duration.duration())
    }

    /// No entry covers `now`
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.entry_at(now).is_none()
    }

    /// Combine with the schedule this one replaces.
    ///
    /// Periods that ended before `created_at` are dropped. The running period
    /// keeps the replaced schedule's entry when this schedule has none for it.
    pub fn merged_onto(mut self, previous: &Schedule) -> Schedule {
        let now = self.created_at;
        self.entries
            .retain(|start, entry| *start + entry.duration.duration() > now);
        if self.entry_at(now).is_none() {
            if let Some((start, entry)) = previous.entry_at(now) {
                self.entries.insert(start, *entry);
            }
        }
        self
    }
}
