pub mod scheduler;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use strum::Display;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::domain::Clock;
use crate::error::OptimizerError;
use crate::forecast::SiteDataSource;
use crate::handler::Handler;
use crate::optimizer::{self, execution_limit, GlobalSimulationContext, SimulationResult, StopReason};

pub use scheduler::{OptimizerTask, TriggerHandle};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OptimizerState {
    #[default]
    Idle,
    QuickScheduleApplied,
    Searching,
    Published,
}

/// Observable state of the scheduler
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStatus {
    pub state: OptimizerState,
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub run_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub last_cost: Option<f64>,
    pub generations: Option<usize>,
    pub stop_reason: Option<StopReason>,
}

/// Result of one successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub result: Arc<SimulationResult>,
    pub context: Arc<GlobalSimulationContext>,
    pub handlers_updated: usize,
    pub stop_reason: Option<StopReason>,
}

/// Runs the optimizer for a fixed set of handlers: quick schedule first,
/// then the bounded search, then publish.
///
/// Runs are serialized; the last published result is kept as the warm start
/// of the next run.
pub struct EnergyScheduler {
    config: Config,
    source: Arc<dyn SiteDataSource>,
    handlers: Vec<Arc<Handler>>,
    clock: Arc<dyn Clock>,
    previous: RwLock<Option<Arc<SimulationResult>>>,
    status: RwLock<RunStatus>,
    run_lock: Mutex<()>,
}

impl EnergyScheduler {
    /// `handlers` must already be in controller priority order. Fails if
    /// `config` does not validate.
    pub fn new(
        config: Config,
        source: Arc<dyn SiteDataSource>,
        handlers: Vec<Arc<Handler>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, OptimizerError> {
        config.validate().map_err(OptimizerError::Configuration)?;
        Ok(Self {
            config,
            source,
            handlers,
            clock,
            previous: RwLock::new(None),
            status: RwLock::new(RunStatus::default()),
            run_lock: Mutex::new(()),
        })
    }

    pub fn handlers(&self) -> &[Arc<Handler>] {
        &self.handlers
    }

    pub fn status(&self) -> RunStatus {
        self.status.read().clone()
    }

    pub fn state(&self) -> OptimizerState {
        self.status.read().state
    }

    /// Result the next run starts from
    pub fn previous(&self) -> Option<Arc<SimulationResult>> {
        self.previous.read().clone()
    }

    fn set_state(&self, state: OptimizerState) {
        self.status.write().state = state;
    }

    /// One full optimizer run. On error nothing is published beyond what the
    /// run already applied, and the previous result stays in place.
    pub async fn reoptimize_schedule(&self) -> Result<RunReport, OptimizerError> {
        let _guard = self.run_lock.lock().await;
        let now = self.clock.now();
        {
            let mut status = self.status.write();
            status.last_run = Some(now);
            status.run_count += 1;
        }

        let outcome = self.run(now).await;
        let mut status = self.status.write();
        status.state = OptimizerState::Idle;
        match &outcome {
            Ok(report) => {
                status.last_success = Some(now);
                status.success_count += 1;
                status.last_error = None;
                status.last_cost = Some(report.result.cost);
                status.stop_reason = report.stop_reason;
            }
            Err(e) => {
                status.error_count += 1;
                status.last_error = Some(e.to_string());
                error!(error = %e, "reoptimize failed");
            }
        }
        outcome
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<RunReport, OptimizerError> {
        if self.handlers.is_empty() {
            return Err(OptimizerError::Configuration(
                "no schedulable handlers registered".to_string(),
            ));
        }
        let inputs = self.source.fetch(now).await.map_err(OptimizerError::Forecast)?;
        let context = Arc::new(GlobalSimulationContext::from_inputs(
            now,
            &inputs,
            self.handlers.clone(),
            &self.config.horizon,
            &self.config.site,
        )?);
        let previous = self.previous();
        let config = &self.config.optimizer;

        let quick = optimizer::quick_schedule(&context, previous.as_deref(), config, now)?;
        let updated = optimizer::publish(&context, &quick);
        self.set_state(OptimizerState::QuickScheduleApplied);
        info!(cost = quick.cost, handlers = updated, "quick schedule applied");

        let mut best = quick;
        let mut stop_reason = None;
        match context.worth_optimizing() {
            Err(reason) => {
                self.status.write().generations = None;
                debug!(reason, "search skipped");
            }
            Ok(()) => {
                self.set_state(OptimizerState::Searching);
                let buffer = chrono::Duration::seconds(config.deadline_buffer_seconds as i64);
                let limit = execution_limit(self.clock.now(), buffer);
                let search_context = Arc::clone(&context);
                let search_previous = previous.clone();
                let search_config = config.clone();
                let optimization = tokio::task::spawn_blocking(move || {
                    optimizer::search(&search_context, search_previous.as_deref(), &search_config, limit, now)
                })
                .await??;

                self.status.write().generations = optimization.as_ref().map(|o| o.outcome.generations);
                if let Some(optimization) = optimization {
                    stop_reason = Some(optimization.outcome.stop_reason);
                    if optimization.result.cost <= best.cost {
                        best = optimization.result;
                    }
                }
            }
        }

        let handlers_updated = optimizer::publish(&context, &best);
        self.set_state(OptimizerState::Published);
        info!(cost = best.cost, handlers = handlers_updated, "schedule published");
        for line in optimizer::log_lines(&best, &context) {
            debug!("{line}");
        }

        let result = Arc::new(best);
        *self.previous.write() = Some(Arc::clone(&result));
        Ok(RunReport {
            result,
            context,
            handlers_updated,
            stop_reason,
        })
    }
}
