use std::future::Future;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};

use super::EnergyScheduler;
use crate::config::SchedulerConfig;

/// Requests an optimizer run outside the regular cadence.
///
/// Triggers arriving while a run is active collapse into one follow-up run.
#[derive(Debug, Clone, Default)]
pub struct TriggerHandle {
    notify: Arc<Notify>,
}

impl TriggerHandle {
    pub fn trigger(&self) {
        self.notify.notify_one();
    }
}

/// Periodic background task driving the [`EnergyScheduler`]
pub struct OptimizerTask {
    scheduler: Arc<EnergyScheduler>,
    config: SchedulerConfig,
    trigger: TriggerHandle,
}

impl OptimizerTask {
    pub fn new(scheduler: Arc<EnergyScheduler>, config: SchedulerConfig) -> Self {
        Self {
            scheduler,
            config,
            trigger: TriggerHandle::default(),
        }
    }

    pub fn trigger_handle(&self) -> TriggerHandle {
        self.trigger.clone()
    }

    /// Run on every cadence tick and on every trigger until `shutdown`
    /// completes. Runs never overlap; a failed run is logged by the scheduler
    /// and the loop carries on.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticks = interval(Duration::from_secs(self.config.cadence_seconds.max(1)));
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !self.config.run_on_start {
            // the first tick completes immediately
            ticks.tick().await;
        }
        info!(cadence_seconds = self.config.cadence_seconds, "optimizer task started");

        tokio::pin!(shutdown);
        loop {
            let cause = tokio::select! {
                _ = &mut shutdown => break,
                _ = ticks.tick() => "cadence",
                _ = self.trigger.notify.notified() => "trigger",
            };
            debug!(cause, "optimizer run requested");
            if let Ok(report) = self.scheduler.reoptimize_schedule().await {
                debug!(cause, cost = report.result.cost, "optimizer run finished");
            }
        }
        info!("optimizer task stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::tests::{config, inputs, start};
    use crate::domain::FixedClock;
    use crate::forecast::MockSiteDataSource;
    use crate::handler::{EssControlMode, EssTimeOfUse, Handler};
    use tokio::sync::oneshot;
    use tokio::time::{sleep, timeout};

    fn scheduler() -> Arc<EnergyScheduler> {
        let mut source = MockSiteDataSource::new();
        source.expect_fetch().returning(|_| Ok(inputs()));
        let scheduler = EnergyScheduler::new(
            config(),
            Arc::new(source),
            vec![Arc::new(Handler::multi_state(
                "ctrlEssTimeOfUse0",
                EssTimeOfUse::new(EssControlMode::ChargeConsumption),
            ))],
            Arc::new(FixedClock::new(start())),
        );
        Arc::new(scheduler.unwrap())
    }

    async fn wait_for_runs(scheduler: &EnergyScheduler, runs: u64) {
        timeout(Duration::from_secs(60), async {
            while scheduler.status().success_count < runs {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_runs_on_start_and_on_trigger() {
        let scheduler = scheduler();
        let task = OptimizerTask::new(
            Arc::clone(&scheduler),
            SchedulerConfig {
                cadence_seconds: 3_600,
                run_on_start: true,
            },
        );
        let trigger = task.trigger_handle();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(task.run(async {
            let _ = stopped.await;
        }));

        wait_for_runs(&scheduler, 1).await;
        trigger.trigger();
        wait_for_runs(&scheduler, 2).await;

        stop.send(()).unwrap();
        handle.await.unwrap();
        assert_eq!(scheduler.status().run_count, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_waits_for_cadence_without_run_on_start() {
        let scheduler = scheduler();
        let task = OptimizerTask::new(
            Arc::clone(&scheduler),
            SchedulerConfig {
                cadence_seconds: 3_600,
                run_on_start: false,
            },
        );
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(task.run(async {
            let _ = stopped.await;
        }));

        sleep(Duration::from_millis(100)).await;
        stop.send(()).unwrap();
        handle.await.unwrap();
        assert_eq!(scheduler.status().run_count, 0);
    }
}
