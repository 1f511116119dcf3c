//! Continuous learning scheduler
//!
//! Fires a retrain-all callback once per interval while enabled. The
//! scheduler owns at most one background task; starting again replaces the
//! running task and stopping waits for it to be gone.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default retraining interval
pub const DEFAULT_UPDATE_INTERVAL_MINUTES: u64 = 60;

/// Configuration for periodic retraining
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningConfig {
    pub enabled: bool,
    pub update_interval_minutes: u64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            update_interval_minutes: DEFAULT_UPDATE_INTERVAL_MINUTES,
        }
    }
}

impl LearningConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.update_interval_minutes.max(1) * 60)
    }
}

/// Callback invoked on every scheduler tick
#[async_trait]
pub trait RetrainTrigger: Send + Sync {
    async fn retrain_all(&self);
}

struct RunningTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy)]
struct Settings {
    enabled: bool,
    period: Duration,
}

/// Timer-driven retraining trigger
pub struct ContinuousLearningScheduler {
    trigger: Arc<dyn RetrainTrigger>,
    settings: Mutex<Settings>,
    task: Mutex<Option<RunningTask>>,
}

impl ContinuousLearningScheduler {
    pub fn new(config: LearningConfig, trigger: Arc<dyn RetrainTrigger>) -> Self {
        Self {
            trigger,
            settings: Mutex::new(Settings {
                enabled: config.enabled,
                period: config.period(),
            }),
            task: Mutex::new(None),
        }
    }

    /// Override the tick period with a finer granularity than minutes
    pub fn with_period(self, period: Duration) -> Self {
        if let Ok(mut settings) = self.settings.lock() {
            settings.period = period;
        }
        self
    }

    fn settings(&self) -> Settings {
        match self.settings.lock() {
            Ok(s) => *s,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings().enabled
    }

    pub fn is_running(&self) -> bool {
        match self.task.lock() {
            Ok(task) => task.as_ref().map(|t| !t.handle.is_finished()).unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Start ticking; returns false when disabled
    ///
    /// A running task is stopped first, so the first tick is always one full
    /// period after this call.
    pub async fn start(&self) -> bool {
        let settings = self.settings();
        if !settings.enabled {
            debug!("Continuous learning disabled, not starting scheduler");
            return false;
        }

        self.stop().await;

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let trigger = Arc::clone(&self.trigger);
        let period = settings.period;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!("Continuous learning tick");
                        trigger.retrain_all().await;
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }
        });

        info!(
            interval_secs = period.as_secs_f64(),
            "Started continuous learning scheduler"
        );

        match self.task.lock() {
            Ok(mut slot) => {
                *slot = Some(RunningTask {
                    shutdown: shutdown_tx,
                    handle,
                });
                true
            }
            Err(_) => {
                warn!("Scheduler task slot poisoned, aborting new task");
                handle.abort();
                false
            }
        }
    }

    /// Cancel the running task; a no-op when nothing is running
    ///
    /// Returns once the task has finished, so no retrain call starts after
    /// this resolves.
    pub async fn stop(&self) {
        let running = match self.task.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        let Some(running) = running else {
            return;
        };

        let _ = running.shutdown.send(());
        running.handle.abort();
        if let Err(e) = running.handle.await {
            if !e.is_cancelled() {
                warn!(error = %e, "Continuous learning task ended abnormally");
            }
        }
        info!("Stopped continuous learning scheduler");
    }

    /// Enable or disable retraining
    ///
    /// Re-enabling restarts the interval from zero; ticks missed while
    /// disabled are not replayed.
    pub async fn set_enabled(&self, enabled: bool) {
        match self.settings.lock() {
            Ok(mut s) => s.enabled = enabled,
            Err(poisoned) => poisoned.into_inner().enabled = enabled,
        }
        if enabled {
            self.start().await;
        } else {
            self.stop().await;
        }
    }
}
