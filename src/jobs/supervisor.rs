//! Worker supervisor
//!
//! Every roster slot runs on its own blocking thread and is restarted
//! immediately after it fails, as long as its sliding retry budget allows.
//! Exhausting a budget ends the whole run with an error the caller treats as
//! process-fatal.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::topic_worker::MirrorWorker;

pub const DEFAULT_MAX_RETRIES: usize = 10;
pub const DEFAULT_RESET_INTERVAL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorError {
    BudgetExhausted {
        worker: String,
        retries: usize,
        window: Duration,
        last_error: String,
    },
    Join(String),
}

impl std::fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupervisorError::BudgetExhausted {
                worker,
                retries,
                window,
                last_error,
            } => write!(
                f,
                "Worker {} exhausted its retry budget ({} restarts in {:?}), last error: {}",
                worker, retries, window, last_error
            ),
            SupervisorError::Join(msg) => write!(f, "Worker task failed: {}", msg),
        }
    }
}

impl std::error::Error for SupervisorError {}

#[derive(Debug, Clone, Copy)]
pub struct RestartPolicy {
    pub max_retries: usize,
    pub reset_interval: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            reset_interval: DEFAULT_RESET_INTERVAL,
        }
    }
}

/// Sliding window of restart instants
#[derive(Debug)]
pub struct RetryBudget {
    policy: RestartPolicy,
    restarts: VecDeque<Instant>,
}

impl RetryBudget {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            restarts: VecDeque::with_capacity(policy.max_retries),
        }
    }

    /// Record a restart at `now` if the window still has room for it
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        while let Some(oldest) = self.restarts.front() {
            if now.duration_since(*oldest) >= self.policy.reset_interval {
                self.restarts.pop_front();
            } else {
                break;
            }
        }

        if self.restarts.len() >= self.policy.max_retries {
            return false;
        }

        self.restarts.push_back(now);
        true
    }

    pub fn used(&self) -> usize {
        self.restarts.len()
    }
}

pub struct Supervisor {
    roster: Vec<Arc<dyn MirrorWorker>>,
    policy: RestartPolicy,
}

impl Supervisor {
    pub fn new(roster: Vec<Arc<dyn MirrorWorker>>, policy: RestartPolicy) -> Self {
        Self { roster, policy }
    }

    pub fn len(&self) -> usize {
        self.roster.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    /// Run the roster until cancellation or until one worker exhausts its budget.
    /// On budget exhaustion the remaining workers are cancelled and flushed first.
    pub async fn run(self, ct: CancellationToken) -> Result<(), SupervisorError> {
        info!(workers = self.roster.len(), "Starting supervisor");

        let mut slots = JoinSet::new();
        for worker in self.roster {
            slots.spawn(supervise(worker, self.policy, ct.clone()));
        }

        let mut outcome = Ok(());
        while let Some(joined) = slots.join_next().await {
            let result = joined
                .map_err(|e| SupervisorError::Join(e.to_string()))
                .and_then(|r| r);

            if let Err(e) = result {
                error!(error = %e, "Supervisor stopping");
                ct.cancel();
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }

        info!("Supervisor stopped");
        outcome
    }
}

async fn supervise(
    worker: Arc<dyn MirrorWorker>,
    policy: RestartPolicy,
    ct: CancellationToken,
) -> Result<(), SupervisorError> {
    let mut budget = RetryBudget::new(policy);

    loop {
        let runner = worker.clone();
        let token = ct.clone();
        let result = tokio::task::spawn_blocking(move || runner.run(&token))
            .await
            .map_err(|e| SupervisorError::Join(e.to_string()))?;

        let last_error = match result {
            Ok(()) if ct.is_cancelled() => {
                info!(worker = worker.name(), "Worker stopped");
                return Ok(());
            }
            Ok(()) => "worker returned without cancellation".to_string(),
            Err(e) => e.to_string(),
        };

        if ct.is_cancelled() {
            warn!(worker = worker.name(), error = %last_error, "Worker failed during shutdown");
            return Ok(());
        }

        if !budget.try_acquire(Instant::now()) {
            error!(
                worker = worker.name(),
                retries = budget.used(),
                error = %last_error,
                "Retry budget exhausted"
            );
            return Err(SupervisorError::BudgetExhausted {
                worker: worker.name().to_string(),
                retries: budget.used(),
                window: policy.reset_interval,
                last_error,
            });
        }

        warn!(
            worker = worker.name(),
            attempt = budget.used(),
            error = %last_error,
            "Restarting worker"
        );
        worker.reset();
    }
}
