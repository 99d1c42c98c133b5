// Scheduler engine: one coordinating loop that sleeps until the nearest
// fire time across all registered triggers, wakes early on registry changes
// or shutdown, and hands due jobs to the dispatcher.

use crate::clock::Clock;
use crate::dispatcher::Dispatcher;
use crate::errors::SchedulerError;
use crate::registry::JobRegistry;
use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Grace period in-flight dispatches get during `stop` before they are
    /// abandoned, unless the caller passes an explicit timeout
    pub drain_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(30),
        }
    }
}

/// How a `stop` call finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The loop and every in-flight dispatch completed within the grace
    /// period
    Clean,
    /// The grace period elapsed; remaining dispatches were abandoned
    Forced { timeout: Duration, pending: usize },
}

impl DrainOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, DrainOutcome::Clean)
    }

    /// Convert a forced drain into the error it reports
    pub fn into_result(self) -> Result<(), SchedulerError> {
        match self {
            DrainOutcome::Clean => Ok(()),
            DrainOutcome::Forced { timeout, pending } => Err(SchedulerError::ShutdownTimeout {
                timeout_ms: timeout.as_millis() as u64,
                pending,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Stopped,
    Running,
    Draining,
}

/// Per-run resources, created by `start` and torn down by `stop`
struct Run {
    loop_handle: JoinHandle<()>,
    shutdown_tx: broadcast::Sender<()>,
    cancellation: CancellationToken,
    in_flight: Arc<AtomicUsize>,
}

struct Lifecycle {
    state: State,
    run: Option<Run>,
}

/// An explicitly constructed scheduler instance. Several independent
/// instances can coexist in one process; each runs at most one loop.
pub struct Scheduler {
    config: SchedulerConfig,
    registry: Arc<JobRegistry>,
    clock: Arc<dyn Clock>,
    lifecycle: Mutex<Lifecycle>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, registry: Arc<JobRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            registry,
            clock,
            lifecycle: Mutex::new(Lifecycle {
                state: State::Stopped,
                run: None,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.lock().unwrap().state == State::Running
    }

    /// Start the coordinating loop. Fails if the scheduler is not stopped;
    /// there is never more than one loop per instance.
    #[instrument(skip(self))]
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut lifecycle = self.lifecycle.lock().unwrap();
        if lifecycle.state != State::Stopped {
            return Err(SchedulerError::AlreadyRunning);
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let cancellation = CancellationToken::new();
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.clock),
            cancellation.clone(),
        );
        let in_flight = dispatcher.in_flight_counter();

        let registry = Arc::clone(&self.registry);
        let clock = Arc::clone(&self.clock);
        let loop_handle = tokio::spawn(run_loop(registry, clock, dispatcher, shutdown_rx));

        lifecycle.run = Some(Run {
            loop_handle,
            shutdown_tx,
            cancellation,
            in_flight,
        });
        lifecycle.state = State::Running;
        info!("Scheduler started");
        Ok(())
    }

    /// Wake the loop so it recomputes its nearest fire time immediately
    pub fn wake(&self) {
        self.registry.notify();
    }

    /// Stop with the configured drain timeout
    pub async fn stop(&self) -> DrainOutcome {
        self.stop_with_timeout(self.config.drain_timeout).await
    }

    /// Request shutdown and wait up to `grace` for the loop and in-flight
    /// dispatches to finish. In-flight job actions observe cancellation
    /// through their context; whatever is still running when the grace
    /// period ends is abandoned and reported, not retried.
    #[instrument(skip(self))]
    pub async fn stop_with_timeout(&self, grace: Duration) -> DrainOutcome {
        let run = {
            let mut lifecycle = self.lifecycle.lock().unwrap();
            match lifecycle.run.take() {
                Some(run) if lifecycle.state == State::Running => {
                    lifecycle.state = State::Draining;
                    run
                }
                other => {
                    // Already stopped (or another stop holds the run);
                    // nothing to drain.
                    lifecycle.run = other;
                    return DrainOutcome::Clean;
                }
            }
        };

        info!(grace_ms = grace.as_millis() as u64, "Stopping scheduler");
        let _ = run.shutdown_tx.send(());
        run.cancellation.cancel();

        let outcome = match timeout(grace, run.loop_handle).await {
            Ok(_) => DrainOutcome::Clean,
            Err(_) => {
                let pending = run.in_flight.load(Ordering::SeqCst);
                warn!(pending, "Drain timed out, abandoning remaining dispatches");
                DrainOutcome::Forced {
                    timeout: grace,
                    pending,
                }
            }
        };

        let mut lifecycle = self.lifecycle.lock().unwrap();
        lifecycle.state = State::Stopped;
        info!(clean = outcome.is_clean(), "Scheduler stopped");
        outcome
    }
}

/// The coordinating loop. Claims and dispatches everything due, then waits
/// until the nearest fire time, a registry change, or shutdown, whichever
/// comes first. Waiting is interruptible, never busy-polling.
async fn run_loop(
    registry: Arc<JobRegistry>,
    clock: Arc<dyn Clock>,
    dispatcher: Dispatcher,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut in_flight: Vec<JoinHandle<()>> = Vec::new();

    loop {
        in_flight.retain(|handle| !handle.is_finished());

        let now = clock.now();
        let due = registry.claim_due(now);
        if !due.is_empty() {
            debug!(due_count = due.len(), %now, "Dispatching due jobs");
        }
        // Claim order is registration order, and so is dispatch order.
        for job in due {
            in_flight.push(dispatcher.dispatch(job));
        }

        let next_wake = registry.next_wake();
        tokio::select! {
            result = shutdown_rx.recv() => {
                if result.is_err() {
                    debug!("Shutdown channel closed");
                }
                break;
            }
            _ = registry.changed() => {
                // Registration, removal, post-fire update, or an explicit
                // wake: recompute the nearest fire time.
                continue;
            }
            _ = wait_until(clock.as_ref(), next_wake) => {}
        }
    }

    if !in_flight.is_empty() {
        debug!(count = in_flight.len(), "Draining in-flight dispatches");
    }
    join_all(in_flight).await;
}

/// Sleep until `at` according to `clock`, or forever when there is no
/// pending fire time (the select arms above interrupt either way).
async fn wait_until(clock: &dyn Clock, at: Option<chrono::DateTime<chrono::Utc>>) {
    match at {
        Some(at) => {
            let remaining = (at - clock.now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            sleep(remaining).await;
        }
        None => futures::future::pending().await,
    }
}
