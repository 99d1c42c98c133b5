// Job dispatch: runs a due job's action on its own task so one slow or
// faulty job cannot delay the loop or other due jobs. Every fault, panics
// included, becomes an Outcome::Failure recorded against the job.

use crate::clock::Clock;
use crate::models::{JobContext, Outcome};
use crate::registry::{DueJob, JobRegistry};
use crate::trigger::TriggerSpec;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

pub struct Dispatcher {
    registry: Arc<JobRegistry>,
    clock: Arc<dyn Clock>,
    cancellation: CancellationToken,
    in_flight: Arc<AtomicUsize>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<JobRegistry>,
        clock: Arc<dyn Clock>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            registry,
            clock,
            cancellation,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of dispatches currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn in_flight_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.in_flight)
    }

    /// Spawn the dispatch of one claimed job. The returned handle completes
    /// once the outcome and the next fire time have been written back.
    #[instrument(skip(self, job), fields(job_name = %job.name, scheduled_for = %job.scheduled_for))]
    pub fn dispatch(&self, job: DueJob) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let clock = Arc::clone(&self.clock);
        let token = self.cancellation.child_token();
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let ctx = JobContext::new(&job.name, job.scheduled_for, token);
            let execution_id = ctx.execution_id;
            info!(
                job_name = %job.name,
                %execution_id,
                scheduled_for = %job.scheduled_for,
                "Dispatching job"
            );

            // The action runs on a nested task so a panic surfaces as a
            // JoinError here instead of unwinding into the loop.
            let action = Arc::clone(&job.action);
            let action_ctx = ctx.clone();
            let outcome =
                match tokio::spawn(async move { action.execute(&action_ctx).await }).await {
                    Ok(outcome) => outcome,
                    Err(join_err) if join_err.is_panic() => {
                        Outcome::failure(panic_reason(join_err.into_panic()))
                    }
                    Err(_) => Outcome::failure("job action was cancelled"),
                };

            match &outcome {
                Outcome::Success => {
                    info!(job_name = %job.name, %execution_id, "Job completed");
                }
                Outcome::Failure { reason } => {
                    error!(job_name = %job.name, %execution_id, reason = %reason, "Job failed");
                }
            }

            let next = next_after_fire(&job.trigger, job.scheduled_for, clock.now());
            registry.update_after_fire(&job.name, next, outcome);
            in_flight.fetch_sub(1, Ordering::SeqCst);
        })
    }
}

/// Next occurrence after a firing. Seeded from the scheduled fire time so
/// repeated occurrences do not drift; if the loop was unable to run for more
/// than one period the result is already in the past, and it is reseeded
/// once from `now` so missed periods coalesce into the single firing that
/// just happened.
pub(crate) fn next_after_fire(
    trigger: &TriggerSpec,
    fired_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match trigger.next_fire(fired_at) {
        Some(next) if next <= now => trigger.next_fire(now),
        other => other,
    }
}

fn panic_reason(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("job action panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("job action panicked: {msg}")
    } else {
        "job action panicked".to_string()
    }
}
