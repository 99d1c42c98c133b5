// Job registry: the single shared mutable resource of the kernel.
//
// All state lives behind one short-held mutex; job actions never run while
// it is locked. Registration order is preserved and is the dispatch order
// for simultaneously-due jobs.

use crate::clock::Clock;
use crate::errors::RegistryError;
use crate::models::{JobAction, JobDefinition, JobSnapshot, LastResult, Outcome, ScheduledJob};
use crate::trigger::TriggerSpec;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// A job claimed for dispatch, detached from the registry lock
#[derive(Clone)]
pub struct DueJob {
    pub name: String,
    pub trigger: TriggerSpec,
    pub action: Arc<dyn JobAction>,
    pub scheduled_for: DateTime<Utc>,
}

pub struct JobRegistry {
    jobs: Mutex<Vec<ScheduledJob>>,
    clock: Arc<dyn Clock>,
    changed: Notify,
}

impl JobRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            clock,
            changed: Notify::new(),
        }
    }

    /// Register a job with its trigger. The trigger is validated here and
    /// never again; the initial next fire time is computed immediately.
    pub fn register(
        &self,
        definition: JobDefinition,
        trigger: TriggerSpec,
        action: Arc<dyn JobAction>,
    ) -> Result<JobSnapshot, RegistryError> {
        trigger.validate()?;

        let next_fire_time = trigger.next_fire(self.clock.now());
        let snapshot = {
            let mut jobs = self.jobs.lock().unwrap();
            if jobs.iter().any(|j| j.definition.name == definition.name) {
                return Err(RegistryError::DuplicateName(definition.name));
            }

            let job = ScheduledJob {
                definition,
                trigger,
                action,
                next_fire_time,
                last_result: LastResult::NeverRun,
            };
            let snapshot = JobSnapshot::from(&job);
            jobs.push(job);
            snapshot
        };

        info!(
            job_name = %snapshot.definition.name,
            next_fire = ?snapshot.next_fire_time,
            "Job registered"
        );
        self.changed.notify_one();
        Ok(snapshot)
    }

    /// Remove a job by name. Returns false if it was not present. A removed
    /// job never dispatches again, even if its fire time was pending.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = {
            let mut jobs = self.jobs.lock().unwrap();
            let before = jobs.len();
            jobs.retain(|j| j.definition.name != name);
            jobs.len() < before
        };

        if removed {
            info!(job_name = %name, "Job unregistered");
            self.changed.notify_one();
        } else {
            debug!(job_name = %name, "Unregister of unknown job ignored");
        }
        removed
    }

    /// Snapshot of all jobs in registration order
    pub fn list(&self) -> Vec<JobSnapshot> {
        let jobs = self.jobs.lock().unwrap();
        jobs.iter().map(JobSnapshot::from).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Earliest pending fire time across all jobs
    pub fn next_wake(&self) -> Option<DateTime<Utc>> {
        let jobs = self.jobs.lock().unwrap();
        jobs.iter().filter_map(|j| j.next_fire_time).min()
    }

    /// Claim every job due at `now`, in registration order. Claiming clears
    /// the stored fire time so an overlapping loop iteration cannot dispatch
    /// the same occurrence twice; `update_after_fire` stores the next one.
    pub fn claim_due(&self, now: DateTime<Utc>) -> Vec<DueJob> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut due = Vec::new();
        for job in jobs.iter_mut() {
            if let Some(fire_time) = job.next_fire_time {
                if fire_time <= now {
                    job.next_fire_time = None;
                    due.push(DueJob {
                        name: job.definition.name.clone(),
                        trigger: job.trigger.clone(),
                        action: Arc::clone(&job.action),
                        scheduled_for: fire_time,
                    });
                }
            }
        }
        due
    }

    /// Record the outcome of a firing and the job's next occurrence. A job
    /// unregistered while its dispatch was in flight is ignored.
    pub fn update_after_fire(
        &self,
        name: &str,
        next_fire_time: Option<DateTime<Utc>>,
        outcome: Outcome,
    ) {
        let found = {
            let mut jobs = self.jobs.lock().unwrap();
            match jobs.iter_mut().find(|j| j.definition.name == name) {
                Some(job) => {
                    job.next_fire_time = next_fire_time;
                    job.last_result = LastResult::from(outcome);
                    true
                }
                None => false,
            }
        };

        if found {
            self.changed.notify_one();
        } else {
            warn!(job_name = %name, "Outcome for a job no longer registered");
        }
    }

    /// Wait until the registry changes: registration, removal, or a
    /// post-fire update. Consumes at most one pending notification.
    pub async fn changed(&self) {
        self.changed.notified().await
    }

    /// Wake the loop without changing any state
    pub fn notify(&self) {
        self.changed.notify_one();
    }
}
