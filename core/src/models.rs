// Job models shared between the registry, the loop, and the dispatcher.

use crate::trigger::TriggerSpec;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Immutable identity of a registered job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl JobDefinition {
    pub fn new(name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            created_at,
        }
    }
}

/// Result of a single dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure { reason: String },
}

impl Outcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        Outcome::Failure {
            reason: reason.into(),
        }
    }
}

/// Most recent dispatch result recorded against a job
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum LastResult {
    #[default]
    NeverRun,
    Success,
    Failure {
        reason: String,
    },
}

impl From<Outcome> for LastResult {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => LastResult::Success,
            Outcome::Failure { reason } => LastResult::Failure { reason },
        }
    }
}

/// Execution context handed to a job action. Carries the instant the firing
/// was scheduled for and a cancellation token tied to scheduler shutdown;
/// long-running actions are expected to poll it.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub execution_id: Uuid,
    pub job_name: String,
    pub scheduled_for: DateTime<Utc>,
    cancellation: CancellationToken,
}

impl JobContext {
    pub fn new(
        job_name: impl Into<String>,
        scheduled_for: DateTime<Utc>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            job_name: job_name.into(),
            scheduled_for,
            cancellation,
        }
    }

    /// True once scheduler shutdown has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves when scheduler shutdown is requested
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }
}

/// Caller-supplied job logic. The kernel owns scheduling only; what a job
/// does when it fires belongs to the embedder.
#[async_trait]
pub trait JobAction: Send + Sync {
    async fn execute(&self, ctx: &JobContext) -> Outcome;
}

/// One registered job with its mutable scheduling state. Owned exclusively
/// by the registry; everything else sees snapshots.
pub struct ScheduledJob {
    pub definition: JobDefinition,
    pub trigger: TriggerSpec,
    pub action: Arc<dyn JobAction>,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub last_result: LastResult,
}

impl fmt::Debug for ScheduledJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledJob")
            .field("definition", &self.definition)
            .field("trigger", &self.trigger)
            .field("next_fire_time", &self.next_fire_time)
            .field("last_result", &self.last_result)
            .finish_non_exhaustive()
    }
}

/// Read-only view of a registered job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub definition: JobDefinition,
    pub trigger: TriggerSpec,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub last_result: LastResult,
}

impl From<&ScheduledJob> for JobSnapshot {
    fn from(job: &ScheduledJob) -> Self {
        Self {
            definition: job.definition.clone(),
            trigger: job.trigger.clone(),
            next_fire_time: job.next_fire_time,
            last_result: job.last_result.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_last_result_from_outcome() {
        assert_eq!(LastResult::from(Outcome::Success), LastResult::Success);
        assert_eq!(
            LastResult::from(Outcome::failure("boom")),
            LastResult::Failure {
                reason: "boom".to_string()
            }
        );
    }

    #[test]
    fn test_last_result_defaults_to_never_run() {
        assert_eq!(LastResult::default(), LastResult::NeverRun);
    }

    #[test]
    fn test_job_context_cancellation() {
        let token = CancellationToken::new();
        let ctx = JobContext::new(
            "greet",
            Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
            token.clone(),
        );
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_outcome_serde() {
        let json = serde_json::to_string(&Outcome::failure("smtp refused")).unwrap();
        assert!(json.contains("failure"));
        assert!(json.contains("smtp refused"));
    }
}
