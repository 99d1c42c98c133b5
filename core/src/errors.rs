// Error handling framework

use thiserror::Error;

/// Trigger validation errors, raised at registration time only. Evaluation
/// of an already-registered trigger never fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Interval must be greater than zero, got {0} hours")]
    InvalidInterval(u32),

    #[error("Time of day must have whole-minute precision: {0}")]
    InvalidTimeOfDay(String),
}

/// Registry errors, surfaced synchronously to the caller of the
/// registration API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("A job named '{0}' is already registered")]
    DuplicateName(String),

    #[error("Invalid trigger: {0}")]
    InvalidTrigger(#[from] ScheduleError),
}

/// Scheduler lifecycle errors
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Shutdown did not drain within {timeout_ms} ms ({pending} dispatch(es) abandoned)")]
    ShutdownTimeout { timeout_ms: u64, pending: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_error_display() {
        let err = ScheduleError::InvalidInterval(0);
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn test_registry_error_from_schedule_error() {
        let err: RegistryError = ScheduleError::InvalidInterval(0).into();
        assert!(matches!(err, RegistryError::InvalidTrigger(_)));
    }

    #[test]
    fn test_scheduler_error_display() {
        let err = SchedulerError::ShutdownTimeout {
            timeout_ms: 500,
            pending: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("500 ms"));
        assert!(msg.contains("2 dispatch"));
    }
}
