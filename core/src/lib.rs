// Embedded scheduler kernel: trigger evaluation, job registry, and the
// coordinating loop that fires registered jobs at their next occurrence.

pub mod clock;
pub mod dispatcher;
pub mod errors;
pub mod models;
pub mod registry;
pub mod scheduler;
pub mod telemetry;
pub mod trigger;

pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{RegistryError, ScheduleError, SchedulerError};
pub use models::{JobAction, JobContext, JobDefinition, JobSnapshot, LastResult, Outcome};
pub use registry::JobRegistry;
pub use scheduler::{DrainOutcome, Scheduler, SchedulerConfig};
pub use trigger::TriggerSpec;
