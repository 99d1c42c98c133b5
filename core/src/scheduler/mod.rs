// Scheduler module: the coordinating loop and its lifecycle

pub mod engine;

pub use engine::{DrainOutcome, Scheduler, SchedulerConfig};
