// Worker binary entry point: wires the scheduler kernel to one daily
// greeting job, with options read from layered configuration.

mod config;

use crate::config::Settings;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use cadence_core::clock::{Clock, SystemClock};
use cadence_core::models::{JobAction, JobContext, JobDefinition, Outcome};
use cadence_core::registry::JobRegistry;
use cadence_core::scheduler::{Scheduler, SchedulerConfig};
use cadence_core::telemetry;
use cadence_core::trigger::TriggerSpec;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// The greeting job. Stands in for a real notification sender; it announces
/// itself on the console with the local time, and names the address the
/// notification would go to.
struct GreetingJob {
    email: Option<String>,
}

#[async_trait]
impl JobAction for GreetingJob {
    async fn execute(&self, ctx: &JobContext) -> Outcome {
        let now = chrono::Local::now();
        println!("Hello World! {}", now.format("%H:%M:%S"));
        info!(
            job_name = %ctx.job_name,
            execution_id = %ctx.execution_id,
            scheduled_for = %ctx.scheduled_for,
            email = self.email.as_deref().unwrap_or("<unset>"),
            "Greeting delivered"
        );
        Outcome::Success
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().map_err(|e| anyhow!("Failed to load configuration: {e}"))?;
    settings.validate().map_err(|e| anyhow!(e))?;

    telemetry::init_logging(&settings.observability.log_level)?;
    info!(
        interval_hours = settings.schedule.interval_hours,
        time_of_day = %settings.schedule.time_of_day,
        timezone = %settings.schedule.timezone,
        run_immediately = settings.worker.run_immediately,
        "Starting cadence worker"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = Arc::new(JobRegistry::new(Arc::clone(&clock)));
    let scheduler = Scheduler::new(
        SchedulerConfig {
            drain_timeout: settings.drain_timeout(),
        },
        Arc::clone(&registry),
        Arc::clone(&clock),
    );

    scheduler.start().map_err(|e| {
        error!(error = %e, "Failed to start scheduler");
        anyhow!(e)
    })?;

    let trigger = settings.trigger().map_err(|e| anyhow!(e))?;
    let action = Arc::new(GreetingJob {
        email: settings.worker.email.clone(),
    });

    let snapshot = registry.register(
        JobDefinition::new("greet", clock.now()),
        trigger,
        Arc::clone(&action) as Arc<dyn JobAction>,
    )?;
    info!(next_fire = ?snapshot.next_fire_time, "Greeting job scheduled");

    if settings.worker.run_immediately {
        registry.register(
            JobDefinition::new("greet-startup", clock.now()),
            TriggerSpec::OneShot {
                fire_at: clock.now() + chrono::Duration::seconds(1),
            },
            action as Arc<dyn JobAction>,
        )?;
        info!("Startup greeting scheduled");
    }

    signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");

    let outcome = scheduler.stop().await;
    outcome.into_result()?;
    info!("Shutdown complete");
    Ok(())
}
