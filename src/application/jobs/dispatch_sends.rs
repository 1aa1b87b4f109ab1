//! Cron job draining due scheduled sends.

use std::str::FromStr;

use apalis::prelude::*;
use apalis_cron::Schedule;

use super::context::{DispatchJobContext, job_failed};

/// Every minute, on the minute.
pub const DEFAULT_DISPATCH_SCHEDULE: &str = "0 * * * * *";

/// Marker struct for the cron-triggered dispatch job.
/// Must implement `From<chrono::DateTime<chrono::Utc>>` for apalis-cron compatibility.
#[derive(Default, Debug, Clone)]
pub struct DispatchSendsJob;

impl From<chrono::DateTime<chrono::Utc>> for DispatchSendsJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

pub async fn process_dispatch_sends_job(
    _job: DispatchSendsJob,
    ctx: Data<DispatchJobContext>,
) -> Result<(), apalis::prelude::Error> {
    match ctx.dispatcher.run_batch(ctx.batch_size).await {
        Ok(report) => {
            if report.hook_failures > 0 {
                tracing::warn!(
                    target = "dripline::application::jobs::dispatch",
                    hook_failures = report.hook_failures,
                    "Some post-send hooks failed"
                );
            }
            Ok(())
        }
        Err(err) => {
            tracing::error!(
                target = "dripline::application::jobs::dispatch",
                error = %err,
                "Dispatch batch could not start"
            );
            Err(job_failed(err))
        }
    }
}

/// Parse a six-field cron expression (with seconds).
pub fn dispatch_schedule(expression: &str) -> Result<Schedule, String> {
    Schedule::from_str(expression).map_err(|err| err.to_string())
}
