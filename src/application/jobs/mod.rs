mod context;
mod dispatch_sends;

pub use context::{DispatchJobContext, job_failed};
pub use dispatch_sends::{
    DEFAULT_DISPATCH_SCHEDULE, DispatchSendsJob, dispatch_schedule, process_dispatch_sends_job,
};
