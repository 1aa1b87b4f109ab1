use std::sync::Arc;

use apalis::prelude::Error as ApalisError;

use crate::application::dispatch::BatchDispatcher;

/// Shared context handed to the dispatch worker on every tick.
#[derive(Clone)]
pub struct DispatchJobContext {
    pub dispatcher: Arc<BatchDispatcher>,
    pub batch_size: Option<u32>,
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convert any error into an [`ApalisError::Failed`].
pub fn job_failed<E>(err: E) -> ApalisError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let boxed: BoxError = Box::new(err);
    ApalisError::Failed(Arc::new(boxed))
}
