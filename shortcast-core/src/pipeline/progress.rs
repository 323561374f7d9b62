use crate::job::JobStatus;

/// Receives every status the orchestrator persists, in order, right after it
/// is written. Called from the worker task, so implementations must not block.
pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, status: &JobStatus);
}

impl<F> ProgressListener for F
where
    F: Fn(&JobStatus) + Send + Sync,
{
    fn on_progress(&self, status: &JobStatus) {
        self(status)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressListener for NoopProgress {
    fn on_progress(&self, _status: &JobStatus) {}
}
