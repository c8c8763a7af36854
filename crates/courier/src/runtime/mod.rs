use std::future::Future;

mod tokio_runtime;

/// A runtime that can drive detached tasks.
///
/// The dispatcher spawns one task per batch and the keepalive loop spawns its
/// polling task through this trait, so neither is tied to a specific executor.
pub trait Runtime: Clone + Send + Sync + 'static {
    /// Handle to a spawned task.
    type JoinHandle: JoinHandle;

    /// Spawns a detached task.
    fn spawn(&self, task: impl Future<Output = ()> + Send + 'static) -> Self::JoinHandle;

    /// Runs `task` to completion on the current thread.
    ///
    /// Must not be called from inside a task driven by this runtime.
    fn block_on<F: Future>(&self, task: F) -> F::Output;
}

/// A handle to a spawned task that can be cancelled.
pub trait JoinHandle: Send + Sync + 'static {
    /// Cancels the task. Aborting a finished task does nothing.
    fn abort(&mut self);
}

pub(crate) fn run_async<F, RT>(task: F, runtime: &RT) -> RT::JoinHandle
where
    F: Future<Output = ()> + Send + 'static,
    RT: Runtime,
{
    runtime.spawn(task)
}
