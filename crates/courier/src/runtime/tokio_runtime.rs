use crate::Runtime;
use std::future::Future;

use super::JoinHandle;

impl Runtime for tokio::runtime::Handle {
    type JoinHandle = tokio::task::JoinHandle<()>;

    fn spawn(&self, task: impl Future<Output = ()> + Send + 'static) -> Self::JoinHandle {
        tracing::trace!("[Handle::spawn] Spawning task");
        tokio::runtime::Handle::spawn(self, task)
    }

    fn block_on<F: Future>(&self, task: F) -> F::Output {
        tokio::runtime::Handle::block_on(self, task)
    }
}

impl JoinHandle for tokio::task::JoinHandle<()> {
    fn abort(&mut self) {
        tokio::task::JoinHandle::abort(self);
    }
}
