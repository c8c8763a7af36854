use std::sync::Arc;

use async_trait::async_trait;
use courier_common::error::RemoteError;

use crate::Runtime;

/// Batch dispatch and demultiplexing of responses.
pub mod dispatch;

/// The dispatcher: turns many logical calls into one round trip.
///
/// A dispatcher is cheap to clone; clones share the transport. Each call to
/// [`Dispatcher::call`] builds an independent batch with independent handles,
/// so it is safe to dispatch from several tasks at once.
pub struct Dispatcher<T: Transport, RT: Runtime = tokio::runtime::Handle> {
    transport: Arc<T>,
    runtime: RT,
}

impl<T: Transport, RT: Runtime> Clone for Dispatcher<T, RT> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            runtime: self.runtime.clone(),
        }
    }
}

/// Moves one encoded batch to the server and brings the encoded responses
/// back.
///
/// A transport knows nothing about calls or positions. Any failure it reports
/// rejects the whole batch.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Name used in log output, e.g. `"HTTP"`.
    const TRANSPORT_NAME: &'static str;

    /// Performs one request/response exchange with `body` as the payload.
    async fn round_trip(&self, body: Vec<u8>) -> Result<Vec<u8>, RemoteError>;
}

#[async_trait]
impl<T: Transport> Transport for Arc<T> {
    const TRANSPORT_NAME: &'static str = T::TRANSPORT_NAME;

    async fn round_trip(&self, body: Vec<u8>) -> Result<Vec<u8>, RemoteError> {
        T::round_trip(self, body).await
    }
}

/// An in-process transport answering calls with registered handlers.
pub mod local;
