use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use courier_common::error::RemoteError;
use courier_common::{CallRequest, CallResponse, RemoteException};
use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use super::Transport;

type Handler = Arc<dyn Fn(&Map<String, Value>) -> Result<Value, RemoteException> + Send + Sync>;

/// An in-process [`Transport`] that answers calls with registered handlers.
///
/// Behaves like the batched call endpoint: calls run in order and the first
/// exception ends the batch, so the response array stops right after it.
/// Every round trip is recorded, which makes this transport handy for
/// checking how calls were batched. The record grows with every round trip
/// until [`LocalTransport::take_batches`] drains it, so this transport is
/// meant for tests and local development, not for long-running processes.
///
/// ## Example
///
/// ```rust
/// use courier::managers::local::LocalTransport;
/// use serde_json::json;
///
/// let transport = LocalTransport::default();
/// transport.register("core_session_time_remaining", |_args| Ok(json!(3600)));
/// assert_eq!(transport.round_trips(), 0);
/// ```
#[derive(Default)]
pub struct LocalTransport {
    handlers: DashMap<String, Handler>,
    round_trips: AtomicUsize,
    batches: Mutex<Vec<Vec<CallRequest>>>,
    failure: Mutex<Option<RemoteError>>,
}

impl LocalTransport {
    /// Registers `handler` for `methodname`, replacing any earlier one.
    pub fn register<F>(&self, methodname: impl Into<String>, handler: F)
    where
        F: Fn(&Map<String, Value>) -> Result<Value, RemoteException> + Send + Sync + 'static,
    {
        self.handlers.insert(methodname.into(), Arc::new(handler));
    }

    /// Makes every following round trip fail with `error` until
    /// [`LocalTransport::clear_failure`] is called.
    pub fn fail_with(&self, error: RemoteError) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    /// Lets round trips succeed again.
    pub fn clear_failure(&self) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Number of round trips made so far, failed ones included.
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::SeqCst)
    }

    /// Every batch received so far, oldest first.
    pub fn batches(&self) -> Vec<Vec<CallRequest>> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Removes and returns every batch received so far, oldest first.
    pub fn take_batches(&self) -> Vec<Vec<CallRequest>> {
        std::mem::take(&mut *self.batches.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn answer(&self, request: &CallRequest) -> CallResponse {
        let handler = self
            .handlers
            .get(&request.methodname)
            .map(|entry| Arc::clone(entry.value()));
        match handler {
            Some(handler) => match handler(&request.args) {
                Ok(data) => CallResponse::success(data),
                Err(exception) => CallResponse::failure(exception),
            },
            None => CallResponse::failure(
                RemoteException::new(format!("Unknown function {}", request.methodname))
                    .with_errorcode("servicenotavailable"),
            ),
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    const TRANSPORT_NAME: &'static str = "Local";

    async fn round_trip(&self, body: Vec<u8>) -> Result<Vec<u8>, RemoteError> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);

        let requests: Vec<CallRequest> = serde_json::from_slice(&body)?;
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(requests.clone());

        let failure = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(error) = failure {
            debug!("Failing round trip of {} calls", requests.len());
            return Err(error);
        }

        let mut responses = Vec::with_capacity(requests.len());
        for request in &requests {
            let response = self.answer(request);
            let failed = response.error;
            responses.push(response);
            if failed {
                trace!("Call {} failed, dropping the rest of the batch", request.index);
                break;
            }
        }

        serde_json::to_vec(&responses).map_err(RemoteError::from)
    }
}
