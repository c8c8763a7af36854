use std::future::IntoFuture;
use std::sync::Arc;

use async_channel::{Receiver, Sender, TryRecvError, bounded};
use codee::{Decoder, Encoder};
use courier_common::codec::BatchJsonCodec;
use courier_common::error::RemoteError;
use courier_common::{CallRequest, CallResponse, RemoteCall, RemoteException};
use futures_lite::future::Boxed;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, trace, warn};

use super::{Dispatcher, Transport};
use crate::runtime::{Runtime, run_async};

type CallResult = Result<Value, RemoteError>;

/// How [`Dispatcher::call`] waits for the round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallMode {
    /// Return immediately; the round trip runs on the dispatcher's runtime.
    #[default]
    Async,
    /// Drive the round trip to completion before returning. Every returned
    /// handle is already settled.
    ///
    /// Must not be used from inside a task running on the same runtime.
    Blocking,
}

/// A handle to the result of one call inside a batch.
///
/// Settles exactly once, with the call's payload or the error that rejected
/// it. Await it directly or call [`PendingResult::wait`].
#[derive(Debug)]
pub struct PendingResult {
    index: usize,
    methodname: String,
    receiver: Receiver<CallResult>,
    settled: Option<CallResult>,
}

impl PendingResult {
    /// Position of this call inside its batch.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Name of the called function.
    pub fn methodname(&self) -> &str {
        &self.methodname
    }

    /// Returns the outcome if the call has settled, without waiting.
    pub fn try_result(&mut self) -> Option<&CallResult> {
        if self.settled.is_none() {
            match self.receiver.try_recv() {
                Ok(result) => self.settled = Some(result),
                Err(TryRecvError::Closed) => self.settled = Some(Err(RemoteError::Dropped)),
                Err(TryRecvError::Empty) => {}
            }
        }
        self.settled.as_ref()
    }

    /// Waits for the call to settle.
    pub async fn wait(mut self) -> CallResult {
        if let Some(result) = self.settled.take() {
            return result;
        }
        self.receiver.recv().await.unwrap_or(Err(RemoteError::Dropped))
    }

    /// Waits for the call to settle and deserializes its payload.
    pub async fn wait_as<D: DeserializeOwned>(self) -> Result<D, RemoteError> {
        let methodname = self.methodname.clone();
        let value = self.wait().await?;
        serde_json::from_value(value).map_err(|err| {
            RemoteError::Serialization(format!("unexpected payload from {}: {}", methodname, err))
        })
    }
}

impl IntoFuture for PendingResult {
    type Output = CallResult;
    type IntoFuture = Boxed<CallResult>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

impl<T: Transport, RT: Runtime> std::fmt::Debug for Dispatcher<T, RT> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Dispatcher [{} transport]", T::TRANSPORT_NAME)
    }
}

impl<T: Transport> Dispatcher<T, tokio::runtime::Handle> {
    /// Creates a dispatcher spawning onto the current tokio runtime.
    ///
    /// ## Panics
    /// Panics when called outside of a tokio runtime.
    pub fn on_current_runtime(transport: T) -> Self {
        Self::new(transport, tokio::runtime::Handle::current())
    }
}

impl<T: Transport, RT: Runtime> Dispatcher<T, RT> {
    /// Creates a dispatcher sending through `transport` and spawning round
    /// trips on `runtime`.
    pub fn new(transport: T, runtime: RT) -> Self {
        Self {
            transport: Arc::new(transport),
            runtime,
        }
    }

    /// The transport batches are sent through.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The runtime round trips are spawned on.
    pub fn runtime(&self) -> &RT {
        &self.runtime
    }

    /// Sends `requests` as one batch and returns one handle per request, in
    /// the same order.
    ///
    /// Exactly one round trip is made per non-empty batch. Once the responses
    /// arrive they are matched to the handles by position:
    /// - a successful response fulfils its handle
    /// - a failed response rejects its handle and every later handle in the
    ///   batch, whatever their own responses said
    /// - a missing response rejects its handle and every later handle with
    ///   [`RemoteError::MissingResponse`]
    ///
    /// Handles settled before the failing position stay fulfilled. A
    /// transport failure rejects every handle.
    ///
    /// ## Example
    ///
    /// ```rust,ignore
    /// let handles = dispatcher.call(
    ///     vec![
    ///         RemoteCall::new("core_session_time_remaining"),
    ///         RemoteCall::new("core_output_load_template")
    ///             .arg("component", "core")
    ///             .arg("template", "pix_icon"),
    ///     ],
    ///     CallMode::Async,
    /// );
    /// let remaining: i64 = handles.into_iter().next().unwrap().wait_as().await?;
    /// ```
    pub fn call(&self, requests: Vec<RemoteCall>, mode: CallMode) -> Vec<PendingResult> {
        let mut senders = Vec::with_capacity(requests.len());
        let mut handles = Vec::with_capacity(requests.len());
        let batch: Vec<CallRequest> = requests
            .iter()
            .enumerate()
            .map(|(index, request)| request.at_index(index))
            .collect();

        for request in &batch {
            let (sender, receiver) = bounded(1);
            senders.push(sender);
            handles.push(PendingResult {
                index: request.index,
                methodname: request.methodname.clone(),
                receiver,
                settled: None,
            });
        }

        if batch.is_empty() {
            trace!("Empty batch, nothing to send");
            return handles;
        }

        debug!(
            "Dispatching batch of {} calls over {}: {}",
            batch.len(),
            T::TRANSPORT_NAME,
            batch
                .iter()
                .map(|request| request.methodname.as_str())
                .collect::<Vec<_>>()
                .join(",")
        );

        let body = match BatchJsonCodec::encode(&batch) {
            Ok(body) => body,
            Err(err) => {
                error!("Could not encode batch: {}", err);
                reject_all(&senders, err);
                return handles;
            }
        };

        let transport = Arc::clone(&self.transport);
        let round_trip = async move {
            match transport.round_trip(body).await {
                Ok(bytes) => match BatchJsonCodec::decode(&bytes[..]) {
                    Ok(responses) => settle_batch(&senders, responses),
                    Err(err) => {
                        error!("Could not decode batch response: {}", err);
                        reject_all(&senders, err);
                    }
                },
                Err(err) => {
                    error!("Batch of {} calls failed: {}", senders.len(), err);
                    reject_all(&senders, err);
                }
            }
        };

        match mode {
            CallMode::Async => {
                run_async(round_trip, &self.runtime);
            }
            CallMode::Blocking => self.runtime.block_on(round_trip),
        }

        handles
    }

    /// Sends a single call as its own batch.
    pub fn call_one(&self, request: RemoteCall) -> PendingResult {
        let mut handles = self.call(vec![request], CallMode::Async);
        handles.remove(0)
    }
}

/// Settles each handle from the response at the same position.
///
/// Walks the batch in order and stops at the first failed or missing
/// response; that handle and every later one is rejected with the same error.
pub(crate) fn settle_batch(senders: &[Sender<CallResult>], responses: Vec<CallResponse>) {
    if responses.len() > senders.len() {
        warn!(
            "Received {} responses for a batch of {} calls, ignoring the excess",
            responses.len(),
            senders.len()
        );
    }

    let mut responses = responses.into_iter();
    let mut failure = None;

    for (index, sender) in senders.iter().enumerate() {
        match responses.next() {
            Some(response) if !response.error => settle(sender, Ok(response.data)),
            Some(response) => {
                let exception = response
                    .exception
                    .unwrap_or_else(|| RemoteException::new("Unknown remote error"));
                debug!("Call {} failed: {}", index, exception);
                failure = Some((index, RemoteError::Exception(exception)));
                break;
            }
            None => {
                warn!("Missing response for call {} of {}", index, senders.len());
                failure = Some((index, RemoteError::MissingResponse { index }));
                break;
            }
        }
    }

    if let Some((first, err)) = failure {
        reject_all(&senders[first..], err);
    }
}

fn reject_all(senders: &[Sender<CallResult>], err: RemoteError) {
    for sender in senders {
        settle(sender, Err(err.clone()));
    }
}

fn settle(sender: &Sender<CallResult>, result: CallResult) {
    // The caller may have dropped its handle already
    if sender.try_send(result).is_err() {
        trace!("Handle dropped before it settled");
    }
}
