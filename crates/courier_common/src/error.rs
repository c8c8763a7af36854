use thiserror::Error;

use crate::RemoteException;

/// Errors a pending call can be rejected with.
///
/// Every handle returned by the dispatcher settles with either its payload or
/// one of these. The error is cloned into each handle it rejects, so one
/// failure inside a batch shows up identically on every affected handle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// The request never produced a usable response (connection refused,
    /// HTTP error status, unreadable body).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The response array ended before this position.
    #[error("missing response for call {index}")]
    MissingResponse {
        /// Position of the first call without a response.
        index: usize,
    },

    /// The server reported an exception for a call in the batch.
    #[error("remote exception: {0}")]
    Exception(RemoteException),

    /// A batch could not be encoded, or a payload had an unexpected shape.
    #[error("serialization failure: {0}")]
    Serialization(String),

    /// The task driving the batch went away before settling this handle.
    #[error("call was dropped before it settled")]
    Dropped,
}

impl RemoteError {
    /// Returns the server exception, if this error carries one.
    pub fn exception(&self) -> Option<&RemoteException> {
        match self {
            RemoteError::Exception(exception) => Some(exception),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(error: serde_json::Error) -> Self {
        RemoteError::Serialization(error.to_string())
    }
}
