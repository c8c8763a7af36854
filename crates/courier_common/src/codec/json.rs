use codee::{Decoder, Encoder};

use crate::{CallRequest, CallResponse, error::RemoteError};

/// Codec for the batched call endpoint.
///
/// The endpoint speaks plain JSON in both directions:
/// - requests are one array of `{index, methodname, args}` objects
/// - responses are one array of `{error, data|exception}` objects aligned
///   with the requests by position
///
/// ## Usage
///
/// ```rust
/// use codee::{Decoder, Encoder};
/// use courier_common::{codec::BatchJsonCodec, CallResponse, RemoteCall};
///
/// let body = BatchJsonCodec::encode(&vec![RemoteCall::new("core_session_touch").at_index(0)]).unwrap();
/// assert_eq!(body, br#"[{"index":0,"methodname":"core_session_touch","args":{}}]"#);
///
/// let responses: Vec<CallResponse> = BatchJsonCodec::decode(&br#"[{"error":false,"data":true}]"#[..]).unwrap();
/// assert!(!responses[0].error);
/// ```
pub struct BatchJsonCodec;

impl Encoder<Vec<CallRequest>> for BatchJsonCodec {
    type Error = RemoteError;
    type Encoded = Vec<u8>;

    fn encode(val: &Vec<CallRequest>) -> Result<Self::Encoded, Self::Error> {
        serde_json::to_vec(val).map_err(RemoteError::from)
    }
}

impl Decoder<Vec<CallResponse>> for BatchJsonCodec {
    type Error = RemoteError;
    type Encoded = [u8];

    fn decode(val: &Self::Encoded) -> Result<Vec<CallResponse>, Self::Error> {
        // An unparseable body means the round trip as a whole failed, not a
        // single call inside it.
        serde_json::from_slice(val).map_err(|err| {
            RemoteError::Transport(format!("invalid response body: {}", err))
        })
    }
}
