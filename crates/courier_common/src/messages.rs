use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{self, Display};

/// A single logical call to a remote web service function.
///
/// Several of these are coalesced into one batch by the dispatcher. The
/// position of each call inside its batch is assigned when the batch is
/// submitted, not when the call is built.
///
/// ## Example
///
/// ```rust
/// use courier_common::RemoteCall;
///
/// let call = RemoteCall::new("core_output_load_template")
///     .arg("component", "core")
///     .arg("template", "pix_icon");
///
/// assert_eq!(call.methodname, "core_output_load_template");
/// assert_eq!(call.args["template"], "pix_icon");
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RemoteCall {
    /// Name of the web service function, e.g. `core_session_touch`.
    pub methodname: String,
    /// Named arguments.
    pub args: Map<String, Value>,
}

impl RemoteCall {
    /// Creates a call with no arguments.
    pub fn new(methodname: impl Into<String>) -> Self {
        Self {
            methodname: methodname.into(),
            args: Map::new(),
        }
    }

    /// Adds a named argument.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    /// Replaces the argument map wholesale.
    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        self.args = args;
        self
    }

    /// Stamps this call with its position inside a batch.
    pub fn at_index(&self, index: usize) -> CallRequest {
        CallRequest {
            index,
            methodname: self.methodname.clone(),
            args: self.args.clone(),
        }
    }
}

/// The on-wire form of a [`RemoteCall`]: `{index, methodname, args}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CallRequest {
    /// Position of the call inside its batch.
    pub index: usize,
    /// Name of the web service function.
    pub methodname: String,
    /// Named arguments.
    pub args: Map<String, Value>,
}

fn missing_error_flag() -> bool {
    // Anything but an explicit `false` counts as a failed call.
    true
}

/// One element of the response array: `{error: bool, data|exception}`.
///
/// Responses carry no index of their own; they are matched to requests by
/// their position in the array.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CallResponse {
    /// `false` when the call succeeded.
    #[serde(default = "missing_error_flag")]
    pub error: bool,
    /// Payload of a successful call.
    #[serde(default)]
    pub data: Value,
    /// Description of a failed call.
    #[serde(default)]
    pub exception: Option<RemoteException>,
}

impl CallResponse {
    /// Builds a successful response.
    pub fn success(data: impl Into<Value>) -> Self {
        Self {
            error: false,
            data: data.into(),
            exception: None,
        }
    }

    /// Builds a failed response.
    pub fn failure(exception: RemoteException) -> Self {
        Self {
            error: true,
            data: Value::Null,
            exception: Some(exception),
        }
    }
}

/// Exception reported by the server for a single call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct RemoteException {
    /// Human readable message.
    #[serde(default)]
    pub message: String,
    /// Machine readable error code, e.g. `servicerequireslogin`.
    #[serde(default)]
    pub errorcode: Option<String>,
    /// Link the user may follow to recover.
    #[serde(default)]
    pub link: Option<String>,
    /// Documentation link for the error.
    #[serde(default)]
    pub moreinfourl: Option<String>,
    /// Extra debugging output, only present on developer sites.
    #[serde(default)]
    pub debuginfo: Option<String>,
}

impl RemoteException {
    /// Creates an exception carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Sets the error code.
    pub fn with_errorcode(mut self, errorcode: impl Into<String>) -> Self {
        self.errorcode = Some(errorcode.into());
        self
    }
}

impl Display for RemoteException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.errorcode {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_request_wire_shape() {
        let call = RemoteCall::new("core_output_load_template")
            .arg("component", "core")
            .arg("template", "pix_icon");

        let wire = serde_json::to_value(call.at_index(3)).unwrap();
        assert_eq!(
            wire,
            json!({
                "index": 3,
                "methodname": "core_output_load_template",
                "args": {"component": "core", "template": "pix_icon"}
            })
        );
    }

    #[test]
    fn test_response_without_error_flag_is_failure() {
        // Only an explicit `error: false` is a success
        let response: CallResponse = serde_json::from_value(json!({"data": 5})).unwrap();
        assert!(response.error);
        assert_eq!(response.data, json!(5));
    }

    #[test]
    fn test_response_exception_fields() {
        let response: CallResponse = serde_json::from_value(json!({
            "error": true,
            "exception": {
                "message": "Course or activity not accessible.",
                "errorcode": "requireloginerror",
                "link": "https://example.org/"
            }
        }))
        .unwrap();

        let exception = response.exception.unwrap();
        assert_eq!(exception.errorcode.as_deref(), Some("requireloginerror"));
        assert_eq!(
            exception.to_string(),
            "Course or activity not accessible. (requireloginerror)"
        );
        assert!(exception.debuginfo.is_none());
    }
}
