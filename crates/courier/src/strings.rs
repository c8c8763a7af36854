//! Localized string lookup over the dispatcher.
//!
//! Strings are requested by `{key, component}` and resolved in one remote
//! call per batch. Resolved strings are cached for the lifetime of the
//! process; only cache misses go over the wire.

use async_trait::async_trait;
use courier_common::error::RemoteError;
use courier_common::{GET_STRINGS_METHOD, RemoteCall};
use dashmap::DashMap;
use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::managers::{Dispatcher, Transport};
use crate::runtime::Runtime;

/// Component used when a request names none.
pub const DEFAULT_COMPONENT: &str = "core";

/// One string to look up.
#[derive(Debug, Clone, PartialEq)]
pub struct StringRequest {
    /// String identifier, e.g. `sessiontimeoutsoon`.
    pub key: String,
    /// Owning component, e.g. `core` or `mod_forum`.
    pub component: String,
    /// Value for the `{$a}` placeholders. A string or number fills `{$a}`,
    /// an object fills `{$a->field}`.
    pub param: Option<Value>,
}

impl StringRequest {
    /// Creates a request without a param. An empty component means
    /// [`DEFAULT_COMPONENT`].
    pub fn new(key: impl Into<String>, component: impl Into<String>) -> Self {
        let component = component.into();
        Self {
            key: key.into(),
            component: if component.is_empty() {
                DEFAULT_COMPONENT.to_string()
            } else {
                component
            },
            param: None,
        }
    }

    /// Sets the param used for placeholder substitution.
    pub fn with_param(mut self, param: impl Into<Value>) -> Self {
        self.param = Some(param.into());
        self
    }
}

/// Resolves a list of string requests to their text, in order.
#[async_trait]
pub trait StringResolver: Send + Sync + 'static {
    /// Returns one string per request, in request order.
    async fn get_strings(&self, requests: &[StringRequest]) -> Result<Vec<String>, RemoteError>;
}

/// [`StringResolver`] backed by the remote string service.
pub struct StringLoader<T: Transport, RT: Runtime = tokio::runtime::Handle> {
    dispatcher: Dispatcher<T, RT>,
    cache: DashMap<(String, String), String>,
}

impl<T: Transport, RT: Runtime> StringLoader<T, RT> {
    /// Creates a loader with an empty cache.
    pub fn new(dispatcher: Dispatcher<T, RT>) -> Self {
        Self {
            dispatcher,
            cache: DashMap::new(),
        }
    }

    /// Number of strings held in the cache.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    async fn fetch_missing(&self, requests: &[StringRequest]) -> Result<(), RemoteError> {
        let mut missing: Vec<(String, String)> = Vec::new();
        for request in requests {
            let id = (request.component.clone(), request.key.clone());
            if !self.cache.contains_key(&id) && !missing.contains(&id) {
                missing.push(id);
            }
        }

        if missing.is_empty() {
            trace!("All {} strings served from cache", requests.len());
            return Ok(());
        }

        debug!("Fetching {} strings", missing.len());
        let wanted: Vec<Value> = missing
            .iter()
            .map(|(component, key)| json!({"stringid": key, "component": component}))
            .collect();
        let call = RemoteCall::new(GET_STRINGS_METHOD).arg("strings", wanted);
        let payload = self.dispatcher.call_one(call).wait().await?;

        let resolved = parse_strings(payload)?;
        if resolved.len() != missing.len() {
            return Err(RemoteError::Serialization(format!(
                "asked for {} strings, got {}",
                missing.len(),
                resolved.len()
            )));
        }

        for (id, text) in missing.into_iter().zip(resolved) {
            self.cache.entry(id).or_insert(text);
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Transport, RT: Runtime> StringResolver for StringLoader<T, RT> {
    async fn get_strings(&self, requests: &[StringRequest]) -> Result<Vec<String>, RemoteError> {
        self.fetch_missing(requests).await?;

        requests
            .iter()
            .map(|request| {
                let id = (request.component.clone(), request.key.clone());
                let text = self.cache.get(&id).ok_or_else(|| {
                    RemoteError::Serialization(format!(
                        "string {}/{} missing after fetch",
                        request.component, request.key
                    ))
                })?;
                Ok(format_string(&text, request.param.as_ref()))
            })
            .collect()
    }
}

/// Accepts either a list of strings or a list of `{string: ...}` records.
fn parse_strings(payload: Value) -> Result<Vec<String>, RemoteError> {
    let Value::Array(items) = payload else {
        return Err(RemoteError::Serialization(
            "string list payload is not an array".to_string(),
        ));
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::String(text) => Ok(text),
            Value::Object(mut record) => match record.remove("string") {
                Some(Value::String(text)) => Ok(text),
                _ => Err(RemoteError::Serialization(
                    "string record without text".to_string(),
                )),
            },
            other => Err(RemoteError::Serialization(format!(
                "unexpected string entry: {}",
                other
            ))),
        })
        .collect()
}

/// Fills `{$a}` and `{$a->field}` placeholders from `param`.
pub fn format_string(text: &str, param: Option<&Value>) -> String {
    match param {
        None | Some(Value::Null) => text.to_string(),
        Some(Value::Object(fields)) => {
            let mut formatted = text.to_string();
            for (name, value) in fields {
                formatted = formatted.replace(&format!("{{$a->{}}}", name), &plain_text(value));
            }
            formatted
        }
        Some(value) => text.replace("{$a}", &plain_text(value)),
    }
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_component_defaults_to_core() {
        let request = StringRequest::new("somekey", "");
        assert_eq!(request.component, "core");
    }

    #[test]
    fn test_format_scalar_param() {
        assert_eq!(
            format_string("Delete {$a}?", Some(&json!("fish"))),
            "Delete fish?"
        );
        assert_eq!(format_string("{$a} items", Some(&json!(3))), "3 items");
    }

    #[test]
    fn test_format_object_param() {
        let param = json!({"a": "fish", "count": 2});
        assert_eq!(
            format_string("{$a->count} {$a->a} left, {$a->missing}", Some(&param)),
            "2 fish left, {$a->missing}"
        );
    }

    #[test]
    fn test_parse_records_and_plain_strings() {
        let parsed = parse_strings(json!([
            "Inactive",
            {"stringid": "sessiontimeoutsoon", "component": "error", "string": "Your session expires soon"}
        ]))
        .unwrap();
        assert_eq!(parsed, vec!["Inactive", "Your session expires soon"]);
    }

    #[test]
    fn test_parse_rejects_non_array() {
        assert!(parse_strings(json!({"string": "x"})).is_err());
    }
}
