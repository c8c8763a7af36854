#![deny(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces,
    clippy::unwrap_used
)]
#![allow(clippy::type_complexity)]

/*!
Batched remote calls for server-rendered pages.

A page usually needs several things from the server at once: a template, a
handful of localized strings, the remaining session lifetime. Instead of one
request each, the [`Dispatcher`] coalesces any number of [`RemoteCall`]s into
a single request to the batched call endpoint and hands back one
[`PendingResult`] per call. The responses come back as one array, matched to
the calls by position.

On top of the dispatcher this crate provides:
- [`strings::StringLoader`], a cached localized string lookup
- [`session::SessionKeepalive`], a background loop that keeps the session
  alive or warns before it expires

Transports are pluggable through the [`Transport`] trait; the HTTP one lives
in `courier_http`.

## Example
```rust,ignore
use courier::{CallMode, Dispatcher, RemoteCall};
use courier_http::{HttpSettings, HttpTransport};

#[tokio::main]
async fn main() -> Result<(), courier::RemoteError> {
    let transport = HttpTransport::new(HttpSettings::new("https://school.example"))?;
    let dispatcher = Dispatcher::on_current_runtime(transport);

    let mut handles = dispatcher.call(
        vec![
            RemoteCall::new("core_session_time_remaining"),
            RemoteCall::new("core_output_load_template")
                .arg("component", "core")
                .arg("template", "pix_icon"),
        ],
        CallMode::Async,
    );

    let template: String = handles.pop().unwrap().wait_as().await?;
    let remaining = handles.pop().unwrap().await?;
    println!("{remaining} seconds left, template: {template}");
    Ok(())
}
```
*/

/// The dispatcher and the transport seam.
pub mod managers;
pub use managers::dispatch::{CallMode, PendingResult};
pub use managers::{Dispatcher, Transport};

mod runtime;
pub use runtime::{JoinHandle, Runtime};

/// Session keepalive loop.
pub mod session;
pub use session::{
    KeepaliveMode, KeepaliveSettings, KeepaliveStatus, Notifier, SessionKeepalive,
    SessionMonitor, StartOutcome, TracingNotifier,
};

pub mod strings;
pub use strings::{StringLoader, StringRequest, StringResolver};

pub use async_trait::async_trait;

pub use courier_common::error;
pub use courier_common::*;
