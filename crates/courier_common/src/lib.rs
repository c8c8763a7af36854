//! Shared types for the courier crates.
//!
//! - [`RemoteCall`], [`CallRequest`], [`CallResponse`] and [`RemoteException`]
//!   describe the batched call endpoint on the wire.
//! - [`SiteConfig`] is the page-level site configuration.
//! - [`codec::BatchJsonCodec`] encodes batches and decodes response arrays.
//! - [`error::RemoteError`] is what a pending call is rejected with.

pub mod messages;
pub use messages::*;

pub mod codec;

pub mod config;
pub use config::SiteConfig;

pub mod error;
pub use error::RemoteError;

/// Web service function returning the source of a template.
pub const LOAD_TEMPLATE_METHOD: &str = "core_output_load_template";

/// Web service function returning several localized strings at once.
pub const GET_STRINGS_METHOD: &str = "core_get_strings";

/// Web service function extending the current session.
pub const SESSION_TOUCH_METHOD: &str = "core_session_touch";

/// Web service function returning the remaining session lifetime in seconds.
pub const SESSION_TIME_REMAINING_METHOD: &str = "core_session_time_remaining";
