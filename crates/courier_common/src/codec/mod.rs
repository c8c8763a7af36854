//! Codecs for the batched call endpoint.

mod json;

pub use json::BatchJsonCodec;
