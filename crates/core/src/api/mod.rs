//! HTTP access to the EQDB REST API.

/// Thin request wrapper around `reqwest`.
pub mod client;

pub use client::ApiClient;
