//! oxide-api: typed access to the Oxide control-plane API.
//!
//! The [`ControlPlane`] trait exposes one method per remote operation used by
//! the provider. Two implementations are shipped:
//! - [`HttpClient`]: talks to a real control plane over HTTP
//! - [`MemoryControlPlane`]: keeps objects in process, for tests and local runs
//!
//! Failures are reported as [`ApiError`], classified only as "not found" vs
//! everything else. No retries happen at this layer.

pub mod client;
pub mod error;
pub mod http;
pub mod memory;
pub mod types;

pub use client::ControlPlane;
pub use error::{ApiError, Result};
pub use http::HttpClient;
pub use memory::MemoryControlPlane;
