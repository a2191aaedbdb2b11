//! Per-kind bindings between attributes and control-plane calls.

use std::time::Duration;

use async_trait::async_trait;
use oxide_api::{ApiError, ControlPlane};
use thiserror::Error;

use crate::schema::ResourceSchema;
use crate::value::{Attributes, ValueError};

/// Failure inside a binding.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error("timed out after {}", pretty(.0))]
    Timeout(Duration),

    #[error("operation not supported")]
    Unsupported,
}

fn pretty(d: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*d)
}

impl BindingError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BindingError::Api(e) if e.is_not_found())
    }
}

/// Binding for one resource kind.
///
/// Implementations build typed requests from validated attributes and map
/// remote objects back into attributes. Validation, timeouts and diagnostics
/// are handled by the engine.
#[async_trait]
pub trait RemoteResource: Send + Sync {
    /// Schema of the kind. Called once at registration.
    fn schema(&self) -> ResourceSchema;

    /// Create the remote object and return its attributes.
    async fn create(
        &self,
        api: &dyn ControlPlane,
        config: &Attributes,
    ) -> Result<Attributes, BindingError>;

    /// Fetch the remote object and merge it into `state`.
    async fn read(
        &self,
        api: &dyn ControlPlane,
        id: &str,
        state: Attributes,
    ) -> Result<Attributes, BindingError>;

    /// Apply `changes` (mutable attributes only) and merge the result into `prior`.
    async fn update(
        &self,
        _api: &dyn ControlPlane,
        _id: &str,
        _changes: &Attributes,
        _prior: Attributes,
    ) -> Result<Attributes, BindingError> {
        Err(BindingError::Unsupported)
    }

    /// Remove the remote object.
    async fn delete(&self, _api: &dyn ControlPlane, _id: &str) -> Result<(), BindingError> {
        Err(BindingError::Unsupported)
    }
}
