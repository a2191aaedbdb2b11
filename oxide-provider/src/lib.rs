//! oxide-provider: declarative reconciliation of Oxide resources.
//!
//! Each resource kind (disks, images, instances, IP pools) is described by a
//! [`ResourceSchema`] and bound to the control plane by a
//! [`RemoteResource`]. A generic [`Engine`] drives create, read, update,
//! delete and import for a kind, and the [`Registry`] hands out one engine
//! per kind wired to shared configuration.

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod registry;
pub mod resource;
pub mod resources;
pub mod schema;
pub mod state_file;
pub mod timeouts;
pub mod value;

pub use config::{ConfigError, ProviderConfig};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use engine::{Engine, Outcome, Plan, Refresh};
pub use registry::{Registry, RegistryError, ResourceDescriptor};
pub use resource::{BindingError, RemoteResource};
pub use schema::{ResourceSchema, SchemaError};
pub use value::Attributes;
