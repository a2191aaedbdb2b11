//! Registry of resource kinds and their engines.

use std::collections::BTreeMap;
use std::sync::Arc;

use oxide_api::ControlPlane;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::engine::Engine;
use crate::resource::RemoteResource;
use crate::resources;
use crate::schema::{ResourceSchema, SchemaError};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("resource kind {0} is already registered")]
    Duplicate(String),

    #[error("unknown resource kind: {0}")]
    UnknownKind(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// What the host needs to know about a kind before driving it.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceDescriptor {
    pub kind: &'static str,
    pub schema: ResourceSchema,
    pub supports_update: bool,
    pub supports_delete: bool,
    pub default_timeout: String,
}

/// Maps kind names to engines sharing one configuration and API client.
pub struct Registry {
    config: Arc<ProviderConfig>,
    api: Arc<dyn ControlPlane>,
    engines: BTreeMap<&'static str, Arc<Engine>>,
}

impl Registry {
    pub fn new(config: ProviderConfig, api: Arc<dyn ControlPlane>) -> Self {
        Self {
            config: Arc::new(config),
            api,
            engines: BTreeMap::new(),
        }
    }

    /// Registry with every built-in kind.
    pub fn builtin(
        config: ProviderConfig,
        api: Arc<dyn ControlPlane>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new(config, api);
        for resource in resources::builtin() {
            registry.register(resource)?;
        }
        Ok(registry)
    }

    /// Add a kind. Its schema is checked before the engine is built.
    pub fn register(
        &mut self,
        resource: Arc<dyn RemoteResource>,
    ) -> Result<Arc<Engine>, RegistryError> {
        let engine = Engine::new(resource, self.api.clone(), self.config.default_timeout)?;
        let kind = engine.kind();
        if self.engines.contains_key(kind) {
            return Err(RegistryError::Duplicate(kind.to_string()));
        }

        debug!("Registered resource kind {}", kind);
        let engine = Arc::new(engine);
        self.engines.insert(kind, engine.clone());
        Ok(engine)
    }

    pub fn resolve(&self, kind: &str) -> Result<Arc<Engine>, RegistryError> {
        self.engines
            .get(kind)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownKind(kind.to_string()))
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.engines.keys().copied()
    }

    pub fn describe(&self) -> Vec<ResourceDescriptor> {
        self.engines
            .values()
            .map(|engine| {
                let schema = engine.schema().clone();
                ResourceDescriptor {
                    kind: schema.kind,
                    supports_update: schema.capabilities.update,
                    supports_delete: schema.capabilities.delete,
                    default_timeout: humantime::format_duration(engine.default_timeout())
                        .to_string(),
                    schema,
                }
            })
            .collect()
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }
}
