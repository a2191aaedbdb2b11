//! Reconciliation engine.
//!
//! One [`Engine`] drives create, read, update, delete and import for every
//! instance of a single resource kind. It validates configurations against
//! the kind's [`ResourceSchema`], bounds each remote interaction with a
//! timeout and turns every failure into [`Diagnostics`]. The engine keeps no
//! per-instance state, so one engine can serve concurrent operations.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use oxide_api::ControlPlane;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::resource::{BindingError, RemoteResource};
use crate::schema::{ResourceSchema, SchemaError};
use crate::timeouts::{Operation, TIMEOUTS, Timeouts};
use crate::value::Attributes;

/// Result of an engine operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    /// The resulting value. `None` when nothing may be recorded.
    pub value: Option<T>,
    pub diagnostics: Diagnostics,
}

impl<T> Outcome<T> {
    fn ok(value: T, diagnostics: Diagnostics) -> Self {
        Self {
            value: Some(value),
            diagnostics,
        }
    }

    fn failed(diagnostics: Diagnostics) -> Self {
        Self {
            value: None,
            diagnostics,
        }
    }

    pub fn has_error(&self) -> bool {
        self.diagnostics.has_error()
    }
}

/// Result of refreshing recorded state.
#[derive(Debug, Clone, PartialEq)]
pub enum Refresh {
    /// The object exists; this is its current state.
    Present(Attributes),
    /// The object is gone and the instance should be dropped.
    Absent,
}

/// How a desired configuration would be applied against recorded state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "attributes", rename_all = "snake_case")]
pub enum Plan {
    /// Nothing recorded yet.
    Create,
    /// Nothing to do.
    NoChange,
    /// In-place update of the listed attributes.
    Update(Vec<String>),
    /// Destroy and recreate because the listed attributes changed.
    Replace(Vec<String>),
}

/// Engine for one resource kind.
pub struct Engine {
    resource: Arc<dyn RemoteResource>,
    schema: ResourceSchema,
    api: Arc<dyn ControlPlane>,
    default_timeout: Duration,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("kind", &self.schema.kind)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Build an engine, rejecting a malformed schema.
    pub fn new(
        resource: Arc<dyn RemoteResource>,
        api: Arc<dyn ControlPlane>,
        default_timeout: Duration,
    ) -> Result<Self, SchemaError> {
        let schema = resource.schema();
        schema.check_definition()?;
        Ok(Self {
            resource,
            schema,
            api,
            default_timeout,
        })
    }

    pub fn kind(&self) -> &'static str {
        self.schema.kind
    }

    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    fn noun(&self) -> &'static str {
        self.schema.noun
    }

    /// Timeout for `op`, honoring an override in `attrs`.
    ///
    /// A malformed override falls back to the default and leaves a warning.
    fn timeout_for(
        &self,
        attrs: &Attributes,
        op: Operation,
        diags: &mut Diagnostics,
    ) -> Duration {
        match Timeouts::parse(attrs, &self.schema.timeouts) {
            Ok(timeouts) => timeouts.resolve(op, self.default_timeout),
            Err(errors) => {
                let fallback = humantime::format_duration(self.default_timeout);
                for e in errors {
                    let mut warning = Diagnostic::warning(
                        e.summary,
                        format!("{}; using the default of {}", e.detail, fallback),
                    );
                    warning.attribute = e.attribute;
                    diags.push(warning);
                }
                self.default_timeout
            }
        }
    }

    async fn bounded<T>(
        &self,
        limit: Duration,
        fut: impl Future<Output = Result<T, BindingError>>,
    ) -> Result<T, BindingError> {
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(BindingError::Timeout(limit)),
        }
    }

    fn api_error(&self, action: &str, err: &BindingError) -> Diagnostic {
        Diagnostic::error(
            format!("Error {} {}", action, self.noun()),
            format!("API error: {}", err),
        )
    }

    /// Diagnostic for a failed create or update. Configuration values the
    /// binding could not use are reported as such, not as remote errors.
    fn failure(&self, action: &str, err: &BindingError) -> Diagnostic {
        match err {
            BindingError::Value(e) => {
                let diag = Diagnostic::error("Invalid configuration", e.to_string());
                match e.attribute() {
                    Some(name) => diag.at(name),
                    None => diag,
                }
            }
            _ => self.api_error(action, err),
        }
    }

    fn unsupported(&self, verb: &str) -> Diagnostic {
        Diagnostic::error(
            format!("Error {} {}", verb, self.noun()),
            format!(
                "the oxide API currently does not support {} {}s",
                verb,
                self.noun()
            ),
        )
    }

    /// Create the remote object described by `desired`.
    ///
    /// Nothing is sent when validation fails. On failure no state is
    /// returned and nothing is cleaned up remotely.
    pub async fn create(&self, desired: &Attributes) -> Outcome<Attributes> {
        let mut diags = self.schema.validate(desired);
        if diags.has_error() {
            debug!(
                "Rejected {} configuration: {} error(s)",
                self.kind(),
                diags.errors().count()
            );
            return Outcome::failed(diags);
        }

        let limit = self.timeout_for(desired, Operation::Create, &mut diags);
        info!(
            "Creating {} (timeout {})",
            self.kind(),
            humantime::format_duration(limit)
        );

        let result = self
            .bounded(limit, self.resource.create(self.api.as_ref(), desired))
            .await;

        match result {
            Ok(state) => {
                info!("Created {} {}", self.kind(), state.id().unwrap_or("<unknown>"));
                Outcome::ok(state, diags)
            }
            Err(e) => {
                warn!("Failed to create {}: {}", self.kind(), e);
                diags.push(self.failure("creating", &e));
                Outcome::failed(diags)
            }
        }
    }

    /// Refresh recorded state from the control plane.
    pub async fn read(&self, state: &Attributes) -> Outcome<Refresh> {
        let Some(id) = state.id() else {
            return Outcome::failed(
                Diagnostic::error(
                    format!("Error reading {}", self.noun()),
                    "the recorded state has no id",
                )
                .into(),
            );
        };

        let mut diags = Diagnostics::new();
        let limit = self.timeout_for(state, Operation::Read, &mut diags);
        debug!("Reading {} {}", self.kind(), id);

        let result = self
            .bounded(
                limit,
                self.resource.read(self.api.as_ref(), id, state.clone()),
            )
            .await;

        match result {
            Ok(fresh) => Outcome::ok(Refresh::Present(fresh), diags),
            Err(e) if e.is_not_found() => {
                info!("{} {} no longer exists", self.kind(), id);
                Outcome::ok(Refresh::Absent, diags)
            }
            Err(e) => {
                diags.push(self.api_error("reading", &e));
                Outcome::failed(diags)
            }
        }
    }

    /// Apply changes to mutable attributes in place.
    ///
    /// The prior state is returned unchanged on every failure.
    pub async fn update(&self, desired: &Attributes, prior: &Attributes) -> Outcome<Attributes> {
        if !self.schema.capabilities.update {
            return Outcome::ok(prior.clone(), self.unsupported("updating").into());
        }

        let mut diags = self.schema.validate(desired);
        for name in self.schema.requires_replace(desired, prior) {
            diags.push(
                Diagnostic::error(
                    "Attribute requires replacement",
                    format!(
                        "\"{}\" cannot be changed in place; the {} must be replaced",
                        name,
                        self.noun()
                    ),
                )
                .at(name),
            );
        }
        if diags.has_error() {
            return Outcome::ok(prior.clone(), diags);
        }

        let Some(id) = prior.id() else {
            diags.push(Diagnostic::error(
                format!("Error updating {}", self.noun()),
                "the recorded state has no id",
            ));
            return Outcome::ok(prior.clone(), diags);
        };

        let mut base = prior.clone();
        base.copy_from(desired, TIMEOUTS);

        let changes = self.schema.changed_mutable(desired, prior);
        if changes.is_empty() {
            debug!("No changes for {} {}", self.kind(), id);
            return Outcome::ok(base, diags);
        }

        let limit = self.timeout_for(desired, Operation::Update, &mut diags);
        info!("Updating {} {}", self.kind(), id);

        let result = self
            .bounded(
                limit,
                self.resource.update(self.api.as_ref(), id, &changes, base),
            )
            .await;

        match result {
            Ok(state) => Outcome::ok(state, diags),
            Err(e) => {
                warn!("Failed to update {} {}: {}", self.kind(), id, e);
                diags.push(self.failure("updating", &e));
                Outcome::ok(prior.clone(), diags)
            }
        }
    }

    /// Delete the remote object. An object that is already gone counts as deleted.
    pub async fn delete(&self, state: &Attributes) -> Diagnostics {
        if !self.schema.capabilities.delete {
            return self.unsupported("deleting").into();
        }

        let Some(id) = state.id() else {
            return Diagnostic::warning(
                format!("Nothing to delete for {}", self.noun()),
                "the recorded state has no id",
            )
            .into();
        };

        let mut diags = Diagnostics::new();
        let limit = self.timeout_for(state, Operation::Delete, &mut diags);
        info!("Deleting {} {}", self.kind(), id);

        let result = self
            .bounded(limit, self.resource.delete(self.api.as_ref(), id))
            .await;

        match result {
            Ok(()) => diags,
            Err(e) if e.is_not_found() => {
                debug!("{} {} already deleted", self.kind(), id);
                diags
            }
            Err(e) => {
                warn!("Failed to delete {} {}: {}", self.kind(), id, e);
                diags.push(self.api_error("deleting", &e));
                diags
            }
        }
    }

    /// Build recorded state for an existing object.
    pub async fn import(&self, id: &str) -> Outcome<Attributes> {
        info!("Importing {} {}", self.kind(), id);

        let result = self
            .bounded(
                self.default_timeout,
                self.resource.read(self.api.as_ref(), id, Attributes::new()),
            )
            .await;

        match result {
            Ok(state) => Outcome::ok(state, Diagnostics::new()),
            Err(e) => Outcome::failed(self.api_error("importing", &e).into()),
        }
    }

    /// Immutable attributes that differ between `desired` and `prior`.
    pub fn requires_replace(&self, desired: &Attributes, prior: &Attributes) -> Vec<&'static str> {
        self.schema.requires_replace(desired, prior)
    }

    /// Decide how `desired` would be applied on top of `prior`.
    pub fn plan(&self, desired: &Attributes, prior: Option<&Attributes>) -> Outcome<Plan> {
        let diags = self.schema.validate(desired);
        if diags.has_error() {
            return Outcome::failed(diags);
        }

        let Some(prior) = prior else {
            return Outcome::ok(Plan::Create, diags);
        };

        let replace = self.requires_replace(desired, prior);
        if !replace.is_empty() {
            let names = replace.into_iter().map(String::from).collect();
            return Outcome::ok(Plan::Replace(names), diags);
        }

        let changes = self.schema.changed_mutable(desired, prior);
        if changes.is_empty() {
            return Outcome::ok(Plan::NoChange, diags);
        }
        let names = changes.iter().map(|(k, _)| k.to_string()).collect();
        Outcome::ok(Plan::Update(names), diags)
    }
}
