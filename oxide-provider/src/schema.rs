//! Resource schemas: attribute descriptors and cross-attribute constraints.
//!
//! A schema is everything the engine needs to validate a configuration and
//! decide between in-place update and replacement without kind-specific code.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::timeouts::{Operation, TIMEOUTS, Timeouts};
use crate::value::Attributes;

/// Errors in a schema definition, caught when a kind is registered.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("{kind}: attribute \"{name}\" is declared twice")]
    DuplicateAttribute { kind: String, name: String },

    #[error("{kind}: attribute name \"{name}\" is reserved")]
    ReservedAttribute { kind: String, name: String },

    #[error("{kind}: constraint {constraint} refers to unknown attribute \"{name}\"")]
    UnknownAttribute {
        kind: String,
        constraint: &'static str,
        name: String,
    },

    #[error("{kind}: constraint {constraint} refers to computed attribute \"{name}\"")]
    ComputedInConstraint {
        kind: String,
        constraint: &'static str,
        name: String,
    },

    #[error("{kind}: exactly-one-of needs at least two attributes")]
    DegenerateGroup { kind: String },
}

/// Value type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "fields", rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Int64,
    Bool,
    /// Object with named scalar fields.
    Object(Vec<(&'static str, AttributeType)>),
}

impl AttributeType {
    fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => true,
            (AttributeType::Int64, v) => v.is_i64(),
            (AttributeType::Bool, Value::Bool(_)) => true,
            (AttributeType::Object(fields), Value::Object(map)) => map.iter().all(|(k, v)| {
                v.is_null()
                    || fields
                        .iter()
                        .any(|(name, ty)| name == k && ty.matches(v))
            }),
            _ => false,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            AttributeType::String => "string",
            AttributeType::Int64 => "number",
            AttributeType::Bool => "bool",
            AttributeType::Object(_) => "object",
        }
    }
}

/// Whether the user must, may or must not supply a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Required,
    Optional,
    Computed,
}

/// How changes to an attribute are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mutability {
    /// Any change forces replacement.
    Immutable,
    /// Changes are applied in place.
    Mutable,
    /// Assigned by the server.
    Computed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    pub name: &'static str,
    #[serde(flatten)]
    pub ty: AttributeType,
    pub presence: Presence,
    pub mutability: Mutability,
    pub description: &'static str,
}

impl Attribute {
    fn new(name: &'static str, ty: AttributeType, presence: Presence) -> Self {
        let mutability = match presence {
            Presence::Computed => Mutability::Computed,
            _ => Mutability::Immutable,
        };
        Self {
            name,
            ty,
            presence,
            mutability,
            description: "",
        }
    }

    pub fn required(name: &'static str, ty: AttributeType) -> Self {
        Self::new(name, ty, Presence::Required)
    }

    pub fn optional(name: &'static str, ty: AttributeType) -> Self {
        Self::new(name, ty, Presence::Optional)
    }

    pub fn computed(name: &'static str, ty: AttributeType) -> Self {
        Self::new(name, ty, Presence::Computed)
    }

    /// Allow in-place updates.
    pub fn mutable(mut self) -> Self {
        if self.presence != Presence::Computed {
            self.mutability = Mutability::Mutable;
        }
        self
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn is_computed(&self) -> bool {
        self.presence == Presence::Computed
    }
}

/// Cross-attribute constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    /// Exactly one of the attributes must be set.
    ExactlyOneOf(Vec<&'static str>),
    /// When `attribute` is set, every attribute in `requires` must be set too.
    AlsoRequires {
        attribute: &'static str,
        requires: Vec<&'static str>,
    },
    /// When `attribute` is set, none of `conflicts` may be set.
    ConflictsWith {
        attribute: &'static str,
        conflicts: Vec<&'static str>,
    },
}

impl Constraint {
    pub fn label(&self) -> &'static str {
        match self {
            Constraint::ExactlyOneOf(_) => "exactly-one-of",
            Constraint::AlsoRequires { .. } => "also-requires",
            Constraint::ConflictsWith { .. } => "conflicts-with",
        }
    }

    fn referenced(&self) -> Vec<&'static str> {
        match self {
            Constraint::ExactlyOneOf(names) => names.clone(),
            Constraint::AlsoRequires {
                attribute,
                requires,
            } => std::iter::once(*attribute)
                .chain(requires.iter().copied())
                .collect(),
            Constraint::ConflictsWith {
                attribute,
                conflicts,
            } => std::iter::once(*attribute)
                .chain(conflicts.iter().copied())
                .collect(),
        }
    }

    fn check(&self, attrs: &Attributes, diags: &mut Diagnostics) {
        let summary = format!("Invalid attribute combination: {}", self.label());
        match self {
            Constraint::ExactlyOneOf(names) => {
                let set: Vec<&str> = names.iter().copied().filter(|n| attrs.is_set(n)).collect();
                if set.len() == 1 {
                    return;
                }
                let detail = if set.is_empty() {
                    format!("exactly one of [{}] must be specified", names.join(", "))
                } else {
                    format!(
                        "exactly one of [{}] must be specified, got [{}]",
                        names.join(", "),
                        set.join(", ")
                    )
                };
                let at = set.first().copied().unwrap_or(names[0]);
                diags.push(Diagnostic::error(summary, detail).at(at));
            }
            Constraint::AlsoRequires {
                attribute,
                requires,
            } => {
                if !attrs.is_set(attribute) {
                    return;
                }
                for missing in requires.iter().filter(|r| !attrs.is_set(r)) {
                    diags.push(
                        Diagnostic::error(
                            summary.clone(),
                            format!(
                                "attribute \"{}\" must be specified when \"{}\" is specified",
                                missing, attribute
                            ),
                        )
                        .at(*attribute),
                    );
                }
            }
            Constraint::ConflictsWith {
                attribute,
                conflicts,
            } => {
                if !attrs.is_set(attribute) {
                    return;
                }
                for other in conflicts.iter().filter(|c| attrs.is_set(c)) {
                    diags.push(
                        Diagnostic::error(
                            summary.clone(),
                            format!(
                                "attribute \"{}\" cannot be specified when \"{}\" is specified",
                                other, attribute
                            ),
                        )
                        .at(*attribute),
                    );
                }
            }
        }
    }
}

/// Which lifecycle operations a kind supports beyond create and read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub update: bool,
    pub delete: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            update: true,
            delete: true,
        }
    }
}

/// Full description of one resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSchema {
    pub kind: &'static str,
    /// Human name used in messages ("disk", "image").
    pub noun: &'static str,
    pub attributes: Vec<Attribute>,
    pub constraints: Vec<Constraint>,
    pub capabilities: Capabilities,
    /// Operations that accept a `timeouts` override.
    pub timeouts: Vec<Operation>,
}

impl ResourceSchema {
    pub fn new(kind: &'static str, noun: &'static str) -> Self {
        Self {
            kind,
            noun,
            attributes: Vec::new(),
            constraints: Vec::new(),
            capabilities: Capabilities::default(),
            timeouts: Vec::new(),
        }
    }

    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn without_update(mut self) -> Self {
        self.capabilities.update = false;
        self
    }

    pub fn without_delete(mut self) -> Self {
        self.capabilities.delete = false;
        self
    }

    pub fn timeouts(mut self, ops: &[Operation]) -> Self {
        self.timeouts = ops.to_vec();
        self
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Check the definition itself for mistakes.
    pub fn check_definition(&self) -> Result<(), SchemaError> {
        let kind = self.kind.to_string();
        let mut seen = HashSet::new();
        for attr in &self.attributes {
            if attr.name == TIMEOUTS {
                return Err(SchemaError::ReservedAttribute {
                    kind,
                    name: attr.name.to_string(),
                });
            }
            if !seen.insert(attr.name) {
                return Err(SchemaError::DuplicateAttribute {
                    kind,
                    name: attr.name.to_string(),
                });
            }
        }

        for constraint in &self.constraints {
            if let Constraint::ExactlyOneOf(names) = constraint
                && names.len() < 2
            {
                return Err(SchemaError::DegenerateGroup { kind });
            }
            for name in constraint.referenced() {
                match self.get(name) {
                    None => {
                        return Err(SchemaError::UnknownAttribute {
                            kind,
                            constraint: constraint.label(),
                            name: name.to_string(),
                        });
                    }
                    Some(attr) if attr.is_computed() => {
                        return Err(SchemaError::ComputedInConstraint {
                            kind,
                            constraint: constraint.label(),
                            name: name.to_string(),
                        });
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    /// Validate a desired configuration.
    pub fn validate(&self, attrs: &Attributes) -> Diagnostics {
        let mut diags = Diagnostics::new();

        for name in attrs.names() {
            if name == TIMEOUTS {
                continue;
            }
            match self.get(name) {
                None => diags.push(
                    Diagnostic::error(
                        "Unsupported argument",
                        format!("An argument named \"{}\" is not expected here.", name),
                    )
                    .at(name),
                ),
                Some(attr) if attr.is_computed() => diags.push(
                    Diagnostic::error(
                        "Invalid configuration",
                        format!(
                            "\"{}\" is assigned by the control plane and cannot be configured",
                            name
                        ),
                    )
                    .at(name),
                ),
                Some(_) => {}
            }
        }

        for attr in &self.attributes {
            match attrs.get(attr.name) {
                None if attr.presence == Presence::Required => diags.push(
                    Diagnostic::error(
                        "Missing required argument",
                        format!(
                            "The argument \"{}\" is required, but no definition was found.",
                            attr.name
                        ),
                    )
                    .at(attr.name),
                ),
                Some(v) if !attr.is_computed() && !attr.ty.matches(v) => diags.push(
                    Diagnostic::error(
                        "Incorrect attribute value type",
                        format!(
                            "Inappropriate value for attribute \"{}\": {} required.",
                            attr.name,
                            attr.ty.describe()
                        ),
                    )
                    .at(attr.name),
                ),
                _ => {}
            }
        }

        for constraint in &self.constraints {
            constraint.check(attrs, &mut diags);
        }

        if let Err(errors) = Timeouts::parse(attrs, &self.timeouts) {
            diags.extend(errors);
        }

        diags
    }

    /// Immutable attributes whose desired value differs from the recorded one.
    pub fn requires_replace(&self, desired: &Attributes, prior: &Attributes) -> Vec<&'static str> {
        self.attributes
            .iter()
            .filter(|a| a.mutability == Mutability::Immutable)
            .filter(|a| desired.get(a.name) != prior.get(a.name))
            .map(|a| a.name)
            .collect()
    }

    /// Mutable attributes whose desired value differs from the recorded one.
    pub fn changed_mutable(&self, desired: &Attributes, prior: &Attributes) -> Attributes {
        let mut changes = Attributes::new();
        for attr in self
            .attributes
            .iter()
            .filter(|a| a.mutability == Mutability::Mutable)
        {
            if desired.get(attr.name) != prior.get(attr.name) {
                changes.set_opt(attr.name, desired.get(attr.name).cloned());
            }
        }
        changes
    }
}
