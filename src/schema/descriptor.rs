//! Resource schemas and descriptors.

use tracing::debug;

use crate::error::ConfigError;
use crate::remote::RemoteObject;
use crate::wait::WaitSpec;

use super::field::{FieldDescriptor, Presence};
use super::value::{FieldKind, FieldMap};

/// Name of the caller-managed tags field.
pub const TAGS_FIELD: &str = "tags";

/// Name of the computed field holding every effective tag.
pub const TAGS_ALL_FIELD: &str = "tags_all";

/// Builds a remote request from desired fields.
pub type ExpandFn = fn(&ResourceSchema, &FieldMap) -> FieldMap;

/// Projects a remote object into caller fields, given the current desired fields.
pub type FlattenFn = fn(&ResourceSchema, &RemoteObject, &FieldMap) -> FieldMap;

/// Field table for one resource type.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSchema {
    /// Resource type name.
    pub type_name: &'static str,
    /// Field descriptors.
    pub fields: &'static [FieldDescriptor],
}

/// A resource expressed as data, consumed by the generic reconciler.
#[derive(Debug, Clone, Copy)]
pub struct ResourceDescriptor {
    /// Field table.
    pub schema: ResourceSchema,
    /// Builds the create request.
    pub expand_create: ExpandFn,
    /// Builds the update request from the changed fields only.
    pub expand_update: ExpandFn,
    /// Projects a remote object into observed fields.
    pub flatten: FlattenFn,
    /// Wait after create.
    pub create_wait: WaitSpec,
    /// Wait after update.
    pub update_wait: WaitSpec,
    /// Wait after delete.
    pub delete_wait: WaitSpec,
}

impl ResourceSchema {
    /// Creates a schema from a static field table.
    #[must_use]
    pub const fn new(type_name: &'static str, fields: &'static [FieldDescriptor]) -> Self {
        Self { type_name, fields }
    }

    /// Looks up a field descriptor by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns true if the resource carries caller-managed tags.
    #[must_use]
    pub fn has_tags(&self) -> bool {
        self.field(TAGS_FIELD)
            .is_some_and(|f| f.kind == FieldKind::Map && f.is_settable())
    }

    /// Returns true if the resource exposes the computed `tags_all` field.
    #[must_use]
    pub fn has_tags_all(&self) -> bool {
        self.field(TAGS_ALL_FIELD).is_some_and(|f| f.kind == FieldKind::Map)
    }

    /// Fields whose changes are tracked for update or replacement.
    pub fn tracked_fields(&self) -> impl Iterator<Item = &'static FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_tracked())
    }

    /// Fills unset fields that declare a default.
    pub fn apply_defaults(&self, desired: &mut FieldMap) {
        for field in self.fields.iter().filter(|f| f.is_settable()) {
            if desired.contains_key(field.name) {
                continue;
            }
            if let Some(value) = field.default_value() {
                debug!("Applying default for {}.{}", self.type_name, field.name);
                desired.insert(field.name.to_string(), value);
            }
        }
    }

    /// Validates desired fields against the table.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure: unknown field, computed field set
    /// by the caller, kind mismatch, or missing required field.
    pub fn validate(&self, desired: &FieldMap) -> Result<(), ConfigError> {
        for (name, value) in desired {
            let Some(field) = self.field(name) else {
                return Err(ConfigError::validation(
                    format!("unknown field for {}", self.type_name),
                    name.as_str(),
                ));
            };

            if !field.is_settable() {
                return Err(ConfigError::validation(
                    "field is computed and cannot be set",
                    name.as_str(),
                ));
            }

            if value.kind() != field.kind {
                return Err(ConfigError::validation(
                    format!("expected {}, found {}", field.kind, value.kind()),
                    name.as_str(),
                ));
            }
        }

        for field in self.fields.iter().filter(|f| f.presence == Presence::Required) {
            match desired.get(field.name) {
                Some(value) if !value.is_empty() => {}
                _ => {
                    return Err(ConfigError::validation("required field is missing", field.name));
                }
            }
        }

        Ok(())
    }

    /// Keeps only the fields the caller can set.
    #[must_use]
    pub fn caller_visible(&self, fields: &FieldMap) -> FieldMap {
        fields
            .iter()
            .filter(|(name, _)| self.field(name).is_some_and(FieldDescriptor::is_settable))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

/// Default create/update expansion: every settable field except tags.
#[must_use]
pub fn expand_settable(schema: &ResourceSchema, desired: &FieldMap) -> FieldMap {
    desired
        .iter()
        .filter(|(name, _)| name.as_str() != TAGS_FIELD)
        .filter(|(name, _)| schema.field(name).is_some_and(FieldDescriptor::is_settable))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Default flatten: copies each field from its remote name, skipping tags.
#[must_use]
pub fn flatten_by_remote_name(
    schema: &ResourceSchema,
    remote: &RemoteObject,
    _desired: &FieldMap,
) -> FieldMap {
    schema
        .fields
        .iter()
        .filter(|f| f.name != TAGS_FIELD && f.name != TAGS_ALL_FIELD)
        .filter_map(|f| {
            remote
                .fields
                .get(f.remote_field())
                .map(|value| (f.name.to_string(), value.clone()))
        })
        .collect()
}
