//! Field descriptors: one declarative row per resource attribute.

use super::value::{FieldKind, FieldValue};

/// Whether the caller, the remote API, or both supply a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Must be set by the caller.
    Required,
    /// May be set by the caller.
    Optional,
    /// Set only by the remote API.
    Computed,
    /// May be set by the caller; otherwise filled in by the remote API.
    OptionalComputed,
}

/// Constant default for an optional field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    /// Boolean default.
    Bool(bool),
    /// Integer default.
    Int(i64),
    /// String default.
    Str(&'static str),
}

/// Declarative description of a single resource field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name as seen by the caller.
    pub name: &'static str,
    /// Value kind.
    pub kind: FieldKind,
    /// Who supplies the value.
    pub presence: Presence,
    /// Whether a change can be applied in place.
    pub updatable: bool,
    /// Whether a change requires replacing the remote object.
    pub force_new: bool,
    /// Default applied when the caller leaves the field unset.
    pub default: Option<FieldDefault>,
    /// Name of the field on the remote object, when it differs.
    pub remote_name: Option<&'static str>,
}

impl FieldDescriptor {
    const fn new(name: &'static str, kind: FieldKind, presence: Presence) -> Self {
        Self {
            name,
            kind,
            presence,
            updatable: false,
            force_new: false,
            default: None,
            remote_name: None,
        }
    }

    /// A field the caller must set.
    #[must_use]
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self::new(name, kind, Presence::Required)
    }

    /// A field the caller may set.
    #[must_use]
    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self::new(name, kind, Presence::Optional)
    }

    /// A field only the remote API sets.
    #[must_use]
    pub const fn computed(name: &'static str, kind: FieldKind) -> Self {
        Self::new(name, kind, Presence::Computed)
    }

    /// A field the caller may set, filled in remotely otherwise.
    #[must_use]
    pub const fn optional_computed(name: &'static str, kind: FieldKind) -> Self {
        Self::new(name, kind, Presence::OptionalComputed)
    }

    /// Marks the field as updatable in place.
    #[must_use]
    pub const fn updatable(mut self) -> Self {
        self.updatable = true;
        self.force_new = false;
        self
    }

    /// Marks the field as requiring replacement when it changes.
    #[must_use]
    pub const fn force_new(mut self) -> Self {
        self.force_new = true;
        self.updatable = false;
        self
    }

    /// Sets a default value.
    #[must_use]
    pub const fn with_default(mut self, default: FieldDefault) -> Self {
        self.default = Some(default);
        self
    }

    /// Sets the remote field name read by the default flatten mapping.
    #[must_use]
    pub const fn from_remote(mut self, remote_name: &'static str) -> Self {
        self.remote_name = Some(remote_name);
        self
    }

    /// Returns true if the caller may set this field.
    #[must_use]
    pub const fn is_settable(&self) -> bool {
        !matches!(self.presence, Presence::Computed)
    }

    /// Returns true if changes to this field are tracked for update or replacement.
    #[must_use]
    pub const fn is_tracked(&self) -> bool {
        self.is_settable() && (self.updatable || self.force_new)
    }

    /// Name of the field on the remote object.
    #[must_use]
    pub fn remote_field(&self) -> &'static str {
        self.remote_name.unwrap_or(self.name)
    }

    /// Returns the default as a value, if any.
    #[must_use]
    pub fn default_value(&self) -> Option<FieldValue> {
        self.default.map(|d| match d {
            FieldDefault::Bool(b) => FieldValue::Bool(b),
            FieldDefault::Int(i) => FieldValue::Int(i),
            FieldDefault::Str(s) => FieldValue::String(s.to_string()),
        })
    }
}
