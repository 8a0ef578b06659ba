//! Resource schemas and descriptors.
//!
//! A resource is described as data: a table of [`FieldDescriptor`]s plus the
//! request/response mapping functions and wait specifications in a
//! [`ResourceDescriptor`]. One generic reconciler consumes any descriptor.

mod descriptor;
mod field;
mod value;

pub use descriptor::{
    expand_settable, flatten_by_remote_name, ExpandFn, FlattenFn, ResourceDescriptor,
    ResourceSchema, TAGS_ALL_FIELD, TAGS_FIELD,
};
pub use field::{FieldDefault, FieldDescriptor, Presence};
pub use value::{FieldKind, FieldMap, FieldValue};
