//! Desired-state boundary seen by the reconciler.

use crate::schema::{FieldMap, FieldValue};

use super::types::{Lifecycle, PendingCreate};

/// Per-resource desired and observed state.
///
/// The reconciler reads desired values and writes identifier, lifecycle and
/// observed values through this trait only. Implementations decide where the
/// data lives.
pub trait DesiredState: Send {
    /// Stable address of the resource instance, e.g. `assoc.main`.
    fn address(&self) -> &str;

    /// Returns a desired field.
    fn get(&self, field: &str) -> Option<&FieldValue>;

    /// Sets a desired field.
    fn set(&mut self, field: &str, value: FieldValue);

    /// All desired fields.
    fn desired(&self) -> &FieldMap;

    /// Returns true if a desired field differs from what was last applied.
    fn has_change(&self, field: &str) -> bool;

    /// Remote identifier, once assigned.
    fn identifier(&self) -> Option<&str>;

    /// Records the remote identifier.
    fn set_identifier(&mut self, id: &str);

    /// Returns true between create and the first successful read.
    fn is_newly_created(&self) -> bool;

    /// Sets or clears the newly-created flag.
    fn mark_newly_created(&mut self, newly_created: bool);

    /// Create request whose client token may be reused by a retry.
    fn pending_create(&self) -> Option<&PendingCreate>;

    /// Records or forgets the pending create request.
    fn set_pending_create(&mut self, pending: Option<PendingCreate>);

    /// Last observed fields.
    fn observed(&self) -> &FieldMap;

    /// Replaces observed fields wholesale.
    fn replace_observed(&mut self, observed: FieldMap);

    /// Current lifecycle.
    fn lifecycle(&self) -> Lifecycle;

    /// Moves to a new lifecycle.
    fn set_lifecycle(&mut self, lifecycle: Lifecycle);

    /// Snapshots the desired fields as applied.
    fn mark_applied(&mut self);

    /// Forgets the remote object: no identifier, nothing observed, no pending
    /// create, destroyed.
    fn clear(&mut self);
}
