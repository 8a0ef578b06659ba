//! Planning and drift detection.
//!
//! Compares desired fields with the last applied snapshot to choose the
//! next reconcile action, and with observed fields to report drift.

mod diff;

pub use diff::{tracked_changes, DiffEngine, DiffType, DriftReport, FieldDiff, ResourceDiff};
