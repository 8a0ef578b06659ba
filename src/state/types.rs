//! Persisted resource records.
//!
//! A [`ProviderState`] holds one [`ResourceRecord`] per resource address,
//! each carrying the remote identifier, lifecycle, desired fields, the last
//! applied snapshot and the last observed fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::schema::{FieldMap, FieldValue};

use super::desired::DesiredState;

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Maximum number of history entries kept.
pub const MAX_HISTORY: usize = 100;

/// Engine lifecycle of one resource instance.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// No remote object has been created.
    #[default]
    Absent,
    /// Create issued, waiting for the object to become active.
    Creating,
    /// The object exists and has converged.
    Active,
    /// Update issued, waiting for convergence.
    Updating,
    /// Delete issued, waiting for the object to disappear.
    Deleting,
    /// The object is gone.
    Destroyed,
}

/// The complete provider state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderState {
    /// State format version.
    pub version: String,
    /// Resource records by address.
    pub resources: BTreeMap<String, ResourceRecord>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Operation history (recent entries).
    #[serde(default)]
    pub history: Vec<OperationHistoryEntry>,
}

/// State of a single resource instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceRecord {
    /// Resource address.
    pub address: String,
    /// Resource type name.
    pub resource_type: String,
    /// Remote identifier.
    #[serde(default)]
    pub id: Option<String>,
    /// Engine lifecycle.
    #[serde(default)]
    pub lifecycle: Lifecycle,
    /// Desired fields.
    #[serde(default)]
    pub desired: FieldMap,
    /// Desired fields as of the last successful create or update.
    #[serde(default)]
    pub applied: FieldMap,
    /// Fields from the last read.
    #[serde(default)]
    pub observed: FieldMap,
    /// Client token of a create whose call did not return an identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_create: Option<PendingCreate>,
    /// Set between create and the first successful read; never persisted.
    #[serde(skip)]
    pub newly_created: bool,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

/// A create request sent without a confirmed identifier.
///
/// Retrying the same request reuses the token, so the remote side can
/// recognise the retry. Any other create gets a fresh token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingCreate {
    /// Client token sent with the create call.
    pub token: String,
    /// Hash of the create request the token was sent with.
    pub request_hash: String,
}

/// A single entry in the operation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationHistoryEntry {
    /// When the operation ran.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: StateOperation,
    /// Resource address.
    pub address: String,
    /// Remote identifier at the end of the operation.
    #[serde(default)]
    pub id: Option<String>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Optional error message.
    #[serde(default)]
    pub error: Option<String>,
}

/// Types of state-changing operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StateOperation {
    /// Initial creation.
    Create,
    /// In-place update.
    Update,
    /// Delete followed by create.
    Replace,
    /// Read-only refresh.
    Refresh,
    /// Adoption of an existing remote object.
    Import,
    /// Destruction.
    Destroy,
}

impl Default for ProviderState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderState {
    /// Creates a new empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            resources: BTreeMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Gets a resource by address.
    #[must_use]
    pub fn get(&self, address: &str) -> Option<&ResourceRecord> {
        self.resources.get(address)
    }

    /// Adds or replaces a resource record.
    pub fn set(&mut self, record: ResourceRecord) {
        self.resources.insert(record.address.clone(), record);
        self.last_updated = Utc::now();
    }

    /// Removes a resource by address.
    pub fn remove(&mut self, address: &str) -> Option<ResourceRecord> {
        let result = self.resources.remove(address);
        if result.is_some() {
            self.last_updated = Utc::now();
        }
        result
    }

    /// Adds a history entry, dropping the oldest past [`MAX_HISTORY`].
    pub fn add_history(&mut self, entry: OperationHistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }

    /// Returns all resource addresses.
    #[must_use]
    pub fn addresses(&self) -> Vec<&str> {
        self.resources.keys().map(String::as_str).collect()
    }
}

impl ResourceRecord {
    /// Creates a record with no remote object yet.
    #[must_use]
    pub fn new(address: &str, resource_type: &str, desired: FieldMap) -> Self {
        let now = Utc::now();
        Self {
            address: address.to_string(),
            resource_type: resource_type.to_string(),
            id: None,
            lifecycle: Lifecycle::Absent,
            desired,
            applied: FieldMap::new(),
            observed: FieldMap::new(),
            pending_create: None,
            newly_created: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces the desired fields.
    pub fn set_desired(&mut self, desired: FieldMap) {
        self.desired = desired;
        self.updated_at = Utc::now();
    }

    /// Returns true if the record refers to a live remote object.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.id.is_some() && matches!(self.lifecycle, Lifecycle::Active | Lifecycle::Updating)
    }

    /// Returns the names of desired fields that differ from the applied snapshot.
    #[must_use]
    pub fn changed_fields(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .desired
            .keys()
            .chain(self.applied.keys())
            .map(String::as_str)
            .filter(|name| self.has_change(name))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

impl DesiredState for ResourceRecord {
    fn address(&self) -> &str {
        &self.address
    }

    fn get(&self, field: &str) -> Option<&FieldValue> {
        self.desired.get(field)
    }

    fn set(&mut self, field: &str, value: FieldValue) {
        self.desired.insert(field.to_string(), value);
        self.updated_at = Utc::now();
    }

    fn desired(&self) -> &FieldMap {
        &self.desired
    }

    fn has_change(&self, field: &str) -> bool {
        // An absent map and an empty map are the same desired state.
        let normalize = |v: Option<&FieldValue>| v.filter(|v| !v.is_empty()).cloned();
        normalize(self.desired.get(field)) != normalize(self.applied.get(field))
    }

    fn identifier(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_identifier(&mut self, id: &str) {
        self.id = Some(id.to_string());
        self.updated_at = Utc::now();
    }

    fn is_newly_created(&self) -> bool {
        self.newly_created
    }

    fn mark_newly_created(&mut self, newly_created: bool) {
        self.newly_created = newly_created;
    }

    fn pending_create(&self) -> Option<&PendingCreate> {
        self.pending_create.as_ref()
    }

    fn set_pending_create(&mut self, pending: Option<PendingCreate>) {
        self.pending_create = pending;
        self.updated_at = Utc::now();
    }

    fn observed(&self) -> &FieldMap {
        &self.observed
    }

    fn replace_observed(&mut self, observed: FieldMap) {
        self.observed = observed;
        self.updated_at = Utc::now();
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = lifecycle;
        self.updated_at = Utc::now();
    }

    fn mark_applied(&mut self) {
        self.applied = self.desired.clone();
        self.updated_at = Utc::now();
    }

    fn clear(&mut self) {
        self.id = None;
        self.observed.clear();
        self.applied.clear();
        self.pending_create = None;
        self.newly_created = false;
        self.lifecycle = Lifecycle::Destroyed;
        self.updated_at = Utc::now();
    }
}

impl OperationHistoryEntry {
    /// Creates a successful history entry.
    #[must_use]
    pub fn new(operation: StateOperation, address: &str, id: Option<&str>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            address: address.to_string(),
            id: id.map(str::to_string),
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(operation: StateOperation, address: &str, id: Option<&str>, error: &str) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Self::new(operation, address, id)
        }
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lifecycle = match self {
            Self::Absent => "absent",
            Self::Creating => "creating",
            Self::Active => "active",
            Self::Updating => "updating",
            Self::Deleting => "deleting",
            Self::Destroyed => "destroyed",
        };
        write!(f, "{lifecycle}")
    }
}

impl std::fmt::Display for StateOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Refresh => "refresh",
            Self::Import => "import",
            Self::Destroy => "destroy",
        };
        write!(f, "{op}")
    }
}
