//! Remote client boundary.
//!
//! The reconciler talks to a remote resource-management API only through
//! [`RemoteClient`]. Implementations map API-specific shapes into
//! [`FieldMap`]s and API errors into [`RemoteError`].

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::schema::FieldMap;
use crate::tags::{TagDelta, Tags};

/// A remote object as returned by a point lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Identifier of the object.
    pub identifier: String,
    /// Fields reported by the API, keyed by remote field name.
    pub fields: FieldMap,
}

/// Response to a create call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOutput {
    /// Identifier assigned by the API, if the response carried one.
    pub identifier: Option<String>,
    /// Fields reported in the create response.
    pub fields: FieldMap,
}

/// Response to an update call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOutput {
    /// Identifier of the asynchronous operation, if the API returned one.
    pub operation_id: Option<String>,
}

/// Operations against a remote resource-management API.
///
/// `Ok(None)` from [`create`](Self::create) or [`get`](Self::get) means the
/// API succeeded but returned no payload.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Creates a remote object. The token makes retries of the same request idempotent.
    async fn create(
        &self,
        request: &FieldMap,
        idempotency_token: &str,
    ) -> Result<Option<CreateOutput>, RemoteError>;

    /// Fetches a remote object by identifier.
    async fn get(&self, id: &str) -> Result<Option<RemoteObject>, RemoteError>;

    /// Applies changed fields to a remote object.
    async fn update(&self, id: &str, changes: &FieldMap) -> Result<UpdateOutput, RemoteError>;

    /// Deletes a remote object.
    async fn delete(&self, id: &str) -> Result<(), RemoteError>;

    /// Lists the tags attached to a remote object.
    async fn list_tags(&self, id: &str) -> Result<Tags, RemoteError>;

    /// Adds, changes and removes tags on a remote object.
    async fn update_tags(&self, id: &str, delta: &TagDelta) -> Result<(), RemoteError>;
}

impl RemoteObject {
    /// Creates a remote object.
    #[must_use]
    pub fn new(identifier: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            identifier: identifier.into(),
            fields,
        }
    }

    /// Returns a string field, if present.
    #[must_use]
    pub fn string(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }
}
