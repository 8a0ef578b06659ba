//! Status probes derive a lifecycle status label from a lookup.

use async_trait::async_trait;

use crate::error::Result;

use super::client::{RemoteClient, RemoteObject};
use super::finder::Finder;

/// Where a status label comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSource {
    /// Read from a string field on the remote object.
    ApiField(&'static str),
    /// A fixed label implied by the preceding call having succeeded.
    ///
    /// Used when the API exposes no status; the lookup still confirms the
    /// object exists.
    SyntheticAfterCall(&'static str),
}

/// Result of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// The object does not exist.
    Absent,
    /// The object exists with the given status.
    Present {
        /// The object as fetched.
        object: RemoteObject,
        /// Its status label.
        status: String,
    },
}

/// Anything the wait engine can poll.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    /// Probes the current status of an object.
    ///
    /// Absence is a normal result, not an error.
    async fn probe(&self, id: &str) -> Result<ProbeResult>;
}

/// Status probe backed by a [`Finder`].
#[derive(Debug)]
pub struct RemoteProbe<'a, C: RemoteClient + ?Sized> {
    finder: Finder<'a, C>,
    source: StatusSource,
}

impl<'a, C: RemoteClient + ?Sized> RemoteProbe<'a, C> {
    /// Creates a probe.
    #[must_use]
    pub const fn new(finder: Finder<'a, C>, source: StatusSource) -> Self {
        Self { finder, source }
    }
}

impl StatusSource {
    /// Extracts the status label from an object.
    #[must_use]
    pub fn status_of(&self, object: &RemoteObject) -> String {
        match self {
            Self::ApiField(field) => object.string(field).unwrap_or_default().to_string(),
            Self::SyntheticAfterCall(label) => (*label).to_string(),
        }
    }
}

#[async_trait]
impl<C: RemoteClient + ?Sized> StatusProbe for RemoteProbe<'_, C> {
    async fn probe(&self, id: &str) -> Result<ProbeResult> {
        match self.finder.find(id).await {
            Ok(object) => {
                let status = self.source.status_of(&object);
                Ok(ProbeResult::Present { object, status })
            }
            Err(err) if err.is_not_found() => Ok(ProbeResult::Absent),
            Err(err) => Err(err),
        }
    }
}
