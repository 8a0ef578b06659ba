//! Error types for the lattice reconciliation engine.
//!
//! This module provides the error hierarchy for every stage of a resource
//! lifecycle: configuration, remote API calls, status polling, state
//! persistence and the reconciler state machine.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The main error type for the reconciliation engine.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The remote object does not exist.
    ///
    /// Produced by the finder from a remote not-found signal. Carries the
    /// lookup that was attempted and the remote error that reported it.
    #[error("{request} not found: {cause}")]
    NotFound {
        /// The lookup that found nothing.
        request: LookupRequest,
        /// The remote error that signalled absence.
        #[source]
        cause: RemoteError,
    },

    /// The remote API succeeded but returned no payload.
    #[error("empty result from {request}")]
    EmptyResult {
        /// The call that returned nothing.
        request: LookupRequest,
    },

    /// Remote API errors.
    #[error("Remote API error: {0}")]
    Remote(#[from] RemoteError),

    /// Status polling errors.
    #[error("Wait error: {0}")]
    Wait(#[from] WaitError),

    /// Configuration and desired-state validation errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State persistence errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Reconciler state machine errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// An operation failed; wraps the cause with the action and resource.
    #[error("{action} {resource_type} ({id}): {source}")]
    Operation {
        /// Action that was in progress.
        action: Action,
        /// Resource type name.
        resource_type: String,
        /// Resource identifier, or address when no identifier is assigned yet.
        id: String,
        /// Underlying cause.
        #[source]
        source: Box<ProviderError>,
    },

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Describes a remote call, used for error context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    /// Resource type name.
    pub resource_type: String,
    /// Identifier that was requested.
    pub identifier: String,
}

/// Lifecycle actions, used for error context and history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Creating a resource.
    Creating,
    /// Reading a resource.
    Reading,
    /// Updating a resource.
    Updating,
    /// Deleting a resource.
    Deleting,
    /// Importing a resource.
    Importing,
    /// Waiting for creation to converge.
    WaitingForCreation,
    /// Waiting for an update to converge.
    WaitingForUpdate,
    /// Waiting for deletion to converge.
    WaitingForDeletion,
    /// Listing tags of a resource.
    ListingTags,
    /// Updating tags of a resource.
    UpdatingTags,
}

/// Errors returned by a remote resource-management API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The API reported that the resource does not exist.
    #[error("resource not found: {message}")]
    ResourceNotFound {
        /// Message from the API.
        message: String,
    },

    /// The request conflicts with the current state of the resource.
    #[error("conflict: {message}")]
    Conflict {
        /// Message from the API.
        message: String,
    },

    /// The API throttled the request.
    #[error("throttled: {message}")]
    Throttled {
        /// Message from the API.
        message: String,
        /// Suggested delay before retrying, if the API provided one.
        retry_after_secs: Option<u64>,
    },

    /// Transport-level failure.
    #[error("network error: {message}")]
    Network {
        /// Description of the failure.
        message: String,
    },

    /// The API rejected the request.
    #[error("request failed ({code}): {message}")]
    ApiRequestFailed {
        /// Error code reported by the API.
        code: String,
        /// Message from the API.
        message: String,
    },

    /// The API response could not be interpreted.
    #[error("invalid response: {message}")]
    InvalidResponse {
        /// Description of the problem.
        message: String,
    },

    /// The remote API has no such operation for this resource.
    #[error("operation not supported: {operation}")]
    Unsupported {
        /// Name of the unsupported operation.
        operation: String,
    },
}

/// Errors from the status poller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WaitError {
    /// The deadline passed before the target status was reached.
    #[error(
        "timeout after {elapsed:?} waiting for {id} to reach {target:?} (last status: {})",
        .last_status.as_deref().unwrap_or("unknown")
    )]
    Timeout {
        /// Resource identifier.
        id: String,
        /// Target statuses.
        target: Vec<String>,
        /// Last status observed, if any probe succeeded.
        last_status: Option<String>,
        /// Time spent waiting.
        elapsed: Duration,
    },

    /// The remote object reported a status outside the expected sets.
    #[error("unexpected state '{status}' for {id}, wanted target {target:?}")]
    UnexpectedState {
        /// Resource identifier.
        id: String,
        /// The status that was observed.
        status: String,
        /// Target statuses.
        target: Vec<String>,
    },

    /// The object stayed absent for more probes than tolerated.
    #[error("{id} not found after {checks} consecutive checks")]
    NotFoundAfterChecks {
        /// Resource identifier.
        id: String,
        /// Number of consecutive absent probes.
        checks: u32,
    },

    /// The wait was cancelled externally.
    #[error("wait for {id} cancelled")]
    Cancelled {
        /// Resource identifier.
        id: String,
    },
}

/// Configuration and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing or malformed.
    #[error("Invalid environment variable {name}: {message}")]
    InvalidEnvVar {
        /// Name of the variable.
        name: String,
        /// Description of the problem.
        message: String,
    },
}

/// State persistence errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// Filesystem error in a state backend.
    #[error("State I/O error: {message}")]
    Io {
        /// Description of the I/O error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Reconciler state machine errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The requested action is not allowed in the current lifecycle state.
    #[error("cannot {action} {address}: resource is {state}")]
    InvalidTransition {
        /// Action requested.
        action: Action,
        /// Resource address.
        address: String,
        /// Current lifecycle state.
        state: String,
    },

    /// Fields that cannot be updated in place have changed.
    #[error("{address} requires replacement, changed fields: {}", .fields.join(", "))]
    RequiresReplacement {
        /// Resource address.
        address: String,
        /// The force-new fields that changed.
        fields: Vec<String>,
    },

    /// No resource record exists at the address.
    #[error("no resource at address {address}")]
    UnknownResource {
        /// Resource address.
        address: String,
    },
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Wraps this error with the action, resource type and identifier.
    #[must_use]
    pub fn context(self, action: Action, resource_type: &str, id: &str) -> Self {
        Self::Operation {
            action,
            resource_type: resource_type.to_string(),
            id: id.to_string(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping operation context.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns true if this error means the remote object is absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.root(),
            Self::NotFound { .. } | Self::Remote(RemoteError::ResourceNotFound { .. })
        )
    }

    /// Returns true if a wait ended on a status outside its pending and target sets.
    #[must_use]
    pub fn is_unexpected_state(&self) -> bool {
        matches!(self.root(), Self::Wait(WaitError::UnexpectedState { .. }))
    }

    /// Returns true if this error is transient and the whole step may be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root(),
            Self::Remote(RemoteError::Throttled { .. } | RemoteError::Network { .. })
        )
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub fn retry_delay_secs(&self) -> Option<u64> {
        match self.root() {
            Self::Remote(RemoteError::Throttled {
                retry_after_secs, ..
            }) => Some(retry_after_secs.unwrap_or(5)),
            Self::Remote(RemoteError::Network { .. }) => Some(5),
            _ => None,
        }
    }
}

impl LookupRequest {
    /// Creates a lookup description.
    #[must_use]
    pub fn new(resource_type: &str, identifier: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            identifier: identifier.to_string(),
        }
    }
}

impl fmt::Display for LookupRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.resource_type, self.identifier)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self {
            Self::Creating => "creating",
            Self::Reading => "reading",
            Self::Updating => "updating",
            Self::Deleting => "deleting",
            Self::Importing => "importing",
            Self::WaitingForCreation => "waiting for creation of",
            Self::WaitingForUpdate => "waiting for update of",
            Self::WaitingForDeletion => "waiting for deletion of",
            Self::ListingTags => "listing tags of",
            Self::UpdatingTags => "updating tags of",
        };
        write!(f, "{action}")
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl StateError {
    /// Creates an I/O error with the given message.
    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl RemoteError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::ResourceNotFound {
            message: message.into(),
        }
    }

    /// Returns true if the API reported the resource as absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ResourceNotFound { .. })
    }
}
