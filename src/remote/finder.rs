//! Point lookups with a normalized not-found contract.

use tracing::trace;

use crate::error::{LookupRequest, ProviderError, RemoteError, Result};

use super::client::{RemoteClient, RemoteObject};

/// Wraps a single get-by-identifier call.
#[derive(Debug)]
pub struct Finder<'a, C: RemoteClient + ?Sized> {
    client: &'a C,
    resource_type: &'a str,
}

impl<'a, C: RemoteClient + ?Sized> Finder<'a, C> {
    /// Creates a finder for one resource type.
    #[must_use]
    pub const fn new(client: &'a C, resource_type: &'a str) -> Self {
        Self {
            client,
            resource_type,
        }
    }

    /// Looks up a remote object.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] when the API reports the object
    /// absent, [`ProviderError::EmptyResult`] when the call succeeded without
    /// a payload, and any other remote error unchanged.
    pub async fn find(&self, id: &str) -> Result<RemoteObject> {
        trace!("Looking up {} {id}", self.resource_type);

        match self.client.get(id).await {
            Ok(Some(object)) => Ok(object),
            Ok(None) => Err(ProviderError::EmptyResult {
                request: LookupRequest::new(self.resource_type, id),
            }),
            Err(cause @ RemoteError::ResourceNotFound { .. }) => Err(ProviderError::NotFound {
                request: LookupRequest::new(self.resource_type, id),
                cause,
            }),
            Err(other) => Err(ProviderError::Remote(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockRemoteClient;
    use crate::schema::FieldMap;

    #[tokio::test]
    async fn test_find_returns_object() {
        let mut client = MockRemoteClient::new();
        client
            .expect_get()
            .returning(|id| Ok(Some(RemoteObject::new(id, FieldMap::new()))));

        let object = Finder::new(&client, "assoc")
            .find("arn:1")
            .await
            .expect("object exists");
        assert_eq!(object.identifier, "arn:1");
    }

    #[tokio::test]
    async fn test_not_found_carries_request_and_cause() {
        let mut client = MockRemoteClient::new();
        client
            .expect_get()
            .returning(|_| Err(RemoteError::not_found("no such association")));

        let err = Finder::new(&client, "assoc")
            .find("arn:1")
            .await
            .expect_err("absent");

        match err {
            ProviderError::NotFound { request, cause } => {
                assert_eq!(request.identifier, "arn:1");
                assert_eq!(request.resource_type, "assoc");
                assert!(cause.is_not_found());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_payload_is_distinct_from_not_found() {
        let mut client = MockRemoteClient::new();
        client.expect_get().returning(|_| Ok(None));

        let err = Finder::new(&client, "assoc")
            .find("arn:1")
            .await
            .expect_err("empty");

        assert!(matches!(err, ProviderError::EmptyResult { .. }));
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_other_errors_propagate_unchanged() {
        let mut client = MockRemoteClient::new();
        client
            .expect_get()
            .returning(|_| Err(RemoteError::network("connection reset")));

        let err = Finder::new(&client, "assoc")
            .find("arn:1")
            .await
            .expect_err("transport failure");

        assert!(matches!(err, ProviderError::Remote(RemoteError::Network { .. })));
        assert!(err.is_retryable());
    }
}
