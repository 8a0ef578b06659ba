//! VPC Lattice API client.
//!
//! Implements [`RemoteClient`] for service network service associations on
//! top of `aws-sdk-vpclattice`. The association ARN is the identifier.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_vpclattice::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_vpclattice::Client;
use tracing::debug;

use crate::error::RemoteError;
use crate::remote::{CreateOutput, RemoteClient, RemoteObject, UpdateOutput};
use crate::schema::{FieldMap, FieldValue, TAGS_FIELD};
use crate::tags::{TagDelta, Tags};

/// API error codes meaning the resource does not exist.
const NOT_FOUND_CODES: &[&str] = &["ResourceNotFoundException"];

/// API error codes meaning the request conflicts with the resource's state.
const CONFLICT_CODES: &[&str] = &["ConflictException"];

/// API error codes for rate limiting.
const THROTTLING_CODES: &[&str] = &["ThrottlingException", "TooManyRequestsException"];

/// VPC Lattice client for service network service associations.
#[derive(Debug, Clone)]
pub struct LatticeClient {
    client: Client,
}

impl LatticeClient {
    /// Wraps an SDK client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Loads AWS configuration from the environment.
    ///
    /// Credentials come from the SDK's default provider chain. `region`
    /// overrides the region found in the environment.
    pub async fn from_env(region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let config = loader.load().await;
        Self::new(Client::new(&config))
    }
}

#[async_trait]
impl RemoteClient for LatticeClient {
    async fn create(
        &self,
        request: &FieldMap,
        idempotency_token: &str,
    ) -> Result<Option<CreateOutput>, RemoteError> {
        debug!("CreateServiceNetworkServiceAssociation (token {idempotency_token})");

        let tags = request
            .get(TAGS_FIELD)
            .and_then(FieldValue::as_map)
            .filter(|tags| !tags.is_empty())
            .map(to_sdk_tags);

        let out = self
            .client
            .create_service_network_service_association()
            .client_token(idempotency_token)
            .set_service_identifier(string_field(request, "service_identifier"))
            .set_service_network_identifier(string_field(request, "service_network_identifier"))
            .set_tags(tags)
            .send()
            .await
            .map_err(|e| classify(&e))?;

        let mut fields = FieldMap::new();
        insert(&mut fields, "id", out.id());
        insert(&mut fields, "arn", out.arn());
        insert(&mut fields, "status", out.status().map(|s| s.as_str()));
        insert(&mut fields, "created_by", out.created_by());
        insert(&mut fields, "custom_domain_name", out.custom_domain_name());

        Ok(Some(CreateOutput {
            identifier: out.arn().map(str::to_string),
            fields,
        }))
    }

    async fn get(&self, id: &str) -> Result<Option<RemoteObject>, RemoteError> {
        debug!("GetServiceNetworkServiceAssociation {id}");

        let out = self
            .client
            .get_service_network_service_association()
            .service_network_service_association_identifier(id)
            .send()
            .await
            .map_err(|e| classify(&e))?;

        let mut fields = FieldMap::new();
        insert(&mut fields, "id", out.id());
        insert(&mut fields, "arn", out.arn());
        insert(&mut fields, "status", out.status().map(|s| s.as_str()));
        insert(&mut fields, "service_id", out.service_id());
        insert(&mut fields, "service_arn", out.service_arn());
        insert(&mut fields, "service_name", out.service_name());
        insert(&mut fields, "service_network_id", out.service_network_id());
        insert(&mut fields, "service_network_arn", out.service_network_arn());
        insert(&mut fields, "service_network_name", out.service_network_name());
        insert(&mut fields, "created_by", out.created_by());
        insert(&mut fields, "custom_domain_name", out.custom_domain_name());
        insert(&mut fields, "failure_message", out.failure_message());

        Ok(Some(RemoteObject::new(id, fields)))
    }

    async fn update(&self, _id: &str, _changes: &FieldMap) -> Result<UpdateOutput, RemoteError> {
        Err(RemoteError::Unsupported {
            operation: String::from("UpdateServiceNetworkServiceAssociation"),
        })
    }

    async fn delete(&self, id: &str) -> Result<(), RemoteError> {
        debug!("DeleteServiceNetworkServiceAssociation {id}");

        self.client
            .delete_service_network_service_association()
            .service_network_service_association_identifier(id)
            .send()
            .await
            .map_err(|e| classify(&e))?;

        Ok(())
    }

    async fn list_tags(&self, id: &str) -> Result<Tags, RemoteError> {
        let out = self
            .client
            .list_tags_for_resource()
            .resource_arn(id)
            .send()
            .await
            .map_err(|e| classify(&e))?;

        Ok(out
            .tags()
            .map(|tags| tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn update_tags(&self, id: &str, delta: &TagDelta) -> Result<(), RemoteError> {
        if !delta.remove.is_empty() {
            debug!("UntagResource {id}: {} keys", delta.remove.len());
            self.client
                .untag_resource()
                .resource_arn(id)
                .set_tag_keys(Some(delta.remove.iter().cloned().collect()))
                .send()
                .await
                .map_err(|e| classify(&e))?;
        }

        if !delta.upsert.is_empty() {
            debug!("TagResource {id}: {} tags", delta.upsert.len());
            self.client
                .tag_resource()
                .resource_arn(id)
                .set_tags(Some(to_sdk_tags(&delta.upsert)))
                .send()
                .await
                .map_err(|e| classify(&e))?;
        }

        Ok(())
    }
}

fn string_field(fields: &FieldMap, name: &str) -> Option<String> {
    fields.get(name).and_then(FieldValue::as_str).map(str::to_string)
}

fn insert(fields: &mut FieldMap, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        fields.insert(name.to_string(), FieldValue::from(value));
    }
}

fn to_sdk_tags(tags: &Tags) -> HashMap<String, String> {
    tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

/// Maps an SDK error onto [`RemoteError`].
fn classify<E, R>(err: &SdkError<E, R>) -> RemoteError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            RemoteError::network(DisplayErrorContext(err).to_string())
        }
        _ => match err.code() {
            Some(code) => classify_code(
                code,
                err.message()
                    .map_or_else(|| DisplayErrorContext(err).to_string(), str::to_string),
            ),
            None => RemoteError::InvalidResponse {
                message: DisplayErrorContext(err).to_string(),
            },
        },
    }
}

/// Maps an API error code onto [`RemoteError`].
fn classify_code(code: &str, message: String) -> RemoteError {
    match code {
        c if NOT_FOUND_CODES.contains(&c) => RemoteError::ResourceNotFound { message },
        c if CONFLICT_CODES.contains(&c) => RemoteError::Conflict { message },
        c if THROTTLING_CODES.contains(&c) => RemoteError::Throttled {
            message,
            retry_after_secs: None,
        },
        _ => RemoteError::api_error(code, message),
    }
}
