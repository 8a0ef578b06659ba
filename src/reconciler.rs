//! Reconciler for a single resource instance.
//!
//! Drives one resource through its lifecycle: translate desired fields into
//! remote calls, poll the remote status until it converges, and fold the
//! remote object back into observed fields. The reconciler is generic over
//! the remote client and works on any [`DesiredState`]; resource-specific
//! behaviour comes from the [`ResourceDescriptor`].

use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{RequestHasher, Timeouts};
use crate::error::{Action, LookupRequest, ProviderError, ReconcileError, Result};
use crate::planner::tracked_changes;
use crate::remote::{Finder, RemoteClient, RemoteObject, RemoteProbe};
use crate::schema::{
    FieldMap, FieldValue, ResourceDescriptor, ResourceSchema, TAGS_ALL_FIELD, TAGS_FIELD,
};
use crate::state::{DesiredState, Lifecycle, PendingCreate};
use crate::tags::{TagDelta, TagPolicy, Tags};
use crate::wait::{WaitSpec, Waiter};

/// Reconciler for one resource type.
pub struct Reconciler<'a, C: RemoteClient + ?Sized> {
    /// Resource description.
    descriptor: &'a ResourceDescriptor,
    /// Remote API client.
    client: &'a C,
    /// Default and ignored tags.
    tags: &'a TagPolicy,
    /// Per-phase timeouts.
    timeouts: Timeouts,
    /// Status poller.
    waiter: Waiter,
    /// Request hasher for matching retried creates.
    hasher: RequestHasher,
}

/// Result of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The object exists; carries the observed fields.
    Found(FieldMap),
    /// The object was deleted outside this engine and the record was cleared.
    Gone,
}

impl<'a, C: RemoteClient + ?Sized> Reconciler<'a, C> {
    /// Creates a new reconciler.
    #[must_use]
    pub const fn new(
        descriptor: &'a ResourceDescriptor,
        client: &'a C,
        tags: &'a TagPolicy,
        timeouts: Timeouts,
        waiter: Waiter,
    ) -> Self {
        Self {
            descriptor,
            client,
            tags,
            timeouts,
            waiter,
            hasher: RequestHasher::new(),
        }
    }

    const fn schema(&self) -> &ResourceSchema {
        &self.descriptor.schema
    }

    const fn type_name(&self) -> &'static str {
        self.descriptor.schema.type_name
    }

    /// Token for a create call.
    ///
    /// A retry of the request that last failed reuses its token. Any other
    /// create gets a fresh one, recorded before the call is made.
    fn client_token<S: DesiredState + ?Sized>(&self, state: &mut S, request: &FieldMap) -> String {
        let request_hash = self.hasher.hash_fields(request);
        let retried = state
            .pending_create()
            .filter(|pending| pending.request_hash == request_hash)
            .map(|pending| pending.token.clone());

        if let Some(token) = retried {
            debug!("Retrying create of {} with its earlier token", state.address());
            return token;
        }

        let token = Uuid::new_v4().to_string();
        state.set_pending_create(Some(PendingCreate {
            token: token.clone(),
            request_hash,
        }));
        token
    }

    /// Creates the remote object and waits for it to become active.
    ///
    /// On success the identifier is recorded, the lifecycle is `Active` and
    /// observed fields are populated. If the create call fails nothing is
    /// recorded. If the wait fails the identifier stays recorded with the
    /// lifecycle left at `Creating`.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any remote call, the create call's
    /// error, [`ProviderError::EmptyResult`] when the response carries no
    /// identifier, or the wait's error.
    pub async fn create<S: DesiredState + ?Sized>(&self, state: &mut S) -> Result<ReadOutcome> {
        let type_name = self.type_name();
        let address = state.address().to_string();

        if state.lifecycle() != Lifecycle::Absent || state.identifier().is_some() {
            return Err(self
                .invalid_transition(Action::Creating, &*state)
                .context(Action::Creating, type_name, &address));
        }

        let desired = self
            .prepare_desired(state)
            .map_err(|e| e.context(Action::Creating, type_name, &address))?;

        let mut request = (self.descriptor.expand_create)(self.schema(), &desired);
        if self.schema().has_tags() {
            let tags = self.tags.merge_for_write(&tags_in(&desired, TAGS_FIELD));
            if !tags.is_empty() {
                request.insert(TAGS_FIELD.to_string(), FieldValue::Map(tags));
            }
        }

        let token = self.client_token(state, &request);
        info!("Creating {type_name} {address}");

        let output = self
            .client
            .create(&request, &token)
            .await
            .map_err(|e| ProviderError::from(e).context(Action::Creating, type_name, &address))?;

        let id = output
            .and_then(|o| o.identifier)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                ProviderError::EmptyResult {
                    request: LookupRequest::new(type_name, &address),
                }
                .context(Action::Creating, type_name, &address)
            })?;

        state.set_pending_create(None);
        state.set_identifier(&id);
        state.mark_newly_created(true);
        state.set_lifecycle(Lifecycle::Creating);
        info!("Created {type_name} {id}, waiting for it to become active");

        self.wait(&id, &self.descriptor.create_wait, self.timeouts.create())
            .await
            .map_err(|e| e.context(Action::WaitingForCreation, type_name, &id))?;

        state.set_lifecycle(Lifecycle::Active);
        state.mark_applied();
        info!("{type_name} {id} is active");

        self.read(state).await
    }

    /// Refreshes observed fields from the remote object.
    ///
    /// If the object is gone and was not created in this same operation, the
    /// record is cleared and [`ReadOutcome::Gone`] is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource has no identifier or is destroyed,
    /// if a newly created object cannot be found, or if a remote call fails.
    pub async fn read<S: DesiredState + ?Sized>(&self, state: &mut S) -> Result<ReadOutcome> {
        let type_name = self.type_name();

        let id = match state.identifier() {
            Some(id) if state.lifecycle() != Lifecycle::Destroyed => id.to_string(),
            _ => {
                let address = state.address().to_string();
                return Err(self
                    .invalid_transition(Action::Reading, &*state)
                    .context(Action::Reading, type_name, &address));
            }
        };

        debug!("Reading {type_name} {id}");

        let remote = match Finder::new(self.client, type_name).find(&id).await {
            Ok(object) => object,
            Err(e) if e.is_not_found() && !state.is_newly_created() => {
                warn!("{type_name} {id} not found, removing from state");
                state.clear();
                return Ok(ReadOutcome::Gone);
            }
            Err(e) => return Err(e.context(Action::Reading, type_name, &id)),
        };

        let mut observed = (self.descriptor.flatten)(self.schema(), &remote, state.desired());

        if self.schema().has_tags() || self.schema().has_tags_all() {
            let remote_tags = self
                .client
                .list_tags(&id)
                .await
                .map_err(|e| ProviderError::from(e).context(Action::ListingTags, type_name, &id))?;

            if self.schema().has_tags() {
                observed.insert(
                    TAGS_FIELD.to_string(),
                    FieldValue::Map(self.tags.filter_for_read(&remote_tags)),
                );
            }
            if self.schema().has_tags_all() {
                observed.insert(
                    TAGS_ALL_FIELD.to_string(),
                    FieldValue::Map(self.tags.all_for_read(&remote_tags)),
                );
            }
        }

        state.replace_observed(observed.clone());
        state.mark_newly_created(false);

        Ok(ReadOutcome::Found(observed))
    }

    /// Applies changed tracked fields to the remote object.
    ///
    /// Does nothing, and makes no remote call, when no tracked field changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource is not active, a force-new field
    /// changed, validation fails, a remote call fails, or the wait fails.
    pub async fn update<S: DesiredState + ?Sized>(&self, state: &mut S) -> Result<ReadOutcome> {
        let type_name = self.type_name();
        let address = state.address().to_string();

        let id = match state.identifier() {
            Some(id) if state.lifecycle() == Lifecycle::Active => id.to_string(),
            _ => {
                return Err(self
                    .invalid_transition(Action::Updating, &*state)
                    .context(Action::Updating, type_name, &address));
            }
        };

        let desired = self
            .prepare_desired(state)
            .map_err(|e| e.context(Action::Updating, type_name, &id))?;

        let changed = tracked_changes(self.schema(), &*state);
        if changed.is_empty() {
            debug!("No changes for {type_name} {id}");
            return Ok(ReadOutcome::Found(state.observed().clone()));
        }

        let replace: Vec<String> = changed
            .iter()
            .filter(|f| f.force_new)
            .map(|f| f.name.to_string())
            .collect();
        if !replace.is_empty() {
            return Err(ProviderError::from(ReconcileError::RequiresReplacement {
                address,
                fields: replace,
            })
            .context(Action::Updating, type_name, &id));
        }

        let changes: FieldMap = changed
            .iter()
            .filter(|f| f.name != TAGS_FIELD)
            .filter_map(|f| desired.get(f.name).map(|v| (f.name.to_string(), v.clone())))
            .collect();

        if !changes.is_empty() {
            let request = (self.descriptor.expand_update)(self.schema(), &changes);
            info!("Updating {type_name} {id}: {}", join_keys(&request));
            let output = self
                .client
                .update(&id, &request)
                .await
                .map_err(|e| ProviderError::from(e).context(Action::Updating, type_name, &id))?;
            if let Some(operation) = output.operation_id {
                debug!("Update of {type_name} {id} started operation {operation}");
            }
        }

        if changed.iter().any(|f| f.name == TAGS_FIELD) {
            let delta = self.tag_delta(state.observed(), &desired);
            if !delta.is_empty() {
                info!(
                    "Updating tags on {type_name} {id}: {} set, {} removed",
                    delta.upsert.len(),
                    delta.remove.len()
                );
                self.client
                    .update_tags(&id, &delta)
                    .await
                    .map_err(|e| ProviderError::from(e).context(Action::UpdatingTags, type_name, &id))?;
            }
        }

        state.set_lifecycle(Lifecycle::Updating);

        self.wait(&id, &self.descriptor.update_wait, self.timeouts.update())
            .await
            .map_err(|e| e.context(Action::WaitingForUpdate, type_name, &id))?;

        state.set_lifecycle(Lifecycle::Active);
        state.mark_applied();
        info!("{type_name} {id} updated");

        self.read(state).await
    }

    /// Deletes the remote object and waits for it to disappear.
    ///
    /// An object that is already gone counts as deleted. On success the
    /// record is cleared. A record stuck mid-transition can be deleted too,
    /// which is how a failed create is cleaned up.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource has no identifier or is already
    /// destroyed, the delete call fails with anything but not-found, or the
    /// wait fails.
    pub async fn delete<S: DesiredState + ?Sized>(&self, state: &mut S) -> Result<()> {
        let type_name = self.type_name();

        let id = match state.identifier() {
            Some(id) if !matches!(state.lifecycle(), Lifecycle::Absent | Lifecycle::Destroyed) => {
                id.to_string()
            }
            _ => {
                let address = state.address().to_string();
                return Err(self
                    .invalid_transition(Action::Deleting, &*state)
                    .context(Action::Deleting, type_name, &address));
            }
        };

        info!("Deleting {type_name} {id}");

        match self.client.delete(&id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!("{type_name} {id} already gone");
                state.clear();
                return Ok(());
            }
            Err(e) => return Err(ProviderError::from(e).context(Action::Deleting, type_name, &id)),
        }

        state.set_lifecycle(Lifecycle::Deleting);

        self.wait(&id, &self.descriptor.delete_wait, self.timeouts.delete())
            .await
            .map_err(|e| e.context(Action::WaitingForDeletion, type_name, &id))?;

        state.clear();
        info!("{type_name} {id} deleted");
        Ok(())
    }

    /// Finishes a transition interrupted while waiting.
    ///
    /// Re-enters the wait for the phase recorded in the lifecycle, then
    /// continues as the original operation would have.
    ///
    /// # Errors
    ///
    /// Returns an error if the lifecycle is not `Creating`, `Updating` or
    /// `Deleting`, or if the wait or the final read fails.
    pub async fn resume<S: DesiredState + ?Sized>(&self, state: &mut S) -> Result<ReadOutcome> {
        let type_name = self.type_name();
        let lifecycle = state.lifecycle();

        let (spec, timeout, action) = match lifecycle {
            Lifecycle::Creating => (
                &self.descriptor.create_wait,
                self.timeouts.create(),
                Action::WaitingForCreation,
            ),
            Lifecycle::Updating => (
                &self.descriptor.update_wait,
                self.timeouts.update(),
                Action::WaitingForUpdate,
            ),
            Lifecycle::Deleting => (
                &self.descriptor.delete_wait,
                self.timeouts.delete(),
                Action::WaitingForDeletion,
            ),
            Lifecycle::Absent | Lifecycle::Active | Lifecycle::Destroyed => {
                let address = state.address().to_string();
                return Err(self
                    .invalid_transition(Action::Reading, &*state)
                    .context(Action::Reading, type_name, &address));
            }
        };

        let Some(id) = state.identifier().map(str::to_string) else {
            let address = state.address().to_string();
            return Err(self
                .invalid_transition(action, &*state)
                .context(action, type_name, &address));
        };

        info!("Resuming {action} for {type_name} {id}");

        self.wait(&id, spec, timeout)
            .await
            .map_err(|e| e.context(action, type_name, &id))?;

        if lifecycle == Lifecycle::Deleting {
            state.clear();
            info!("{type_name} {id} deleted");
            return Ok(ReadOutcome::Gone);
        }

        if lifecycle == Lifecycle::Creating {
            state.mark_newly_created(true);
        }
        state.set_lifecycle(Lifecycle::Active);
        state.mark_applied();

        self.read(state).await
    }

    /// Applies defaults, writes them back into the desired state and validates.
    fn prepare_desired<S: DesiredState + ?Sized>(&self, state: &mut S) -> Result<FieldMap> {
        let mut desired = state.desired().clone();
        self.schema().apply_defaults(&mut desired);

        for (name, value) in &desired {
            if state.get(name).is_none() {
                state.set(name, value.clone());
            }
        }

        self.schema().validate(&desired)?;
        Ok(desired)
    }

    /// Tag changes from the last observed effective tags to the new merged tags.
    fn tag_delta(&self, observed: &FieldMap, desired: &FieldMap) -> TagDelta {
        let old = if self.schema().has_tags_all() {
            tags_in(observed, TAGS_ALL_FIELD)
        } else {
            self.tags.merge_for_write(&tags_in(observed, TAGS_FIELD))
        };
        let new = self.tags.merge_for_write(&tags_in(desired, TAGS_FIELD));

        TagDelta::between(&old, &new)
    }

    async fn wait(
        &self,
        id: &str,
        spec: &WaitSpec,
        timeout: Duration,
    ) -> Result<Option<RemoteObject>> {
        let probe = RemoteProbe::new(Finder::new(self.client, self.type_name()), spec.status);
        self.waiter.wait_for(&probe, id, spec, timeout).await
    }

    fn invalid_transition<S: DesiredState + ?Sized>(&self, action: Action, state: &S) -> ProviderError {
        let mut current = state.lifecycle().to_string();
        if state.lifecycle() == Lifecycle::Absent && state.identifier().is_some() {
            current.push_str(" with an identifier");
        } else if state.identifier().is_none() && state.lifecycle() != Lifecycle::Absent {
            current.push_str(" without an identifier");
        }

        ReconcileError::InvalidTransition {
            action,
            address: state.address().to_string(),
            state: current,
        }
        .into()
    }
}

fn tags_in(fields: &FieldMap, name: &str) -> Tags {
    fields
        .get(name)
        .and_then(FieldValue::as_map)
        .cloned()
        .unwrap_or_default()
}

fn join_keys(fields: &FieldMap) -> String {
    fields.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
}
