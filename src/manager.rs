//! Resource manager.
//!
//! Runs reconcile operations against records kept in a [`StateStore`]:
//! load the state, plan the next action, drive the reconciler, then persist
//! the record and a history entry. State is saved after every run, including
//! failed ones, so identifiers of half-finished creates are never lost.
//!
//! Operations on different addresses may run concurrently. Each save reloads
//! the state under a lock and replaces only the record it touched.

use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{ProviderSettings, Timeouts};
use crate::error::{Action, ConfigError, ProviderError, ReconcileError, Result};
use crate::planner::{DiffEngine, DiffType, DriftReport};
use crate::reconciler::{ReadOutcome, Reconciler};
use crate::remote::RemoteClient;
use crate::schema::{FieldMap, ResourceDescriptor};
use crate::state::{
    DesiredState, Lifecycle, OperationHistoryEntry, ProviderState, ResourceRecord, StateOperation,
    StateStore,
};
use crate::tags::TagPolicy;
use crate::wait::Waiter;

/// Manages resources of one type over a state store.
pub struct ResourceManager<C: RemoteClient, S: StateStore> {
    /// Resource description.
    descriptor: &'static ResourceDescriptor,
    /// Remote API client.
    client: C,
    /// State store.
    store: S,
    /// Default and ignored tags.
    tags: TagPolicy,
    /// Per-phase timeouts.
    timeouts: Timeouts,
    /// Status poller.
    waiter: Waiter,
    /// Diff engine.
    diff_engine: DiffEngine,
    /// Serializes load-merge-save of the state store.
    save_lock: Mutex<()>,
}

/// How a finished operation changes the record at its address.
enum RecordChange {
    /// Store the record.
    Set(ResourceRecord),
    /// Drop the record.
    Remove,
    /// Leave the stored record as it is.
    Keep,
}

/// Result of an apply run.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyResult {
    /// Resource address.
    pub address: String,
    /// Action taken.
    pub action: String,
    /// Remote identifier after the run.
    pub id: Option<String>,
    /// Observed fields after the run.
    pub observed: FieldMap,
}

impl<C: RemoteClient, S: StateStore> ResourceManager<C, S> {
    /// Creates a manager from provider settings.
    #[must_use]
    pub fn new(
        descriptor: &'static ResourceDescriptor,
        client: C,
        store: S,
        settings: &ProviderSettings,
    ) -> Self {
        Self {
            descriptor,
            client,
            store,
            tags: settings.tag_policy(),
            timeouts: settings.timeouts,
            waiter: Waiter::new(settings.wait_config()),
            diff_engine: DiffEngine::new(),
            save_lock: Mutex::new(()),
        }
    }

    /// Observes a cancellation token while waiting on remote status.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.waiter = self.waiter.with_cancellation(token);
        self
    }

    /// The state store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Loads the current state, or an empty one.
    ///
    /// # Errors
    ///
    /// Returns an error if the state store fails.
    pub async fn state(&self) -> Result<ProviderState> {
        Ok(self.store.load().await?.unwrap_or_default())
    }

    fn reconciler(&self) -> Reconciler<'_, C> {
        Reconciler::new(
            self.descriptor,
            &self.client,
            &self.tags,
            self.timeouts,
            self.waiter.clone(),
        )
    }

    const fn type_name(&self) -> &'static str {
        self.descriptor.schema.type_name
    }

    /// Converges the resource at `address` on the desired fields.
    ///
    /// Creates it when it has never been created or was deleted outside
    /// this engine, updates it in place when tracked fields changed, and
    /// replaces it when a force-new field changed.
    ///
    /// # Errors
    ///
    /// Returns the first error from the reconciler or the state store. State
    /// is still saved when the reconciler fails.
    pub async fn apply(&self, address: &str, mut desired: FieldMap) -> Result<ApplyResult> {
        info!("Applying {} {address}", self.type_name());
        // Applied snapshots include defaults.
        self.descriptor.schema.apply_defaults(&mut desired);

        let state = self.state().await?;
        let mut record = self.record_for(&state, address, &desired)?;

        let outcome = self.apply_record(&mut record, desired).await;

        let operation = match &outcome {
            Ok((DiffType::Create, _)) => StateOperation::Create,
            Ok((DiffType::Replace, _)) => StateOperation::Replace,
            Ok(_) => StateOperation::Update,
            Err(_) if record.applied.is_empty() => StateOperation::Create,
            Err(_) => StateOperation::Update,
        };

        let outcome = outcome.map(|(diff_type, _)| ApplyResult {
            address: address.to_string(),
            action: diff_type.to_string(),
            id: record.id.clone(),
            observed: record.observed.clone(),
        });

        self.finish(operation, address, RecordChange::Set(record), outcome)
            .await
    }

    async fn apply_record(
        &self,
        record: &mut ResourceRecord,
        desired: FieldMap,
    ) -> Result<(DiffType, ReadOutcome)> {
        let reconciler = self.reconciler();

        // Finish an interrupted transition with the desired fields it started with.
        if record.id.is_some()
            && matches!(
                record.lifecycle,
                Lifecycle::Creating | Lifecycle::Updating | Lifecycle::Deleting
            )
        {
            info!("Resuming interrupted {} of {}", record.lifecycle, record.address);
            reconciler.resume(record).await?;
        }

        record.set_desired(desired);

        if record.is_live() && reconciler.read(record).await? == ReadOutcome::Gone {
            info!("{} was deleted outside this engine, recreating", record.address);
        }

        if record.lifecycle == Lifecycle::Destroyed {
            record.set_lifecycle(Lifecycle::Absent);
        }

        let diff = self.diff_engine.plan(&self.descriptor.schema, record);
        info!("Plan: {diff}");

        let outcome = match diff.diff_type {
            DiffType::Create => reconciler.create(record).await?,
            DiffType::Update => reconciler.update(record).await?,
            DiffType::Replace => {
                info!(
                    "Replacing {} because {} changed",
                    record.address,
                    diff.replacement_fields().join(", ")
                );
                reconciler.delete(record).await?;
                record.set_lifecycle(Lifecycle::Absent);
                reconciler.create(record).await?
            }
            DiffType::Resume => reconciler.resume(record).await?,
            DiffType::NoChange => ReadOutcome::Found(record.observed.clone()),
        };

        Ok((diff.diff_type, outcome))
    }

    /// Refreshes the resource and reports drift from the desired fields.
    ///
    /// A resource deleted outside this engine is reported as gone and its
    /// identifier is cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if no record exists at `address`, or if the read or
    /// the state store fails.
    pub async fn refresh(&self, address: &str) -> Result<DriftReport> {
        let mut record = Self::existing(&self.state().await?, address)?;

        let outcome = if record.id.is_some() && record.lifecycle != Lifecycle::Destroyed {
            self.reconciler().read(&mut record).await.map(|_| ())
        } else {
            Ok(())
        };

        let outcome = outcome.map(|()| {
            let report = self.diff_engine.drift(&self.descriptor.schema, &record);
            if report.has_drift() {
                warn!("Drift detected: {report}");
            } else {
                info!("{report}");
            }
            report
        });

        self.finish(StateOperation::Refresh, address, RecordChange::Set(record), outcome)
            .await
    }

    /// Deletes the resource and removes its record.
    ///
    /// A transition left in progress is resumed first. If it ended in a
    /// failed status, such as a create that failed remotely, the object is
    /// deleted anyway.
    ///
    /// # Errors
    ///
    /// Returns an error if no record exists at `address`, or if the delete
    /// or the state store fails. The record is kept when the delete fails.
    pub async fn destroy(&self, address: &str) -> Result<()> {
        let mut record = Self::existing(&self.state().await?, address)?;

        info!("Destroying {} {address}", self.type_name());

        let outcome = self.destroy_record(&mut record).await;
        let change = if outcome.is_ok() {
            RecordChange::Remove
        } else {
            RecordChange::Set(record)
        };

        self.finish(StateOperation::Destroy, address, change, outcome)
            .await
    }

    async fn destroy_record(&self, record: &mut ResourceRecord) -> Result<()> {
        let reconciler = self.reconciler();

        if record.id.is_some()
            && matches!(
                record.lifecycle,
                Lifecycle::Creating | Lifecycle::Updating | Lifecycle::Deleting
            )
        {
            match reconciler.resume(record).await {
                Ok(_) => {}
                Err(e) if e.is_unexpected_state() => {
                    warn!(
                        "Interrupted {} of {} failed, deleting it: {e}",
                        record.lifecycle, record.address
                    );
                }
                Err(e) => return Err(e),
            }
        }

        if record.id.is_some() && record.lifecycle != Lifecycle::Destroyed {
            reconciler.delete(record).await?;
        }

        Ok(())
    }

    /// Adopts an existing remote object at `address`.
    ///
    /// The desired fields are seeded from what the read observes, so the
    /// next apply with the same fields is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if a live resource already exists at `address`, the
    /// object cannot be found, or the state store fails.
    pub async fn import(&self, address: &str, id: &str) -> Result<FieldMap> {
        let type_name = self.type_name();
        let state = self.state().await?;

        if let Some(existing) = state.get(address).filter(|r| r.is_live()) {
            return Err(ProviderError::from(ReconcileError::InvalidTransition {
                action: Action::Importing,
                address: address.to_string(),
                state: existing.lifecycle.to_string(),
            })
            .context(Action::Importing, type_name, id));
        }

        info!("Importing {type_name} {id} as {address}");

        let mut record = ResourceRecord::new(address, type_name, FieldMap::new());
        record.set_identifier(id);
        record.set_lifecycle(Lifecycle::Active);
        // An import of a missing object fails rather than clearing the record.
        record.mark_newly_created(true);

        let outcome = self
            .reconciler()
            .read(&mut record)
            .await
            .map_err(|e| e.context(Action::Importing, type_name, id));

        let outcome = outcome.map(|_| {
            let desired = self.descriptor.schema.caller_visible(&record.observed);
            record.set_desired(desired.clone());
            record.mark_applied();
            desired
        });

        let change = if outcome.is_ok() {
            RecordChange::Set(record)
        } else {
            RecordChange::Keep
        };
        self.finish(StateOperation::Import, address, change, outcome)
            .await
    }

    fn record_for(
        &self,
        state: &ProviderState,
        address: &str,
        desired: &FieldMap,
    ) -> Result<ResourceRecord> {
        match state.get(address) {
            Some(record) if record.resource_type != self.type_name() => {
                Err(ConfigError::validation(
                    format!(
                        "{address} holds a {} resource, not {}",
                        record.resource_type,
                        self.type_name()
                    ),
                    address,
                )
                .into())
            }
            Some(record) => Ok(record.clone()),
            None => Ok(ResourceRecord::new(address, self.type_name(), desired.clone())),
        }
    }

    fn existing(state: &ProviderState, address: &str) -> Result<ResourceRecord> {
        state.get(address).cloned().ok_or_else(|| {
            ReconcileError::UnknownResource {
                address: address.to_string(),
            }
            .into()
        })
    }

    /// Records history and saves the state, whatever the outcome.
    async fn finish<T>(
        &self,
        operation: StateOperation,
        address: &str,
        change: RecordChange,
        outcome: Result<T>,
    ) -> Result<T> {
        if let Err(e) = &outcome {
            error!("{operation} of {address} failed: {e}");
        }

        let saved = self
            .persist(operation, address, change, outcome.as_ref().err())
            .await;

        if let Err(save_err) = saved {
            error!("Failed to save state: {save_err}");
            // The operation's own error is the more useful one to surface.
            return match outcome {
                Ok(_) => Err(save_err),
                Err(e) => Err(e),
            };
        }

        outcome
    }

    /// Merges one record change and a history entry into the latest state.
    async fn persist(
        &self,
        operation: StateOperation,
        address: &str,
        change: RecordChange,
        failure: Option<&ProviderError>,
    ) -> Result<()> {
        let _guard = self.save_lock.lock().await;
        let mut state = self.state().await?;

        match change {
            RecordChange::Set(record) => state.set(record),
            RecordChange::Remove => {
                state.remove(address);
            }
            RecordChange::Keep => {}
        }

        let id = state.get(address).and_then(|r| r.id.clone());
        let entry = match failure {
            None => OperationHistoryEntry::new(operation, address, id.as_deref()),
            Some(e) => {
                OperationHistoryEntry::failed(operation, address, id.as_deref(), &e.to_string())
            }
        };
        state.add_history(entry);

        self.store.save(&state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::schema::FieldValue;
    use crate::state::{LocalStateStore, MemoryStateStore};
    use crate::testing::{tags, ScriptedRemote, WIDGET, WIDGET_ARN};
    use crate::wait::WaitConfig;
    use std::time::Duration;
    use tempfile::TempDir;

    const ADDRESS: &str = "widget.main";

    fn settings() -> ProviderSettings {
        let mut settings = ProviderSettings::default();
        settings
            .default_tags
            .insert(String::from("env"), String::from("prod"));
        settings.timeouts = Timeouts {
            create_secs: 5,
            update_secs: 5,
            delete_secs: 5,
        };
        settings.wait.initial_delay_ms = 1;
        settings.wait.max_delay_ms = 2;
        settings.wait.jitter = 0.0;
        settings
    }

    fn manager<S: StateStore>(store: S) -> ResourceManager<ScriptedRemote, S> {
        ResourceManager::new(&WIDGET, ScriptedRemote::default(), store, &settings())
    }

    fn desired(name: &str, tag_pairs: &[(&str, &str)]) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert(String::from("name"), FieldValue::from(name));
        fields.insert(String::from("tags"), FieldValue::Map(tags(tag_pairs)));
        fields
    }

    async fn applied() -> ResourceManager<ScriptedRemote, MemoryStateStore> {
        let manager = manager(MemoryStateStore::new());
        manager
            .client
            .script(&[Some("CREATING"), Some("ACTIVE"), Some("ACTIVE")]);
        manager
            .apply(ADDRESS, desired("w1", &[("a", "1")]))
            .await
            .expect("create succeeds");
        manager
    }

    #[test]
    fn test_wait_config_from_settings() {
        let manager = manager(MemoryStateStore::new());
        assert_eq!(
            *manager.waiter.config(),
            WaitConfig {
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                jitter: 0.0,
            }
        );
    }

    #[tokio::test]
    async fn test_apply_creates_and_persists() {
        let manager = applied().await;

        let state = manager.state().await.expect("state");
        let record = state.get(ADDRESS).expect("record saved");
        assert_eq!(record.id.as_deref(), Some(WIDGET_ARN));
        assert_eq!(record.lifecycle, Lifecycle::Active);
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history[0].operation, StateOperation::Create);
        assert!(state.history[0].success);
    }

    #[tokio::test]
    async fn test_apply_again_is_no_change() {
        let manager = applied().await;

        let result = manager
            .apply(ADDRESS, desired("w1", &[("a", "1")]))
            .await
            .expect("no-op");

        assert_eq!(result.action, "no change");
        assert_eq!(manager.client.tokens.lock().expect("lock").len(), 1);
        assert!(manager.client.updates.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn test_apply_updates_tags() {
        let manager = applied().await;

        let result = manager
            .apply(ADDRESS, desired("w1", &[("a", "2")]))
            .await
            .expect("update");

        assert_eq!(result.action, "update");
        assert_eq!(
            result.observed.get("tags"),
            Some(&FieldValue::Map(tags(&[("a", "2")])))
        );
        assert_eq!(manager.client.tag_updates.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn test_apply_replaces_on_force_new_change() {
        let manager = applied().await;
        manager.client.script(&[
            Some("ACTIVE"),
            None,
            None,
            Some("CREATING"),
            Some("ACTIVE"),
            Some("ACTIVE"),
        ]);

        let result = manager
            .apply(ADDRESS, desired("w2", &[("a", "1")]))
            .await
            .expect("replace");

        assert_eq!(result.action, "replace");
        assert_eq!(result.observed.get("name"), Some(&FieldValue::from("w2")));
        assert_eq!(manager.client.tokens.lock().expect("lock").len(), 2);

        let state = manager.state().await.expect("state");
        assert_eq!(
            state.history.last().map(|h| h.operation),
            Some(StateOperation::Replace)
        );
    }

    #[tokio::test]
    async fn test_apply_recreates_after_external_delete() {
        let manager = applied().await;
        manager.client.script(&[None, Some("ACTIVE")]);

        let result = manager
            .apply(ADDRESS, desired("w1", &[("a", "1")]))
            .await
            .expect("recreate");

        assert_eq!(result.action, "create");
        assert_eq!(result.id.as_deref(), Some(WIDGET_ARN));

        // A new create, not a retry of the first one.
        let tokens = manager.client.tokens.lock().expect("lock").clone();
        assert_eq!(tokens.len(), 2);
        assert_ne!(tokens[0], tokens[1]);
    }

    #[tokio::test]
    async fn test_concurrent_applies_keep_both_records() {
        let manager = manager(MemoryStateStore::new());
        manager.client.script(&[Some("ACTIVE")]);

        let (first, second) = tokio::join!(
            manager.apply("widget.a", desired("wa", &[])),
            manager.apply("widget.b", desired("wb", &[])),
        );
        tokio_test::assert_ok!(first);
        tokio_test::assert_ok!(second);

        let state = manager.state().await.expect("state");
        assert_eq!(state.addresses(), vec!["widget.a", "widget.b"]);
        assert_eq!(state.history.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_apply_still_saves_state() {
        let manager = manager(MemoryStateStore::new());
        *manager.client.create_error.lock().expect("lock") = Some(RemoteError::Throttled {
            message: String::from("rate exceeded"),
            retry_after_secs: Some(2),
        });

        let err = manager
            .apply(ADDRESS, desired("w1", &[]))
            .await
            .expect_err("throttled");
        assert_eq!(err.retry_delay_secs(), Some(2));

        let state = manager.state().await.expect("state saved");
        let record = state.get(ADDRESS).expect("record kept");
        assert!(record.id.is_none());
        assert_eq!(record.lifecycle, Lifecycle::Absent);
        assert!(!state.history[0].success);
        assert!(state.history[0].error.is_some());
    }

    #[tokio::test]
    async fn test_interrupted_create_resumes_on_next_apply() {
        let manager = manager(MemoryStateStore::new());
        manager
            .client
            .script(&[Some("CREATING"), Some("CREATE_FAILED")]);
        manager
            .apply(ADDRESS, desired("w1", &[]))
            .await
            .expect_err("unexpected state");

        let state = manager.state().await.expect("state");
        let record = state.get(ADDRESS).expect("record kept");
        assert_eq!(record.id.as_deref(), Some(WIDGET_ARN));
        assert_eq!(record.lifecycle, Lifecycle::Creating);

        manager.client.script(&[Some("ACTIVE")]);
        let result = manager
            .apply(ADDRESS, desired("w1", &[]))
            .await
            .expect("resumed");
        assert_eq!(result.action, "no change");
        assert_eq!(manager.client.tokens.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_reports_drift() {
        let manager = applied().await;
        manager
            .client
            .tags
            .lock()
            .expect("lock")
            .insert(String::from("owner"), String::from("ops"));

        let report = manager.refresh(ADDRESS).await.expect("refresh");
        assert!(report.has_drift());
        assert_eq!(report.fields.len(), 1);
        assert_eq!(report.fields[0].field, "tags");
    }

    #[tokio::test]
    async fn test_refresh_reports_gone() {
        let manager = applied().await;
        manager.client.script(&[None]);

        let report = manager.refresh(ADDRESS).await.expect("refresh");
        assert!(report.gone);

        let state = manager.state().await.expect("state");
        assert!(state.get(ADDRESS).is_some_and(|r| r.id.is_none()));
    }

    #[tokio::test]
    async fn test_refresh_unknown_address() {
        let manager = manager(MemoryStateStore::new());
        let err = manager.refresh("widget.nope").await.expect_err("unknown");
        assert!(matches!(
            err,
            ProviderError::Reconcile(ReconcileError::UnknownResource { .. })
        ));
    }

    #[tokio::test]
    async fn test_destroy_removes_record() {
        let manager = applied().await;
        manager.client.script(&[Some("DELETING"), None, None]);

        manager.destroy(ADDRESS).await.expect("destroy");

        let state = manager.state().await.expect("state");
        assert!(state.get(ADDRESS).is_none());
        assert_eq!(
            state.history.last().map(|h| h.operation),
            Some(StateOperation::Destroy)
        );
    }

    #[tokio::test]
    async fn test_destroy_cleans_up_failed_create() {
        let manager = manager(MemoryStateStore::new());
        manager
            .client
            .script(&[Some("CREATING"), Some("CREATE_FAILED")]);
        manager
            .apply(ADDRESS, desired("w1", &[]))
            .await
            .expect_err("create failed remotely");

        manager.client.script(&[Some("CREATE_FAILED"), None, None]);
        manager.destroy(ADDRESS).await.expect("failed create deleted");

        let state = manager.state().await.expect("state");
        assert!(state.get(ADDRESS).is_none());
        assert!(state.history.last().is_some_and(|h| h.success));

        // Creating again after a destroy uses a fresh token.
        manager.client.script(&[Some("ACTIVE")]);
        manager
            .apply(ADDRESS, desired("w1", &[]))
            .await
            .expect("created again");
        let tokens = manager.client.tokens.lock().expect("lock").clone();
        assert_eq!(tokens.len(), 2);
        assert_ne!(tokens[0], tokens[1]);
    }

    #[tokio::test]
    async fn test_import_seeds_desired() {
        let manager = manager(MemoryStateStore::new());
        manager.client.script(&[Some("ACTIVE")]);
        *manager.client.fields.lock().expect("lock") = desired("w1", &[]);
        manager.client.fields.lock().expect("lock").remove("tags");
        manager
            .client
            .fields
            .lock()
            .expect("lock")
            .insert(String::from("size"), FieldValue::Int(10));
        *manager.client.tags.lock().expect("lock") = tags(&[("a", "1"), ("env", "prod")]);

        let imported = manager.import(ADDRESS, WIDGET_ARN).await.expect("import");

        assert_eq!(imported.get("name"), Some(&FieldValue::from("w1")));
        assert_eq!(
            imported.get("tags"),
            Some(&FieldValue::Map(tags(&[("a", "1")])))
        );
        assert!(!imported.contains_key("arn"));

        let result = manager
            .apply(ADDRESS, desired("w1", &[("a", "1")]))
            .await
            .expect("apply after import");
        assert_eq!(result.action, "no change");
    }

    #[tokio::test]
    async fn test_import_missing_object_fails() {
        let manager = manager(MemoryStateStore::new());
        manager.client.script(&[None]);

        let err = manager.import(ADDRESS, WIDGET_ARN).await.expect_err("missing");
        assert!(err.is_not_found());
        assert!(manager.state().await.expect("state").get(ADDRESS).is_none());
    }

    #[tokio::test]
    async fn test_state_survives_reload_from_disk() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("state.json");

        let first = manager(LocalStateStore::with_state_path(&path));
        first.client.script(&[Some("ACTIVE")]);
        first
            .apply(ADDRESS, desired("w1", &[]))
            .await
            .expect("create");

        let second = manager(LocalStateStore::with_state_path(&path));
        let state = second.state().await.expect("load");
        let record = state.get(ADDRESS).expect("persisted");
        assert_eq!(record.id.as_deref(), Some(WIDGET_ARN));
        assert!(!record.newly_created);
    }
}
