//! Test fixtures shared by the reconciler and manager tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::Timeouts;
use crate::error::RemoteError;
use crate::remote::{CreateOutput, RemoteClient, RemoteObject, StatusSource, UpdateOutput};
use crate::schema::{
    expand_settable, flatten_by_remote_name, FieldDefault, FieldDescriptor, FieldKind, FieldMap,
    FieldValue, ResourceDescriptor, ResourceSchema, TAGS_FIELD,
};
use crate::state::ResourceRecord;
use crate::tags::{IgnoreTags, TagDelta, TagPolicy, Tags};
use crate::wait::{WaitConfig, WaitSpec, Waiter};

const FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::computed("arn", FieldKind::String),
    FieldDescriptor::computed("status", FieldKind::String),
    FieldDescriptor::required("name", FieldKind::String).force_new(),
    FieldDescriptor::optional("size", FieldKind::Int)
        .updatable()
        .with_default(FieldDefault::Int(10)),
    FieldDescriptor::optional("tags", FieldKind::Map).updatable(),
    FieldDescriptor::computed("tags_all", FieldKind::Map),
];

pub const WIDGET: ResourceDescriptor = ResourceDescriptor {
    schema: ResourceSchema::new("test_widget", FIELDS),
    expand_create: expand_settable,
    expand_update: expand_settable,
    flatten: flatten_by_remote_name,
    create_wait: WaitSpec {
        pending: &["CREATING"],
        target: &["ACTIVE"],
        status: StatusSource::ApiField("status"),
        min_target_hits: 2,
        not_found_checks: 3,
    },
    update_wait: WaitSpec {
        pending: &["UPDATING"],
        target: &["ACTIVE"],
        status: StatusSource::ApiField("status"),
        min_target_hits: 1,
        not_found_checks: 0,
    },
    delete_wait: WaitSpec {
        pending: &["DELETING", "ACTIVE"],
        target: &[],
        status: StatusSource::ApiField("status"),
        min_target_hits: 1,
        not_found_checks: 2,
    },
};

pub const WIDGET_ARN: &str = "arn:widget/1";

/// In-memory remote that replays a status script. `None` means not found;
/// the last entry repeats once the script runs out.
#[derive(Default)]
pub struct ScriptedRemote {
    pub statuses: Mutex<VecDeque<Option<&'static str>>>,
    pub last_status: Mutex<Option<&'static str>>,
    pub fields: Mutex<FieldMap>,
    pub tags: Mutex<Tags>,
    pub create_error: Mutex<Option<RemoteError>>,
    pub create_empty: Mutex<bool>,
    pub delete_error: Mutex<Option<RemoteError>>,
    pub tokens: Mutex<Vec<String>>,
    pub updates: Mutex<Vec<FieldMap>>,
    pub tag_updates: Mutex<Vec<TagDelta>>,
    pub gets: Mutex<u32>,
}

impl ScriptedRemote {
    pub fn with_script(script: &[Option<&'static str>]) -> Self {
        let remote = Self::default();
        remote.script(script);
        remote
    }

    pub fn script(&self, script: &[Option<&'static str>]) {
        *self.statuses.lock().expect("lock") = script.iter().copied().collect();
    }

    pub fn gets(&self) -> u32 {
        *self.gets.lock().expect("lock")
    }
}

#[async_trait]
impl RemoteClient for ScriptedRemote {
    async fn create(
        &self,
        request: &FieldMap,
        idempotency_token: &str,
    ) -> std::result::Result<Option<CreateOutput>, RemoteError> {
        self.tokens.lock().expect("lock").push(idempotency_token.to_string());
        if let Some(err) = self.create_error.lock().expect("lock").take() {
            return Err(err);
        }
        if *self.create_empty.lock().expect("lock") {
            return Ok(None);
        }

        let mut fields = request.clone();
        if let Some(FieldValue::Map(tags)) = fields.remove(TAGS_FIELD) {
            *self.tags.lock().expect("lock") = tags;
        }
        fields.insert(String::from("arn"), FieldValue::from(WIDGET_ARN));
        *self.fields.lock().expect("lock") = fields;

        Ok(Some(CreateOutput {
            identifier: Some(WIDGET_ARN.to_string()),
            fields: FieldMap::new(),
        }))
    }

    async fn get(&self, id: &str) -> std::result::Result<Option<RemoteObject>, RemoteError> {
        *self.gets.lock().expect("lock") += 1;
        let status = {
            let mut script = self.statuses.lock().expect("lock");
            let mut last = self.last_status.lock().expect("lock");
            if let Some(next) = script.pop_front() {
                *last = next;
            }
            *last
        };

        let Some(status) = status else {
            return Err(RemoteError::not_found(format!("{id} does not exist")));
        };

        let mut fields = self.fields.lock().expect("lock").clone();
        fields.insert(String::from("status"), FieldValue::from(status));
        Ok(Some(RemoteObject::new(id, fields)))
    }

    async fn update(
        &self,
        _id: &str,
        changes: &FieldMap,
    ) -> std::result::Result<UpdateOutput, RemoteError> {
        self.updates.lock().expect("lock").push(changes.clone());
        self.fields
            .lock()
            .expect("lock")
            .extend(changes.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(UpdateOutput::default())
    }

    async fn delete(&self, _id: &str) -> std::result::Result<(), RemoteError> {
        self.delete_error.lock().expect("lock").take().map_or(Ok(()), Err)
    }

    async fn list_tags(&self, _id: &str) -> std::result::Result<Tags, RemoteError> {
        Ok(self.tags.lock().expect("lock").clone())
    }

    async fn update_tags(
        &self,
        _id: &str,
        delta: &TagDelta,
    ) -> std::result::Result<(), RemoteError> {
        self.tag_updates.lock().expect("lock").push(delta.clone());
        let mut tags = self.tags.lock().expect("lock");
        for key in &delta.remove {
            tags.remove(key);
        }
        tags.extend(delta.upsert.clone());
        Ok(())
    }
}

pub fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

pub fn policy() -> TagPolicy {
    TagPolicy::new(tags(&[("env", "prod")]), IgnoreTags::default())
}

pub fn timeouts() -> Timeouts {
    Timeouts {
        create_secs: 5,
        update_secs: 5,
        delete_secs: 5,
    }
}

pub fn waiter() -> Waiter {
    Waiter::new(WaitConfig {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        jitter: 0.0,
    })
}

pub fn new_record() -> ResourceRecord {
    let mut desired = FieldMap::new();
    desired.insert(String::from("name"), FieldValue::from("w1"));
    desired.insert(String::from("tags"), FieldValue::Map(tags(&[("a", "1")])));
    ResourceRecord::new("widget.main", "test_widget", desired)
}
