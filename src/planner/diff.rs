//! Diff engine for comparing desired, applied and observed fields.
//!
//! Planning compares desired fields against the last applied snapshot to
//! pick the next action. Drift detection compares desired fields against
//! what the last read observed.

use tracing::debug;

use crate::schema::{FieldDescriptor, FieldMap, FieldValue, Presence, ResourceSchema};
use crate::state::{DesiredState, Lifecycle, ResourceRecord};

/// Engine for computing plans and drift.
#[derive(Debug, Default)]
pub struct DiffEngine;

/// Planned action for a single resource.
#[derive(Debug, Clone)]
pub struct ResourceDiff {
    /// Resource address.
    pub address: String,
    /// Type of difference.
    pub diff_type: DiffType,
    /// Fields that differ.
    pub details: Vec<FieldDiff>,
}

/// Type of difference detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffType {
    /// Resource needs to be created.
    Create,
    /// Resource can be updated in place.
    Update,
    /// A force-new field changed; delete then create.
    Replace,
    /// A previous operation was interrupted while waiting.
    Resume,
    /// Resource is unchanged.
    NoChange,
}

/// Detail about a specific difference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiff {
    /// Field that differs.
    pub field: String,
    /// Old value.
    pub old_value: Option<String>,
    /// New value.
    pub new_value: Option<String>,
    /// Whether the field forces replacement.
    pub force_new: bool,
}

/// Differences between desired and observed fields after a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftReport {
    /// Resource address.
    pub address: String,
    /// Remote identifier at the time of the refresh.
    pub id: Option<String>,
    /// The remote object no longer exists.
    pub gone: bool,
    /// Fields whose observed value differs from the desired value.
    pub fields: Vec<FieldDiff>,
}

/// Tracked fields whose desired value differs from the last applied value.
pub fn tracked_changes<S: DesiredState + ?Sized>(
    schema: &ResourceSchema,
    state: &S,
) -> Vec<&'static FieldDescriptor> {
    schema
        .tracked_fields()
        .filter(|f| state.has_change(f.name))
        .collect()
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Picks the next action for a record.
    #[must_use]
    pub fn plan(&self, schema: &ResourceSchema, record: &ResourceRecord) -> ResourceDiff {
        let (diff_type, details) = match (record.identifier(), record.lifecycle) {
            (None, _) | (_, Lifecycle::Absent | Lifecycle::Destroyed) => {
                (DiffType::Create, Vec::new())
            }
            (Some(_), Lifecycle::Creating | Lifecycle::Updating | Lifecycle::Deleting) => {
                (DiffType::Resume, Vec::new())
            }
            (Some(_), Lifecycle::Active) => {
                let details: Vec<FieldDiff> = tracked_changes(schema, record)
                    .into_iter()
                    .map(|f| FieldDiff::new(f, record.applied.get(f.name), record.desired.get(f.name)))
                    .collect();

                let diff_type = if details.iter().any(|d| d.force_new) {
                    DiffType::Replace
                } else if details.is_empty() {
                    DiffType::NoChange
                } else {
                    DiffType::Update
                };
                (diff_type, details)
            }
        };

        debug!("Planned {} for {}", diff_type, record.address);

        ResourceDiff {
            address: record.address.clone(),
            diff_type,
            details,
        }
    }

    /// Compares desired fields against the last observed fields.
    ///
    /// Only fields the caller can set are compared. Optional-computed fields
    /// the caller left unset are filled by the remote side and never drift.
    #[must_use]
    pub fn drift(&self, schema: &ResourceSchema, record: &ResourceRecord) -> DriftReport {
        let gone = record.identifier().is_none() || record.lifecycle == Lifecycle::Destroyed;

        let fields = if gone {
            Vec::new()
        } else {
            schema
                .fields
                .iter()
                .filter(|f| f.is_settable())
                .filter(|f| {
                    f.presence != Presence::OptionalComputed || record.desired.contains_key(f.name)
                })
                .filter_map(|f| {
                    let desired = normalized(&record.desired, f.name);
                    let observed = normalized(&record.observed, f.name);
                    (desired != observed).then(|| FieldDiff::new(f, observed, desired))
                })
                .collect()
        };

        DriftReport {
            address: record.address.clone(),
            id: record.id.clone(),
            gone,
            fields,
        }
    }
}

/// A value, with empty collections treated as unset.
fn normalized<'a>(fields: &'a FieldMap, name: &str) -> Option<&'a FieldValue> {
    fields.get(name).filter(|v| !v.is_empty())
}

impl FieldDiff {
    fn new(field: &FieldDescriptor, old: Option<&FieldValue>, new: Option<&FieldValue>) -> Self {
        Self {
            field: field.name.to_string(),
            old_value: old.map(ToString::to_string),
            new_value: new.map(ToString::to_string),
            force_new: field.force_new,
        }
    }
}

impl ResourceDiff {
    /// Returns true if the plan changes anything.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.diff_type != DiffType::NoChange
    }

    /// Names of the force-new fields that changed.
    #[must_use]
    pub fn replacement_fields(&self) -> Vec<String> {
        self.details
            .iter()
            .filter(|d| d.force_new)
            .map(|d| d.field.clone())
            .collect()
    }
}

impl DriftReport {
    /// Returns true if the remote object is gone or any field drifted.
    #[must_use]
    pub fn has_drift(&self) -> bool {
        self.gone || !self.fields.is_empty()
    }
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Resume => "resume",
            Self::NoChange => "no change",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ResourceDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.address, self.diff_type)?;
        if !self.details.is_empty() {
            write!(f, " (")?;
            for (i, detail) in self.details.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", detail.field)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.gone {
            return write!(f, "{}: gone", self.address);
        }
        if self.fields.is_empty() {
            return write!(f, "{}: in sync", self.address);
        }
        write!(f, "{}: drifted", self.address)?;
        for detail in &self.fields {
            write!(
                f,
                "\n  {}: {} -> {}",
                detail.field,
                detail.old_value.as_deref().unwrap_or("(unset)"),
                detail.new_value.as_deref().unwrap_or("(unset)")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldKind;
    use std::collections::BTreeMap;

    const FIELDS: &[FieldDescriptor] = &[
        FieldDescriptor::computed("arn", FieldKind::String),
        FieldDescriptor::required("name", FieldKind::String).force_new(),
        FieldDescriptor::optional_computed("zone", FieldKind::String).force_new(),
        FieldDescriptor::optional("tags", FieldKind::Map).updatable(),
    ];

    const SCHEMA: ResourceSchema = ResourceSchema::new("test_widget", FIELDS);

    fn active_record() -> ResourceRecord {
        let mut desired = FieldMap::new();
        desired.insert(String::from("name"), FieldValue::from("w1"));
        let mut record = ResourceRecord::new("widget.main", "test_widget", desired);
        record.set_identifier("arn:1");
        record.set_lifecycle(Lifecycle::Active);
        record.mark_applied();
        record.replace_observed(record.desired.clone());
        record
    }

    fn tags(pairs: &[(&str, &str)]) -> FieldValue {
        FieldValue::Map(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    #[test]
    fn test_plan_create_without_identifier() {
        let record = ResourceRecord::new("widget.main", "test_widget", FieldMap::new());
        let diff = DiffEngine::new().plan(&SCHEMA, &record);
        assert_eq!(diff.diff_type, DiffType::Create);
        assert!(diff.details.is_empty());
    }

    #[test]
    fn test_plan_no_change() {
        let diff = DiffEngine::new().plan(&SCHEMA, &active_record());
        assert_eq!(diff.diff_type, DiffType::NoChange);
        assert!(!diff.has_changes());
        assert_eq!(diff.to_string(), "widget.main: no change");
    }

    #[test]
    fn test_plan_update_for_tags() {
        let mut record = active_record();
        record.set("tags", tags(&[("a", "1")]));

        let diff = DiffEngine::new().plan(&SCHEMA, &record);
        assert_eq!(diff.diff_type, DiffType::Update);
        assert_eq!(diff.to_string(), "widget.main: update (tags)");
    }

    #[test]
    fn test_plan_replace_for_force_new() {
        let mut record = active_record();
        record.set("name", FieldValue::from("w2"));
        record.set("tags", tags(&[("a", "1")]));

        let diff = DiffEngine::new().plan(&SCHEMA, &record);
        assert_eq!(diff.diff_type, DiffType::Replace);
        assert_eq!(diff.replacement_fields(), vec![String::from("name")]);
    }

    #[test]
    fn test_plan_resume_interrupted() {
        let mut record = active_record();
        record.set_lifecycle(Lifecycle::Creating);
        assert_eq!(DiffEngine::new().plan(&SCHEMA, &record).diff_type, DiffType::Resume);
    }

    #[test]
    fn test_drift_detects_tag_change() {
        let mut record = active_record();
        let mut observed = record.observed.clone();
        observed.insert(String::from("tags"), tags(&[("a", "2")]));
        observed.insert(String::from("zone"), FieldValue::from("z1"));
        record.replace_observed(observed);

        let report = DiffEngine::new().drift(&SCHEMA, &record);
        assert!(report.has_drift());
        assert_eq!(report.fields.len(), 1);
        assert_eq!(report.fields[0].field, "tags");
        assert!(report.to_string().contains("tags"));
    }

    #[test]
    fn test_drift_in_sync_and_gone() {
        let mut record = active_record();
        let report = DiffEngine::new().drift(&SCHEMA, &record);
        assert!(!report.has_drift());
        assert_eq!(report.to_string(), "widget.main: in sync");

        record.clear();
        let report = DiffEngine::new().drift(&SCHEMA, &record);
        assert!(report.gone);
        assert_eq!(report.to_string(), "widget.main: gone");
    }
}
