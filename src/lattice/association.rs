//! Service network service association.
//!
//! Associates a VPC Lattice service with a service network. Both identifiers
//! are fixed at create time, so changing either one replaces the association.
//! Only tags can be changed in place.

use crate::remote::{RemoteObject, StatusSource};
use crate::schema::{
    expand_settable, flatten_by_remote_name, FieldDescriptor, FieldKind, FieldMap, FieldValue,
    ResourceDescriptor, ResourceSchema,
};
use crate::wait::WaitSpec;

/// Resource type name.
pub const ASSOCIATION_TYPE: &str = "aws_vpclattice_service_network_service_association";

/// The association is being created.
pub const STATUS_CREATE_IN_PROGRESS: &str = "CREATE_IN_PROGRESS";
/// The association is usable.
pub const STATUS_ACTIVE: &str = "ACTIVE";
/// The association is being deleted.
pub const STATUS_DELETE_IN_PROGRESS: &str = "DELETE_IN_PROGRESS";
/// The association could not be created.
pub const STATUS_CREATE_FAILED: &str = "CREATE_FAILED";
/// The association could not be deleted.
pub const STATUS_DELETE_FAILED: &str = "DELETE_FAILED";

/// Label reported once an in-place change has been accepted. The API has no
/// update status, so the label only confirms the association still exists.
pub const STATUS_UPDATED: &str = "UPDATED";

const FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::computed("arn", FieldKind::String),
    FieldDescriptor::computed("id", FieldKind::String),
    FieldDescriptor::computed("status", FieldKind::String),
    FieldDescriptor::computed("created_by", FieldKind::String),
    FieldDescriptor::computed("custom_domain_name", FieldKind::String),
    FieldDescriptor::computed("failure_message", FieldKind::String),
    FieldDescriptor::required("service_identifier", FieldKind::String)
        .force_new()
        .from_remote("service_id"),
    FieldDescriptor::required("service_network_identifier", FieldKind::String)
        .force_new()
        .from_remote("service_network_id"),
    FieldDescriptor::optional("tags", FieldKind::Map).updatable(),
    FieldDescriptor::computed("tags_all", FieldKind::Map),
];

/// Descriptor for `aws_vpclattice_service_network_service_association`.
pub static ASSOCIATION: ResourceDescriptor = ResourceDescriptor {
    schema: ResourceSchema::new(ASSOCIATION_TYPE, FIELDS),
    expand_create: expand_settable,
    expand_update: expand_settable,
    flatten: flatten_association,
    create_wait: WaitSpec {
        pending: &[STATUS_CREATE_IN_PROGRESS],
        target: &[STATUS_ACTIVE],
        status: StatusSource::ApiField("status"),
        min_target_hits: 2,
        not_found_checks: 20,
    },
    update_wait: WaitSpec {
        pending: &[],
        target: &[STATUS_UPDATED],
        status: StatusSource::SyntheticAfterCall(STATUS_UPDATED),
        min_target_hits: 1,
        not_found_checks: 0,
    },
    delete_wait: WaitSpec {
        pending: &[STATUS_DELETE_IN_PROGRESS, STATUS_ACTIVE, STATUS_CREATE_FAILED],
        target: &[],
        status: StatusSource::ApiField("status"),
        min_target_hits: 1,
        not_found_checks: 2,
    },
};

/// Identifier fields that accept either an id or an ARN, with the remote
/// fields holding each form.
const IDENTIFIER_FORMS: &[(&str, &str, &str)] = &[
    ("service_identifier", "service_id", "service_arn"),
    ("service_network_identifier", "service_network_id", "service_network_arn"),
];

/// Maps a fetched association into observed fields.
///
/// The API reports both the id and the ARN of the service and the service
/// network. Whichever form the caller configured is kept, so configuring an
/// ARN does not show up as a change on every read.
fn flatten_association(schema: &ResourceSchema, remote: &RemoteObject, desired: &FieldMap) -> FieldMap {
    let mut observed = flatten_by_remote_name(schema, remote, desired);

    for (field, id_field, arn_field) in IDENTIFIER_FORMS {
        let Some(wanted) = desired.get(*field).and_then(FieldValue::as_str) else {
            continue;
        };
        if remote.string(arn_field) == Some(wanted) || remote.string(id_field) == Some(wanted) {
            observed.insert((*field).to_string(), FieldValue::from(wanted));
        }
    }

    observed
}
