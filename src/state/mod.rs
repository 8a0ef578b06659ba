//! State management.
//!
//! Persistent records of managed resources: remote identifiers, lifecycle,
//! desired, applied and observed fields, plus a bounded operation history.

mod desired;
mod local;
mod memory;
mod store;
mod types;

pub use desired::DesiredState;
pub use local::LocalStateStore;
pub use memory::MemoryStateStore;
pub use store::StateStore;
pub use types::{
    Lifecycle, OperationHistoryEntry, PendingCreate, ProviderState, ResourceRecord, StateOperation,
    MAX_HISTORY, STATE_VERSION,
};
