// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![forbid(unsafe_code)]               // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![warn(unused_imports)]              // Unused imports
#![warn(unused_variables)]            // Unused variables

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Lattice Reconcile
//!
//! A reconcile-and-poll lifecycle engine for cloud networking resources, with
//! VPC Lattice service network service associations as the first resource.
//!
//! ## Overview
//!
//! Each resource type is described as data: a field table, mapping functions
//! between desired fields and API requests, and one wait specification per
//! lifecycle phase. A single generic engine drives every resource:
//!
//! - Create, wait until active, read back observed fields
//! - Update changed fields or tags, wait, read back
//! - Delete, wait until the object is gone
//! - Detect objects deleted or changed outside the engine
//!
//! ## Architecture
//!
//! 1. **Remote client**: API calls behind the [`remote::RemoteClient`] trait
//! 2. **Finder and status probe**: point lookups with a unified not-found contract
//! 3. **Waiter**: polls status with jittered exponential backoff until it converges
//! 4. **Reconciler**: sequences calls, waits and reads for one resource
//! 5. **Resource manager**: plans and persists runs over a state store
//!
//! ## Modules
//!
//! - [`config`]: Provider settings and request hashing
//! - [`error`]: Error types
//! - [`lattice`]: VPC Lattice descriptor and API client
//! - [`logging`]: Subscriber setup
//! - [`manager`]: Apply, refresh, destroy and import over persisted state
//! - [`planner`]: Plans and drift reports
//! - [`reconciler`]: Per-resource lifecycle engine
//! - [`remote`]: Remote client boundary, finder and status probes
//! - [`schema`]: Field tables and resource descriptors
//! - [`state`]: Resource records and state stores
//! - [`tags`]: Default and ignored tag handling
//! - [`wait`]: Status polling
//!
//! ## Example
//!
//! ```yaml
//! region: us-east-1
//! default_tags:
//!   team: networking
//! ignore_tags:
//!   key_prefixes: ["kubernetes.io/"]
//! timeouts:
//!   create_secs: 600
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod config;
pub mod error;
pub mod lattice;
pub mod logging;
pub mod manager;
pub mod planner;
pub mod reconciler;
pub mod remote;
pub mod schema;
pub mod state;
pub mod tags;
pub mod wait;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{ProviderSettings, RequestHasher, SettingsParser};
pub use error::{ProviderError, Result};
pub use lattice::{LatticeClient, ASSOCIATION};
pub use logging::{init_logging, try_init_logging};
pub use manager::{ApplyResult, ResourceManager};
pub use planner::{DiffEngine, DriftReport};
pub use reconciler::{ReadOutcome, Reconciler};
pub use remote::{RemoteClient, RemoteObject};
pub use schema::{FieldMap, FieldValue, ResourceDescriptor};
pub use state::{DesiredState, LocalStateStore, MemoryStateStore, ProviderState, StateStore};
pub use tags::TagPolicy;
pub use wait::{WaitConfig, WaitSpec, Waiter};
