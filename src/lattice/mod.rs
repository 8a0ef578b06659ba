//! AWS VPC Lattice resources.
//!
//! - [`association`]: descriptor for service network service associations
//! - [`client`]: `aws-sdk-vpclattice` implementation of the remote client

pub mod association;
pub mod client;

pub use association::{ASSOCIATION, ASSOCIATION_TYPE};
pub use client::LatticeClient;
