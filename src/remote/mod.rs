//! Remote API boundary: client trait, finder and status probe.

mod client;
mod finder;
mod probe;

pub use client::{CreateOutput, RemoteClient, RemoteObject, UpdateOutput};
pub use finder::Finder;
pub use probe::{ProbeResult, RemoteProbe, StatusProbe, StatusSource};

#[cfg(test)]
pub use client::MockRemoteClient;
