//! Request hashing for idempotent creates.
//!
//! Field maps are ordered, so hashing their canonical JSON form is
//! deterministic across runs and processes. A create remembers the hash of
//! the request it sent, and a retry reuses its client token only while the
//! request hash still matches.

use sha2::{Digest, Sha256};

use crate::schema::FieldMap;

/// Hasher for field maps.
#[derive(Debug, Default)]
pub struct RequestHasher;

impl RequestHasher {
    /// Creates a new request hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of a field map, as 64 hex characters.
    #[must_use]
    pub fn hash_fields(&self, fields: &FieldMap) -> String {
        let mut hasher = Sha256::new();
        Self::update_fields(&mut hasher, fields);
        hex::encode(hasher.finalize())
    }

    fn update_fields(hasher: &mut Sha256, fields: &FieldMap) {
        // Serializing a BTreeMap of plain values cannot fail.
        let canonical = serde_json::to_vec(fields).unwrap_or_default();
        hasher.update((canonical.len() as u64).to_be_bytes());
        hasher.update(&canonical);
    }
}
