//! Tag merging and filtering.
//!
//! Tags written to a remote object are the process-wide default tags merged
//! with the resource's own tags, minus ignored keys. Tags read back drop
//! ignored keys and any default tag whose value is unchanged, so only the
//! caller's own tags appear in the resource.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Tag map. Ordered so requests and hashes are stable.
pub type Tags = BTreeMap<String, String>;

/// Key prefix reserved for system tags; never written or exposed.
pub const SYSTEM_TAG_PREFIX: &str = "aws:";

/// Keys that are never managed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreTags {
    /// Exact keys to ignore.
    #[serde(default)]
    pub keys: BTreeSet<String>,
    /// Key prefixes to ignore.
    #[serde(default)]
    pub key_prefixes: Vec<String>,
}

/// Default tags plus the ignore list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagPolicy {
    default_tags: Tags,
    ignore: IgnoreTags,
}

/// Tag changes between two tag sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDelta {
    /// Tags to add or change.
    pub upsert: Tags,
    /// Keys to remove.
    pub remove: Vec<String>,
}

impl IgnoreTags {
    /// Returns true if the key is ignored, including system keys.
    #[must_use]
    pub fn is_ignored(&self, key: &str) -> bool {
        key.starts_with(SYSTEM_TAG_PREFIX)
            || self.keys.contains(key)
            || self.key_prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }
}

impl TagPolicy {
    /// Creates a tag policy.
    #[must_use]
    pub const fn new(default_tags: Tags, ignore: IgnoreTags) -> Self {
        Self {
            default_tags,
            ignore,
        }
    }

    /// Default tags.
    #[must_use]
    pub const fn default_tags(&self) -> &Tags {
        &self.default_tags
    }

    /// Tags to send to the remote API: defaults overlaid with resource tags, minus ignored keys.
    #[must_use]
    pub fn merge_for_write(&self, resource_tags: &Tags) -> Tags {
        self.default_tags
            .iter()
            .chain(resource_tags)
            .filter(|(k, _)| !self.ignore.is_ignored(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Every effective remote tag the caller may see: remote tags minus ignored keys.
    #[must_use]
    pub fn all_for_read(&self, remote_tags: &Tags) -> Tags {
        remote_tags
            .iter()
            .filter(|(k, _)| !self.ignore.is_ignored(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Caller-visible tags: remote tags minus ignored keys minus unchanged defaults.
    #[must_use]
    pub fn filter_for_read(&self, remote_tags: &Tags) -> Tags {
        self.all_for_read(remote_tags)
            .into_iter()
            .filter(|(k, v)| self.default_tags.get(k) != Some(v))
            .collect()
    }
}

impl TagDelta {
    /// Computes the changes that turn `old` into `new`.
    #[must_use]
    pub fn between(old: &Tags, new: &Tags) -> Self {
        let upsert = new
            .iter()
            .filter(|(k, v)| old.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let remove = old
            .keys()
            .filter(|k| !new.contains_key(*k))
            .cloned()
            .collect();

        Self { upsert, remove }
    }

    /// Returns true if nothing changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upsert.is_empty() && self.remove.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_round_trip_elides_defaults() {
        let policy = TagPolicy::new(tags(&[("env", "prod")]), IgnoreTags::default());

        let written = policy.merge_for_write(&tags(&[("a", "1")]));
        assert_eq!(written, tags(&[("a", "1"), ("env", "prod")]));

        let visible = policy.filter_for_read(&written);
        assert_eq!(visible, tags(&[("a", "1")]));
    }

    #[test]
    fn test_resource_tag_overrides_default() {
        let policy = TagPolicy::new(tags(&[("env", "prod")]), IgnoreTags::default());

        let written = policy.merge_for_write(&tags(&[("env", "staging")]));
        assert_eq!(written, tags(&[("env", "staging")]));

        // An override differs from the default, so it stays visible.
        assert_eq!(policy.filter_for_read(&written), tags(&[("env", "staging")]));
    }

    #[test]
    fn test_ignored_keys_dropped_both_ways() {
        let ignore = IgnoreTags {
            keys: BTreeSet::from([String::from("owner")]),
            key_prefixes: vec![String::from("kubernetes.io/")],
        };
        let policy = TagPolicy::new(Tags::new(), ignore);

        let written = policy.merge_for_write(&tags(&[("a", "1"), ("owner", "me")]));
        assert_eq!(written, tags(&[("a", "1")]));

        let remote = tags(&[
            ("a", "1"),
            ("owner", "me"),
            ("kubernetes.io/cluster", "x"),
            ("aws:cloudformation:stack-name", "s"),
        ]);
        assert_eq!(policy.filter_for_read(&remote), tags(&[("a", "1")]));
        assert_eq!(policy.all_for_read(&remote), tags(&[("a", "1")]));
    }

    #[test]
    fn test_all_for_read_keeps_defaults() {
        let policy = TagPolicy::new(tags(&[("env", "prod")]), IgnoreTags::default());
        let remote = tags(&[("a", "1"), ("env", "prod")]);
        assert_eq!(policy.all_for_read(&remote), remote);
    }

    #[test]
    fn test_delta() {
        let old = tags(&[("a", "1"), ("b", "2")]);
        let new = tags(&[("a", "1"), ("b", "3"), ("c", "4")]);
        let delta = TagDelta::between(&old, &new);
        assert_eq!(delta.upsert, tags(&[("b", "3"), ("c", "4")]));
        assert!(delta.remove.is_empty());

        let delta = TagDelta::between(&new, &tags(&[("a", "1")]));
        assert!(delta.upsert.is_empty());
        assert_eq!(delta.remove, vec![String::from("b"), String::from("c")]);

        assert!(TagDelta::between(&old, &old).is_empty());
    }
}
