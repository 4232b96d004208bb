// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Sideband metadata keyed by absolute item offset.
//!
//! A [`TagStore`] lives next to the items of one channel buffer. Tags are
//! addressed in the producer's absolute item count, so they stay valid no
//! matter where the ring currently stores the item. They are pruned only
//! when the ring overwrites the item they annotate.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// One `(offset, key, value)` annotation. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    /// Absolute item offset in the producer's output stream
    pub offset: u64,
    pub key: String,
    pub value: Value,
    /// Name of the block that originally wrote the tag
    pub source: Option<String>,
}

impl Tag {
    pub fn new(offset: u64, key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            offset,
            key: key.into(),
            value: value.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Same tag re-addressed to another stream position.
    pub fn moved_to(&self, offset: u64) -> Self {
        Self {
            offset,
            ..self.clone()
        }
    }
}

/// Offset-ordered tag collection. Tags at the same offset keep insertion order.
#[derive(Debug, Default)]
pub struct TagStore {
    tags: BTreeMap<u64, Vec<Tag>>,
    len: usize,
}

impl TagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: Tag) {
        self.tags.entry(tag.offset).or_default().push(tag);
        self.len += 1;
    }

    /// Tags with `start <= offset < end`, in offset order.
    pub fn in_window(&self, start: u64, end: u64) -> Vec<Tag> {
        if start >= end {
            return Vec::new();
        }
        self.tags
            .range(start..end)
            .flat_map(|(_, at_offset)| at_offset.iter().cloned())
            .collect()
    }

    /// Drop every tag below `offset`; returns how many were removed.
    pub fn prune_before(&mut self, offset: u64) -> usize {
        if self.tags.first_key_value().map_or(true, |(first, _)| *first >= offset) {
            return 0;
        }
        let kept = self.tags.split_off(&offset);
        let removed: usize = self.tags.values().map(Vec::len).sum();
        self.tags = kept;
        self.len -= removed;
        removed
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn first_offset(&self) -> Option<u64> {
        self.tags.keys().next().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_with(offsets: &[u64]) -> TagStore {
        let mut store = TagStore::new();
        for (i, offset) in offsets.iter().enumerate() {
            store.insert(Tag::new(*offset, "k", json!(i)));
        }
        store
    }

    #[test]
    fn test_window_is_half_open_and_ordered() {
        let store = store_with(&[30, 10, 20, 40]);
        let found: Vec<u64> = store.in_window(10, 40).iter().map(|t| t.offset).collect();
        assert_eq!(found, vec![10, 20, 30]);
        assert!(store.in_window(41, 100).is_empty());
        assert!(store.in_window(20, 20).is_empty());
    }

    #[test]
    fn test_equal_offsets_keep_insertion_order() {
        let mut store = TagStore::new();
        store.insert(Tag::new(5, "first", json!(1)));
        store.insert(Tag::new(5, "second", json!(2)));
        let keys: Vec<String> = store.in_window(0, 10).into_iter().map(|t| t.key).collect();
        assert_eq!(keys, vec!["first", "second"]);
    }

    #[test]
    fn test_prune_before_removes_only_older_tags() {
        let mut store = store_with(&[1, 2, 2, 7, 9]);
        assert_eq!(store.prune_before(3), 3);
        assert_eq!(store.len(), 2);
        assert_eq!(store.first_offset(), Some(7));
        assert_eq!(store.prune_before(3), 0);
        assert_eq!(store.prune_before(100), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_moved_to_keeps_payload() {
        let tag = Tag::new(3, "count", json!(3)).with_source("src");
        let moved = tag.moved_to(2003);
        assert_eq!(moved.offset, 2003);
        assert_eq!(moved.value, json!(3));
        assert_eq!(moved.source.as_deref(), Some("src"));
    }
}
