use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use tracing::trace;

use super::{compile::Matcher, Filter, FilterId, FilterNode};

/// Entries are swept for dropped filters once the map grows past this size.
const INITIAL_SWEEP_THRESHOLD: usize = 64;

/// Compiled matchers keyed by filter identity.
///
/// Structurally equal filters built separately are different keys. An entry
/// is kept while its filter node is alive; entries of dropped filters are
/// removed lazily as the map grows.
pub struct MatcherCache {
    inner: Mutex<Inner>,
}

struct Inner {
    entries: HashMap<FilterId, Entry>,
    sweep_threshold: usize,
}

struct Entry {
    node: Weak<FilterNode>,
    matcher: Matcher,
}

impl Default for MatcherCache {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                sweep_threshold: INITIAL_SWEEP_THRESHOLD,
            }),
        }
    }
}

impl MatcherCache {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // entries are immutable once inserted, so a poisoned map is still valid
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, filter: &Filter) -> Option<Matcher> {
        self.lock()
            .entries
            .get(&filter.id())
            .map(|entry| entry.matcher.clone())
    }

    /// Returns the cached matcher for `filter`, compiling it with `compile`
    /// on a miss.
    ///
    /// The lock is released while compiling, since compiling a group
    /// reenters the cache for its subfilters. If another caller stored a
    /// matcher in the meantime, that one is returned.
    pub fn get_or_insert_with(&self, filter: &Filter, compile: impl FnOnce() -> Matcher) -> Matcher {
        if let Some(matcher) = self.get(filter) {
            return matcher;
        }
        let compiled = compile();
        trace!("Compiled filter {}", filter.id());

        let mut inner = self.lock();
        if inner.entries.len() >= inner.sweep_threshold {
            inner.sweep();
        }
        inner
            .entries
            .entry(filter.id())
            .or_insert_with(|| Entry {
                node: Arc::downgrade(filter.node()),
                matcher: compiled,
            })
            .matcher
            .clone()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }
}

impl Inner {
    fn sweep(&mut self) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.node.strong_count() > 0);
        trace!(
            "Swept {} matchers of dropped filters",
            before - self.entries.len()
        );
        self.sweep_threshold = (self.entries.len() * 2).max(INITIAL_SWEEP_THRESHOLD);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{engine::UnknownOperatorPolicy, filter::compile::compile, Condition};

    fn cached(cache: &MatcherCache, filter: &Filter) -> Matcher {
        cache.get_or_insert_with(filter, || {
            compile(filter, cache, UnknownOperatorPolicy::Permissive)
        })
    }

    #[test]
    fn same_node_hits() {
        let cache = MatcherCache::default();
        let filter = Filter::leaf("status", Condition::Equals(json!("OPEN")));
        let first = cached(&cache, &filter);
        let second = cached(&cache, &filter.clone());
        assert!(first.ptr_eq(&second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn equal_structure_is_not_a_hit() {
        let cache = MatcherCache::default();
        let a = Filter::leaf("status", Condition::Equals(json!("OPEN")));
        let b = Filter::leaf("status", Condition::Equals(json!("OPEN")));
        let first = cached(&cache, &a);
        let second = cached(&cache, &b);
        assert!(!first.ptr_eq(&second));
        assert_eq!(cache.len(), 2);

        let row = json!({"status": "open"}).as_object().cloned().unwrap();
        assert_eq!(first.matches(&row), second.matches(&row));
    }

    #[test]
    fn groups_cache_their_subfilters() {
        let cache = MatcherCache::default();
        let leaf = Filter::leaf("qty", Condition::Gt(json!(3)));
        let group = Filter::and(vec![leaf.clone()]);
        cached(&cache, &group);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&leaf).is_some());
    }

    #[test]
    fn dropped_filters_are_swept() {
        let cache = MatcherCache::default();
        let kept = Filter::leaf("kept", Condition::IsNull);
        cached(&cache, &kept);
        for i in 0..INITIAL_SWEEP_THRESHOLD {
            let transient = Filter::leaf(format!("c{i}"), Condition::IsNull);
            cached(&cache, &transient);
        }
        // the insert that crossed the threshold swept every dropped filter
        assert!(cache.len() < INITIAL_SWEEP_THRESHOLD);
        assert!(cache.get(&kept).is_some());
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = MatcherCache::default();
        cached(&cache, &Filter::or(vec![]));
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
    }
}
