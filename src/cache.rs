//! LRU cache of loaded project indexes.
//!
//! Values are `Arc<ProjectIndex>`: eviction only drops the cache's
//! reference, never force-closes the index, because a concurrent query may
//! still hold its own `Arc`. The lexical handle is released when the last
//! reference drops, or explicitly: callers deleting a project or
//! clearing its files, who must close the index before removing the
//! directory.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::index::ProjectIndex;

/// Loaded indexes kept in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 5;

pub struct IndexCache {
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    capacity: usize,
    /// Front = most recently used.
    order: Vec<String>,
    items: HashMap<String, Arc<ProjectIndex>>,
}

impl IndexCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                capacity: capacity.max(1),
                order: Vec::new(),
                items: HashMap::new(),
            }),
        }
    }

    /// Fetch and promote to most-recently-used.
    pub fn get(&self, project_id: &str) -> Option<Arc<ProjectIndex>> {
        let mut inner = self.inner.lock().unwrap();
        let value = inner.items.get(project_id)?.clone();
        promote(&mut inner.order, project_id);
        Some(value)
    }

    /// Insert or replace, promote, and evict the least-recently-used entry
    /// when over capacity.
    pub fn put(&self, project_id: &str, index: Arc<ProjectIndex>) {
        let mut inner = self.inner.lock().unwrap();

        if inner.items.insert(project_id.to_string(), index).is_none()
            && inner.order.len() >= inner.capacity
        {
            if let Some(evicted) = inner.order.pop() {
                inner.items.remove(&evicted);
                info!(project = %evicted, "index cache evicted least-recently-used entry");
            }
        }
        promote(&mut inner.order, project_id);
    }

    /// Membership check without promotion.
    pub fn has(&self, project_id: &str) -> bool {
        self.inner.lock().unwrap().items.contains_key(project_id)
    }

    pub fn remove(&self, project_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.items.remove(project_id);
        inner.order.retain(|id| id != project_id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn promote(order: &mut Vec<String>, project_id: &str) {
    order.retain(|id| id != project_id);
    order.insert(0, project_id.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;
    use crate::error::Result;
    use crate::lexical::LexicalIndex;
    use async_trait::async_trait;

    struct NullEmbedder;

    #[async_trait]
    impl Embedder for NullEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0]).collect())
        }

        fn model_name(&self) -> &str {
            "null"
        }
    }

    fn make_index() -> Arc<ProjectIndex> {
        Arc::new(ProjectIndex::new(
            LexicalIndex::open_in_ram().unwrap(),
            Arc::new(NullEmbedder),
        ))
    }

    #[test]
    fn capacity_five_evicts_first_inserted() {
        let cache = IndexCache::new(5);
        for i in 1..=6 {
            cache.put(&format!("p{i}"), make_index());
        }

        assert_eq!(cache.len(), 5);
        assert!(!cache.has("p1"), "first-inserted key must be evicted");
        for i in 2..=6 {
            assert!(cache.has(&format!("p{i}")));
        }
    }

    #[test]
    fn get_promotes_to_most_recently_used() {
        let cache = IndexCache::new(3);
        cache.put("a", make_index());
        cache.put("b", make_index());
        cache.put("c", make_index());

        // Touch "a" so "b" becomes the LRU entry.
        assert!(cache.get("a").is_some());
        cache.put("d", make_index());

        assert!(cache.has("a"));
        assert!(!cache.has("b"));
        assert!(cache.has("c"));
        assert!(cache.has("d"));
    }

    #[test]
    fn has_does_not_promote() {
        let cache = IndexCache::new(2);
        cache.put("a", make_index());
        cache.put("b", make_index());

        // `has` must not refresh "a".
        assert!(cache.has("a"));
        cache.put("c", make_index());
        assert!(!cache.has("a"));
    }

    #[test]
    fn replacing_existing_key_does_not_evict() {
        let cache = IndexCache::new(2);
        cache.put("a", make_index());
        cache.put("b", make_index());
        cache.put("a", make_index());

        assert_eq!(cache.len(), 2);
        assert!(cache.has("a"));
        assert!(cache.has("b"));
    }

    #[test]
    fn remove_drops_entry() {
        let cache = IndexCache::new(2);
        cache.put("a", make_index());
        cache.remove("a");
        assert!(cache.is_empty());
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn evicted_index_stays_usable_through_held_reference() {
        let cache = IndexCache::new(1);
        let first = make_index();
        first
            .lexical()
            .index_chunk("a_p1_c0", "still reachable text", "a.pdf", 1)
            .unwrap();
        first.lexical().commit().unwrap();

        cache.put("p1", Arc::clone(&first));
        let held = cache.get("p1").unwrap();

        // Evict p1 by inserting another project into the size-1 cache.
        cache.put("p2", make_index());
        assert!(!cache.has("p1"));

        // The in-flight query's reference keeps the index alive and working.
        let hits = held.lexical().search("reachable", 10).unwrap();
        assert_eq!(hits.len(), 1);
    }
}
