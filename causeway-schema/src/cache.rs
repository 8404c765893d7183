//! Descriptor cache keyed by host type identity.
//!
//! Look-ups are read-biased; a miss upgrades to the write lock and checks
//! again before building, so concurrent requests for the same uncached type
//! collapse to a single build.

use std::any::TypeId;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use causeway::record::{Record, RecordType};
use prost_types::FileDescriptorProto;
use tracing::trace;

use crate::builder::SchemaBuilder;
use crate::error::SchemaError;

#[derive(Default)]
struct CacheInner {
    entries: HashMap<TypeId, Arc<FileDescriptorProto>>,
    /// Least-recently-used order, front = coldest.
    order: VecDeque<TypeId>,
}

impl CacheInner {
    fn touch(&mut self, id: TypeId) {
        if let Some(pos) = self.order.iter().position(|k| *k == id) {
            self.order.remove(pos);
        }
        self.order.push_back(id);
    }
}

/// A bounded, thread-safe descriptor cache.
pub struct SchemaCache {
    max_entries: Option<usize>,
    inner: RwLock<CacheInner>,
}

impl SchemaCache {
    /// Unbounded cache.
    pub fn new() -> SchemaCache {
        SchemaCache {
            max_entries: None,
            inner: RwLock::new(CacheInner::default()),
        }
    }

    /// Cache evicting least-recently-used entries past `max_entries`.
    pub fn bounded(max_entries: usize) -> SchemaCache {
        SchemaCache {
            max_entries: Some(max_entries.max(1)),
            inner: RwLock::new(CacheInner::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("schema cache poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch the descriptor for `T`, building it on first use.
    pub fn get_or_build<T: Record>(
        &self,
        builder: &SchemaBuilder,
    ) -> Result<Arc<FileDescriptorProto>, SchemaError> {
        self.get_or_build_type(builder, &T::record_type())
    }

    /// Same as [`get_or_build`](Self::get_or_build) for an already
    /// reflected type.
    pub fn get_or_build_type(
        &self,
        builder: &SchemaBuilder,
        root: &RecordType,
    ) -> Result<Arc<FileDescriptorProto>, SchemaError> {
        let hit = self
            .inner
            .read()
            .expect("schema cache poisoned")
            .entries
            .get(&root.type_id)
            .cloned();
        if let Some(hit) = hit {
            // Best-effort recency bump; never blocks the read path.
            if let Ok(mut inner) = self.inner.try_write() {
                inner.touch(root.type_id);
            }
            return Ok(hit);
        }

        let mut inner = self.inner.write().expect("schema cache poisoned");
        // Double-checked: another thread may have built while we waited.
        if let Some(hit) = inner.entries.get(&root.type_id) {
            let hit = hit.clone();
            inner.touch(root.type_id);
            return Ok(hit);
        }

        trace!(r#type = root.name, "descriptor cache miss");
        let built = Arc::new(builder.build_file(root)?);
        inner.entries.insert(root.type_id, built.clone());
        inner.touch(root.type_id);
        if let Some(max) = self.max_entries {
            while inner.entries.len() > max {
                let Some(coldest) = inner.order.pop_front() else {
                    break;
                };
                inner.entries.remove(&coldest);
            }
        }
        Ok(built)
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        SchemaCache::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SchemaConfig;
    use causeway::record::{FieldKind, FieldMeta};

    struct A;
    struct B;
    struct C;

    fn ty<T: 'static>(name: &'static str) -> RecordType {
        RecordType::new::<T>(name).with_field(FieldMeta::new("x", FieldKind::Int32))
    }

    #[test]
    fn repeated_lookups_hit_the_cache() {
        let builder = SchemaBuilder::new(SchemaConfig::proto3("test.v1"));
        let cache = SchemaCache::new();
        let first = cache.get_or_build_type(&builder, &ty::<A>("A")).unwrap();
        let second = cache.get_or_build_type(&builder, &ty::<A>("A")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn bounded_cache_evicts_least_recently_used() {
        let builder = SchemaBuilder::new(SchemaConfig::proto3("test.v1"));
        let cache = SchemaCache::bounded(2);
        cache.get_or_build_type(&builder, &ty::<A>("A")).unwrap();
        cache.get_or_build_type(&builder, &ty::<B>("B")).unwrap();
        // Touch A so B becomes the eviction candidate.
        cache.get_or_build_type(&builder, &ty::<A>("A")).unwrap();
        cache.get_or_build_type(&builder, &ty::<C>("C")).unwrap();
        assert_eq!(cache.len(), 2);
        let inner = cache.inner.read().unwrap();
        assert!(inner.entries.contains_key(&TypeId::of::<A>()));
        assert!(!inner.entries.contains_key(&TypeId::of::<B>()));
    }
}
