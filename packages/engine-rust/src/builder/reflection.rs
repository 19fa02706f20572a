use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use super::{OperationDelegate, PropertyDescriptor};

/// Property metadata for a delegate type, computed once per type.
#[derive(Debug)]
pub struct TypeDescriptor {
    type_name: &'static str,
    properties: Vec<PropertyDescriptor>,
    by_name: HashMap<&'static str, usize>,
}

impl TypeDescriptor {
    /// Introspects `T`.
    #[must_use]
    pub fn of<T: OperationDelegate>() -> Self {
        let properties = T::properties();
        let by_name = properties
            .iter()
            .enumerate()
            .map(|(idx, p)| (p.name, idx))
            .collect();
        Self {
            type_name: type_name::<T>(),
            properties,
            by_name,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[must_use]
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.by_name.get(name).map(|&idx| &self.properties[idx])
    }

    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }
}

/// Concurrent cache of [`TypeDescriptor`]s keyed by the delegate's `TypeId`.
///
/// Read-mostly: lookups take a shard read lock; a miss introspects the type
/// and inserts through the entry API. Two threads racing on the same miss may
/// both introspect, but only one descriptor is stored.
#[derive(Debug, Default)]
pub struct ReflectionCache {
    descriptors: DashMap<TypeId, Arc<TypeDescriptor>>,
    misses: AtomicU64,
}

impl ReflectionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the descriptor for `T`, populating the cache on first use.
    pub fn descriptor<T: OperationDelegate>(&self) -> Arc<TypeDescriptor> {
        let key = TypeId::of::<T>();
        if let Some(entry) = self.descriptors.get(&key) {
            return Arc::clone(entry.value());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let descriptor = Arc::new(TypeDescriptor::of::<T>());
        Arc::clone(self.descriptors.entry(key).or_insert(descriptor).value())
    }

    /// Number of cached types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Number of lookups that had to introspect a type.
    #[must_use]
    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    crate::operation_delegate! {
        struct First {
            host: String,
            port: u16,
        }
    }

    crate::operation_delegate! {
        struct Second {
            path: String,
        }
    }

    #[test]
    fn descriptor_indexes_properties() {
        let descriptor = TypeDescriptor::of::<First>();
        assert!(descriptor.type_name().ends_with("First"));
        assert!(descriptor.has_property("port"));
        assert!(!descriptor.has_property("path"));
        let host = descriptor.property("host").unwrap();
        assert!(host.type_name.ends_with("String"));
    }

    #[test]
    fn cache_populates_lazily_and_reuses() {
        let cache = ReflectionCache::new();
        assert!(cache.is_empty());

        let a = cache.descriptor::<First>();
        let b = cache.descriptor::<First>();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.miss_count(), 1);

        cache.descriptor::<Second>();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn concurrent_lookups_store_one_descriptor() {
        let cache = Arc::new(ReflectionCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.descriptor::<First>())
            })
            .collect();

        let descriptors: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(cache.len(), 1);
        let stored = cache.descriptor::<First>();
        assert!(descriptors.iter().all(|d| d.properties() == stored.properties()));
    }
}
