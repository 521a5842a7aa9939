//! Compiled-predicate caching.
//!
//! [`PredicateCache`] maps a tree instance to its compiled callable so that
//! evaluating the same specification many times compiles it once.
//!
//! # Identity policy
//!
//! Entries are keyed by [`TreeId`], the identity of a tree *instance*. Clones
//! of a tree share its id and therefore its entry; two trees built separately
//! never share one, even when they render identically. Recompiling after
//! swapping a sub-expression is just building a new tree.
//!
//! # Growth
//!
//! The cache is unbounded. The process-wide instance keeps every tree it has
//! seen until [`PredicateCache::clear`] is called, so workloads producing an
//! unbounded number of ad-hoc trees should use a private cache or compile
//! directly with [`compile`](crate::compile::compile).
//!
//! ```rust
//! use sift_query::cache::PredicateCache;
//! use sift_query::tree::PredicateTree;
//! # use sift_query::entity::{Entity, EntityMetadata};
//! # use std::sync::OnceLock;
//! # struct Permission { id: i64 }
//! # impl Entity for Permission {
//! #     fn metadata() -> &'static EntityMetadata<Self> {
//! #         static M: OnceLock<EntityMetadata<Permission>> = OnceLock::new();
//! #         M.get_or_init(|| EntityMetadata::builder("Permission").field("Id", |p: &Permission| &p.id).build())
//! #     }
//! # }
//!
//! let cache = PredicateCache::new();
//! let tree = PredicateTree::<Permission>::build(|x| Ok(x.property("Id")?.gt(3))).unwrap();
//!
//! let first = cache.compile(&tree).unwrap();
//! let second = cache.compile(&tree.clone()).unwrap();
//! assert!(first.ptr_eq(&second));
//! assert_eq!(cache.stats().compilations, 1);
//! ```

use std::collections::HashMap;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::compile::{CompiledPredicate, ErasedPredicate, compile_erased};
use crate::entity::Entity;
use crate::error::{QueryError, QueryResult};
use crate::tree::{PredicateTree, TreeId};

/// Statistics about cache usage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of lookups answered from the cache.
    pub hits: u64,
    /// Number of lookups that had to compile.
    pub misses: u64,
    /// Number of successful compilations.
    pub compilations: u64,
}

impl CacheStats {
    /// Calculate the hit rate.
    #[inline]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock-free usage counters.
#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    compilations: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            compilations: self.compilations.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.compilations.store(0, Ordering::Relaxed);
    }
}

/// A thread-safe, identity-keyed cache of compiled predicates.
#[derive(Debug, Default)]
pub struct PredicateCache {
    entries: RwLock<HashMap<TreeId, ErasedPredicate>>,
    counters: Counters,
}

static GLOBAL_PREDICATE_CACHE: OnceLock<PredicateCache> = OnceLock::new();

impl PredicateCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache.
    #[inline]
    pub fn global() -> &'static PredicateCache {
        GLOBAL_PREDICATE_CACHE.get_or_init(|| {
            info!("PredicateCache initialized");
            PredicateCache::new()
        })
    }

    /// Get the compiled form of `tree`, compiling it on first use.
    ///
    /// Compilation runs outside the lock. When two threads race on the same
    /// tree both may compile, but the first published callable wins and
    /// every caller receives that one.
    pub fn compile<T: Entity>(&self, tree: &PredicateTree<T>) -> QueryResult<CompiledPredicate<T>> {
        let id = tree.id();

        let cached = self.entries.read().get(&id).and_then(|entry| entry.downcast::<T>());
        if let Some(compiled) = cached {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!(tree = %id, "PredicateCache hit");
            return Ok(compiled);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!(tree = %id, "PredicateCache miss");

        let compiled = compile_erased(id, tree.parameter(), tree.body())
            .map_err(|err| err.with_tree(tree).with_entity(T::metadata().name()))?;
        self.counters.compilations.fetch_add(1, Ordering::Relaxed);

        let published = self.entries.write().entry(id).or_insert(compiled).clone();
        published
            .downcast::<T>()
            .ok_or_else(|| QueryError::internal(format!("cached predicate {} has the wrong entity type", id)))
    }

    /// Get a previously compiled predicate without compiling.
    pub fn get<T: Entity>(&self, tree: &PredicateTree<T>) -> Option<CompiledPredicate<T>> {
        self.entries.read().get(&tree.id()).and_then(|entry| entry.downcast::<T>())
    }

    /// Check if a tree has been compiled into this cache.
    pub fn contains(&self, id: TreeId) -> bool {
        self.entries.read().contains_key(&id)
    }

    /// Drop the entry for one tree.
    pub fn remove(&self, id: TreeId) -> bool {
        self.entries.write().remove(&id).is_some()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        debug!(entries = entries.len(), "PredicateCache cleared");
        entries.clear();
    }

    /// Number of cached predicates.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics. Counters are updated without locking, so a
    /// snapshot taken during concurrent lookups may be mid-update.
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// Reset cache statistics.
    pub fn reset_stats(&self) {
        self.counters.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::fixtures::{Permission, permissions};
    use crate::expr::Expr;
    use pretty_assertions::assert_eq;

    fn id_above(n: i64) -> PredicateTree<Permission> {
        PredicateTree::<Permission>::build(|x| Ok(x.property("Id")?.gt(n))).unwrap()
    }

    #[test]
    fn test_same_instance_compiles_once() {
        let cache = PredicateCache::new();
        let tree = id_above(6);

        let first = cache.compile(&tree).unwrap();
        let second = cache.compile(&tree).unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(
            cache.stats(),
            CacheStats { hits: 1, misses: 1, compilations: 1 }
        );
        let rows = permissions();
        let a: Vec<bool> = rows.iter().map(|p| first.call(p)).collect();
        let b: Vec<bool> = rows.iter().map(|p| second.call(p)).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_equal_but_distinct_trees_recompile() {
        let cache = PredicateCache::new();
        let a = id_above(6);
        let b = id_above(6);
        assert_eq!(a.to_string(), b.to_string());

        cache.compile(&a).unwrap();
        cache.compile(&b).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().compilations, 2);
    }

    #[test]
    fn test_failed_compilation_is_not_cached() {
        let cache = PredicateCache::new();
        let x = crate::expr::Parameter::new::<Permission>("x");
        let tree = PredicateTree::<Permission>::from_parts(x, Expr::constant("nope")).unwrap();

        assert!(cache.compile(&tree).unwrap_err().is_invalid_tree());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().compilations, 0);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_clear_remove_and_reset() {
        let cache = PredicateCache::new();
        let a = id_above(1);
        let b = id_above(2);
        cache.compile(&a).unwrap();
        cache.compile(&b).unwrap();

        assert!(cache.remove(a.id()));
        assert!(!cache.contains(a.id()));
        assert!(cache.get(&b).is_some());

        cache.clear();
        assert!(cache.is_empty());
        cache.reset_stats();
        assert_eq!(cache.stats(), CacheStats::default());
        assert_eq!(cache.stats().hit_rate(), 0.0);
    }

    #[test]
    fn test_concurrent_compile_publishes_one_callable() {
        let cache = PredicateCache::new();
        let tree = id_above(4);

        let results: Vec<CompiledPredicate<Permission>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| cache.compile(&tree).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let published = cache.get(&tree).unwrap();
        assert!(results.iter().all(|r| r.ptr_eq(&published)));
        assert_eq!(cache.len(), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits + stats.misses, 8);
        assert!(stats.compilations >= 1 && stats.compilations == stats.misses);
    }

    #[test]
    fn test_concurrent_hits_are_all_counted() {
        let cache = PredicateCache::new();
        let tree = id_above(3);
        cache.compile(&tree).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..500 {
                        cache.compile(&tree).unwrap();
                    }
                });
            }
        });

        assert_eq!(
            cache.stats(),
            CacheStats { hits: 4000, misses: 1, compilations: 1 }
        );
        cache.reset_stats();
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_global_cache_is_shared() {
        assert!(std::ptr::eq(PredicateCache::global(), PredicateCache::global()));
    }
}
