use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use super::error::CodecError;
use super::registry::PayloadType;

static GLOBAL: OnceLock<Arc<TypesCache>> = OnceLock::new();

/// Identity of one codec's ordered list of type sources.
///
/// Every built codec gets a fresh id (clones keep it), so codecs sharing a
/// cache never see each other's resolutions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SourceSetId(u64);

impl SourceSetId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        SourceSetId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Process-wide (source set, tag) → type cache with get-or-compute semantics.
///
/// Only successful resolutions are stored: a failed lookup is retried the
/// next time the tag is read. Resolution is deterministic for a source set,
/// so a race between two resolvers of the same entry is harmless.
#[derive(Debug, Default)]
pub struct TypesCache {
    entries: RwLock<HashMap<(SourceSetId, String), PayloadType>>,
}

impl TypesCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache shared by every codec that was not given its own.
    pub fn global() -> Arc<TypesCache> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(TypesCache::new())))
    }

    pub fn get(
        &self,
        sources: SourceSetId,
        type_tag: &str,
    ) -> Result<Option<PayloadType>, CodecError> {
        let entries = self.entries.read().map_err(|_| CodecError::CachePoisoned)?;
        Ok(entries.get(&(sources, type_tag.to_string())).copied())
    }

    pub fn get_or_try_insert_with<F>(
        &self,
        sources: SourceSetId,
        type_tag: &str,
        resolve: F,
    ) -> Result<PayloadType, CodecError>
    where
        F: FnOnce(&str) -> Result<PayloadType, CodecError>,
    {
        if let Some(cached) = self.get(sources, type_tag)? {
            return Ok(cached);
        }

        // Resolve outside the lock; sources may be slow.
        let resolved = resolve(type_tag)?;

        let mut entries = self.entries.write().map_err(|_| CodecError::CachePoisoned)?;
        Ok(*entries
            .entry((sources, type_tag.to_string()))
            .or_insert(resolved))
    }

    pub fn contains(&self, sources: SourceSetId, type_tag: &str) -> bool {
        self.get(sources, type_tag)
            .map(|entry| entry.is_some())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn resolves_once_then_serves_from_cache() {
        let cache = TypesCache::new();
        let sources = SourceSetId::next();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let resolved = cache
                .get_or_try_insert_with(sources, "i64", |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(PayloadType::of::<i64>())
                })
                .unwrap();
            assert_eq!(resolved.type_tag(), "i64");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_resolution_is_not_cached() {
        let cache = TypesCache::new();
        let sources = SourceSetId::next();

        let err = cache
            .get_or_try_insert_with(sources, "i64", |tag| {
                Err(CodecError::UnresolvableType {
                    type_tag: tag.to_string(),
                })
            })
            .unwrap_err();
        assert!(matches!(err, CodecError::UnresolvableType { .. }));
        assert!(!cache.contains(sources, "i64"));

        let resolved = cache
            .get_or_try_insert_with(sources, "i64", |_| Ok(PayloadType::of::<i64>()))
            .unwrap();
        assert_eq!(resolved.type_tag(), "i64");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn entries_are_scoped_by_source_set() {
        let cache = TypesCache::new();
        let strings = SourceSetId::next();
        let integers = SourceSetId::next();

        cache
            .get_or_try_insert_with(strings, "value", |_| Ok(PayloadType::of::<String>()))
            .unwrap();

        assert!(cache.contains(strings, "value"));
        assert!(!cache.contains(integers, "value"));
        let resolved = cache
            .get_or_try_insert_with(integers, "value", |_| Ok(PayloadType::of::<i64>()))
            .unwrap();
        assert_eq!(resolved.type_tag(), "i64");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn concurrent_readers_and_writers_agree() {
        let cache = TypesCache::new();
        let sources = SourceSetId::next();
        let tags = ["i64", "bool", "String"];

        thread::scope(|scope| {
            for worker in 0..8 {
                let cache = &cache;
                scope.spawn(move || {
                    for round in 0..100 {
                        let tag = tags[(worker + round) % tags.len()];
                        let resolved = cache
                            .get_or_try_insert_with(sources, tag, |tag| match tag {
                                "i64" => Ok(PayloadType::of::<i64>()),
                                "bool" => Ok(PayloadType::of::<bool>()),
                                _ => Ok(PayloadType::of::<String>()),
                            })
                            .unwrap();
                        assert_eq!(resolved.type_tag(), tag);
                    }
                });
            }
        });

        assert_eq!(cache.len(), tags.len());
    }

    #[test]
    fn global_is_a_single_instance() {
        assert!(Arc::ptr_eq(&TypesCache::global(), &TypesCache::global()));
    }
}
