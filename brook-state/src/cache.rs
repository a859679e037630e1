//! A bounded, recency-ordered cache fronting block storage.

use std::sync::{Arc, Mutex, MutexGuard};

use indexmap::IndexMap;

use brook_chain::block::{Block, Number};

use crate::Config;

/// A bounded block store with least-recently-used eviction.
///
/// The cache decouples the producer ingestion rate from consumer delivery:
/// recently streamed blocks are served from memory while slower durable
/// storage catches up. It has no relation to verification; blocks are
/// cached by number as soon as they are assembled.
///
/// `insert`, `get`, and `contains` are all safe to call concurrently from
/// producer and consumer threads; a single lock over the recency-ordered
/// map makes the three operations linearizable with respect to each other.
#[derive(Debug)]
pub struct BlockCache {
    /// Cached blocks in recency order: index 0 is always the next eviction
    /// candidate.
    blocks: Mutex<IndexMap<Number, Arc<Block>>>,
    capacity: usize,
}

impl BlockCache {
    /// Creates a cache bounded by `config.cache_capacity` entries.
    ///
    /// # Panics
    ///
    /// If the configured capacity is zero.
    pub fn new(config: &Config) -> Self {
        assert!(
            config.cache_capacity > 0,
            "block cache capacity must be nonzero",
        );
        BlockCache {
            blocks: Mutex::new(IndexMap::with_capacity(config.cache_capacity + 1)),
            capacity: config.cache_capacity,
        }
    }

    /// Inserts `block` if its number is not already cached, and returns the
    /// key it is cached under.
    ///
    /// The first writer wins: a duplicate insert is a no-op that does not
    /// replace the cached block and does not disturb its recency. Inserting
    /// a new block at capacity evicts exactly the least recently used
    /// entry.
    pub fn insert(&self, block: Arc<Block>) -> Number {
        let number = block.header.number;
        let mut blocks = self.lock();
        if blocks.contains_key(&number) {
            return number;
        }
        blocks.insert(number, block);
        if blocks.len() > self.capacity {
            if let Some((evicted, _)) = blocks.shift_remove_index(0) {
                tracing::trace!(%evicted, "evicted least recently used block");
                metrics::counter!("state.block.cache.evictions").increment(1);
            }
        }
        number
    }

    /// Returns the cached block for `number`, refreshing its recency.
    pub fn get(&self, number: Number) -> Option<Arc<Block>> {
        let mut blocks = self.lock();
        let index = blocks.get_index_of(&number)?;
        let newest = blocks.len() - 1;
        blocks.move_index(index, newest);
        blocks.get(&number).cloned()
    }

    /// Whether `number` is cached. Unlike [`get`](Self::get), does not
    /// refresh recency.
    pub fn contains(&self, number: Number) -> bool {
        self.lock().contains_key(&number)
    }

    /// The number of cached blocks.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<Number, Arc<Block>>> {
        self.blocks.lock().expect("block cache lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use brook_chain::block::{Hash, Header};

    fn block(number: u64) -> Arc<Block> {
        Arc::new(Block {
            header: Header {
                number: Number(number),
                previous_block_hash: Hash::digest(number.to_be_bytes()),
            },
            items: Vec::new(),
        })
    }

    fn cache(capacity: usize) -> BlockCache {
        BlockCache::new(&Config {
            cache_capacity: capacity,
        })
    }

    #[test]
    fn inserting_past_capacity_evicts_exactly_one_block() {
        let cache = cache(3);
        for number in 0..4 {
            cache.insert(block(number));
        }

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(Number(0)));
        for number in 1..4 {
            assert!(cache.contains(Number(number)));
        }
    }

    #[test]
    fn get_refreshes_recency_before_eviction() {
        let cache = cache(3);
        for number in 1..=3 {
            cache.insert(block(number));
        }

        // Touch block 1, so block 2 becomes the least recently used.
        assert!(cache.get(Number(1)).is_some());
        cache.insert(block(4));

        assert!(cache.contains(Number(1)));
        assert!(!cache.contains(Number(2)));
        assert!(cache.contains(Number(3)));
        assert!(cache.contains(Number(4)));
    }

    #[test]
    fn duplicate_insert_is_a_no_op() {
        let cache = cache(3);
        let first = block(7);
        cache.insert(first.clone());

        let replacement = Arc::new(Block {
            header: Header {
                number: Number(7),
                previous_block_hash: Hash::digest(b"different"),
            },
            items: Vec::new(),
        });
        assert_eq!(cache.insert(replacement), Number(7));

        assert_eq!(cache.len(), 1);
        let cached = cache.get(Number(7)).expect("cached");
        assert_eq!(cached.header, first.header);
    }

    #[test]
    fn contains_does_not_refresh_recency() {
        let cache = cache(2);
        cache.insert(block(1));
        cache.insert(block(2));

        // Querying block 1 must not save it from eviction.
        assert!(cache.contains(Number(1)));
        cache.insert(block(3));

        assert!(!cache.contains(Number(1)));
        assert!(cache.contains(Number(2)));
        assert!(cache.contains(Number(3)));
    }

    #[test]
    fn concurrent_access_keeps_the_bound() {
        let cache = Arc::new(cache(64));

        std::thread::scope(|scope| {
            for thread in 0..4u64 {
                let cache = cache.clone();
                scope.spawn(move || {
                    for number in 0..256 {
                        cache.insert(block(thread * 1000 + number));
                        let _ = cache.get(Number(thread * 1000 + number / 2));
                        cache.contains(Number(number));
                    }
                });
            }
        });

        assert_eq!(cache.len(), 64);
    }
}
