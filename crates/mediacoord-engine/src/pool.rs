//! Fixed size-class byte buffer pools.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::BytesMut;
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, trace};

use mediacoord_ipc::PoolStats;

/// A bounded, lock-free pool of equally sized byte buffers.
///
/// Buffers are not tracked individually: anything of the right length can
/// be returned, and anything the pool cannot hold is dropped.
pub struct BufferPool {
    name: &'static str,
    buffer_size: usize,
    capacity: usize,
    zero_on_return: bool,
    tx: Sender<BytesMut>,
    rx: Receiver<BytesMut>,
    hits: AtomicU64,
    misses: AtomicU64,
    rejected_returns: AtomicU64,
}

impl BufferPool {
    /// Create an empty pool.
    pub fn new(name: &'static str, buffer_size: usize, capacity: usize, zero_on_return: bool) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self {
            name,
            buffer_size,
            capacity,
            zero_on_return,
            tx,
            rx,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            rejected_returns: AtomicU64::new(0),
        }
    }

    /// Take a buffer from the pool, allocating when the pool is empty.
    ///
    /// The returned buffer is always `buffer_size` bytes long.
    pub fn rent(&self) -> BytesMut {
        match self.rx.try_recv() {
            Ok(buffer) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                buffer
            }
            Err(_) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(pool = self.name, "Pool empty, allocating");
                BytesMut::zeroed(self.buffer_size)
            }
        }
    }

    /// Hand a buffer back. Returns false if it was dropped instead.
    pub fn give_back(&self, mut buffer: BytesMut) -> bool {
        if buffer.len() != self.buffer_size || self.rx.len() >= self.capacity {
            self.rejected_returns.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        if self.zero_on_return {
            buffer.fill(0);
        }

        // Another thread may have filled the last slot since the length check.
        if self.tx.try_send(buffer).is_err() {
            self.rejected_returns.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        true
    }

    /// Discard pooled buffers until at most `floor` remain.
    pub fn shrink_to(&self, floor: usize) -> usize {
        let mut released = 0;
        while self.rx.len() > floor {
            if self.rx.try_recv().is_err() {
                break;
            }
            released += 1;
        }

        if released > 0 {
            debug!(pool = self.name, released, floor, "Shrunk buffer pool");
        }
        released
    }

    /// Discard every pooled buffer.
    pub fn clear(&self) -> usize {
        self.shrink_to(0)
    }

    /// Buffers currently held.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// True when no buffers are pooled.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Length of every buffer this pool hands out.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Maximum number of buffers held at once.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current statistics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            buffer_size: self.buffer_size,
            pooled: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            rejected_returns: self.rejected_returns.load(Ordering::Relaxed),
        }
    }

    /// Zero the hit/miss/reject counters.
    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.rejected_returns.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SMALL: usize = 4096;

    #[test]
    fn empty_pool_allocates_fresh_buffer() {
        let pool = BufferPool::new("small", SMALL, 20, true);
        let buffer = pool.rent();

        assert_eq!(buffer.len(), SMALL);
        assert_eq!(pool.stats().misses, 1);
        assert_eq!(pool.stats().hits, 0);
    }

    #[test]
    fn returned_buffer_is_reused() {
        let pool = BufferPool::new("small", SMALL, 20, true);
        assert!(pool.give_back(pool.rent()));
        assert_eq!(pool.len(), 1);

        let _ = pool.rent();
        assert_eq!(pool.stats().hits, 1);
        assert!(pool.is_empty());
    }

    #[test]
    fn small_buffers_are_zeroed_on_return() {
        let pool = BufferPool::new("small", SMALL, 20, true);
        let mut buffer = pool.rent();
        buffer.fill(0xAB);
        assert!(pool.give_back(buffer));

        let reused = pool.rent();
        assert!(reused.iter().all(|&b| b == 0));
    }

    #[test]
    fn large_buffers_keep_their_contents() {
        let pool = BufferPool::new("large", 1024, 20, false);
        let mut buffer = pool.rent();
        buffer[0] = 7;
        assert!(pool.give_back(buffer));

        assert_eq!(pool.rent()[0], 7);
    }

    #[test]
    fn wrong_size_is_rejected() {
        let pool = BufferPool::new("small", SMALL, 20, true);
        assert!(!pool.give_back(BytesMut::zeroed(SMALL - 1)));
        assert!(!pool.give_back(BytesMut::zeroed(SMALL * 2)));
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.stats().rejected_returns, 2);
    }

    #[test]
    fn excess_returns_are_dropped_at_capacity() {
        let pool = BufferPool::new("small", SMALL, 20, true);
        for _ in 0..25 {
            pool.give_back(BytesMut::zeroed(SMALL));
        }
        assert_eq!(pool.len(), 20);
        assert_eq!(pool.stats().rejected_returns, 5);
    }

    #[test]
    fn shrink_discards_down_to_floor() {
        let pool = BufferPool::new("large", 1024, 20, false);
        for _ in 0..20 {
            pool.give_back(BytesMut::zeroed(1024));
        }

        assert_eq!(pool.shrink_to(2), 18);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.shrink_to(5), 0);
        assert_eq!(pool.clear(), 2);
        assert!(pool.is_empty());
    }

    #[test]
    fn concurrent_returns_never_exceed_capacity() {
        let pool = std::sync::Arc::new(BufferPool::new("small", 64, 20, true));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = std::sync::Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let buffer = pool.rent();
                        pool.give_back(buffer);
                        pool.give_back(BytesMut::zeroed(64));
                        assert!(pool.len() <= 20);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(pool.len() <= 20);
    }

    proptest! {
        /// Occupancy stays within the cap for any rent/return sequence.
        #[test]
        fn occupancy_never_exceeds_cap(ops in proptest::collection::vec(any::<bool>(), 0..200)) {
            let pool = BufferPool::new("small", 32, 20, true);
            let mut outstanding = Vec::new();

            for rent in ops {
                if rent {
                    outstanding.push(pool.rent());
                } else if let Some(buffer) = outstanding.pop() {
                    pool.give_back(buffer);
                } else {
                    pool.give_back(BytesMut::zeroed(32));
                }
                prop_assert!(pool.len() <= 20);
            }
        }
    }
}
