use crate::pool::SlicePool;
use dashmap::DashMap;
use pano_hal::SharedFrame;
use std::sync::Arc;

/// Sequence number a stitcher assigns to each submitted frame.
pub type FrameId = u64;

struct Lease {
    pool: Arc<SlicePool>,
    buffer: SharedFrame,
}

/// Pool buffers currently held by in-flight frames, keyed by `(frame, slot)`.
///
/// Releasing through the arena is idempotent: a slot already returned is a no-op,
/// so a late completion racing a `stop` can never double-release.
#[derive(Default)]
pub struct FrameArena {
    leases: DashMap<(FrameId, usize), Lease>,
}

impl FrameArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `buffer` as acquired from `pool` for `slot` of `frame`.
    pub fn insert(&self, frame: FrameId, slot: usize, pool: Arc<SlicePool>, buffer: SharedFrame) {
        if let Some(old) = self.leases.insert((frame, slot), Lease { pool, buffer }) {
            tracing::warn!(frame, slot, "slot leased twice, returning previous buffer");
            old.pool.release(old.buffer);
        }
    }

    pub fn get(&self, frame: FrameId, slot: usize) -> Option<SharedFrame> {
        self.leases.get(&(frame, slot)).map(|l| l.buffer.clone())
    }

    /// Return one slot's buffer to its pool. `false` when nothing was held.
    pub fn release(&self, frame: FrameId, slot: usize) -> bool {
        match self.leases.remove(&(frame, slot)) {
            Some((_, lease)) => {
                lease.pool.release(lease.buffer);
                true
            }
            None => false,
        }
    }

    pub fn release_frame(&self, frame: FrameId) -> usize {
        let keys: Vec<_> = self
            .leases
            .iter()
            .filter(|e| e.key().0 == frame)
            .map(|e| *e.key())
            .collect();
        keys.into_iter().filter(|&(f, s)| self.release(f, s)).count()
    }

    pub fn release_all(&self) -> usize {
        let keys: Vec<_> = self.leases.iter().map(|e| *e.key()).collect();
        keys.into_iter().filter(|&(f, s)| self.release(f, s)).count()
    }

    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pano_core::FrameInfo;

    fn pool() -> Arc<SlicePool> {
        Arc::new(SlicePool::new("p", FrameInfo::new(4, 4, 1), 2).unwrap())
    }

    #[test]
    fn test_release_is_idempotent() {
        let p = pool();
        let arena = FrameArena::new();
        arena.insert(1, 0, p.clone(), p.acquire().unwrap());
        assert_eq!(p.outstanding(), 1);

        assert!(arena.release(1, 0));
        assert!(!arena.release(1, 0));
        assert_eq!(p.outstanding(), 0);
    }

    #[test]
    fn test_release_frame_only_touches_that_frame() {
        let p = pool();
        let arena = FrameArena::new();
        arena.insert(1, 0, p.clone(), p.acquire().unwrap());
        arena.insert(2, 0, p.clone(), p.acquire().unwrap());

        assert_eq!(arena.release_frame(1), 1);
        assert!(arena.get(2, 0).is_some());
        assert_eq!(arena.release_all(), 1);
        assert!(arena.is_empty());
        assert_eq!(p.outstanding(), 0);
    }
}
