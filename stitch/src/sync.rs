//! Blend gating: a pair's blend runs once both of its slices are ready.

use pano_core::CameraRing;
use std::sync::atomic::{AtomicU32, Ordering};

/// Geomap completions a pair waits for.
pub const PAIR_SYNC_TARGET: u32 = 2;

/// Completion counter of one camera pair.
#[derive(Debug, Default)]
pub struct PairSync {
    count: AtomicU32,
}

impl PairSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one contribution. Returns `true` for exactly the increment that
    /// reaches the target, which also resets the counter in the same step.
    pub fn increment(&self) -> bool {
        let mut cur = self.count.load(Ordering::Acquire);
        loop {
            let next = if cur + 1 >= PAIR_SYNC_TARGET { 0 } else { cur + 1 };
            match self
                .count
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next == 0,
                Err(actual) => cur = actual,
            }
        }
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }
}

/// One `PairSync` per adjacent pair of a ring.
#[derive(Debug)]
pub struct PairSyncSet {
    ring: CameraRing,
    pairs: Vec<PairSync>,
}

impl PairSyncSet {
    pub fn new(ring: CameraRing) -> Self {
        Self {
            ring,
            pairs: ring.cameras().map(|_| PairSync::new()).collect(),
        }
    }

    /// Record `camera`'s slice as ready and return the pairs whose blend may now run.
    ///
    /// The pair where `camera` is the right contributor is counted first.
    pub fn on_geomap_done(&self, camera: usize) -> Vec<usize> {
        self.ring
            .pairs_of(camera)
            .into_iter()
            .filter(|&pair| self.pairs[pair].increment())
            .collect()
    }

    pub fn count(&self, pair: usize) -> u32 {
        self.pairs[pair].count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_increment_fires_and_resets() {
        let s = PairSync::new();
        assert!(!s.increment());
        assert_eq!(s.count(), 1);
        assert!(s.increment());
        assert_eq!(s.count(), 0);
        assert!(!s.increment());
    }

    #[test]
    fn test_ring_of_two_fires_both_pairs_on_second_camera() {
        let set = PairSyncSet::new(CameraRing::new(2).unwrap());
        assert!(set.on_geomap_done(0).is_empty());
        assert_eq!(set.on_geomap_done(1), vec![0, 1]);
        assert_eq!(set.count(0), 0);
        assert_eq!(set.count(1), 0);
    }

    #[test]
    fn test_neighbors_fire_shared_pair() {
        let set = PairSyncSet::new(CameraRing::new(4).unwrap());
        assert!(set.on_geomap_done(1).is_empty());
        assert_eq!(set.on_geomap_done(2), vec![1]);
        assert_eq!(set.on_geomap_done(0), vec![0]);
        assert_eq!(set.on_geomap_done(3), vec![2, 3]);
    }
}
