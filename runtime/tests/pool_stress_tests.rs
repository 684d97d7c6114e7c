use pano_core::FrameInfo;
use pano_runtime::{FrameArena, SlicePool};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn stress_test_concurrent_acquire_release() {
    let pool = Arc::new(SlicePool::new("stress", FrameInfo::new(16, 16, 1), 3).unwrap());
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            let b = barrier.clone();
            thread::spawn(move || {
                b.wait();
                let mut got = 0;
                for _ in 0..200 {
                    if let Ok(buf) = pool.acquire() {
                        assert!(pool.outstanding() <= pool.capacity());
                        got += 1;
                        thread::yield_now();
                        pool.release(buf);
                    }
                }
                got
            })
        })
        .collect();

    let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(total > 0);
    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn stress_test_arena_release_races_release_all() {
    let pool = Arc::new(SlicePool::new("arena", FrameInfo::new(8, 8, 1), 64).unwrap());
    let arena = Arc::new(FrameArena::new());
    for frame in 0..64u64 {
        arena.insert(frame, 0, pool.clone(), pool.acquire().unwrap());
    }

    let a = arena.clone();
    let releaser = thread::spawn(move || (0..64u64).filter(|&f| a.release(f, 0)).count());
    let swept = arena.release_all();
    let released = releaser.join().unwrap();

    assert_eq!(released + swept, 64);
    assert_eq!(pool.outstanding(), 0);
}
