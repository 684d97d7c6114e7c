use crate::{Error, Result};
use pano_core::{FrameInfo, VideoFrame};
use pano_hal::{shared_frame, SharedFrame};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Fixed-capacity pool of equally sized frame buffers.
///
/// `acquire` never blocks: with every buffer outstanding it fails with
/// `Error::ResourceExhausted` and the caller decides whether to retry.
pub struct SlicePool {
    name: String,
    info: FrameInfo,
    capacity: usize,
    free: Mutex<Vec<SharedFrame>>,
    outstanding: AtomicUsize,
    shut_down: AtomicBool,
}

impl SlicePool {
    pub fn new(name: impl Into<String>, info: FrameInfo, capacity: usize) -> Result<Self> {
        let name = name.into();
        if capacity == 0 || info.is_empty() {
            return Err(Error::RuntimeError(format!(
                "pool {} needs a non-empty buffer and capacity, got {}x{}x{} * {}",
                name, info.width, info.height, info.channels, capacity
            )));
        }

        let free = (0..capacity).map(|_| shared_frame(VideoFrame::new(info))).collect();
        Ok(Self {
            name,
            info,
            capacity,
            free: Mutex::new(free),
            outstanding: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frame_info(&self) -> FrameInfo {
        self.info
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn acquire(&self) -> Result<SharedFrame> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(Error::PoolShutdown(self.name.clone()));
        }

        let mut free = self.free.lock();
        match free.pop() {
            Some(buf) => {
                self.outstanding.fetch_add(1, Ordering::AcqRel);
                Ok(buf)
            }
            None => Err(Error::ResourceExhausted {
                pool: self.name.clone(),
                capacity: self.capacity,
            }),
        }
    }

    /// Return a buffer obtained from `acquire`.
    pub fn release(&self, buf: SharedFrame) {
        let mut free = self.free.lock();
        if self.outstanding.load(Ordering::Acquire) == 0 {
            tracing::warn!(pool = %self.name, "release without outstanding buffer ignored");
            return;
        }
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        if !self.shut_down.load(Ordering::Acquire) {
            free.push(buf);
        }
    }

    /// Drop idle buffers and refuse further acquires. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.free.lock().clear();
        tracing::debug!(pool = %self.name, outstanding = self.outstanding(), "pool shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for SlicePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlicePool")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(capacity: usize) -> SlicePool {
        SlicePool::new("slice-0", FrameInfo::aligned(30, 10, 3, 16, 4), capacity).unwrap()
    }

    #[test]
    fn test_single_buffer_pool_exhausts() {
        let p = pool(1);
        let buf = p.acquire().unwrap();
        assert_eq!(p.outstanding(), 1);

        let err = p.acquire().unwrap_err();
        assert!(err.is_retryable());

        p.release(buf);
        assert_eq!(p.outstanding(), 0);
        assert!(p.acquire().is_ok());
    }

    #[test]
    fn test_buffers_are_aligned() {
        let p = pool(2);
        let buf = p.acquire().unwrap();
        let info = buf.read().info();
        assert_eq!(info.aligned_width, 32);
        assert_eq!(info.aligned_height, 12);
    }

    #[test]
    fn test_shutdown_refuses_and_accepts_late_release() {
        let p = pool(2);
        let buf = p.acquire().unwrap();
        p.shutdown();
        p.shutdown();

        assert!(matches!(p.acquire(), Err(Error::PoolShutdown(_))));
        p.release(buf);
        assert_eq!(p.outstanding(), 0);
    }

    #[test]
    fn test_extra_release_is_ignored() {
        let p = pool(1);
        let stray = shared_frame(VideoFrame::new(p.frame_info()));
        p.release(stray);
        assert_eq!(p.outstanding(), 0);
        assert!(p.acquire().is_ok());
        assert!(p.acquire().is_err());
    }
}
