use crate::backend::{BlendSetup, Completion, ComputeBackend};
use crate::{BackendType, Blender, Copier, Error, GeoMapper, Result};
use pano_core::CopyArea;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod blend;
mod copy;
mod geomap;

pub use blend::CpuBlender;
pub use copy::CpuCopier;
pub use geomap::CpuGeoMapper;

/// Runs every unit's work on one dedicated rayon pool.
#[derive(Clone)]
pub struct CpuBackend {
    pool: Arc<rayon::ThreadPool>,
    num_threads: usize,
}

impl CpuBackend {
    pub fn new(num_threads: usize) -> Result<Self> {
        let num_threads = num_threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("pano-cpu-{}", i))
            .build()
            .map_err(|e| Error::BackendNotAvailable(format!("cpu pool: {}", e)))?;

        Ok(Self {
            pool: Arc::new(pool),
            num_threads,
        })
    }

    /// Pool sized like the global rayon pool.
    pub fn with_default_threads() -> Result<Self> {
        Self::new(rayon::current_num_threads())
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    fn queue(&self, label: String) -> JobQueue {
        JobQueue {
            pool: self.pool.clone(),
            terminated: Arc::new(AtomicBool::new(false)),
            label,
        }
    }
}

impl ComputeBackend for CpuBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Cpu
    }

    fn name(&self) -> &str {
        "CPU"
    }

    fn create_geo_mapper(
        &self,
        camera: usize,
        output_size: (u32, u32),
    ) -> Result<Box<dyn GeoMapper>> {
        let queue = self.queue(format!("geomap-{}", camera));
        let mapper = CpuGeoMapper::new(camera, output_size, queue)?;
        Ok(Box::new(mapper))
    }

    fn create_blender(&self, pair: usize, setup: BlendSetup) -> Result<Box<dyn Blender>> {
        let blender = CpuBlender::new(pair, setup, self.queue(format!("blender-{}", pair)))?;
        Ok(Box::new(blender))
    }

    fn create_copier(&self, index: usize, area: CopyArea) -> Result<Box<dyn Copier>> {
        let copier = CpuCopier::new(index, area, self.queue(format!("copier-{}", index)))?;
        Ok(Box::new(copier))
    }
}

/// Work submission shared by the CPU units.
///
/// After `terminate`, new submissions are refused and queued jobs complete
/// with `Error::Terminated` instead of running.
pub(crate) struct JobQueue {
    pool: Arc<rayon::ThreadPool>,
    terminated: Arc<AtomicBool>,
    label: String,
}

impl JobQueue {
    pub(crate) fn submit<P, F>(&self, mut params: P, done: Completion<P>, work: F) -> Result<()>
    where
        P: Send + 'static,
        F: FnOnce(&mut P) -> Result<()> + Send + 'static,
    {
        if self.is_terminated() {
            return Err(Error::Terminated(self.label.clone()));
        }

        let terminated = self.terminated.clone();
        let label = self.label.clone();
        self.pool.spawn(move || {
            let status = if terminated.load(Ordering::Acquire) {
                Err(Error::Terminated(label))
            } else {
                work(&mut params)
            };
            done(params, status);
        });
        Ok(())
    }

    pub(crate) fn terminate(&self) {
        if !self.terminated.swap(true, Ordering::AcqRel) {
            tracing::debug!(unit = %self.label, "terminated");
        }
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_queue_runs_work_then_completion() {
        let backend = CpuBackend::new(2).unwrap();
        let queue = backend.queue("test".into());
        let (tx, rx) = mpsc::channel();

        queue
            .submit(
                1u32,
                Box::new(move |p, status| tx.send((p, status.is_ok())).unwrap()),
                |p| {
                    *p += 1;
                    Ok(())
                },
            )
            .unwrap();

        assert_eq!(rx.recv().unwrap(), (2, true));
    }

    #[test]
    fn test_terminated_queue_refuses_work() {
        let backend = CpuBackend::new(1).unwrap();
        let queue = backend.queue("test".into());
        queue.terminate();
        queue.terminate();

        let res = queue.submit(0u32, Box::new(|_, _| {}), |_| Ok(()));
        assert!(matches!(res, Err(Error::Terminated(_))));
    }
}
