use crate::Result;
use core_affinity::CoreId;

/// Private thread pool for work that must not compete with the compute units,
/// such as feature matching between frames.
#[derive(Debug)]
pub struct Executor {
    name: String,
    pool: rayon::ThreadPool,
}

impl Executor {
    pub fn new(name: &str, num_threads: usize) -> Result<Self> {
        Self::with_cores(name, num_threads, None)
    }

    /// Executor whose workers are pinned round-robin onto `cores`.
    pub fn with_cores(name: &str, num_threads: usize, cores: Option<Vec<usize>>) -> Result<Self> {
        let name_clone = name.to_string();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .thread_name(move |idx| format!("{}-{}", name_clone, idx))
            .start_handler(move |i| {
                if let Some(ref cores) = cores {
                    if let Some(&id) = cores.get(i % cores.len().max(1)) {
                        if !core_affinity::set_for_current(CoreId { id }) {
                            tracing::warn!(worker = i, core = id, "core pinning refused");
                        }
                    }
                }
            })
            .build()
            .map_err(|e| {
                crate::Error::RuntimeError(format!("Failed to build thread pool: {}", e))
            })?;

        Ok(Self {
            name: name.to_string(),
            pool,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn spawn<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(f);
    }
}
