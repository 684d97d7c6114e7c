use rayon::ThreadPoolBuilder;
use std::env;
use std::sync::OnceLock;

/// Environment variable overriding worker thread counts.
pub const THREADS_ENV: &str = "PANO_CPU_THREADS";

static THREAD_POOL_INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Initialize the global Rayon pool used by table generation and other CPU work.
///
/// Priority:
/// 1. `num_threads` argument
/// 2. `PANO_CPU_THREADS` environment variable
/// 3. Rayon default
pub fn init_global_thread_pool(num_threads: Option<usize>) -> Result<(), String> {
    THREAD_POOL_INIT
        .get_or_init(|| {
            let configured = match num_threads {
                Some(n) => Some(n),
                None => threads_from_env()?,
            };

            let mut builder = ThreadPoolBuilder::new();
            if let Some(n) = configured {
                if n == 0 {
                    return Err(format!("{} must be >= 1", THREADS_ENV));
                }
                builder = builder.num_threads(n);
            }
            builder.build_global().map_err(|e| e.to_string())
        })
        .clone()
}

/// Parse `PANO_CPU_THREADS`, `Ok(None)` when unset.
pub fn threads_from_env() -> Result<Option<usize>, String> {
    let raw = match env::var(THREADS_ENV) {
        Ok(v) => v,
        Err(env::VarError::NotPresent) => return Ok(None),
        Err(e) => return Err(format!("failed to read {}: {e}", THREADS_ENV)),
    };

    let parsed: usize = raw
        .trim()
        .parse()
        .map_err(|_| format!("{} must be a positive integer, got '{raw}'", THREADS_ENV))?;
    if parsed == 0 {
        return Err(format!("{} must be >= 1", THREADS_ENV));
    }
    Ok(Some(parsed))
}
