use crate::config::StitcherConfig;
use crate::dewarp::{table_size, PolyBowlDewarp, TableGenerator};
use crate::error::{Result, StitchError};
use crate::feedback::{correction_model, FeedbackState, PendingCorrection};
use crate::frame::{FrameHandle, StitchedFrame};
use crate::layout::RingLayout;
use pano_core::{CameraRing, Factor, FrameInfo, VideoFrame};
use pano_features::{FeatureMatch, FmConfig};
use pano_hal::{
    shared_frame, BlendSetup, Blender, ComputeBackend, Copier, CpuBackend, GeoMapper, SharedFrame,
};
use pano_runtime::{Executor, FrameArena, FrameId, SlicePool};
use parking_lot::Mutex;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Builds the matcher for one camera pair.
pub type MatcherFactory = Arc<dyn Fn(usize, &FmConfig) -> Box<dyn FeatureMatch> + Send + Sync>;

pub(crate) type SharedMatcher = Arc<Mutex<Box<dyn FeatureMatch>>>;

fn config_err(what: &str, e: impl Display) -> StitchError {
    StitchError::Config(format!("{}: {}", what, e))
}

pub struct StitcherBuilder {
    config: StitcherConfig,
    backend: Option<Arc<dyn ComputeBackend>>,
    matcher_factory: Option<MatcherFactory>,
    table_generator: Option<Arc<dyn TableGenerator>>,
}

impl StitcherBuilder {
    pub fn new(config: StitcherConfig) -> Self {
        Self {
            config,
            backend: None,
            matcher_factory: None,
            table_generator: None,
        }
    }

    /// Compute backend for every unit. Defaults to [`CpuBackend`].
    pub fn with_backend(mut self, backend: Arc<dyn ComputeBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Replace the built-in matcher. Lets feature matching run in builds
    /// without the `feature-match` feature.
    pub fn with_matcher_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(usize, &FmConfig) -> Box<dyn FeatureMatch> + Send + Sync + 'static,
    {
        self.matcher_factory = Some(Arc::new(factory));
        self
    }

    /// Dewarp table source. Defaults to [`PolyBowlDewarp`].
    pub fn with_table_generator<G>(mut self, generator: G) -> Self
    where
        G: TableGenerator + 'static,
    {
        self.table_generator = Some(Arc::new(generator));
        self
    }

    pub fn build(self) -> Result<Stitcher> {
        let config = self.config;
        config.check(self.matcher_factory.is_none())?;
        let threads = config.resolved_worker_threads()?;

        let ring = CameraRing::new(config.camera_num).map_err(|e| config_err(&config.name, e))?;
        let output_size = config.output_size();
        let layout = match &config.layout {
            Some(supplied) => {
                supplied.validate(ring, output_size)?;
                supplied.clone()
            }
            None => RingLayout::estimate(
                output_size,
                &config.viewpoint_ranges(),
                config.slice_alignment,
            )?,
        };

        let backend: Arc<dyn ComputeBackend> = match self.backend {
            Some(b) => b,
            None => Arc::new(CpuBackend::new(threads).map_err(|e| config_err("cpu backend", e))?),
        };
        let generator: Arc<dyn TableGenerator> = match self.table_generator {
            Some(g) => g,
            None => Arc::new(PolyBowlDewarp),
        };
        let infos = config.camera_infos();

        let output_info = FrameInfo::aligned(
            output_size.0,
            output_size.1,
            config.channels,
            config.alignment_x,
            config.alignment_y,
        );

        let mut pools = Vec::with_capacity(ring.len());
        let mut mappers = Vec::with_capacity(ring.len());
        for cam in ring.cameras() {
            let slice = layout.slices[cam];
            let info = FrameInfo::aligned(
                slice.width,
                slice.height,
                config.channels,
                config.alignment_x,
                config.alignment_y,
            );
            let pool_name = format!("{}-slice-{}", config.name, cam);
            let pool = SlicePool::new(pool_name, info, config.pool_capacity)?;
            pools.push(Arc::new(pool));

            let mapper = backend
                .create_geo_mapper(cam, (slice.width, slice.height))
                .map_err(|e| config_err(&format!("geomap {}", cam), e))?;
            let size = table_size(&slice);
            let table = generator.generate(cam, &infos[cam], &slice, &config.bowl, size)?;
            mapper
                .set_lookup_table(table)
                .map_err(|e| config_err(&format!("geomap {}", cam), e))?;
            mappers.push(mapper);
        }

        let mut blenders = Vec::with_capacity(ring.len());
        for pair in ring.cameras() {
            let overlap = layout.overlaps[pair];
            let setup = BlendSetup {
                output_size,
                merge_window: overlap.out_area,
                left_area: overlap.left,
                right_area: overlap.right,
            };
            let blender = backend
                .create_blender(pair, setup)
                .map_err(|e| config_err(&format!("blender {}", pair), e))?;
            blenders.push(blender);
        }

        let mut copiers = Vec::with_capacity(layout.copy_areas.len());
        for (index, area) in layout.copy_areas.iter().enumerate() {
            let copier = backend
                .create_copier(index, *area)
                .map_err(|e| config_err(&format!("copier {}", index), e))?;
            copiers.push(copier);
        }

        let feedback = FeedbackState::new(ring.len(), correction_model(config.scale_mode)?);

        let (matchers, executor) = if config.fm_mode.is_enabled() {
            let factory = match self.matcher_factory {
                Some(f) => f,
                None => builtin_matcher_factory()?,
            };
            let matchers: Vec<SharedMatcher> = ring
                .cameras()
                .map(|pair| Arc::new(Mutex::new(factory(pair, &config.fm_config))))
                .collect();
            let executor = Executor::with_cores(
                &format!("{}-fm", config.name),
                threads.min(ring.len()),
                config.fm_cores.clone(),
            )?;
            (matchers, Some(executor))
        } else {
            (Vec::new(), None)
        };

        tracing::info!(
            name = %config.name,
            cameras = ring.len(),
            width = output_size.0,
            height = output_size.1,
            copies = layout.copy_areas.len(),
            backend = backend.name(),
            threads,
            feature_match = config.fm_mode.is_enabled(),
            "stitcher configured"
        );

        Ok(Stitcher {
            shared: Arc::new(Shared {
                config,
                ring,
                layout,
                output_info,
                backend,
                mappers,
                blenders,
                copiers,
                pools,
                arena: FrameArena::new(),
                feedback,
                matchers,
                executor,
                next_frame: AtomicU64::new(0),
                stopped: AtomicBool::new(false),
            }),
        })
    }
}

#[cfg(feature = "feature-match")]
fn builtin_matcher_factory() -> Result<MatcherFactory> {
    use pano_features::DefaultFeatureMatch;
    Ok(Arc::new(|_pair: usize, config: &FmConfig| {
        Box::new(DefaultFeatureMatch::new(config.clone())) as Box<dyn FeatureMatch>
    }))
}

#[cfg(not(feature = "feature-match"))]
fn builtin_matcher_factory() -> Result<MatcherFactory> {
    Err(StitchError::Unsupported(
        "built without feature-match and no matcher factory supplied".to_string(),
    ))
}

/// State shared by the stitcher and its in-flight frames.
pub(crate) struct Shared {
    pub(crate) config: StitcherConfig,
    pub(crate) ring: CameraRing,
    pub(crate) layout: RingLayout,
    pub(crate) output_info: FrameInfo,
    backend: Arc<dyn ComputeBackend>,
    pub(crate) mappers: Vec<Box<dyn GeoMapper>>,
    pub(crate) blenders: Vec<Box<dyn Blender>>,
    pub(crate) copiers: Vec<Box<dyn Copier>>,
    pub(crate) pools: Vec<Arc<SlicePool>>,
    pub(crate) arena: FrameArena,
    pub(crate) feedback: FeedbackState,
    pub(crate) matchers: Vec<SharedMatcher>,
    pub(crate) executor: Option<Executor>,
    next_frame: AtomicU64,
    stopped: AtomicBool,
}

impl Shared {
    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn next_frame_id(&self) -> FrameId {
        self.next_frame.fetch_add(1, Ordering::Relaxed)
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        for mapper in &self.mappers {
            mapper.terminate();
        }
        for blender in &self.blenders {
            blender.terminate();
        }
        for copier in &self.copiers {
            copier.terminate();
        }
        let released = self.arena.release_all();
        for pool in &self.pools {
            pool.shutdown();
        }
        tracing::info!(name = %self.config.name, released, "stitcher stopped");
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Surround-view stitcher for one camera ring.
///
/// Cloning is cheap; clones drive the same pipeline.
#[derive(Clone)]
pub struct Stitcher {
    shared: Arc<Shared>,
}

impl Stitcher {
    pub fn new(config: StitcherConfig) -> Result<Self> {
        StitcherBuilder::new(config).build()
    }

    pub fn builder(config: StitcherConfig) -> StitcherBuilder {
        StitcherBuilder::new(config)
    }

    /// Start a frame. Fails with a retryable error while an earlier frame
    /// still holds every slice buffer.
    pub fn submit(&self, inputs: Vec<VideoFrame>) -> Result<FrameHandle> {
        self.submit_shared(inputs.into_iter().map(shared_frame).collect())
    }

    pub fn submit_shared(&self, inputs: Vec<SharedFrame>) -> Result<FrameHandle> {
        FrameHandle::start(self.shared.clone(), inputs)
    }

    pub fn stitch(&self, inputs: Vec<VideoFrame>) -> Result<StitchedFrame> {
        self.submit(inputs)?.wait()
    }

    pub async fn stitch_async(&self, inputs: Vec<VideoFrame>) -> Result<StitchedFrame> {
        let stitcher = self.clone();
        tokio::task::spawn_blocking(move || stitcher.stitch(inputs))
            .await
            .map_err(|e| StitchError::Dispatch(format!("stitch task failed: {}", e)))?
    }

    /// Terminate every unit and return all buffers. Idempotent.
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    /// Persistent dewarp factor of `camera`; `Factor::ZERO` until its first geomap.
    pub fn geomap_factor(&self, camera: usize) -> Option<Factor> {
        (camera < self.shared.ring.len()).then(|| self.shared.feedback.factor(camera))
    }

    pub fn pending_correction(&self, camera: usize) -> Option<PendingCorrection> {
        (camera < self.shared.ring.len()).then(|| self.shared.feedback.pending(camera))
    }

    /// Slice buffers currently held by frames.
    pub fn outstanding_buffers(&self) -> usize {
        self.shared.pools.iter().map(|p| p.outstanding()).sum()
    }

    pub fn layout(&self) -> &RingLayout {
        &self.shared.layout
    }

    pub fn config(&self) -> &StitcherConfig {
        &self.shared.config
    }

    pub fn camera_num(&self) -> usize {
        self.shared.ring.len()
    }

    pub fn output_info(&self) -> FrameInfo {
        self.shared.output_info
    }

    pub fn backend_name(&self) -> &str {
        self.shared.backend.name()
    }
}

impl std::fmt::Debug for Stitcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stitcher")
            .field("name", &self.shared.config.name)
            .field("cameras", &self.shared.ring.len())
            .field("backend", &self.shared.backend.name())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
