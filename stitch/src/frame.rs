//! One frame's trip through the pipeline.
//!
//! Unit completions are posted as events on the frame's channel and handled
//! on the thread that drives the handle, so every cross-stage decision
//! (blend gating, copy dispatch, buffer release) happens in one place.

use crate::error::{Result, StitchError};
use crate::feedback::{feature_crop, pair_correction, PairCorrection};
use crate::stitcher::Shared;
use crate::sync::PairSyncSet;
use pano_core::{FrameInfo, VideoFrame};
use pano_hal::{shared_frame, BlendParams, CopyParams, GeoMapParams, SharedFrame};
use pano_runtime::FrameId;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

pub(crate) enum Event {
    GeoMapDone {
        params: GeoMapParams,
        status: pano_hal::Result<()>,
    },
    BlendDone {
        params: BlendParams,
        status: pano_hal::Result<()>,
    },
    CopyDone {
        index: usize,
        status: pano_hal::Result<()>,
    },
    FeedbackDone {
        pair: usize,
        outcome: Result<PairCorrection>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// Geomaps in flight, no blend yet.
    Dispatched,
    Blending,
    /// Every blend finished; copies or feedback still running.
    Copying,
    Complete,
}

/// Result of a completed frame.
#[derive(Debug, Clone)]
pub struct StitchedFrame {
    pub frame_id: FrameId,
    pub image: VideoFrame,
    /// Blend dispatches per pair; exactly one each for a good frame.
    pub blends_per_pair: Vec<u32>,
    pub copies: usize,
    /// Corrections measured on this frame, applied from the next one.
    pub corrections: Vec<PairCorrection>,
}

struct FrameContext {
    id: FrameId,
    inputs: Vec<SharedFrame>,
    slices: Vec<SharedFrame>,
    output: SharedFrame,
    syncs: PairSyncSet,
    /// Outstanding blend/copy/measurement readers of each camera's slice.
    consumers: Vec<usize>,
    pending: usize,
    blends_per_pair: Vec<u32>,
    blends_done: usize,
    copies_done: usize,
    corrections: Vec<PairCorrection>,
    error: Option<StitchError>,
    abandoned: bool,
}

/// In-flight frame. `wait` drives it to completion; dropping it drains its
/// units and returns its buffers without producing output.
pub struct FrameHandle {
    shared: Arc<Shared>,
    ctx: FrameContext,
    tx: Sender<Event>,
    rx: Receiver<Event>,
    finished: bool,
}

impl std::fmt::Debug for FrameHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHandle")
            .field("frame_id", &self.ctx.id)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl FrameHandle {
    pub(crate) fn start(shared: Arc<Shared>, inputs: Vec<SharedFrame>) -> Result<Self> {
        let n = shared.ring.len();
        if inputs.len() != n {
            return Err(StitchError::InvalidInput(format!(
                "expected {} input frames, got {}",
                n,
                inputs.len()
            )));
        }
        for (cam, input) in inputs.iter().enumerate() {
            let info = input.read().info();
            if info.is_empty() || info.channels != shared.config.channels {
                return Err(StitchError::InvalidInput(format!(
                    "camera {} input {}x{}x{} does not match {} channels",
                    cam, info.width, info.height, info.channels, shared.config.channels
                )));
            }
        }
        if shared.is_stopped() {
            return Err(StitchError::Stopped);
        }

        let id = shared.next_frame_id();
        let mut slices = Vec::with_capacity(n);
        for cam in shared.ring.cameras() {
            match shared.pools[cam].acquire() {
                Ok(buf) => {
                    shared.arena.insert(id, cam, shared.pools[cam].clone(), buf.clone());
                    slices.push(buf);
                }
                Err(e) => {
                    shared.arena.release_frame(id);
                    tracing::debug!(frame = id, camera = cam, "slice pool busy");
                    return Err(e.into());
                }
            }
        }

        let consumers = shared
            .ring
            .cameras()
            .map(|cam| 2 + shared.layout.copies_from(cam).count())
            .collect();
        let (tx, rx) = channel();
        let ctx = FrameContext {
            id,
            inputs,
            slices,
            output: shared_frame(VideoFrame::new(shared.output_info)),
            syncs: PairSyncSet::new(shared.ring),
            consumers,
            pending: 0,
            blends_per_pair: vec![0; n],
            blends_done: 0,
            copies_done: 0,
            corrections: Vec::new(),
            error: None,
            abandoned: false,
        };
        let mut handle = Self {
            shared,
            ctx,
            tx,
            rx,
            finished: false,
        };

        tracing::debug!(frame = id, "dispatching geomaps");
        for cam in 0..n {
            handle.dispatch_geomap(cam);
            if handle.ctx.error.is_some() {
                break;
            }
        }
        if handle.ctx.error.is_some() {
            return Err(handle.abort());
        }
        Ok(handle)
    }

    pub fn frame_id(&self) -> FrameId {
        self.ctx.id
    }

    pub fn phase(&self) -> FramePhase {
        if self.ctx.pending == 0 {
            FramePhase::Complete
        } else if self.ctx.blends_done == self.shared.ring.len() {
            FramePhase::Copying
        } else if self.ctx.blends_per_pair.iter().any(|&b| b > 0) {
            FramePhase::Blending
        } else {
            FramePhase::Dispatched
        }
    }

    /// Handle every completion already posted without blocking and report
    /// where the frame stands.
    pub fn poll(&mut self) -> FramePhase {
        while let Ok(ev) = self.rx.try_recv() {
            self.handle(ev);
        }
        self.phase()
    }

    /// Block until every unit of this frame has completed.
    pub fn wait(mut self) -> Result<StitchedFrame> {
        self.drive();
        self.finish();

        if let Some(err) = self.ctx.error.take() {
            return Err(err);
        }
        let expected_copies = self.shared.layout.copy_areas.len();
        if self.ctx.blends_done != self.shared.ring.len()
            || self.ctx.copies_done != expected_copies
        {
            return Err(StitchError::Dispatch(format!(
                "frame {} incomplete: {} blends, {}/{} copies",
                self.ctx.id, self.ctx.blends_done, self.ctx.copies_done, expected_copies
            )));
        }

        self.ctx.inputs.clear();
        self.ctx.slices.clear();
        let empty = shared_frame(VideoFrame::new(FrameInfo::new(0, 0, 1)));
        let output = std::mem::replace(&mut self.ctx.output, empty);
        let image = match Arc::try_unwrap(output) {
            Ok(lock) => lock.into_inner(),
            Err(still_shared) => still_shared.read().clone(),
        };

        Ok(StitchedFrame {
            frame_id: self.ctx.id,
            image,
            blends_per_pair: std::mem::take(&mut self.ctx.blends_per_pair),
            copies: self.ctx.copies_done,
            corrections: std::mem::take(&mut self.ctx.corrections),
        })
    }

    fn drive(&mut self) {
        while self.ctx.pending > 0 {
            match self.rx.recv() {
                Ok(ev) => self.handle(ev),
                Err(_) => break,
            }
        }
    }

    fn abort(mut self) -> StitchError {
        self.drive();
        self.finish();
        self.ctx
            .error
            .take()
            .unwrap_or_else(|| StitchError::Dispatch(format!("frame {} aborted", self.ctx.id)))
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let released = self.shared.arena.release_frame(self.ctx.id);
        tracing::debug!(
            frame = self.ctx.id,
            released,
            failed = self.ctx.error.is_some(),
            "frame finished"
        );
    }

    fn accepting(&mut self) -> bool {
        if self.ctx.error.is_some() || self.ctx.abandoned {
            return false;
        }
        if self.shared.is_stopped() {
            self.fail(StitchError::Stopped);
            return false;
        }
        true
    }

    fn fail(&mut self, err: StitchError) {
        if self.ctx.error.is_none() {
            if !matches!(err, StitchError::Stopped) {
                tracing::error!(frame = self.ctx.id, error = %err, "frame failed");
            }
            self.ctx.error = Some(err);
        }
    }

    fn fail_unit(&mut self, stage: &str, index: usize, err: pano_hal::Error) {
        let err = match err {
            pano_hal::Error::Terminated(_) => StitchError::Stopped,
            other => StitchError::Dispatch(format!("{} {}: {}", stage, index, other)),
        };
        self.fail(err);
    }

    fn release_consumer(&mut self, camera: usize) {
        let left = &mut self.ctx.consumers[camera];
        *left = left.saturating_sub(1);
        if *left == 0 {
            self.shared.arena.release(self.ctx.id, camera);
        }
    }

    fn release_pair(&mut self, pair: usize) {
        let (l, r) = self.shared.ring.pair_cameras(pair);
        self.release_consumer(l);
        self.release_consumer(r);
    }

    fn dispatch_geomap(&mut self, camera: usize) {
        let factor = self.shared.feedback.next_factor(camera);
        let params = GeoMapParams {
            camera,
            input: self.ctx.inputs[camera].clone(),
            output: self.ctx.slices[camera].clone(),
            factor,
        };
        let tx = self.tx.clone();
        let done = Box::new(move |params: GeoMapParams, status: pano_hal::Result<()>| {
            let _ = tx.send(Event::GeoMapDone { params, status });
        });
        match self.shared.mappers[camera].dispatch(params, done) {
            Ok(()) => self.ctx.pending += 1,
            Err(e) => self.fail_unit("geomap", camera, e),
        }
    }

    fn dispatch_blend(&mut self, pair: usize) {
        let (l, r) = self.shared.ring.pair_cameras(pair);
        let params = BlendParams {
            pair,
            left: self.ctx.slices[l].clone(),
            right: self.ctx.slices[r].clone(),
            output: self.ctx.output.clone(),
        };
        let tx = self.tx.clone();
        let done = Box::new(move |params: BlendParams, status: pano_hal::Result<()>| {
            let _ = tx.send(Event::BlendDone { params, status });
        });
        match self.shared.blenders[pair].dispatch(params, done) {
            Ok(()) => {
                self.ctx.pending += 1;
                self.ctx.blends_per_pair[pair] += 1;
            }
            Err(e) => self.fail_unit("blender", pair, e),
        }
    }

    fn dispatch_copy(&mut self, index: usize, source: usize) {
        let params = CopyParams {
            index,
            source: self.ctx.slices[source].clone(),
            output: self.ctx.output.clone(),
        };
        let tx = self.tx.clone();
        let done = Box::new(move |_: CopyParams, status: pano_hal::Result<()>| {
            let _ = tx.send(Event::CopyDone { index, status });
        });
        match self.shared.copiers[index].dispatch(params, done) {
            Ok(()) => self.ctx.pending += 1,
            Err(e) => self.fail_unit("copier", index, e),
        }
    }

    /// Crop both sides of the blended overlap and measure them off the pipeline
    /// threads. Returns `true` when a measurement was started.
    fn dispatch_feedback(&mut self, pair: usize, params: &BlendParams) -> bool {
        let executor = match self.shared.executor.as_ref() {
            Some(exec) => exec,
            None => return false,
        };
        let overlap = self.shared.layout.overlaps[pair];
        let bowl = &self.shared.config.bowl;
        let left_rect = feature_crop(&overlap.left, bowl);
        let right_rect = feature_crop(&overlap.right, bowl);

        let left = params.left.read().crop_luma(&left_rect);
        let right = params.right.read().crop_luma(&right_rect);
        let (left, right) = match (left, right) {
            (Ok(l), Ok(r)) => (l, r),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(frame = self.ctx.id, pair, error = %e, "feature crop failed");
                return false;
            }
        };

        let matcher = self.shared.matchers[pair].clone();
        let ring = self.shared.ring;
        let centers = self.shared.layout.centers.clone();
        let tx = self.tx.clone();
        executor.spawn(move || {
            let outcome = matcher
                .lock()
                .match_offset(&left, &right)
                .map_err(StitchError::from)
                .and_then(|offset| pair_correction(&ring, pair, &overlap, &centers, offset));
            let _ = tx.send(Event::FeedbackDone { pair, outcome });
        });
        self.ctx.pending += 1;
        true
    }

    fn handle(&mut self, ev: Event) {
        self.ctx.pending -= 1;
        match ev {
            Event::GeoMapDone { params, status } => {
                let camera = params.camera;
                if let Err(e) = status {
                    self.fail_unit("geomap", camera, e);
                    return;
                }
                if let Some(factor) = params.factor {
                    if self.shared.feedback.commit(camera, factor) {
                        tracing::debug!(
                            camera,
                            x = factor.x,
                            y = factor.y,
                            "geomap factor initialized"
                        );
                    }
                }
                if !self.accepting() {
                    return;
                }

                for pair in self.ctx.syncs.on_geomap_done(camera) {
                    self.dispatch_blend(pair);
                }
                let copies: Vec<usize> =
                    self.shared.layout.copies_from(camera).map(|(i, _)| i).collect();
                for index in copies {
                    self.dispatch_copy(index, camera);
                }
            }
            Event::BlendDone { params, status } => {
                let pair = params.pair;
                let mut measuring = false;
                match status {
                    Ok(()) => {
                        self.ctx.blends_done += 1;
                        if self.accepting() && !self.shared.matchers.is_empty() {
                            measuring = self.dispatch_feedback(pair, &params);
                        }
                    }
                    Err(e) => self.fail_unit("blender", pair, e),
                }
                drop(params);
                // A measuring pair keeps its slices until the correction is stored.
                if !measuring {
                    self.release_pair(pair);
                }
            }
            Event::CopyDone { index, status } => {
                match status {
                    Ok(()) => self.ctx.copies_done += 1,
                    Err(e) => self.fail_unit("copier", index, e),
                }
                let source = self.shared.layout.copy_areas[index].source;
                self.release_consumer(source);
            }
            Event::FeedbackDone { pair, outcome } => {
                match outcome {
                    Ok(correction) => {
                        tracing::debug!(
                            frame = self.ctx.id,
                            pair,
                            offset = correction.offset,
                            left = correction.right_factor.x,
                            right = correction.left_factor.x,
                            "correction measured"
                        );
                        self.shared.feedback.store(&correction);
                        self.ctx.corrections.push(correction);
                    }
                    Err(e) => {
                        tracing::warn!(frame = self.ctx.id, pair, error = %e, "correction skipped");
                    }
                }
                self.release_pair(pair);
            }
        }
    }
}

impl Drop for FrameHandle {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.ctx.abandoned = true;
        self.drive();
        self.finish();
    }
}
