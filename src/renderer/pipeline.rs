//! Pipeline Orchestrator
//!
//! [`RenderPipeline`] wires the three stages together. Each stage pushes its
//! output into the next one synchronously, so a call to
//! [`render`](RenderPipeline::render) runs cull, sort and draw to completion
//! on the calling thread:
//!
//! ```text
//! layers ──cull──▶ CulledFrame ──sort──▶ InstructionStream ──draw──▶ device
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use saga::renderer::{HeadlessContext, PipelineSettings, RenderPipeline};
//!
//! let context = HeadlessContext::default();
//! let mut pipeline = RenderPipeline::new(PipelineSettings::default(), Box::new(context))?;
//! pipeline.set_layers(vec![Some(layer)], 1)?;
//!
//! // Main loop
//! loop {
//!     // ... mutate the graph ...
//!     pipeline.render(&graph)?;
//!     pipeline.swap_buffers();
//! }
//! ```

use crate::errors::{PipelineError, Result, SharedReporter, StageStatus, default_reporter};
use crate::renderer::HaltFlag;
use crate::renderer::cull::{CullOutputReceiver, CullStage, CulledFrame, FrustumCullStage};
use crate::renderer::device::{GraphicsContext, OutputDevice, ResizeHandle};
use crate::renderer::profiling::{ProfilingData, RequestData};
use crate::renderer::settings::{PipelineSettings, SortPolicy};
use crate::renderer::sort::{DepthSortStage, SortStage, StateSortStage};
use crate::scene::{Layer, SceneGraph};
use crate::utils::Timer;

/// Forwards cull output into the sort stage, and sort output into the
/// device.
struct SortForwarder<'a> {
    sort: &'a mut dyn SortStage,
    device: &'a mut OutputDevice,
    status: StageStatus,
}

impl CullOutputReceiver for SortForwarder<'_> {
    fn culled_output(
        &mut self,
        request: &mut RequestData,
        profiling: &mut ProfilingData,
        frame: &CulledFrame,
        graph: &SceneGraph,
    ) {
        self.status = self.sort.sort(request, profiling, frame, graph, &mut *self.device);
    }
}

/// Cull, sort and draw for one rendering surface.
///
/// # Lifecycle
///
/// 1. Create with [`RenderPipeline::new`]
/// 2. Select what to draw with [`RenderPipeline::set_layers`]
/// 3. Each frame call [`RenderPipeline::render`] (or
///    [`RenderPipeline::display_only`] when nothing changed), then
///    [`RenderPipeline::swap_buffers`]
/// 4. Stop with [`RenderPipeline::halt`]
pub struct RenderPipeline {
    settings: PipelineSettings,
    reporter: SharedReporter,
    halt: HaltFlag,

    cull: Box<dyn CullStage>,
    sort: Box<dyn SortStage>,
    device: OutputDevice,

    layers: Vec<Option<Layer>>,
    request: RequestData,
    profiling: ProfilingData,
    timer: Timer,
}

impl RenderPipeline {
    /// Builds a pipeline reporting through the `log` facade.
    pub fn new(settings: PipelineSettings, context: Box<dyn GraphicsContext>) -> Result<Self> {
        Self::with_reporter(settings, context, default_reporter())
    }

    pub fn with_reporter(
        settings: PipelineSettings,
        context: Box<dyn GraphicsContext>,
        reporter: SharedReporter,
    ) -> Result<Self> {
        settings.validate()?;

        let halt = HaltFlag::new();
        let capacity = settings.initial_instruction_capacity;

        let cull: Box<dyn CullStage> = Box::new(
            FrustumCullStage::new(halt.clone(), reporter.clone())
                .with_item_capacity(settings.initial_item_capacity),
        );
        let sort: Box<dyn SortStage> = match settings.sort_policy {
            SortPolicy::StateSort => Box::new(StateSortStage::new(
                settings.state_priority.clone(),
                halt.clone(),
                reporter.clone(),
                capacity,
            )),
            SortPolicy::DepthSort => Box::new(DepthSortStage::new(
                settings.depth_sort_bits,
                halt.clone(),
                reporter.clone(),
                capacity,
            )),
        };
        let device = OutputDevice::new(context, halt.clone(), reporter.clone(), capacity)
            .with_stereo(settings.stereo, settings.eye_separation)
            .with_clear_color(settings.clear_color);

        log::debug!(
            "Pipeline created: {:?}, stereo {:?}",
            settings.sort_policy,
            settings.stereo
        );

        Ok(Self {
            settings,
            reporter,
            halt,
            cull,
            sort,
            device,
            layers: Vec::new(),
            request: RequestData::default(),
            profiling: ProfilingData::default(),
            timer: Timer::new(),
        })
    }

    /// Replaces the cull stage, e.g. with an application-specific one.
    #[must_use]
    pub fn with_cull_stage(mut self, cull: Box<dyn CullStage>) -> Self {
        self.cull = cull;
        self
    }

    /// Replaces the sort stage.
    #[must_use]
    pub fn with_sort_stage(mut self, sort: Box<dyn SortStage>) -> Self {
        self.sort = sort;
        self
    }

    /// Sets the layers rendered by subsequent frames. Only the first `count`
    /// entries are used; `None` entries are skipped.
    pub fn set_layers(&mut self, mut layers: Vec<Option<Layer>>, count: usize) -> Result<()> {
        if count > layers.len() {
            return Err(PipelineError::InvalidLayerCount {
                requested: count,
                available: layers.len(),
            });
        }
        layers.truncate(count);
        self.layers = layers;
        Ok(())
    }

    #[must_use]
    pub fn layers(&self) -> &[Option<Layer>] {
        &self.layers
    }

    /// Culls, sorts and draws one frame.
    ///
    /// Returns `Ok(false)` when the frame was halted or the device could not
    /// draw it. Configuration problems found while culling are returned as
    /// errors. With no layers set this is a no-op returning `Ok(true)`.
    pub fn render(&mut self, graph: &SceneGraph) -> Result<bool> {
        if self.layers.iter().all(Option::is_none) {
            return Ok(true);
        }
        if self.halt.is_set() {
            self.device.terminate();
            return Ok(false);
        }

        self.timer.tick();
        self.profiling.reset();
        self.profiling.frame = self.timer.frame_count;
        self.profiling.frame_delta = self.timer.delta;

        let Self {
            cull,
            sort,
            device,
            layers,
            request,
            profiling,
            ..
        } = &mut *self;

        let mut forward = SortForwarder {
            sort: sort.as_mut(),
            device,
            status: StageStatus::Halted,
        };
        let status = cull.cull(request, profiling, layers, graph, &mut forward)?;
        if status.is_halted() || forward.status.is_halted() {
            log::debug!("Frame {} halted", profiling.frame);
            self.device.terminate();
            return Ok(false);
        }

        Ok(self.device.draw(&mut self.profiling))
    }

    /// Redraws the previous frame's instructions without culling or sorting.
    pub fn display_only(&mut self) -> bool {
        if self.layers.iter().all(Option::is_none) {
            return true;
        }
        self.device.draw(&mut self.profiling)
    }

    pub fn swap_buffers(&mut self) -> bool {
        self.device.swap_buffers()
    }

    /// Terminates the pipeline. Stages running on other threads stop at
    /// their next safe point; the device releases the context and every
    /// backing buffer now.
    pub fn halt(&mut self) {
        self.halt.request();
        self.device.terminate();
    }

    /// Shared handle to the halt flag, usable from other threads.
    #[must_use]
    pub fn halt_flag(&self) -> HaltFlag {
        self.halt.clone()
    }

    #[must_use]
    pub fn resize_handle(&self) -> ResizeHandle {
        self.device.resize_handle()
    }

    /// Deferred device requests, processed at the start of the next draw.
    pub fn request_mut(&mut self) -> &mut RequestData {
        &mut self.request
    }

    #[must_use]
    pub fn profiling(&self) -> &ProfilingData {
        &self.profiling
    }

    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    #[must_use]
    pub fn reporter(&self) -> &SharedReporter {
        &self.reporter
    }

    #[must_use]
    pub fn device(&self) -> &OutputDevice {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut OutputDevice {
        &mut self.device
    }
}
