//! Rendering Pipeline
//!
//! Three stages connected by push callbacks:
//!
//! - [`cull`]: walks the scene graph and collects visible shapes with the
//!   state in scope for each
//! - [`sort`]: orders them into an [`InstructionStream`]
//! - [`device`]: executes the stream against a graphics context
//!
//! [`RenderPipeline`] owns one of each and drives a frame end to end.

pub mod cull;
pub mod device;
pub mod environment;
pub mod instruction;
pub mod pipeline;
pub mod profiling;
pub mod settings;
pub mod sort;

pub use cull::{CullItem, CullOutputReceiver, CullStage, CulledFrame, FrustumCullStage};
pub use device::{
    DeviceCall, DeviceState, GraphicsContext, HeadlessContext, HeadlessEvent, OutputDevice,
    ResizeHandle, SurfaceFeatures, SurfaceInfo,
};
pub use environment::{EnvironmentData, Projection};
pub use instruction::{Instruction, InstructionStream, Opcode, Renderable, SortedSurface};
pub use pipeline::RenderPipeline;
pub use profiling::{ProfilingData, RequestData};
pub use settings::{PipelineSettings, SortPolicy, StateSlot, StereoMode};
pub use sort::{DepthSortStage, SortStage, SortedOutputReceiver, StateSortStage};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative termination flag shared by every stage of a pipeline.
///
/// Stages poll it at safe points: between traversal steps, between scenes
/// and before each instruction.
#[derive(Debug, Clone, Default)]
pub struct HaltFlag(Arc<AtomicBool>);

impl HaltFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }
}
