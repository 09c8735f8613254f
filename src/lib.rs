#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! Cull, sort and draw pipeline for retained-mode scene graphs.
//!
//! - [`scene`]: the arena scene graph the pipeline reads
//! - [`renderer`]: the cull, sort and output stages and their orchestrator
//! - [`errors`]: configuration errors, context errors and the reporting
//!   channel

pub mod errors;
pub mod renderer;
pub mod scene;
pub mod utils;

pub use errors::{ContextError, ErrorReporter, LogReporter, PipelineError, Result, StageStatus};
pub use renderer::{
    HaltFlag, HeadlessContext, InstructionStream, Opcode, OutputDevice, PipelineSettings,
    RenderPipeline, SortPolicy, StereoMode,
};
pub use scene::{Appearance, Layer, Node, Scene, SceneGraph, Shape, Viewpoint, ViewportRect};
