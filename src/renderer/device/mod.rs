//! Output Device
//!
//! Consumes sorted instruction streams and executes them against a
//! [`GraphicsContext`].
//!
//! Each draw:
//!
//! 1. Makes the context current, reinitializing resources if it was recreated
//! 2. Applies the latest buffered resize
//! 3. Runs deferred deletions, shader inits and shader-log requests
//! 4. Reconciles offscreen backing buffers
//! 5. Executes every surface, offscreen surfaces first, the main surface once
//!    per eye when stereo is enabled
//!
//! Light and clip-plane START/STOP pairs are matched through their
//! correlation id and mapped onto hardware slots by an [`IdPool`].

mod context;
mod headless;
mod id_pool;
mod offscreen;
mod output;

pub use context::{
    BufferOp, ContextStatus, DeviceCall, DrawBuffer, GraphicsContext, LightSource,
    OffscreenBacking, RenderTarget, SurfaceFeatures, SurfaceInfo,
};
pub use headless::{HeadlessContext, HeadlessEvent};
pub use id_pool::IdPool;
pub use offscreen::{OffscreenBuffer, OffscreenBuffers};
pub use output::{DeviceState, OutputDevice, ResizeHandle, SurfaceListener};
