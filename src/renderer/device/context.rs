//! Graphics Context Binding
//!
//! The [`GraphicsContext`] trait is the seam between the output device and a
//! concrete graphics API. The device resolves every instruction into a
//! [`DeviceCall`] and hands it to the binding; the binding owns the native
//! context, the main surface and any offscreen backing buffers.

use bitflags::bitflags;
use glam::Mat4;

use crate::errors::ContextError;
use crate::scene::{
    AttributeKey, BufferKind, CustomPayload, Fog, GeometryKey, NodeKey, OffscreenKey,
    TextureKey, ViewportRect,
};

bitflags! {
    /// Optional capabilities advertised by a surface.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SurfaceFeatures: u32 {
        /// Framebuffer-object style render-to-texture attachments.
        const FRAMEBUFFER_OBJECTS = 1 << 0;
        /// Pixel-buffer style offscreen contexts.
        const PBUFFERS            = 1 << 1;
        /// Separate left and right back buffers.
        const QUAD_STEREO         = 1 << 2;
    }
}

/// Static capabilities of a surface, queried once after initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceInfo {
    /// Hardware light slots, including the reserved head-light slot 0.
    pub max_lights: u32,
    /// Hardware clip-plane slots, slot 0 reserved.
    pub max_clip_planes: u32,
    pub max_texture_units: u32,
    pub max_render_targets: u32,
    /// Driver version string, `"<major>.<minor>[.<patch>] [vendor info]"`.
    pub version: String,
    pub extensions: Vec<String>,
    pub features: SurfaceFeatures,
}

impl Default for SurfaceInfo {
    fn default() -> Self {
        Self {
            max_lights: 8,
            max_clip_planes: 6,
            max_texture_units: 4,
            max_render_targets: 1,
            version: "1.0".to_string(),
            extensions: Vec::new(),
            features: SurfaceFeatures::FRAMEBUFFER_OBJECTS,
        }
    }
}

impl SurfaceInfo {
    /// Parses the leading `major.minor` pair of the version string.
    pub fn parse_version(&self) -> Result<(u32, u32), String> {
        let number = self
            .version
            .split_whitespace()
            .next()
            .ok_or_else(|| format!("empty version string '{}'", self.version))?;
        let mut parts = number.split('.');
        let mut component = |name: &str| {
            parts
                .next()
                .and_then(|p| p.parse::<u32>().ok())
                .ok_or_else(|| format!("invalid {name} version in '{}'", self.version))
        };
        let major = component("major")?;
        let minor = component("minor")?;
        Ok((major, minor))
    }
}

/// Outcome of making a context current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStatus {
    Ready,
    /// The native context was recreated; every device-resident resource must
    /// be reinitialized before drawing.
    Reinitialized,
}

/// Back buffer selected for drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawBuffer {
    Back,
    BackLeft,
    BackRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    Main,
    Offscreen(OffscreenKey),
}

/// Allocation strategy for an offscreen backing buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffscreenBacking {
    FramebufferObject,
    PixelBuffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightSource {
    /// Light attached to the viewpoint, always in slot 0.
    Head,
    Node(NodeKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferOp {
    Start,
    Change,
    Stop,
    Clear,
}

/// A single resolved device operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    DeleteResource(u32),
    InitShader(u32),
    ShaderLog(u32),

    BindTarget(RenderTarget),
    DrawBuffer(DrawBuffer),
    Clear([f32; 4]),
    Viewport(ViewportRect),
    Scissor(Option<ViewportRect>),
    Projection(Mat4),
    Camera(Mat4),
    Background {
        node: NodeKey,
        transform: Mat4,
        projection: Mat4,
    },
    SceneFog(Option<Fog>),

    EnableLight {
        slot: u32,
        source: LightSource,
        transform: Mat4,
    },
    DisableLight {
        slot: u32,
    },
    EnableClipPlane {
        slot: u32,
        node: NodeKey,
        transform: Mat4,
    },
    DisableClipPlane {
        slot: u32,
    },
    LocalFog(Option<NodeKey>),

    PushTransform(Mat4),
    PopTransform,
    Draw {
        node: NodeKey,
        geometry: Option<GeometryKey>,
        custom: Option<CustomPayload>,
    },

    ApplyAttribute(AttributeKey),
    RestoreAttribute(AttributeKey),
    UseShader(AttributeKey),
    ReleaseShader(AttributeKey),
    ShaderArgs(AttributeKey),
    BindTexture {
        unit: u8,
        texture: TextureKey,
    },
    UnbindTexture {
        unit: u8,
    },
    Blend(bool),

    Buffer {
        op: BufferOp,
        kind: BufferKind,
        state: AttributeKey,
    },
    PassViewport(Option<ViewportRect>),
    Multipass(bool),
    BeginPass(usize),
    EndPass(usize),
}

/// A graphics API binding driven by the output device.
///
/// Only one thread may have a given context current at a time; the device
/// makes it current at the start of each draw and releases it at the end.
pub trait GraphicsContext: Send {
    fn make_current(&mut self) -> Result<ContextStatus, ContextError>;

    fn release(&mut self);

    fn surface_info(&self) -> SurfaceInfo;

    /// Re-uploads every device-resident shader and texture after the native
    /// context was recreated.
    fn reinitialize_resources(&mut self) -> Result<(), ContextError>;

    fn resize(&mut self, rect: ViewportRect);

    fn create_offscreen(
        &mut self,
        key: OffscreenKey,
        width: u32,
        height: u32,
        backing: OffscreenBacking,
    ) -> Result<(), ContextError>;

    fn resize_offscreen(
        &mut self,
        key: OffscreenKey,
        width: u32,
        height: u32,
    ) -> Result<(), ContextError>;

    fn delete_offscreen(&mut self, key: OffscreenKey);

    fn execute(&mut self, call: DeviceCall) -> Result<(), ContextError>;

    fn swap_buffers(&mut self) -> Result<(), ContextError>;

    /// Releases the native context for good.
    fn dispose(&mut self);
}
