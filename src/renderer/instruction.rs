//! Render instruction stream.
//!
//! The sort stage flattens culled scenes into a list of [`Instruction`]s that
//! open and close device state around draw calls. Most START/STOP pairs nest
//! strictly. Lights, clip planes and shader programs pair through the
//! instruction's correlation `id` instead, since sorting can interleave them.

use std::ops::Range;

use glam::{Mat4, Vec2};

use crate::renderer::environment::EnvironmentData;
use crate::scene::{
    AttributeKey, BufferKind, CustomPayload, GeometryKey, NodeKey, OffscreenKey, TextureKey,
    ViewportRect,
};
use crate::utils::{Pool, Recycle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    StartLayer,
    StopLayer,
    StartViewport,
    StopViewport,
    /// Installs the scene's [`EnvironmentData`].
    StartScene,
    StopScene,
    StartRender,
    StopRender,
    RenderGeometry,
    StartLight,
    StopLight,
    StartClipPlane,
    StopClipPlane,
    StartTransparent,
    StopTransparent,
    StartFog,
    StopFog,
    StartShaderProgram,
    StopShaderProgram,
    SetShaderArgs,
    StartTexture,
    StopTexture,
    StartBuffer,
    ChangeBuffer,
    StopBuffer,
    ClearBuffer,
    StartMultipass,
    StopMultipass,
    StartMultipassPass,
    StopMultipassPass,
}

impl Opcode {
    /// The closing opcode for a START opcode.
    #[must_use]
    pub fn matching_stop(self) -> Option<Opcode> {
        Some(match self {
            Self::StartLayer => Self::StopLayer,
            Self::StartViewport => Self::StopViewport,
            Self::StartScene => Self::StopScene,
            Self::StartRender => Self::StopRender,
            Self::StartLight => Self::StopLight,
            Self::StartClipPlane => Self::StopClipPlane,
            Self::StartTransparent => Self::StopTransparent,
            Self::StartFog => Self::StopFog,
            Self::StartShaderProgram => Self::StopShaderProgram,
            Self::StartTexture => Self::StopTexture,
            Self::StartBuffer => Self::StopBuffer,
            Self::StartMultipass => Self::StopMultipass,
            Self::StartMultipassPass => Self::StopMultipassPass,
            _ => return None,
        })
    }

    /// Pairs through the correlation id rather than by nesting.
    #[must_use]
    pub fn is_correlated(self) -> bool {
        matches!(
            self,
            Self::StartLight
                | Self::StopLight
                | Self::StartClipPlane
                | Self::StopClipPlane
                | Self::StartShaderProgram
                | Self::StopShaderProgram
        )
    }
}

/// What an instruction operates on.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Renderable {
    #[default]
    None,
    Layer(i32),
    Viewport(ViewportRect),
    /// Index into the stream's environment table.
    Environment(usize),
    Shape {
        node: NodeKey,
        geometry: Option<GeometryKey>,
    },
    Attribute(AttributeKey),
    Light(NodeKey),
    HeadLight,
    ClipPlane(NodeKey),
    Fog(NodeKey),
    Texture {
        unit: u8,
        texture: TextureKey,
    },
    Buffer {
        kind: BufferKind,
        state: AttributeKey,
    },
    PassViewport(ViewportRect),
    Pass(usize),
}

/// Buffer slot ids carried by buffer-state instructions.
#[must_use]
pub fn buffer_slot(kind: BufferKind) -> u32 {
    match kind {
        BufferKind::General => 0,
        BufferKind::Color => 1,
        BufferKind::Depth => 2,
        BufferKind::Stencil => 3,
        BufferKind::Accumulation => 4,
    }
}

/// Slot id for the per-pass viewport state.
pub const VIEWPORT_SLOT: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: Opcode,
    pub renderable: Renderable,
    pub transform: Mat4,
    pub custom: Option<CustomPayload>,
    /// Correlation id for lights, clip planes and shader programs; buffer
    /// slot for buffer-state operations; zero otherwise.
    pub id: u32,
}

impl Instruction {
    #[must_use]
    pub fn new(op: Opcode, renderable: Renderable) -> Self {
        Self {
            op,
            renderable,
            transform: Mat4::IDENTITY,
            custom: None,
            id: 0,
        }
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub fn with_custom(mut self, custom: Option<CustomPayload>) -> Self {
        self.custom = custom;
        self
    }

    /// Transform as 16 column-major floats.
    #[must_use]
    pub fn transform_array(&self) -> [f32; 16] {
        self.transform.to_cols_array()
    }
}

/// Instructions for one render target.
#[derive(Debug, Clone, Default)]
pub struct SortedSurface {
    /// Offscreen source rendered into, `None` for the main surface.
    pub owner: Option<OffscreenKey>,
    /// Consumer of this surface, `None` when it is the main surface.
    pub parent: Option<OffscreenKey>,
    pub size: Vec2,
    pub clear_color: Option<[f32; 4]>,
    pub range: Range<usize>,
}

impl Recycle for SortedSurface {
    fn recycle(&mut self) {
        self.owner = None;
        self.parent = None;
        self.clear_color = None;
        self.range = 0..0;
    }
}

/// One frame of sorted output: an instruction list, the environments it
/// references and the surfaces slicing it.
///
/// Surfaces are ordered dependency-first: every offscreen surface precedes
/// the surfaces that sample it, and the main surface comes last.
#[derive(Debug)]
pub struct InstructionStream {
    instructions: Vec<Instruction>,
    environments: Vec<EnvironmentData>,
    surfaces: Pool<SortedSurface>,
    next_id: u32,
}

impl Default for InstructionStream {
    fn default() -> Self {
        Self {
            instructions: Vec::new(),
            environments: Vec::new(),
            surfaces: Pool::default(),
            next_id: 1,
        }
    }
}

impl InstructionStream {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            instructions: Vec::with_capacity(capacity),
            environments: Vec::new(),
            surfaces: Pool::with_capacity(4),
            next_id: 1,
        }
    }

    /// Resets for a new frame while keeping every allocation.
    pub fn clear(&mut self) {
        self.instructions.clear();
        self.environments.clear();
        self.surfaces.clear();
        self.next_id = 1;
    }

    /// Pre-sizes the instruction buffer for a scene.
    ///
    /// Each item needs a shape bracket, a draw and its state brackets; lights
    /// and clip planes add a pair each.
    pub fn reserve_for(&mut self, items: usize, lights: usize, clips: usize) {
        let estimate = items * 8 + (lights + clips) * 2 + 16;
        self.instructions.reserve(estimate);
    }

    /// A fresh correlation id, never reused within this stream's frame.
    pub fn next_correlation_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    #[inline]
    pub fn emit(&mut self, op: Opcode, renderable: Renderable) {
        self.instructions.push(Instruction::new(op, renderable));
    }

    pub fn push_environment(&mut self, env: EnvironmentData) -> usize {
        self.environments.push(env);
        self.environments.len() - 1
    }

    pub fn begin_surface(
        &mut self,
        owner: Option<OffscreenKey>,
        parent: Option<OffscreenKey>,
        size: Vec2,
    ) -> &mut SortedSurface {
        let start = self.instructions.len();
        let surface = self.surfaces.next_slot();
        surface.owner = owner;
        surface.parent = parent;
        surface.size = size;
        surface.range = start..start;
        surface
    }

    pub fn end_surface(&mut self) {
        let end = self.instructions.len();
        if let Some(surface) = self.surfaces.last_mut() {
            surface.range.end = end;
        }
    }

    /// Copies `range` to the end of the stream, giving every correlated
    /// pair a fresh id.
    pub fn replay_range(&mut self, range: Range<usize>) {
        let Some(base) = self.instructions[range.clone()]
            .iter()
            .filter(|i| i.op.is_correlated())
            .map(|i| i.id)
            .min()
        else {
            self.instructions.extend_from_within(range);
            return;
        };

        let delta = self.next_id - base;
        let mut max_id = self.next_id;
        for index in range {
            let mut copy = self.instructions[index].clone();
            if copy.op.is_correlated() {
                copy.id += delta;
                max_id = max_id.max(copy.id + 1);
            }
            self.instructions.push(copy);
        }
        self.next_id = max_id;
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    #[inline]
    #[must_use]
    pub fn environments(&self) -> &[EnvironmentData] {
        &self.environments
    }

    #[must_use]
    pub fn environment(&self, index: usize) -> Option<&EnvironmentData> {
        self.environments.get(index)
    }

    #[inline]
    #[must_use]
    pub fn surfaces(&self) -> &[SortedSurface] {
        self.surfaces.as_slice()
    }

    /// Replaces this stream's contents with a copy of `other`, reusing the
    /// existing allocations.
    pub fn copy_from(&mut self, other: &InstructionStream) {
        self.clear();
        self.instructions.extend_from_slice(&other.instructions);
        self.environments.extend_from_slice(&other.environments);
        for surface in other.surfaces() {
            let slot = self.surfaces.next_slot();
            slot.clone_from(surface);
        }
        self.next_id = other.next_id;
    }
}
