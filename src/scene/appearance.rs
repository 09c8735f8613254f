//! Appearance and render-state attributes.
//!
//! An [`Appearance`] is a bundle of optional state slots. Each slot refers to
//! an [`Attribute`] stored in the graph's attribute arena, so two shapes
//! referencing the same attribute key share that state and sort together.

use glam::Vec4;

use crate::scene::{AttributeKey, OffscreenKey, TextureKey};

/// Number of texture units an appearance can bind.
pub const MAX_TEXTURE_UNITS: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub diffuse: Vec4,
    pub specular: Vec4,
    pub shininess: f32,
    /// `0.0` is fully opaque.
    pub transparency: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            diffuse: Vec4::new(0.8, 0.8, 0.8, 1.0),
            specular: Vec4::ZERO,
            shininess: 0.2,
            transparency: 0.0,
        }
    }
}

impl Material {
    #[must_use]
    pub fn is_transparent(&self) -> bool {
        self.transparency > 0.0 || self.diffuse.w < 1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PolygonAttributes {
    pub cull_back: bool,
    pub wireframe: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineAttributes {
    pub width: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointAttributes {
    pub size: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BlendAttributes {
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAttributes {
    pub test: bool,
    pub write: bool,
}

impl Default for DepthAttributes {
    fn default() -> Self {
        Self {
            test: true,
            write: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StencilAttributes {
    pub enabled: bool,
    pub reference: i32,
    pub mask: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// Handle to a shader program owned by the graphics binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderProgram {
    pub stage: ShaderStage,
    pub id: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShaderArguments {
    pub values: Vec<f32>,
}

/// Which framebuffer a [`BufferState`] configures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferKind {
    General,
    Color,
    Depth,
    Stencil,
    Accumulation,
}

/// Per-pass framebuffer configuration for multipass scenes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferState {
    pub kind: BufferKind,
    /// Clear the buffer when this state is installed.
    pub clear: bool,
    pub clear_value: Vec4,
    /// Writes enabled (color/depth/stencil) or accumulation weight.
    pub write_mask: bool,
    pub accumulation_weight: f32,
}

impl BufferState {
    #[must_use]
    pub fn new(kind: BufferKind) -> Self {
        Self {
            kind,
            clear: false,
            clear_value: Vec4::ZERO,
            write_mask: true,
            accumulation_weight: 1.0,
        }
    }

    #[must_use]
    pub fn with_clear(mut self, clear: bool) -> Self {
        self.clear = clear;
        self
    }
}

/// A single piece of render state stored in the attribute arena.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Material(Material),
    Polygon(PolygonAttributes),
    Line(LineAttributes),
    Point(PointAttributes),
    Blend(BlendAttributes),
    Depth(DepthAttributes),
    Stencil(StencilAttributes),
    Shader(ShaderProgram),
    ShaderArgs(ShaderArguments),
    Buffer(BufferState),
}

impl Attribute {
    /// Whether installing this state can produce fragments with alpha below one.
    #[must_use]
    pub fn is_transparent(&self) -> bool {
        match self {
            Self::Material(m) => m.is_transparent(),
            Self::Blend(b) => b.enabled,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSource {
    /// Static image data uploaded by the binding.
    Image,
    /// Contents produced each frame by rendering an offscreen source.
    Offscreen(OffscreenKey),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub has_alpha: bool,
    pub source: TextureSource,
}

impl Texture {
    #[must_use]
    pub fn image(width: u32, height: u32, has_alpha: bool) -> Self {
        Self {
            width,
            height,
            has_alpha,
            source: TextureSource::Image,
        }
    }

    #[must_use]
    pub fn offscreen(source: OffscreenKey, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            has_alpha: false,
            source: TextureSource::Offscreen(source),
        }
    }
}

/// Bundle of optional state slots attached to a shape or override node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Appearance {
    pub material: Option<AttributeKey>,
    pub polygon: Option<AttributeKey>,
    pub line: Option<AttributeKey>,
    pub point: Option<AttributeKey>,
    pub blend: Option<AttributeKey>,
    pub depth: Option<AttributeKey>,
    pub stencil: Option<AttributeKey>,
    pub vertex_shader: Option<AttributeKey>,
    pub fragment_shader: Option<AttributeKey>,
    pub shader_args: Option<AttributeKey>,
    pub texture_units: [Option<TextureKey>; MAX_TEXTURE_UNITS],
}

impl Appearance {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fills every unset slot of `self` from `lower`.
    #[must_use]
    pub fn merged_over(&self, lower: &Appearance) -> Appearance {
        let mut texture_units = lower.texture_units;
        for (dst, src) in texture_units.iter_mut().zip(self.texture_units) {
            if src.is_some() {
                *dst = src;
            }
        }
        Appearance {
            material: self.material.or(lower.material),
            polygon: self.polygon.or(lower.polygon),
            line: self.line.or(lower.line),
            point: self.point.or(lower.point),
            blend: self.blend.or(lower.blend),
            depth: self.depth.or(lower.depth),
            stencil: self.stencil.or(lower.stencil),
            vertex_shader: self.vertex_shader.or(lower.vertex_shader),
            fragment_shader: self.fragment_shader.or(lower.fragment_shader),
            shader_args: self.shader_args.or(lower.shader_args),
            texture_units,
        }
    }

    /// Non-texture attribute keys in installation order.
    pub fn attribute_slots(&self) -> impl Iterator<Item = AttributeKey> + '_ {
        [
            self.material,
            self.polygon,
            self.line,
            self.point,
            self.blend,
            self.depth,
            self.stencil,
        ]
        .into_iter()
        .flatten()
    }
}
