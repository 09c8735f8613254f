use glam::Vec4;
use serde::{Deserialize, Serialize};

use crate::scene::geometry::CustomPayload;
use crate::scene::light::Fog;
use crate::scene::{AttributeKey, NodeKey, SceneKey};

/// Pixel rectangle on a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViewportRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ViewportRect {
    #[must_use]
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Width over height, `1.0` for a degenerate rectangle.
    #[must_use]
    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Top-level composition unit: an ordered set of viewports.
#[derive(Debug, Clone, Default)]
pub struct Layer {
    pub id: i32,
    pub viewports: Vec<Viewport>,
}

impl Layer {
    #[must_use]
    pub fn new(id: i32) -> Self {
        Self {
            id,
            viewports: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewports.push(viewport);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Viewport {
    pub rect: ViewportRect,
    pub scissor: Option<ViewportRect>,
    pub scenes: Vec<SceneLayer>,
}

impl Viewport {
    #[must_use]
    pub fn new(rect: ViewportRect) -> Self {
        Self {
            rect,
            scissor: None,
            scenes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_scene(mut self, id: i32, scene: SceneKey) -> Self {
        self.scenes.push(SceneLayer { id, scene });
        self
    }
}

/// A scene placed in a viewport, tagged with its sublayer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneLayer {
    pub id: i32,
    pub scene: SceneKey,
}

/// How a scene is rendered.
#[derive(Debug, Clone)]
pub enum SceneKind {
    /// Single-pass 3D scene seen from a viewpoint leaf.
    Single { root: NodeKey, viewpoint: NodeKey },
    /// Single-pass 2D overlay: orthographic, unlit, unfogged.
    Flat { root: NodeKey },
    /// Several passes over one viewpoint, composited through buffer states.
    Multipass {
        viewpoint: NodeKey,
        passes: Vec<RenderPass>,
    },
}

/// Buffer configuration installed before a pass renders.
///
/// Each entry is a [`BufferState`](crate::scene::BufferState) attribute key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassBufferState {
    pub viewport: Option<ViewportRect>,
    pub general: Option<AttributeKey>,
    pub color: Option<AttributeKey>,
    pub depth: Option<AttributeKey>,
    pub stencil: Option<AttributeKey>,
    pub accumulation: Option<AttributeKey>,
}

#[derive(Debug, Clone)]
pub struct RenderPass {
    pub root: NodeKey,
    pub buffers: PassBufferState,
}

#[derive(Debug, Clone)]
pub struct Scene {
    pub kind: SceneKind,
    /// Background leaf node, resolved along its own path to the root.
    pub background: Option<NodeKey>,
    /// Scene-wide fog. Local fog leaves take precedence inside their scope.
    pub fog: Option<Fog>,
    pub user_data: Option<CustomPayload>,
}

impl Scene {
    #[must_use]
    pub fn new(kind: SceneKind) -> Self {
        Self {
            kind,
            background: None,
            fog: None,
            user_data: None,
        }
    }

    #[must_use]
    pub fn with_background(mut self, background: NodeKey) -> Self {
        self.background = Some(background);
        self
    }

    #[must_use]
    pub fn with_fog(mut self, fog: Fog) -> Self {
        self.fog = Some(fog);
        self
    }
}

/// Render-to-texture source.
///
/// Its layers are culled whenever a visible shape samples a texture backed
/// by it and `repaint_required` is set.
#[derive(Debug, Clone)]
pub struct OffscreenTexture {
    pub width: u32,
    pub height: u32,
    pub layers: Vec<Option<Layer>>,
    pub repaint_required: bool,
    pub clear_color: Vec4,
}

impl OffscreenTexture {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            layers: Vec::new(),
            repaint_required: true,
            clear_color: Vec4::ZERO,
        }
    }

    #[must_use]
    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layers.push(Some(layer));
        self
    }
}
