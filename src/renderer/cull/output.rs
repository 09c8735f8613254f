//! Cull stage output.
//!
//! Everything here is pooled: the stage clears and refills the same
//! [`CulledFrame`] every frame, and recycling drops every graph reference a
//! slot held so nothing outlives the frame it was culled in.

use glam::{Mat4, Vec2};
use smallvec::SmallVec;

use crate::renderer::environment::EnvironmentData;
use crate::scene::{
    Appearance, AppearanceKey, CustomRenderable, GeometryKey, NodeKey, OffscreenKey,
    PassBufferState, SceneKey, ViewportRect,
};
use crate::utils::{Pool, Recycle};

/// A light or clip plane in scope, with the world transform of its parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScopedLeaf {
    pub node: NodeKey,
    pub transform: Mat4,
}

/// One visible shape with everything needed to draw it.
#[derive(Debug, Clone, Default)]
pub struct CullItem {
    pub node: Option<NodeKey>,
    pub geometry: Option<GeometryKey>,
    /// The shape's own appearance key, before overrides.
    pub appearance_key: Option<AppearanceKey>,
    /// Appearance after overrides are applied.
    pub appearance: Appearance,
    pub transform: Mat4,
    pub lights: SmallVec<[ScopedLeaf; 4]>,
    pub clips: SmallVec<[ScopedLeaf; 2]>,
    /// Innermost local fog leaf.
    pub fog: Option<NodeKey>,
    pub custom: Option<CustomRenderable>,
}

impl Recycle for CullItem {
    fn recycle(&mut self) {
        self.node = None;
        self.geometry = None;
        self.appearance_key = None;
        self.appearance = Appearance::default();
        self.lights.clear();
        self.clips.clear();
        self.fog = None;
        self.custom = None;
    }
}

#[derive(Debug, Default)]
pub struct CulledPass {
    pub buffers: PassBufferState,
    pub items: Pool<CullItem>,
}

impl Recycle for CulledPass {
    fn recycle(&mut self) {
        self.buffers = PassBufferState::default();
        self.items.clear();
    }
}

#[derive(Debug, Default)]
pub struct CulledScene {
    pub scene: Option<SceneKey>,
    pub env: EnvironmentData,
    pub multipass: bool,
    /// Single-pass scenes hold exactly one pass.
    pub passes: Pool<CulledPass>,
}

impl CulledScene {
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.passes.iter().map(|p| p.items.len()).sum()
    }
}

impl Recycle for CulledScene {
    fn recycle(&mut self) {
        self.scene = None;
        self.env.recycle();
        self.multipass = false;
        self.passes.clear();
    }
}

#[derive(Debug, Default)]
pub struct CulledViewport {
    pub rect: ViewportRect,
    pub scissor: Option<ViewportRect>,
    pub scenes: Pool<CulledScene>,
}

impl Recycle for CulledViewport {
    fn recycle(&mut self) {
        self.scissor = None;
        self.scenes.clear();
    }
}

#[derive(Debug, Default)]
pub struct CulledLayer {
    pub id: i32,
    pub viewports: Pool<CulledViewport>,
}

impl Recycle for CulledLayer {
    fn recycle(&mut self) {
        self.viewports.clear();
    }
}

/// Everything rendered into one target.
#[derive(Debug, Default)]
pub struct CulledSurface {
    /// Offscreen source this surface renders, `None` for the main surface.
    pub owner: Option<OffscreenKey>,
    /// Surface that samples this one, `None` when that is the main surface.
    pub parent: Option<OffscreenKey>,
    pub size: Vec2,
    /// Offscreen clear colour; the main surface uses the pipeline's.
    pub clear_color: Option<[f32; 4]>,
    pub layers: Pool<CulledLayer>,
}

impl CulledSurface {
    pub fn scenes(&self) -> impl Iterator<Item = &CulledScene> {
        self.layers
            .iter()
            .flat_map(|l| l.viewports.iter())
            .flat_map(|v| v.scenes.iter())
    }
}

impl Recycle for CulledSurface {
    fn recycle(&mut self) {
        self.owner = None;
        self.parent = None;
        self.clear_color = None;
        self.layers.clear();
    }
}

/// One frame of cull output.
///
/// Surfaces are ordered dependency-first: nested offscreen surfaces precede
/// their consumers and the main surface is last.
#[derive(Debug, Default)]
pub struct CulledFrame {
    pub surfaces: Pool<CulledSurface>,
}

impl CulledFrame {
    pub fn clear(&mut self) {
        self.surfaces.clear();
    }

    #[must_use]
    pub fn scene_count(&self) -> usize {
        self.surfaces.iter().map(|s| s.scenes().count()).sum()
    }

    #[must_use]
    pub fn item_count(&self) -> usize {
        self.surfaces
            .iter()
            .flat_map(CulledSurface::scenes)
            .map(CulledScene::item_count)
            .sum()
    }

    /// The on-screen surface.
    #[must_use]
    pub fn main_surface(&self) -> Option<&CulledSurface> {
        self.surfaces.iter().find(|s| s.owner.is_none())
    }
}
