use std::collections::VecDeque;

use glam::{Mat4, Vec2, Vec3, Vec4};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::errors::{ErrorReporter, PipelineError, Result, StageStatus};
use crate::renderer::HaltFlag;
use crate::renderer::cull::output::{
    CulledLayer, CulledPass, CulledScene, CulledSurface, ScopedLeaf,
};
use crate::renderer::environment::{EnvironmentData, Projection};
use crate::scene::{
    AppearanceKey, Bounds, Frustum, FrustumTest, Layer, Leaf, NodeKey, NodeKind, OffscreenKey,
    PassBufferState, ProjectionKind, SceneGraph, SceneKey, SceneKind, SceneLayer, Shape,
    TextureSource, Viewport,
};

/// Offscreen source waiting to be culled, with the surface that samples it.
pub(crate) type PendingOffscreen = (OffscreenKey, Option<OffscreenKey>);

/// State inherited from ancestors, copied into each group on entry.
#[derive(Debug, Clone)]
struct TraversalContext {
    transform: Mat4,
    lights: SmallVec<[ScopedLeaf; 4]>,
    clips: SmallVec<[ScopedLeaf; 2]>,
    fog: Option<NodeKey>,
    /// Innermost first.
    overrides: SmallVec<[AppearanceKey; 2]>,
    overrides_locked: bool,
    /// Set once an ancestor was found entirely inside the frustum.
    inside: bool,
}

impl TraversalContext {
    fn root() -> Self {
        Self {
            transform: Mat4::IDENTITY,
            lights: SmallVec::new(),
            clips: SmallVec::new(),
            fog: None,
            overrides: SmallVec::new(),
            overrides_locked: false,
            inside: false,
        }
    }
}

/// Culls the layers of one surface.
pub(crate) struct SurfaceCuller<'a> {
    pub graph: &'a SceneGraph,
    pub halt: &'a HaltFlag,
    pub reporter: &'a dyn ErrorReporter,
    pub pending: &'a mut VecDeque<PendingOffscreen>,
    pub visited: &'a mut FxHashSet<OffscreenKey>,
    pub last_projection: &'a mut FxHashMap<SceneKey, Projection>,
    pub item_capacity: usize,
    pub owner: Option<OffscreenKey>,
}

impl SurfaceCuller<'_> {
    pub fn cull_surface(
        &mut self,
        layers: &[Option<Layer>],
        surface: &mut CulledSurface,
    ) -> Result<StageStatus> {
        let mut extent = Vec2::ZERO;
        for layer in layers.iter().flatten() {
            let culled_layer = surface.layers.next_slot();
            culled_layer.id = layer.id;
            if self.cull_layer(layer, culled_layer, &mut extent)?.is_halted() {
                return Ok(StageStatus::Halted);
            }
        }
        if self.owner.is_none() {
            surface.size = extent;
        }
        Ok(StageStatus::Completed)
    }

    fn cull_layer(
        &mut self,
        layer: &Layer,
        out: &mut CulledLayer,
        extent: &mut Vec2,
    ) -> Result<StageStatus> {
        for viewport in &layer.viewports {
            *extent = extent.max(Vec2::new(
                viewport.rect.x as f32 + viewport.rect.width as f32,
                viewport.rect.y as f32 + viewport.rect.height as f32,
            ));

            let culled_viewport = out.viewports.next_slot();
            culled_viewport.rect = viewport.rect;
            culled_viewport.scissor = viewport.scissor;

            for scene_layer in &viewport.scenes {
                let culled_scene = culled_viewport.scenes.next_slot();
                let status = self.cull_scene(layer.id, viewport, scene_layer, culled_scene)?;
                if status.is_halted() {
                    return Ok(StageStatus::Halted);
                }
                if culled_scene.scene.is_none() {
                    culled_viewport.scenes.pop();
                }
            }
        }
        Ok(StageStatus::Completed)
    }

    fn cull_scene(
        &mut self,
        layer_id: i32,
        viewport: &Viewport,
        scene_layer: &SceneLayer,
        out: &mut CulledScene,
    ) -> Result<StageStatus> {
        let Some(scene) = self.graph.scene(scene_layer.scene) else {
            self.reporter
                .warning(&format!("Scene {:?} not found, skipped", scene_layer.scene));
            return Ok(StageStatus::Completed);
        };

        let env = &mut out.env;
        env.viewport = viewport.rect;
        env.scissor = viewport.scissor;
        env.layer_id = layer_id;
        env.sublayer_id = scene_layer.id;
        env.user_data.clone_from(&scene.user_data);
        env.scene = Some(scene_layer.scene);
        env.eye_offset = Vec3::ZERO;

        let flat = matches!(scene.kind, SceneKind::Flat { .. });
        match &scene.kind {
            SceneKind::Single { viewpoint, .. } | SceneKind::Multipass { viewpoint, .. } => {
                self.fill_3d_env(env, scene_layer.scene, *viewpoint, scene.background)?;
                env.fog = scene.fog.clone().filter(|f| f.global);
            }
            SceneKind::Flat { .. } => fill_2d_env(env),
        }

        let frustum = Frustum::from_matrix(env.view_projection());
        out.scene = Some(scene_layer.scene);

        match &scene.kind {
            SceneKind::Single { root, .. } | SceneKind::Flat { root } => {
                out.multipass = false;
                let pass = out.passes.next_slot();
                pass.buffers = PassBufferState::default();
                self.cull_pass(*root, &frustum, flat, pass)
            }
            SceneKind::Multipass { passes, .. } => {
                out.multipass = true;
                for render_pass in passes {
                    let pass = out.passes.next_slot();
                    pass.buffers = render_pass.buffers;
                    if self.cull_pass(render_pass.root, &frustum, false, pass)?.is_halted() {
                        return Ok(StageStatus::Halted);
                    }
                }
                Ok(StageStatus::Completed)
            }
        }
    }

    fn fill_3d_env(
        &mut self,
        env: &mut EnvironmentData,
        scene_key: SceneKey,
        viewpoint_key: NodeKey,
        background: Option<NodeKey>,
    ) -> Result<()> {
        let Some(NodeKind::Leaf(Leaf::Viewpoint(viewpoint))) =
            self.graph.node(viewpoint_key).map(|n| &n.kind)
        else {
            return Err(PipelineError::NodeNotFound(format!(
                "viewpoint {viewpoint_key:?}"
            )));
        };

        let mut view = self.graph.path_transform(viewpoint_key, "viewpoint")?;
        if let Some(orientation) = viewpoint.screen_orientation() {
            view *= Mat4::from_quat(orientation);
        }
        env.view_transform = view;
        env.camera_transform = view.inverse();
        env.head_light = viewpoint.head_light;

        let projection = match viewpoint.frustum_params(env.viewport.aspect()) {
            Some(params) => match viewpoint.projection {
                ProjectionKind::Orthographic => Projection::Orthographic(params),
                _ => Projection::Perspective(params),
            },
            None => match viewpoint.custom_projection {
                Some(matrix) => Projection::Custom(matrix),
                None => {
                    self.reporter.warning(&format!(
                        "Viewpoint {viewpoint_key:?} has a custom projection without a \
                         matrix, keeping the previous projection"
                    ));
                    self.last_projection
                        .get(&scene_key)
                        .copied()
                        .unwrap_or(env.projection)
                }
            },
        };
        env.projection = projection;
        self.last_projection.insert(scene_key, projection);

        env.background = background;
        if let Some(bg) = background {
            // Background follows the viewpoint's rotation, never its position.
            let mut bg_rotation = self.graph.path_transform(bg, "background")?;
            bg_rotation.w_axis = Vec4::W;
            let mut view_rotation = view;
            view_rotation.w_axis = Vec4::W;
            env.background_transform = view_rotation.inverse() * bg_rotation;
            env.background_projection = projection;
        } else {
            env.background_transform = Mat4::IDENTITY;
        }
        Ok(())
    }

    fn cull_pass(
        &mut self,
        root: NodeKey,
        frustum: &Frustum,
        flat: bool,
        pass: &mut CulledPass,
    ) -> Result<StageStatus> {
        pass.items.reserve(self.item_capacity);
        let mut walker = Walker {
            graph: self.graph,
            halt: self.halt,
            reporter: self.reporter,
            pending: &mut *self.pending,
            visited: &mut *self.visited,
            owner: self.owner,
            frustum,
            flat,
            pass,
        };
        Ok(walker.visit(root, &TraversalContext::root()))
    }
}

/// Orthographic frustum centred on the viewport, in pixels.
fn fill_2d_env(env: &mut EnvironmentData) {
    let half_w = env.viewport.width as f32 * 0.5;
    let half_h = env.viewport.height as f32 * 0.5;
    env.projection = Projection::Orthographic([-half_w, half_w, -half_h, half_h, -1.0, 1.0]);
    env.view_transform = Mat4::IDENTITY;
    env.camera_transform = Mat4::IDENTITY;
    env.background = None;
    env.background_transform = Mat4::IDENTITY;
    env.fog = None;
    env.head_light = false;
}

struct Walker<'w, 'a> {
    graph: &'a SceneGraph,
    halt: &'a HaltFlag,
    reporter: &'a dyn ErrorReporter,
    pending: &'w mut VecDeque<PendingOffscreen>,
    visited: &'w mut FxHashSet<OffscreenKey>,
    owner: Option<OffscreenKey>,
    frustum: &'w Frustum,
    flat: bool,
    pass: &'w mut CulledPass,
}

impl Walker<'_, '_> {
    fn visit(&mut self, key: NodeKey, parent: &TraversalContext) -> StageStatus {
        if self.halt.is_set() {
            return StageStatus::Halted;
        }
        let Some(node) = self.graph.node(key) else {
            self.reporter
                .warning(&format!("Node {key:?} not found during traversal, skipped"));
            return StageStatus::Completed;
        };

        match &node.kind {
            NodeKind::Leaf(Leaf::Shape(shape)) => {
                self.visit_shape(key, shape, &node.bounds, parent);
                StageStatus::Completed
            }
            // Scoped leaves are collected by their parent group.
            NodeKind::Leaf(_) => StageStatus::Completed,
            kind => {
                let mut ctx = parent.clone();
                match kind {
                    NodeKind::Transform(matrix) => ctx.transform *= *matrix,
                    NodeKind::Override(o) if !ctx.overrides_locked => {
                        ctx.overrides.insert(0, o.appearance);
                        ctx.overrides_locked = o.override_lower;
                    }
                    _ => {}
                }

                if !ctx.inside {
                    match self.frustum.classify(&node.bounds, &ctx.transform) {
                        FrustumTest::AllOut => return StageStatus::Completed,
                        FrustumTest::AllIn => ctx.inside = true,
                        FrustumTest::Partial => {}
                    }
                }

                if !self.flat {
                    self.collect_scoped(node.children(), &mut ctx);
                }

                for &child in node.children() {
                    if self.visit(child, &ctx).is_halted() {
                        return StageStatus::Halted;
                    }
                }
                StageStatus::Completed
            }
        }
    }

    /// Lights, clip planes and local fog among `children` scope to all of
    /// their siblings.
    fn collect_scoped(&self, children: &[NodeKey], ctx: &mut TraversalContext) {
        for &child in children {
            let Some(node) = self.graph.node(child) else {
                continue;
            };
            match &node.kind {
                NodeKind::Leaf(Leaf::Light(light)) if light.enabled => {
                    ctx.lights.push(ScopedLeaf {
                        node: child,
                        transform: ctx.transform,
                    });
                }
                NodeKind::Leaf(Leaf::ClipPlane(clip)) if clip.enabled => {
                    ctx.clips.push(ScopedLeaf {
                        node: child,
                        transform: ctx.transform,
                    });
                }
                NodeKind::Leaf(Leaf::Fog(fog)) if !fog.global => ctx.fog = Some(child),
                _ => {}
            }
        }
    }

    fn visit_shape(
        &mut self,
        key: NodeKey,
        shape: &Shape,
        node_bounds: &Bounds,
        ctx: &TraversalContext,
    ) {
        if !shape.visible {
            return;
        }

        let geometry = shape.geometry.and_then(|g| self.graph.geometry(g));
        if shape.geometry.is_some() && geometry.is_none() {
            self.reporter
                .warning(&format!("Shape {key:?} refers to missing geometry, skipped"));
            return;
        }

        if !ctx.inside {
            let test = match geometry {
                Some(g) => self
                    .frustum
                    .classify(&Bounds::Box(g.bounds), &ctx.transform),
                None => self.frustum.classify(node_bounds, &ctx.transform),
            };
            if test == FrustumTest::AllOut {
                return;
            }
        }

        let mut appearance = shape
            .appearance
            .and_then(|a| self.graph.appearance(a))
            .copied()
            .unwrap_or_default();
        for override_key in ctx.overrides.iter().rev() {
            if let Some(upper) = self.graph.appearance(*override_key) {
                appearance = upper.merged_over(&appearance);
            }
        }

        for texture in appearance.texture_units.iter().flatten() {
            if let Some(tex) = self.graph.texture(*texture)
                && let TextureSource::Offscreen(source) = tex.source
            {
                self.discover_offscreen(source);
            }
        }

        let item = self.pass.items.next_slot();
        item.node = Some(key);
        item.geometry = shape.geometry;
        item.appearance_key = shape.appearance;
        item.appearance = appearance;
        item.transform = ctx.transform;
        item.lights.extend_from_slice(&ctx.lights);
        item.clips.extend_from_slice(&ctx.clips);
        item.fog = ctx.fog;
        item.custom.clone_from(&shape.custom);
    }

    fn discover_offscreen(&mut self, source: OffscreenKey) {
        let Some(offscreen) = self.graph.offscreen(source) else {
            return;
        };
        if !offscreen.repaint_required || Some(source) == self.owner {
            return;
        }
        if self.visited.insert(source) {
            log::trace!("Discovered offscreen source {source:?}");
            self.pending.push_back((source, self.owner));
        }
    }
}
