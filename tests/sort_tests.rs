//! Sort Stage Tests
//!
//! Tests for:
//! - Light, clip-plane and shader brackets paired by correlation id
//! - State grouping and comparator stability
//! - Back-to-front ordering of transparent items
//! - Buffer-state bracketing in multipass scenes
//! - Reuse of offscreen scenes sorted earlier in the frame
//! - Cooperative halt

use glam::{Mat4, Vec3};

use saga::errors::{StageStatus, default_reporter};
use saga::renderer::cull::{CullItem, CullStage, CulledFrame, CullOutputReceiver, FrustumCullStage};
use saga::renderer::instruction::{InstructionStream, Opcode, Renderable, buffer_slot};
use saga::renderer::profiling::{ProfilingData, RequestData};
use saga::renderer::settings::StateSlot;
use saga::renderer::sort::{
    DepthSortStage, SortStage, SortedOutputReceiver, StateOrdering, StateSortStage,
};
use saga::renderer::HaltFlag;
use saga::scene::{
    Aabb, Appearance, AppearanceKey, Attribute, BufferKind, BufferState, Geometry, GeometryKey,
    Layer, Leaf, Light, Material, Node, NodeKey, OffscreenTexture, PassBufferState, RenderPass,
    Scene, SceneGraph, SceneKey, SceneKind, Shape, Texture, Viewpoint, Viewport, ViewportRect,
};

// ============================================================================
// Fixtures
// ============================================================================

struct NoopReceiver;

impl CullOutputReceiver for NoopReceiver {
    fn culled_output(
        &mut self,
        _request: &mut RequestData,
        _profiling: &mut ProfilingData,
        _frame: &CulledFrame,
        _graph: &SceneGraph,
    ) {
    }
}

#[derive(Default)]
struct Captured {
    calls: usize,
    stream: InstructionStream,
}

impl SortedOutputReceiver for Captured {
    fn sorted_output(
        &mut self,
        _request: &mut RequestData,
        _profiling: &mut ProfilingData,
        stream: &InstructionStream,
    ) {
        self.calls += 1;
        self.stream.copy_from(stream);
    }
}

struct Fixture {
    graph: SceneGraph,
    root: NodeKey,
    camera: NodeKey,
    geometry: GeometryKey,
    scene: SceneKey,
}

impl Fixture {
    fn new() -> Self {
        let mut graph = SceneGraph::new();
        let root = graph.add_node(Node::group());
        let camera = graph
            .add_to_parent(Node::leaf(Leaf::Viewpoint(Viewpoint::default())), root)
            .unwrap();
        let geometry = graph.add_geometry(Geometry::new(
            Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5)),
            36,
        ));
        let scene = graph.add_scene(Scene::new(SceneKind::Single { root, viewpoint: camera }));
        Self {
            graph,
            root,
            camera,
            geometry,
            scene,
        }
    }

    fn cube_at(&mut self, parent: NodeKey, z: f32, appearance: Option<AppearanceKey>) -> NodeKey {
        let xform = self
            .graph
            .add_to_parent(
                Node::transform(Mat4::from_translation(Vec3::new(0.0, 0.0, z))),
                parent,
            )
            .unwrap();
        self.graph
            .add_shape(Shape::new(self.geometry, appearance), xform)
            .unwrap()
    }

    fn appearance_with_material(&mut self, material: Material) -> AppearanceKey {
        let material = self.graph.add_attribute(Attribute::Material(material));
        self.graph.add_appearance(Appearance {
            material: Some(material),
            ..Appearance::default()
        })
    }

    /// Culls the fixture's scene, then sorts it with `stage`.
    fn run(&self, stage: &mut dyn SortStage) -> (StageStatus, Captured, ProfilingData) {
        self.run_scene(self.scene, stage)
    }

    fn run_scene(
        &self,
        scene: SceneKey,
        stage: &mut dyn SortStage,
    ) -> (StageStatus, Captured, ProfilingData) {
        let mut cull = FrustumCullStage::new(HaltFlag::new(), default_reporter());
        let mut request = RequestData::default();
        let mut profiling = ProfilingData::default();
        cull.cull(
            &mut request,
            &mut profiling,
            &[Some(layer_for(scene))],
            &self.graph,
            &mut NoopReceiver,
        )
        .unwrap();

        let mut captured = Captured::default();
        let status = stage.sort(
            &mut request,
            &mut profiling,
            cull.frame(),
            &self.graph,
            &mut captured,
        );
        (status, captured, profiling)
    }
}

fn layer_for(scene: SceneKey) -> Layer {
    Layer::new(0).with_viewport(
        Viewport::new(ViewportRect::new(0, 0, 800, 600)).with_scene(0, scene),
    )
}

fn state_sort() -> StateSortStage {
    StateSortStage::new(
        StateSlot::DEFAULT_PRIORITY.to_vec(),
        HaltFlag::new(),
        default_reporter(),
        64,
    )
}

fn depth_sort() -> DepthSortStage {
    DepthSortStage::new(16, HaltFlag::new(), default_reporter(), 64)
}

fn ops(stream: &InstructionStream) -> Vec<Opcode> {
    stream.instructions().iter().map(|i| i.op).collect()
}

fn drawn_nodes(stream: &InstructionStream) -> Vec<NodeKey> {
    stream
        .instructions()
        .iter()
        .filter(|i| i.op == Opcode::RenderGeometry)
        .filter_map(|i| match i.renderable {
            Renderable::Shape { node, .. } => Some(node),
            _ => None,
        })
        .collect()
}

/// Nested opcodes close in reverse order; correlated ones pair by id.
fn assert_balanced(stream: &InstructionStream) {
    let mut nested: Vec<Opcode> = Vec::new();
    let mut open_ids: Vec<(Opcode, u32)> = Vec::new();

    for instruction in stream.instructions() {
        let op = instruction.op;
        if matches!(
            op,
            Opcode::StartBuffer | Opcode::ChangeBuffer | Opcode::StopBuffer | Opcode::ClearBuffer
        ) {
            continue;
        }
        if op.is_correlated() {
            if let Some(stop) = op.matching_stop() {
                open_ids.push((stop, instruction.id));
            } else {
                let position = open_ids
                    .iter()
                    .position(|&(expected, id)| expected == op && id == instruction.id);
                assert!(position.is_some(), "unmatched {op:?} id {}", instruction.id);
                open_ids.remove(position.unwrap());
            }
            continue;
        }
        if let Some(stop) = op.matching_stop() {
            nested.push(stop);
        } else if op != Opcode::RenderGeometry && op != Opcode::SetShaderArgs {
            assert_eq!(nested.pop(), Some(op), "out of order close");
        }
    }
    assert!(nested.is_empty(), "unclosed: {nested:?}");
    assert!(open_ids.is_empty(), "unclosed correlated: {open_ids:?}");
}

// ============================================================================
// Brackets
// ============================================================================

#[test]
fn light_bracket_surrounds_its_shape() {
    let mut fx = Fixture::new();
    let root = fx.root;
    let cube = fx.cube_at(root, -5.0, None);
    let light = fx
        .graph
        .add_to_parent(
            Node::leaf(Leaf::Light(Light::new_point(Vec3::ONE, 1.0, 20.0))),
            root,
        )
        .unwrap();

    let (status, captured, _) = fx.run(&mut state_sort());
    assert_eq!(status, StageStatus::Completed);

    let instructions = captured.stream.instructions();
    let start = instructions
        .iter()
        .position(|i| i.op == Opcode::StartLight)
        .unwrap();
    let stop = instructions
        .iter()
        .position(|i| i.op == Opcode::StopLight)
        .unwrap();
    let draw = instructions
        .iter()
        .position(|i| i.op == Opcode::RenderGeometry)
        .unwrap();

    assert!(start < draw && draw < stop);
    assert_eq!(instructions[start].renderable, Renderable::Light(light));
    assert_eq!(instructions[start].id, instructions[stop].id);
    assert_ne!(instructions[start].id, 0);
    assert_eq!(drawn_nodes(&captured.stream), vec![cube]);
    assert_eq!(instructions[draw - 1].op, Opcode::StartRender);
    assert_eq!(instructions[draw + 1].op, Opcode::StopRender);
}

#[test]
fn frame_is_wrapped_in_layer_viewport_and_scene() {
    let mut fx = Fixture::new();
    let root = fx.root;
    fx.cube_at(root, -5.0, None);

    let (_, captured, _) = fx.run(&mut state_sort());
    let ops = ops(&captured.stream);
    assert_eq!(
        &ops[..3],
        &[Opcode::StartLayer, Opcode::StartViewport, Opcode::StartScene]
    );
    assert_eq!(
        &ops[ops.len() - 3..],
        &[Opcode::StopScene, Opcode::StopViewport, Opcode::StopLayer]
    );

    let surfaces = captured.stream.surfaces();
    assert_eq!(surfaces.len(), 1);
    assert_eq!(surfaces[0].range, 0..captured.stream.len());
    assert_eq!(captured.stream.environments().len(), 1);
}

#[test]
fn streams_are_balanced_under_both_policies() {
    let mut fx = Fixture::new();
    let root = fx.root;
    let glass = fx.appearance_with_material(Material {
        transparency: 0.5,
        ..Material::default()
    });
    let solid = fx.appearance_with_material(Material::default());
    let group = fx.graph.add_to_parent(Node::group(), root).unwrap();
    fx.graph
        .add_to_parent(
            Node::leaf(Leaf::Light(Light::new_directional(Vec3::ONE, 1.0))),
            group,
        )
        .unwrap();
    fx.cube_at(group, -5.0, Some(glass));
    fx.cube_at(group, -6.0, Some(solid));
    fx.cube_at(root, -7.0, Some(solid));
    fx.cube_at(root, -8.0, None);

    let (_, state, _) = fx.run(&mut state_sort());
    assert_balanced(&state.stream);
    assert_eq!(drawn_nodes(&state.stream).len(), 4);

    let (_, depth, _) = fx.run(&mut depth_sort());
    assert_balanced(&depth.stream);
    assert_eq!(drawn_nodes(&depth.stream).len(), 4);
}

// ============================================================================
// State Sort
// ============================================================================

#[test]
fn shared_material_is_installed_once() {
    let mut fx = Fixture::new();
    let root = fx.root;
    let material = fx.graph.add_attribute(Attribute::Material(Material::default()));
    let appearance = fx.graph.add_appearance(Appearance {
        material: Some(material),
        ..Appearance::default()
    });
    let other = fx.appearance_with_material(Material::default());
    fx.cube_at(root, -5.0, Some(appearance));
    fx.cube_at(root, -6.0, Some(other));
    fx.cube_at(root, -7.0, Some(appearance));

    let (_, captured, _) = fx.run(&mut state_sort());
    let installs = captured
        .stream
        .instructions()
        .iter()
        .filter(|i| i.op == Opcode::StartRender && i.renderable == Renderable::Attribute(material))
        .count();
    assert_eq!(installs, 1);
}

#[test]
fn comparator_orders_missing_state_first_and_is_stable() {
    let mut graph = SceneGraph::new();
    let a = graph.add_attribute(Attribute::Material(Material::default()));
    let b = graph.add_attribute(Attribute::Material(Material::default()));

    let with_material = |material| CullItem {
        appearance: Appearance {
            material,
            ..Appearance::default()
        },
        ..CullItem::default()
    };
    let items = vec![
        with_material(Some(b)),
        with_material(None),
        with_material(Some(a)),
        with_material(None),
    ];

    let mut ordering = StateOrdering::new(StateSlot::DEFAULT_PRIORITY.to_vec());
    ordering.sort_indices(&items);
    let first = ordering.order().to_vec();
    assert_eq!(first, vec![1, 3, 2, 0]);

    ordering.sort_indices(&items);
    assert_eq!(ordering.order(), first.as_slice());
}

// ============================================================================
// Depth Sort
// ============================================================================

#[test]
fn transparent_items_draw_back_to_front_after_opaque() {
    let mut fx = Fixture::new();
    let root = fx.root;
    let glass = fx.appearance_with_material(Material {
        transparency: 0.5,
        ..Material::default()
    });
    let near = fx.cube_at(root, -5.0, Some(glass));
    let opaque = fx.cube_at(root, -20.0, None);
    let far = fx.cube_at(root, -10.0, Some(glass));

    let (_, captured, _) = fx.run(&mut depth_sort());
    assert_eq!(drawn_nodes(&captured.stream), vec![opaque, far, near]);

    let ops = ops(&captured.stream);
    let open = ops.iter().position(|&o| o == Opcode::StartTransparent).unwrap();
    let close = ops.iter().position(|&o| o == Opcode::StopTransparent).unwrap();
    let draws: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter(|(_, o)| **o == Opcode::RenderGeometry)
        .map(|(i, _)| i)
        .collect();
    assert!(draws[0] < open);
    assert!(draws[1] > open && draws[2] < close);
}

#[test]
fn opaque_only_scene_has_no_transparent_block() {
    let mut fx = Fixture::new();
    let root = fx.root;
    fx.cube_at(root, -5.0, None);

    let (_, captured, _) = fx.run(&mut depth_sort());
    assert!(!ops(&captured.stream).contains(&Opcode::StartTransparent));
}

// ============================================================================
// Multipass
// ============================================================================

#[test]
fn multipass_brackets_buffer_states() {
    let mut fx = Fixture::new();
    let cleared_color = fx.graph.add_attribute(Attribute::Buffer(
        BufferState::new(BufferKind::Color).with_clear(true),
    ));
    let plain_color = fx
        .graph
        .add_attribute(Attribute::Buffer(BufferState::new(BufferKind::Color)));
    let accumulate = fx
        .graph
        .add_attribute(Attribute::Buffer(BufferState::new(BufferKind::Accumulation)));

    let mut passes = Vec::new();
    for color in [cleared_color, plain_color] {
        let pass_root = fx.graph.add_node(Node::group());
        fx.cube_at(pass_root, -5.0, None);
        passes.push(RenderPass {
            root: pass_root,
            buffers: PassBufferState {
                color: Some(color),
                accumulation: Some(accumulate),
                ..PassBufferState::default()
            },
        });
    }
    let scene = fx.graph.add_scene(Scene::new(SceneKind::Multipass {
        viewpoint: fx.camera,
        passes,
    }));

    let (_, captured, _) = fx.run_scene(scene, &mut state_sort());

    let color = |state| Renderable::Buffer {
        kind: BufferKind::Color,
        state,
    };
    let acc = Renderable::Buffer {
        kind: BufferKind::Accumulation,
        state: accumulate,
    };
    let sequence: Vec<(Opcode, Renderable)> = captured
        .stream
        .instructions()
        .iter()
        .filter(|i| {
            matches!(
                i.renderable,
                Renderable::Buffer { .. } | Renderable::Pass(_)
            ) || matches!(i.op, Opcode::StartMultipass | Opcode::StopMultipass)
        })
        .map(|i| (i.op, i.renderable))
        .collect();

    assert_eq!(
        sequence,
        vec![
            (Opcode::StartMultipass, Renderable::None),
            (Opcode::StartBuffer, color(cleared_color)),
            (Opcode::ClearBuffer, color(cleared_color)),
            (Opcode::StartBuffer, acc),
            (Opcode::StartMultipassPass, Renderable::Pass(0)),
            (Opcode::StopMultipassPass, Renderable::Pass(0)),
            (Opcode::ChangeBuffer, acc),
            (Opcode::ChangeBuffer, color(plain_color)),
            (Opcode::StartMultipassPass, Renderable::Pass(1)),
            (Opcode::StopMultipassPass, Renderable::Pass(1)),
            (Opcode::ChangeBuffer, acc),
            (Opcode::StopBuffer, acc),
            (Opcode::StopBuffer, color(plain_color)),
            (Opcode::StopMultipass, Renderable::None),
        ]
    );

    for instruction in captured.stream.instructions() {
        if let Renderable::Buffer { kind, .. } = instruction.renderable {
            assert_eq!(instruction.id, buffer_slot(kind));
        }
    }
    assert_eq!(drawn_nodes(&captured.stream).len(), 2);
}

#[test]
fn clearing_accumulation_restarts_it() {
    let mut fx = Fixture::new();
    let first = fx
        .graph
        .add_attribute(Attribute::Buffer(BufferState::new(BufferKind::Accumulation)));
    let cleared = fx.graph.add_attribute(Attribute::Buffer(
        BufferState::new(BufferKind::Accumulation).with_clear(true),
    ));

    let mut passes = Vec::new();
    for accumulation in [first, cleared] {
        let pass_root = fx.graph.add_node(Node::group());
        fx.cube_at(pass_root, -5.0, None);
        passes.push(RenderPass {
            root: pass_root,
            buffers: PassBufferState {
                accumulation: Some(accumulation),
                ..PassBufferState::default()
            },
        });
    }
    let scene = fx.graph.add_scene(Scene::new(SceneKind::Multipass {
        viewpoint: fx.camera,
        passes,
    }));

    let (_, captured, _) = fx.run_scene(scene, &mut state_sort());
    let ops: Vec<Opcode> = captured
        .stream
        .instructions()
        .iter()
        .filter(|i| matches!(i.renderable, Renderable::Buffer { .. }))
        .map(|i| i.op)
        .collect();
    assert_eq!(
        ops,
        vec![
            Opcode::StartBuffer,
            Opcode::ChangeBuffer,
            Opcode::StopBuffer,
            Opcode::StartBuffer,
            Opcode::ChangeBuffer,
            Opcode::StopBuffer,
        ]
    );
}

// ============================================================================
// Offscreen Reuse
// ============================================================================

#[test]
fn offscreen_scene_shared_by_two_sources_is_sorted_once() {
    let mut fx = Fixture::new();

    let inner_root = fx.graph.add_node(Node::group());
    let inner_camera = fx
        .graph
        .add_to_parent(Node::leaf(Leaf::Viewpoint(Viewpoint::default())), inner_root)
        .unwrap();
    fx.graph
        .add_to_parent(
            Node::leaf(Leaf::Light(Light::new_directional(Vec3::ONE, 1.0))),
            inner_root,
        )
        .unwrap();
    fx.cube_at(inner_root, -3.0, None);
    let inner_scene = fx.graph.add_scene(Scene::new(SceneKind::Single {
        root: inner_root,
        viewpoint: inner_camera,
    }));

    let root = fx.root;
    for z in [-5.0, -7.0] {
        let source = fx.graph.add_offscreen(OffscreenTexture::new(64, 64).with_layer(
            Layer::new(0).with_viewport(
                Viewport::new(ViewportRect::new(0, 0, 64, 64)).with_scene(0, inner_scene),
            ),
        ));
        let texture = fx.graph.add_texture(Texture::offscreen(source, 64, 64));
        let mut appearance = Appearance::default();
        appearance.texture_units[0] = Some(texture);
        let appearance = fx.graph.add_appearance(appearance);
        fx.cube_at(root, z, Some(appearance));
    }

    let (_, captured, profiling) = fx.run(&mut state_sort());

    assert_eq!(captured.stream.surfaces().len(), 3);
    let clears: Vec<_> = captured.stream.surfaces().iter().map(|s| s.clear_color).collect();
    assert_eq!(clears, vec![Some([0.0; 4]), Some([0.0; 4]), None]);
    assert_eq!(profiling.scenes_sorted, 2);
    assert_eq!(profiling.scenes_reused, 1);
    assert_balanced(&captured.stream);

    // The replayed light bracket gets its own correlation id.
    let light_ids: Vec<u32> = captured
        .stream
        .instructions()
        .iter()
        .filter(|i| i.op == Opcode::StartLight)
        .map(|i| i.id)
        .collect();
    assert_eq!(light_ids.len(), 2);
    assert_ne!(light_ids[0], light_ids[1]);
}

// ============================================================================
// Halt
// ============================================================================

#[test]
fn halted_sort_does_not_call_receiver() {
    let mut fx = Fixture::new();
    let root = fx.root;
    fx.cube_at(root, -5.0, None);

    let halt = HaltFlag::new();
    let mut stage = StateSortStage::new(
        StateSlot::DEFAULT_PRIORITY.to_vec(),
        halt.clone(),
        default_reporter(),
        64,
    );
    halt.request();

    let (status, captured, _) = fx.run(&mut stage);
    assert_eq!(status, StageStatus::Halted);
    assert_eq!(captured.calls, 0);
}
