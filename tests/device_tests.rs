//! Output Device Tests
//!
//! Tests for:
//! - Device call sequences produced for a scene
//! - Light slot allocation (slot 0 reserved, graceful exhaustion)
//! - Context loss, recovery, interruption and recreation
//! - Surface capability reporting
//! - Deferred requests, buffered resizes and offscreen buffers
//! - Stereo rendering
//! - One-shot cleanup on halt

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use glam::{Mat4, Vec2, Vec3};
use parking_lot::Mutex;

use saga::errors::{ContextError, ErrorReporter, default_reporter};
use saga::renderer::device::{
    ContextStatus, DeviceCall, DeviceState, DrawBuffer, HeadlessContext, HeadlessEvent,
    LightSource, OutputDevice, RenderTarget, SurfaceFeatures, SurfaceInfo,
};
use saga::renderer::environment::EnvironmentData;
use saga::renderer::instruction::{Instruction, InstructionStream, Opcode, Renderable};
use saga::renderer::profiling::{ProfilingData, RequestData};
use saga::renderer::settings::StereoMode;
use saga::renderer::sort::SortedOutputReceiver;
use saga::renderer::HaltFlag;
use saga::scene::{
    Node, NodeKey, OffscreenKey, OffscreenTexture, SceneGraph, ViewportRect,
};

const EPSILON: f32 = 1e-5;

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Default)]
struct RecordingReporter {
    warnings: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl ErrorReporter for RecordingReporter {
    fn warning(&self, message: &str) {
        self.warnings.lock().push(message.to_string());
    }

    fn error(&self, message: &str, _cause: Option<&dyn std::error::Error>) {
        self.errors.lock().push(message.to_string());
    }
}

const RECT: ViewportRect = ViewportRect {
    x: 0,
    y: 0,
    width: 800,
    height: 600,
};

fn node_keys(count: usize) -> Vec<NodeKey> {
    let mut graph = SceneGraph::new();
    (0..count).map(|_| graph.add_node(Node::group())).collect()
}

fn offscreen_key() -> OffscreenKey {
    SceneGraph::new().add_offscreen(OffscreenTexture::new(64, 32))
}

/// One surface with a single scene whose body is written by `body`.
fn write_surface(
    stream: &mut InstructionStream,
    owner: Option<OffscreenKey>,
    env: EnvironmentData,
    body: impl FnOnce(&mut InstructionStream),
) {
    write_cleared_surface(stream, owner, None, env, body);
}

fn write_cleared_surface(
    stream: &mut InstructionStream,
    owner: Option<OffscreenKey>,
    clear_color: Option<[f32; 4]>,
    env: EnvironmentData,
    body: impl FnOnce(&mut InstructionStream),
) {
    stream
        .begin_surface(owner, None, Vec2::new(64.0, 32.0))
        .clear_color = clear_color;
    stream.emit(Opcode::StartLayer, Renderable::Layer(0));
    stream.emit(Opcode::StartViewport, Renderable::Viewport(env.viewport));
    let index = stream.push_environment(env);
    stream.emit(Opcode::StartScene, Renderable::Environment(index));
    body(stream);
    stream.emit(Opcode::StopScene, Renderable::Environment(index));
    stream.emit(Opcode::StopViewport, Renderable::Viewport(RECT));
    stream.emit(Opcode::StopLayer, Renderable::Layer(0));
    stream.end_surface();
}

fn env() -> EnvironmentData {
    EnvironmentData {
        viewport: RECT,
        ..EnvironmentData::default()
    }
}

fn draw_shape(stream: &mut InstructionStream, node: NodeKey, transform: Mat4) {
    let shape = Renderable::Shape {
        node,
        geometry: None,
    };
    stream.push(Instruction::new(Opcode::StartRender, shape).with_transform(transform));
    stream.push(Instruction::new(Opcode::RenderGeometry, shape).with_transform(transform));
    stream.emit(Opcode::StopRender, shape);
}

fn single_shape_stream(node: NodeKey) -> InstructionStream {
    let mut stream = InstructionStream::with_capacity(16);
    write_surface(&mut stream, None, env(), |s| {
        draw_shape(s, node, Mat4::IDENTITY);
    });
    stream
}

fn feed(device: &mut OutputDevice, stream: &InstructionStream) {
    device.sorted_output(
        &mut RequestData::default(),
        &mut ProfilingData::default(),
        stream,
    );
}

fn device_with(context: &HeadlessContext, reporter: Arc<RecordingReporter>) -> OutputDevice {
    OutputDevice::new(Box::new(context.clone()), HaltFlag::new(), reporter, 16)
}

fn draw(device: &mut OutputDevice) -> bool {
    device.draw(&mut ProfilingData::default())
}

fn camera_offsets(calls: &[DeviceCall]) -> Vec<f32> {
    calls
        .iter()
        .filter_map(|c| match c {
            DeviceCall::Camera(m) => Some(m.w_axis.x),
            _ => None,
        })
        .collect()
}

fn count_events(events: &[HeadlessEvent], wanted: &HeadlessEvent) -> usize {
    events.iter().filter(|e| *e == wanted).count()
}

// ============================================================================
// Call Sequences
// ============================================================================

#[test]
fn scene_resolves_to_ordered_calls() {
    let context = HeadlessContext::default();
    let mut device = device_with(&context, Arc::default()).with_clear_color([0.1, 0.2, 0.3, 1.0]);
    let node = node_keys(1)[0];
    let transform = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));

    let mut stream = InstructionStream::with_capacity(16);
    let scene_env = EnvironmentData {
        head_light: true,
        ..env()
    };
    let projection = scene_env.projection.matrix();
    write_surface(&mut stream, None, scene_env, |s| draw_shape(s, node, transform));
    feed(&mut device, &stream);

    assert!(draw(&mut device));
    assert_eq!(device.state(), DeviceState::Ready);
    assert_eq!(
        context.calls(),
        vec![
            DeviceCall::BindTarget(RenderTarget::Main),
            DeviceCall::DrawBuffer(DrawBuffer::Back),
            DeviceCall::Clear([0.1, 0.2, 0.3, 1.0]),
            DeviceCall::Viewport(RECT),
            DeviceCall::Viewport(RECT),
            DeviceCall::Scissor(None),
            DeviceCall::Projection(projection),
            DeviceCall::Camera(Mat4::IDENTITY),
            DeviceCall::EnableLight {
                slot: 0,
                source: LightSource::Head,
                transform: Mat4::IDENTITY,
            },
            DeviceCall::PushTransform(transform),
            DeviceCall::Draw {
                node,
                geometry: None,
                custom: None,
            },
            DeviceCall::PopTransform,
            DeviceCall::DisableLight { slot: 0 },
        ]
    );

    let events = context.events();
    assert_eq!(events.first(), Some(&HeadlessEvent::MakeCurrent));
    assert_eq!(events.last(), Some(&HeadlessEvent::Release));
}

#[test]
fn redraw_replays_identical_calls() {
    let context = HeadlessContext::default();
    let mut device = device_with(&context, Arc::default());
    let keys = node_keys(2);

    let mut stream = InstructionStream::with_capacity(16);
    write_surface(&mut stream, None, env(), |s| {
        let id = s.next_correlation_id();
        s.push(Instruction::new(Opcode::StartLight, Renderable::Light(keys[0])).with_id(id));
        draw_shape(s, keys[1], Mat4::IDENTITY);
        s.push(Instruction::new(Opcode::StopLight, Renderable::Light(keys[0])).with_id(id));
    });
    feed(&mut device, &stream);

    assert!(draw(&mut device));
    let first = context.take_events();
    assert!(draw(&mut device));
    let second = context.take_events();
    assert_eq!(first, second);
}

// ============================================================================
// Light Slots
// ============================================================================

#[test]
fn light_slots_skip_zero_and_drop_when_exhausted() {
    let reporter = Arc::new(RecordingReporter::default());
    let context = HeadlessContext::new(SurfaceInfo {
        max_lights: 3,
        ..SurfaceInfo::default()
    });
    let mut device = device_with(&context, reporter.clone());
    let keys = node_keys(4);

    let mut stream = InstructionStream::with_capacity(32);
    write_surface(&mut stream, None, env(), |s| {
        let ids: Vec<u32> = (0..3).map(|_| s.next_correlation_id()).collect();
        for (i, &id) in ids.iter().enumerate() {
            s.push(Instruction::new(Opcode::StartLight, Renderable::Light(keys[i])).with_id(id));
        }
        draw_shape(s, keys[3], Mat4::IDENTITY);
        for (i, &id) in ids.iter().enumerate().rev() {
            s.push(Instruction::new(Opcode::StopLight, Renderable::Light(keys[i])).with_id(id));
        }
    });
    feed(&mut device, &stream);

    assert!(draw(&mut device));
    let calls = context.calls();
    let enabled: Vec<u32> = calls
        .iter()
        .filter_map(|c| match c {
            DeviceCall::EnableLight { slot, .. } => Some(*slot),
            _ => None,
        })
        .collect();
    let disabled: Vec<u32> = calls
        .iter()
        .filter_map(|c| match c {
            DeviceCall::DisableLight { slot } => Some(*slot),
            _ => None,
        })
        .collect();

    assert_eq!(enabled, vec![1, 2]);
    assert_eq!(disabled, vec![2, 1]);
    assert!(calls.iter().any(|c| matches!(c, DeviceCall::Draw { .. })));
    assert!(reporter.errors.lock().is_empty());
}

// ============================================================================
// Context Lifecycle
// ============================================================================

#[test]
fn failed_make_current_loses_context_until_recovered() {
    let reporter = Arc::new(RecordingReporter::default());
    let context = HeadlessContext::default();
    context.script_make_current(Err(ContextError::Failed("no surface".into())));
    let mut device = device_with(&context, reporter.clone());
    feed(&mut device, &single_shape_stream(node_keys(1)[0]));

    assert!(!draw(&mut device));
    assert_eq!(device.state(), DeviceState::ContextLost);
    assert_eq!(reporter.errors.lock().len(), 1);
    assert!(context.calls().is_empty());

    assert!(draw(&mut device));
    assert_eq!(device.state(), DeviceState::Ready);
    assert!(device.surface_info().is_some());
}

#[test]
fn interrupted_context_terminates_quietly() {
    let reporter = Arc::new(RecordingReporter::default());
    let context = HeadlessContext::default();
    context.script_make_current(Err(ContextError::Interrupted));
    let mut device = device_with(&context, reporter.clone());

    assert!(!draw(&mut device));
    assert_eq!(device.state(), DeviceState::Terminated);
    assert!(reporter.errors.lock().is_empty());

    assert!(!draw(&mut device));
    let events = context.events();
    assert_eq!(count_events(&events, &HeadlessEvent::MakeCurrent), 1);
    assert_eq!(count_events(&events, &HeadlessEvent::Dispose), 1);
}

#[test]
fn recreated_context_reinitializes_and_reallocates_offscreens() {
    let context = HeadlessContext::default();
    let mut device = device_with(&context, Arc::default());
    let key = offscreen_key();

    let mut stream = InstructionStream::with_capacity(16);
    write_surface(&mut stream, Some(key), env(), |_| {});
    feed(&mut device, &stream);

    assert!(draw(&mut device));
    context.take_events();

    context.script_make_current(Ok(ContextStatus::Reinitialized));
    assert!(draw(&mut device));
    let events = context.take_events();

    let reinit = events
        .iter()
        .position(|e| *e == HeadlessEvent::Reinitialize)
        .unwrap();
    let realloc = events
        .iter()
        .position(|e| matches!(e, HeadlessEvent::CreateOffscreen { key: k, width: 64, height: 32, .. } if *k == key))
        .unwrap();
    assert!(reinit < realloc);
}

#[test]
fn failing_call_is_reported_and_aborts_the_frame() {
    let reporter = Arc::new(RecordingReporter::default());
    let context = HeadlessContext::default();
    let mut device = device_with(&context, reporter.clone());
    feed(&mut device, &single_shape_stream(node_keys(1)[0]));

    context.fail_execute(Some(ContextError::Lost));
    assert!(!draw(&mut device));
    assert_eq!(reporter.errors.lock().len(), 1);
    assert_ne!(device.state(), DeviceState::Terminated);

    context.fail_execute(None);
    assert!(draw(&mut device));
}

#[test]
fn dropping_the_device_releases_the_context() {
    let context = HeadlessContext::default();
    let device = device_with(&context, Arc::default());
    drop(device);

    assert_eq!(
        context.events(),
        vec![HeadlessEvent::Release, HeadlessEvent::Dispose]
    );
}

// ============================================================================
// Surface Info
// ============================================================================

#[test]
fn surface_info_reported_once_to_listeners() {
    let context = HeadlessContext::default();
    let mut device = device_with(&context, Arc::default());
    let seen = Arc::new(AtomicUsize::new(0));

    let counter = seen.clone();
    device.add_surface_listener(Box::new(move |info| {
        assert_eq!(info.max_lights, 8);
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    assert_eq!(seen.load(Ordering::SeqCst), 0);

    draw(&mut device);
    draw(&mut device);
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    let counter = seen.clone();
    device.add_surface_listener(Box::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[test]
fn unparseable_version_is_a_warning() {
    let reporter = Arc::new(RecordingReporter::default());
    let context = HeadlessContext::new(SurfaceInfo {
        version: "vendor build".into(),
        ..SurfaceInfo::default()
    });
    let mut device = device_with(&context, reporter.clone());

    draw(&mut device);
    assert_eq!(reporter.warnings.lock().len(), 1);
    assert_eq!(device.state(), DeviceState::Ready);
}

// ============================================================================
// Deferred Work
// ============================================================================

#[test]
fn deferred_requests_run_before_rendering() {
    let context = HeadlessContext::default();
    let mut device = device_with(&context, Arc::default());

    let mut request = RequestData::default();
    request.delete_resource(7);
    request.init_shader(3);
    request.request_shader_log(3);
    device.sorted_output(
        &mut request,
        &mut ProfilingData::default(),
        &single_shape_stream(node_keys(1)[0]),
    );
    assert!(request.is_empty());

    draw(&mut device);
    let calls = context.calls();
    assert_eq!(
        &calls[..4],
        &[
            DeviceCall::DeleteResource(7),
            DeviceCall::InitShader(3),
            DeviceCall::ShaderLog(3),
            DeviceCall::BindTarget(RenderTarget::Main),
        ]
    );

    context.take_events();
    draw(&mut device);
    assert!(!context.calls().contains(&DeviceCall::DeleteResource(7)));
}

#[test]
fn failed_request_keeps_the_rest_queued() {
    let context = HeadlessContext::default();
    let mut device = device_with(&context, Arc::default());

    let mut request = RequestData::default();
    for id in 1..=3 {
        request.delete_resource(id);
    }
    request.init_shader(9);
    device.sorted_output(
        &mut request,
        &mut ProfilingData::default(),
        &single_shape_stream(node_keys(1)[0]),
    );

    context.fail_execute(Some(ContextError::Failed("device busy".into())));
    assert!(!draw(&mut device));

    context.fail_execute(None);
    assert!(draw(&mut device));
    assert_eq!(
        &context.calls()[..4],
        &[
            DeviceCall::DeleteResource(1),
            DeviceCall::DeleteResource(2),
            DeviceCall::DeleteResource(3),
            DeviceCall::InitShader(9),
        ]
    );

    context.take_events();
    draw(&mut device);
    assert!(!context.calls().contains(&DeviceCall::DeleteResource(1)));
}

#[test]
fn latest_resize_is_applied_at_draw() {
    let context = HeadlessContext::default();
    let mut device = device_with(&context, Arc::default());
    let handle = device.resize_handle();

    handle.request(0, 0, 640, 480);
    handle.request(0, 0, 1024, 768);
    assert!(context.events().is_empty());

    draw(&mut device);
    let events = context.events();
    assert_eq!(
        events[1],
        HeadlessEvent::Resize(ViewportRect::new(0, 0, 1024, 768))
    );
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, HeadlessEvent::Resize(_)))
            .count(),
        1
    );
}

// ============================================================================
// Offscreen Buffers
// ============================================================================

#[test]
fn offscreen_surface_renders_into_its_buffer() {
    let context = HeadlessContext::default();
    let mut device = device_with(&context, Arc::default());
    let key = offscreen_key();
    let node = node_keys(1)[0];

    let mut stream = InstructionStream::with_capacity(32);
    write_surface(&mut stream, Some(key), env(), |s| draw_shape(s, node, Mat4::IDENTITY));
    write_surface(&mut stream, None, env(), |s| draw_shape(s, node, Mat4::IDENTITY));
    feed(&mut device, &stream);

    assert!(draw(&mut device));
    let calls = context.calls();
    let targets: Vec<_> = calls
        .iter()
        .filter_map(|c| match c {
            DeviceCall::BindTarget(t) => Some(*t),
            _ => None,
        })
        .collect();
    assert_eq!(targets, vec![RenderTarget::Offscreen(key), RenderTarget::Main]);

    // Removed buffers are deleted on the next draw and their surface skipped.
    device.remove_offscreen(key);
    context.take_events();
    assert!(draw(&mut device));
    let events = context.events();
    assert_eq!(count_events(&events, &HeadlessEvent::DeleteOffscreen(key)), 1);
    assert!(!context.calls().contains(&DeviceCall::BindTarget(RenderTarget::Offscreen(key))));
}

#[test]
fn offscreen_surface_uses_its_own_clear_color() {
    let context = HeadlessContext::default();
    let mut device = device_with(&context, Arc::default()).with_clear_color([0.0, 0.0, 0.0, 1.0]);
    let key = offscreen_key();
    let node = node_keys(1)[0];

    let mut stream = InstructionStream::with_capacity(32);
    write_cleared_surface(&mut stream, Some(key), Some([1.0, 0.5, 0.0, 0.0]), env(), |s| {
        draw_shape(s, node, Mat4::IDENTITY);
    });
    write_surface(&mut stream, None, env(), |s| draw_shape(s, node, Mat4::IDENTITY));
    feed(&mut device, &stream);

    assert!(draw(&mut device));
    let clears: Vec<_> = context
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            DeviceCall::Clear(color) => Some(color),
            _ => None,
        })
        .collect();
    assert_eq!(clears, vec![[1.0, 0.5, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]]);
}

#[test]
fn offscreen_without_support_is_skipped_with_warning() {
    let reporter = Arc::new(RecordingReporter::default());
    let context = HeadlessContext::new(SurfaceInfo {
        features: SurfaceFeatures::empty(),
        ..SurfaceInfo::default()
    });
    let mut device = device_with(&context, reporter.clone());
    let key = offscreen_key();

    let mut stream = InstructionStream::with_capacity(16);
    write_surface(&mut stream, Some(key), env(), |_| {});
    feed(&mut device, &stream);

    assert!(draw(&mut device));
    assert_eq!(reporter.warnings.lock().len(), 1);
    assert!(context.calls().is_empty());
}

// ============================================================================
// Stereo
// ============================================================================

#[test]
fn quad_buffer_renders_both_eyes() {
    let context = HeadlessContext::new(SurfaceInfo {
        features: SurfaceFeatures::FRAMEBUFFER_OBJECTS | SurfaceFeatures::QUAD_STEREO,
        ..SurfaceInfo::default()
    });
    let mut device = device_with(&context, Arc::default()).with_stereo(StereoMode::QuadBuffer, 0.1);
    feed(&mut device, &single_shape_stream(node_keys(1)[0]));

    assert!(draw(&mut device));
    assert_eq!(
        context.draw_buffers(),
        vec![DrawBuffer::BackLeft, DrawBuffer::BackRight]
    );
    let offsets = camera_offsets(&context.calls());
    assert_eq!(offsets.len(), 2);
    assert!((offsets[0] - 0.05).abs() < EPSILON);
    assert!((offsets[1] + 0.05).abs() < EPSILON);
}

#[test]
fn quad_buffer_without_support_renders_mono() {
    let context = HeadlessContext::default();
    let mut device = device_with(&context, Arc::default()).with_stereo(StereoMode::QuadBuffer, 0.1);
    feed(&mut device, &single_shape_stream(node_keys(1)[0]));

    assert!(draw(&mut device));
    assert_eq!(context.draw_buffers(), vec![DrawBuffer::Back]);
    assert_eq!(camera_offsets(&context.calls()), vec![0.0]);
}

#[test]
fn alternate_frame_switches_eye_each_draw() {
    let context = HeadlessContext::default();
    let mut device =
        device_with(&context, Arc::default()).with_stereo(StereoMode::AlternateFrame, 0.2);
    feed(&mut device, &single_shape_stream(node_keys(1)[0]));

    for _ in 0..3 {
        assert!(draw(&mut device));
    }
    let offsets = camera_offsets(&context.calls());
    assert_eq!(offsets.len(), 3);
    assert!((offsets[0] - 0.1).abs() < EPSILON);
    assert!((offsets[1] + 0.1).abs() < EPSILON);
    assert!((offsets[2] - 0.1).abs() < EPSILON);
}

// ============================================================================
// Halt
// ============================================================================

#[test]
fn halt_cleans_up_exactly_once() {
    let context = HeadlessContext::default();
    let halt = HaltFlag::new();
    let mut device = OutputDevice::new(Box::new(context.clone()), halt.clone(), default_reporter(), 16);
    let key = offscreen_key();

    let mut stream = InstructionStream::with_capacity(16);
    write_surface(&mut stream, Some(key), env(), |_| {});
    feed(&mut device, &stream);
    assert!(draw(&mut device));
    context.take_events();

    halt.request();
    assert!(!draw(&mut device));
    assert_eq!(device.state(), DeviceState::Terminated);
    assert!(!draw(&mut device));
    device.terminate();

    assert_eq!(
        context.events(),
        vec![
            HeadlessEvent::DeleteOffscreen(key),
            HeadlessEvent::Release,
            HeadlessEvent::Dispose,
        ]
    );
    assert!(!device.swap_buffers());
}
