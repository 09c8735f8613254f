use std::sync::Arc;

use glam::{Mat4, Vec3};
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::errors::{ContextError, SharedReporter, StageStatus};
use crate::renderer::HaltFlag;
use crate::renderer::device::context::{
    BufferOp, ContextStatus, DeviceCall, DrawBuffer, GraphicsContext, LightSource, RenderTarget,
    SurfaceFeatures, SurfaceInfo,
};
use crate::renderer::device::id_pool::IdPool;
use crate::renderer::device::offscreen::OffscreenBuffers;
use crate::renderer::environment::EnvironmentData;
use crate::renderer::instruction::{Instruction, InstructionStream, Opcode, Renderable};
use crate::renderer::profiling::{ProfilingData, RequestData};
use crate::renderer::settings::StereoMode;
use crate::renderer::sort::SortedOutputReceiver;
use crate::scene::{OffscreenKey, ViewportRect};
use crate::utils::Stopwatch;

/// Lifecycle of the main surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Uninitialized,
    Ready,
    ContextLost,
    Terminated,
}

/// Buffers surface resizes from any thread until the next draw.
#[derive(Debug, Clone, Default)]
pub struct ResizeHandle {
    pending: Arc<Mutex<Option<ViewportRect>>>,
}

impl ResizeHandle {
    /// Records a resize; only the latest one before a draw is applied.
    pub fn request(&self, x: i32, y: i32, width: u32, height: u32) {
        *self.pending.lock() = Some(ViewportRect::new(x, y, width, height));
    }

    pub fn take(&self) -> Option<ViewportRect> {
        self.pending.lock().take()
    }
}

pub type SurfaceListener = Box<dyn FnMut(&SurfaceInfo) + Send>;

/// Executes sorted instruction streams against a [`GraphicsContext`].
pub struct OutputDevice {
    context: Box<dyn GraphicsContext>,
    reporter: SharedReporter,
    halt: HaltFlag,
    state: DeviceState,

    stream: InstructionStream,
    request: RequestData,

    lights: IdPool,
    clips: IdPool,
    transforms: Vec<Mat4>,
    offscreens: OffscreenBuffers,

    info: Option<SurfaceInfo>,
    listeners: Vec<SurfaceListener>,
    resize: ResizeHandle,

    stereo: StereoMode,
    eye_separation: f32,
    right_eye_next: bool,
    clear_color: [f32; 4],

    cleaned_up: bool,
}

impl OutputDevice {
    #[must_use]
    pub fn new(
        context: Box<dyn GraphicsContext>,
        halt: HaltFlag,
        reporter: SharedReporter,
        capacity: usize,
    ) -> Self {
        Self {
            context,
            reporter,
            halt,
            state: DeviceState::Uninitialized,
            stream: InstructionStream::with_capacity(capacity),
            request: RequestData::default(),
            lights: IdPool::default(),
            clips: IdPool::default(),
            transforms: Vec::with_capacity(16),
            offscreens: OffscreenBuffers::default(),
            info: None,
            listeners: Vec::new(),
            resize: ResizeHandle::default(),
            stereo: StereoMode::Mono,
            eye_separation: 0.0,
            right_eye_next: false,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            cleaned_up: false,
        }
    }

    #[must_use]
    pub fn with_stereo(mut self, stereo: StereoMode, eye_separation: f32) -> Self {
        self.stereo = stereo;
        self.eye_separation = eye_separation;
        self
    }

    #[must_use]
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Capabilities reported at first initialization.
    #[must_use]
    pub fn surface_info(&self) -> Option<&SurfaceInfo> {
        self.info.as_ref()
    }

    /// Registers a callback run once with the surface capabilities. If they
    /// are already known the callback runs immediately.
    pub fn add_surface_listener(&mut self, mut listener: SurfaceListener) {
        match &self.info {
            Some(info) => listener(info),
            None => self.listeners.push(listener),
        }
    }

    /// Handle for resize notifications, cloneable across threads.
    #[must_use]
    pub fn resize_handle(&self) -> ResizeHandle {
        self.resize.clone()
    }

    /// Instructions the next draw will execute.
    #[must_use]
    pub fn stream(&self) -> &InstructionStream {
        &self.stream
    }

    /// Queues deletion of the backing buffer of `key`.
    pub fn remove_offscreen(&mut self, key: OffscreenKey) {
        self.offscreens.remove(key);
    }

    /// Executes the current stream. Returns `false` when nothing was drawn:
    /// halted, terminated or context unusable this frame.
    pub fn draw(&mut self, profiling: &mut ProfilingData) -> bool {
        if self.halt.is_set() {
            self.terminate();
            return false;
        }
        if self.state == DeviceState::Terminated {
            return false;
        }

        let stopwatch = Stopwatch::start();
        if !self.prepare() {
            return false;
        }

        if let Some(rect) = self.resize.take() {
            log::debug!("Applying resize to {rect:?}");
            self.context.resize(rect);
        }

        self.process_requests();

        let features = self.info.as_ref().map_or(SurfaceFeatures::empty(), |i| i.features);
        self.offscreens
            .reconcile(self.context.as_mut(), features, self.reporter.as_ref());

        let drawn = self.render();
        if self.state == DeviceState::Terminated {
            return false;
        }
        self.context.release();

        if self.halt.is_set() {
            self.terminate();
            return false;
        }

        profiling.draw_time = stopwatch.elapsed();
        drawn
    }

    pub fn swap_buffers(&mut self) -> bool {
        if self.state != DeviceState::Ready {
            return false;
        }
        match self.context.swap_buffers() {
            Ok(()) => true,
            Err(err) => {
                self.report(&err, "Swap failed");
                false
            }
        }
    }

    /// Releases the context and every backing buffer. Runs once; later
    /// calls only keep the device terminated.
    pub fn terminate(&mut self) {
        self.state = DeviceState::Terminated;
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;
        log::debug!("Terminating output device");
        self.offscreens.delete_all(self.context.as_mut());
        self.context.release();
        self.context.dispose();
    }

    fn report(&mut self, err: &ContextError, message: &str) {
        if err.is_benign() {
            self.terminate();
        } else {
            self.reporter.error(message, Some(err));
        }
    }

    /// Makes the context current and brings the device to `Ready`.
    fn prepare(&mut self) -> bool {
        match self.context.make_current() {
            Ok(ContextStatus::Ready) => {
                if self.info.is_none() {
                    self.initialize();
                }
                self.state = DeviceState::Ready;
                true
            }
            Ok(ContextStatus::Reinitialized) => {
                log::debug!("Context recreated, reinitializing resources");
                if self.info.is_none() {
                    self.initialize();
                }
                if let Err(err) = self.context.reinitialize_resources() {
                    self.report(&err, "Failed to reinitialize resources");
                    self.context.release();
                    if self.state != DeviceState::Terminated {
                        self.state = DeviceState::ContextLost;
                    }
                    return false;
                }
                self.offscreens.requeue_all();
                self.state = DeviceState::Ready;
                true
            }
            Err(err) => {
                self.report(&err, "Failed to make context current");
                if self.state != DeviceState::Terminated {
                    self.state = DeviceState::ContextLost;
                }
                false
            }
        }
    }

    /// Queries surface capabilities, reports them once and sizes the slot
    /// pools.
    fn initialize(&mut self) {
        let info = self.context.surface_info();
        if let Err(msg) = info.parse_version() {
            self.reporter.warning(&format!("Cannot parse driver version: {msg}"));
        }
        log::info!(
            "Surface: version {}, {} lights, {} clip planes, {} texture units, {} render targets",
            info.version,
            info.max_lights,
            info.max_clip_planes,
            info.max_texture_units,
            info.max_render_targets
        );
        self.lights = IdPool::new(info.max_lights);
        self.clips = IdPool::new(info.max_clip_planes);
        for mut listener in self.listeners.drain(..) {
            listener(&info);
        }
        self.info = Some(info);
    }

    /// Runs deferred requests in order. Requests after a failing call stay
    /// queued for the next frame.
    fn process_requests(&mut self) {
        let mut request = std::mem::take(&mut self.request);
        let _ = self.run_pending(&mut request.deleted_resources, DeviceCall::DeleteResource)
            && self.run_pending(&mut request.shader_inits, DeviceCall::InitShader)
            && self.run_pending(&mut request.shader_logs, DeviceCall::ShaderLog);
        self.request = request;
    }

    fn run_pending(&mut self, ids: &mut Vec<u32>, call: fn(u32) -> DeviceCall) -> bool {
        let done = ids.iter().take_while(|&&id| self.run(call(id))).count();
        ids.drain(..done);
        ids.is_empty()
    }

    fn render(&mut self) -> bool {
        let stream = std::mem::take(&mut self.stream);
        let completed = self.render_stream(&stream);
        self.stream = stream;
        completed
    }

    fn render_stream(&mut self, stream: &InstructionStream) -> bool {
        for surface in stream.surfaces() {
            let target = match surface.owner {
                Some(key) if self.offscreens.get(key).is_none() => {
                    log::debug!("No backing buffer for {key:?}, skipping surface");
                    continue;
                }
                Some(key) => RenderTarget::Offscreen(key),
                None => RenderTarget::Main,
            };
            if !self.run(DeviceCall::BindTarget(target)) {
                return false;
            }
            let instructions = &stream.instructions()[surface.range.clone()];
            let clear = surface.clear_color.unwrap_or(self.clear_color);

            let status = if target == RenderTarget::Main {
                self.render_main(stream, instructions, clear)
            } else {
                self.render_one_eye(stream, instructions, 0.0, DrawBuffer::Back, clear)
            };
            match status {
                Some(StageStatus::Completed) => {}
                Some(StageStatus::Halted) | None => return false,
            }
        }
        true
    }

    fn render_main(
        &mut self,
        stream: &InstructionStream,
        instructions: &[Instruction],
        clear: [f32; 4],
    ) -> Option<StageStatus> {
        let half = self.eye_separation * 0.5;
        match self.stereo {
            StereoMode::Mono => {
                self.render_one_eye(stream, instructions, 0.0, DrawBuffer::Back, clear)
            }
            StereoMode::QuadBuffer => {
                let quad = self
                    .info
                    .as_ref()
                    .is_some_and(|i| i.features.contains(SurfaceFeatures::QUAD_STEREO));
                if !quad {
                    return self.render_one_eye(stream, instructions, 0.0, DrawBuffer::Back, clear);
                }
                let left =
                    self.render_one_eye(stream, instructions, -half, DrawBuffer::BackLeft, clear)?;
                if left.is_halted() {
                    return Some(left);
                }
                self.render_one_eye(stream, instructions, half, DrawBuffer::BackRight, clear)
            }
            StereoMode::AlternateFrame => {
                let offset = if self.right_eye_next { half } else { -half };
                self.right_eye_next = !self.right_eye_next;
                self.render_one_eye(stream, instructions, offset, DrawBuffer::Back, clear)
            }
        }
    }

    /// Executes `instructions` once with the camera shifted by `eye_offset`
    /// along its x axis. `None` when the context failed.
    fn render_one_eye(
        &mut self,
        stream: &InstructionStream,
        instructions: &[Instruction],
        eye_offset: f32,
        buffer: DrawBuffer,
        clear: [f32; 4],
    ) -> Option<StageStatus> {
        self.lights.reset();
        self.clips.reset();
        self.transforms.clear();

        if !self.run(DeviceCall::DrawBuffer(buffer)) || !self.run(DeviceCall::Clear(clear)) {
            return None;
        }

        let mut env: Option<&EnvironmentData> = None;
        for instruction in instructions {
            if self.halt.is_set() {
                return Some(StageStatus::Halted);
            }
            if let Renderable::Environment(index) = instruction.renderable
                && instruction.op == Opcode::StartScene
            {
                env = stream.environment(index);
                if env.is_none() {
                    self.reporter
                        .warning(&format!("Scene references missing environment {index}"));
                }
            }
            let calls = self.resolve(instruction, env, eye_offset);
            for call in calls {
                if !self.run(call) {
                    return None;
                }
            }
            if instruction.op == Opcode::StopScene {
                env = None;
            }
        }
        Some(StageStatus::Completed)
    }

    fn run(&mut self, call: DeviceCall) -> bool {
        if self.state == DeviceState::Terminated {
            return false;
        }
        log::trace!("{call:?}");
        match self.context.execute(call) {
            Ok(()) => true,
            Err(err) => {
                self.report(&err, "Device call failed");
                false
            }
        }
    }

    /// Translates one instruction into device calls.
    fn resolve(
        &mut self,
        instruction: &Instruction,
        env: Option<&EnvironmentData>,
        eye_offset: f32,
    ) -> SmallVec<[DeviceCall; 4]> {
        use Opcode as Op;
        use Renderable as R;

        let mut calls = SmallVec::new();
        match (instruction.op, instruction.renderable) {
            (Op::StartViewport, R::Viewport(rect)) => {
                calls.push(DeviceCall::Viewport(rect));
            }
            (Op::StartScene, R::Environment(_)) => {
                if let Some(env) = env {
                    self.begin_scene(env, eye_offset, &mut calls);
                }
            }
            (Op::StopScene, R::Environment(_)) => {
                if let Some(env) = env {
                    if env.head_light {
                        calls.push(DeviceCall::DisableLight { slot: 0 });
                    }
                    if env.fog.is_some() {
                        calls.push(DeviceCall::SceneFog(None));
                    }
                }
                self.transforms.clear();
            }
            (Op::StartRender, R::Shape { .. }) => {
                let parent = self.transforms.last().copied().unwrap_or(Mat4::IDENTITY);
                self.transforms.push(parent * instruction.transform);
                calls.push(DeviceCall::PushTransform(instruction.transform));
            }
            (Op::StopRender, R::Shape { .. }) => {
                self.transforms.pop();
                calls.push(DeviceCall::PopTransform);
            }
            (Op::RenderGeometry, R::Shape { node, geometry }) => {
                calls.push(DeviceCall::Draw {
                    node,
                    geometry,
                    custom: instruction.custom.clone(),
                });
            }
            (Op::StartRender, R::Attribute(key)) => calls.push(DeviceCall::ApplyAttribute(key)),
            (Op::StopRender, R::Attribute(key)) => calls.push(DeviceCall::RestoreAttribute(key)),
            (Op::StartLight, R::Light(node)) => match self.lights.acquire(instruction.id) {
                Some(slot) => calls.push(DeviceCall::EnableLight {
                    slot,
                    source: LightSource::Node(node),
                    transform: instruction.transform,
                }),
                None => log::debug!("Light pool exhausted, dropping {node:?}"),
            },
            (Op::StopLight, R::Light(_)) => {
                if let Some(slot) = self.lights.release(instruction.id) {
                    calls.push(DeviceCall::DisableLight { slot });
                }
            }
            (Op::StartClipPlane, R::ClipPlane(node)) => match self.clips.acquire(instruction.id) {
                Some(slot) => calls.push(DeviceCall::EnableClipPlane {
                    slot,
                    node,
                    transform: instruction.transform,
                }),
                None => log::debug!("Clip plane pool exhausted, dropping {node:?}"),
            },
            (Op::StopClipPlane, R::ClipPlane(_)) => {
                if let Some(slot) = self.clips.release(instruction.id) {
                    calls.push(DeviceCall::DisableClipPlane { slot });
                }
            }
            (Op::StartTransparent, _) => calls.push(DeviceCall::Blend(true)),
            (Op::StopTransparent, _) => calls.push(DeviceCall::Blend(false)),
            (Op::StartFog, R::Fog(node)) => calls.push(DeviceCall::LocalFog(Some(node))),
            (Op::StopFog, R::Fog(_)) => calls.push(DeviceCall::LocalFog(None)),
            (Op::StartShaderProgram, R::Attribute(key)) => calls.push(DeviceCall::UseShader(key)),
            (Op::StopShaderProgram, R::Attribute(key)) => {
                calls.push(DeviceCall::ReleaseShader(key));
            }
            (Op::SetShaderArgs, R::Attribute(key)) => calls.push(DeviceCall::ShaderArgs(key)),
            (Op::StartTexture, R::Texture { unit, texture }) => {
                calls.push(DeviceCall::BindTexture { unit, texture });
            }
            (Op::StopTexture, R::Texture { unit, .. }) => {
                calls.push(DeviceCall::UnbindTexture { unit });
            }
            (Op::StartBuffer | Op::ChangeBuffer, R::PassViewport(rect)) => {
                calls.push(DeviceCall::PassViewport(Some(rect)));
            }
            (Op::StopBuffer, R::PassViewport(_)) => calls.push(DeviceCall::PassViewport(None)),
            (op, R::Buffer { kind, state }) => {
                let op = match op {
                    Op::StartBuffer => BufferOp::Start,
                    Op::ChangeBuffer => BufferOp::Change,
                    Op::StopBuffer => BufferOp::Stop,
                    Op::ClearBuffer => BufferOp::Clear,
                    _ => return calls,
                };
                calls.push(DeviceCall::Buffer { op, kind, state });
            }
            (Op::StartMultipass, _) => calls.push(DeviceCall::Multipass(true)),
            (Op::StopMultipass, _) => calls.push(DeviceCall::Multipass(false)),
            (Op::StartMultipassPass, R::Pass(index)) => calls.push(DeviceCall::BeginPass(index)),
            (Op::StopMultipassPass, R::Pass(index)) => calls.push(DeviceCall::EndPass(index)),
            (Op::StartLayer | Op::StopLayer | Op::StopViewport, _) => {}
            (op, renderable) => {
                self.reporter
                    .warning(&format!("Malformed instruction {op:?} on {renderable:?}, skipped"));
            }
        }
        calls
    }

    fn begin_scene(
        &mut self,
        env: &EnvironmentData,
        eye_offset: f32,
        calls: &mut SmallVec<[DeviceCall; 4]>,
    ) {
        self.transforms.clear();
        calls.push(DeviceCall::Viewport(env.viewport));
        calls.push(DeviceCall::Scissor(env.scissor));

        if let Some(node) = env.background {
            calls.push(DeviceCall::Background {
                node,
                transform: env.background_transform,
                projection: env.background_projection.matrix(),
            });
        }

        let eye = env.eye_offset + Vec3::X * eye_offset;
        let camera = Mat4::from_translation(-eye) * env.camera_transform;
        calls.push(DeviceCall::Projection(env.projection.matrix()));
        calls.push(DeviceCall::Camera(camera));

        if let Some(fog) = &env.fog {
            calls.push(DeviceCall::SceneFog(Some(fog.clone())));
        }
        if env.head_light {
            calls.push(DeviceCall::EnableLight {
                slot: 0,
                source: LightSource::Head,
                transform: Mat4::IDENTITY,
            });
        }
    }
}

impl Drop for OutputDevice {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl SortedOutputReceiver for OutputDevice {
    fn sorted_output(
        &mut self,
        request: &mut RequestData,
        _profiling: &mut ProfilingData,
        stream: &InstructionStream,
    ) {
        self.stream.copy_from(stream);
        request.drain_into(&mut self.request);

        for surface in stream.surfaces() {
            if let Some(key) = surface.owner {
                self.offscreens
                    .require(key, surface.size.x as u32, surface.size.y as u32);
            }
        }
    }
}
