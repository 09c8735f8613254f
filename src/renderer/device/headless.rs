//! Headless binding that records every call instead of drawing.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::ContextError;
use crate::renderer::device::context::{
    ContextStatus, DeviceCall, DrawBuffer, GraphicsContext, OffscreenBacking, SurfaceInfo,
};
use crate::scene::{OffscreenKey, ViewportRect};

/// Context lifecycle events, recorded alongside the resolved draw calls.
#[derive(Debug, Clone, PartialEq)]
pub enum HeadlessEvent {
    MakeCurrent,
    Release,
    Reinitialize,
    Resize(ViewportRect),
    CreateOffscreen {
        key: OffscreenKey,
        width: u32,
        height: u32,
        backing: OffscreenBacking,
    },
    ResizeOffscreen {
        key: OffscreenKey,
        width: u32,
        height: u32,
    },
    DeleteOffscreen(OffscreenKey),
    Call(DeviceCall),
    Swap,
    Dispose,
}

#[derive(Debug, Default)]
struct HeadlessState {
    info: SurfaceInfo,
    events: Vec<HeadlessEvent>,
    /// Scripted outcomes for upcoming `make_current` calls.
    current_script: VecDeque<Result<ContextStatus, ContextError>>,
    execute_failure: Option<ContextError>,
    offscreen_failure: Option<ContextError>,
}

/// A [`GraphicsContext`] that records into shared storage.
///
/// Clones share the same recording, so a test can keep one clone while the
/// device owns another.
#[derive(Debug, Clone, Default)]
pub struct HeadlessContext {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessContext {
    #[must_use]
    pub fn new(info: SurfaceInfo) -> Self {
        Self {
            state: Arc::new(Mutex::new(HeadlessState {
                info,
                ..Default::default()
            })),
        }
    }

    /// Queues the result of a future `make_current`. Unscripted calls
    /// succeed with [`ContextStatus::Ready`].
    pub fn script_make_current(&self, outcome: Result<ContextStatus, ContextError>) {
        self.state.lock().current_script.push_back(outcome);
    }

    /// Makes every `execute` fail with `error` until cleared with `None`.
    pub fn fail_execute(&self, error: Option<ContextError>) {
        self.state.lock().execute_failure = error;
    }

    /// Makes every offscreen allocation fail with `error` until cleared.
    pub fn fail_offscreen(&self, error: Option<ContextError>) {
        self.state.lock().offscreen_failure = error;
    }

    #[must_use]
    pub fn events(&self) -> Vec<HeadlessEvent> {
        self.state.lock().events.clone()
    }

    /// Resolved draw calls only, lifecycle events filtered out.
    #[must_use]
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                HeadlessEvent::Call(call) => Some(call.clone()),
                _ => None,
            })
            .collect()
    }

    /// Removes and returns everything recorded so far.
    pub fn take_events(&self) -> Vec<HeadlessEvent> {
        std::mem::take(&mut self.state.lock().events)
    }

    /// Draw buffers selected so far, in order.
    #[must_use]
    pub fn draw_buffers(&self) -> Vec<DrawBuffer> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCall::DrawBuffer(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: HeadlessEvent) {
        self.state.lock().events.push(event);
    }
}

impl GraphicsContext for HeadlessContext {
    fn make_current(&mut self) -> Result<ContextStatus, ContextError> {
        let mut state = self.state.lock();
        state.events.push(HeadlessEvent::MakeCurrent);
        state
            .current_script
            .pop_front()
            .unwrap_or(Ok(ContextStatus::Ready))
    }

    fn release(&mut self) {
        self.record(HeadlessEvent::Release);
    }

    fn surface_info(&self) -> SurfaceInfo {
        self.state.lock().info.clone()
    }

    fn reinitialize_resources(&mut self) -> Result<(), ContextError> {
        self.record(HeadlessEvent::Reinitialize);
        Ok(())
    }

    fn resize(&mut self, rect: ViewportRect) {
        self.record(HeadlessEvent::Resize(rect));
    }

    fn create_offscreen(
        &mut self,
        key: OffscreenKey,
        width: u32,
        height: u32,
        backing: OffscreenBacking,
    ) -> Result<(), ContextError> {
        let mut state = self.state.lock();
        if let Some(err) = state.offscreen_failure.clone() {
            return Err(err);
        }
        state.events.push(HeadlessEvent::CreateOffscreen {
            key,
            width,
            height,
            backing,
        });
        Ok(())
    }

    fn resize_offscreen(
        &mut self,
        key: OffscreenKey,
        width: u32,
        height: u32,
    ) -> Result<(), ContextError> {
        self.record(HeadlessEvent::ResizeOffscreen { key, width, height });
        Ok(())
    }

    fn delete_offscreen(&mut self, key: OffscreenKey) {
        self.record(HeadlessEvent::DeleteOffscreen(key));
    }

    fn execute(&mut self, call: DeviceCall) -> Result<(), ContextError> {
        let mut state = self.state.lock();
        if let Some(err) = state.execute_failure.clone() {
            return Err(err);
        }
        state.events.push(HeadlessEvent::Call(call));
        Ok(())
    }

    fn swap_buffers(&mut self) -> Result<(), ContextError> {
        self.record(HeadlessEvent::Swap);
        Ok(())
    }

    fn dispose(&mut self) {
        self.record(HeadlessEvent::Dispose);
    }
}
