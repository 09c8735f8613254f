use std::time::Duration;

/// Per-frame timings and counts filled in by each stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfilingData {
    pub frame: u64,
    pub frame_delta: Duration,
    pub cull_time: Duration,
    pub sort_time: Duration,
    pub draw_time: Duration,
    pub culled_items: usize,
    pub culled_scenes: usize,
    pub instructions: usize,
    pub scenes_sorted: usize,
    /// Offscreen scenes whose sorted output was reused from earlier this frame.
    pub scenes_reused: usize,
}

impl ProfilingData {
    /// Resets everything except the frame counter.
    pub fn reset(&mut self) {
        *self = Self {
            frame: self.frame,
            ..Self::default()
        };
    }
}

/// Resource work deferred to the device, handled before the frame's
/// instructions so freed handles can be reused by new allocations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestData {
    pub deleted_resources: Vec<u32>,
    pub shader_inits: Vec<u32>,
    pub shader_logs: Vec<u32>,
}

impl RequestData {
    pub fn delete_resource(&mut self, id: u32) {
        self.deleted_resources.push(id);
    }

    pub fn init_shader(&mut self, id: u32) {
        self.shader_inits.push(id);
    }

    pub fn request_shader_log(&mut self, id: u32) {
        self.shader_logs.push(id);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deleted_resources.is_empty() && self.shader_inits.is_empty() && self.shader_logs.is_empty()
    }

    pub fn clear(&mut self) {
        self.deleted_resources.clear();
        self.shader_inits.clear();
        self.shader_logs.clear();
    }

    /// Moves every pending request from `self` into `into`.
    pub fn drain_into(&mut self, into: &mut RequestData) {
        into.deleted_resources.append(&mut self.deleted_resources);
        into.shader_inits.append(&mut self.shader_inits);
        into.shader_logs.append(&mut self.shader_logs);
    }
}
