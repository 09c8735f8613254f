use smallvec::SmallVec;

use crate::errors::{ErrorReporter, SharedReporter, StageStatus};
use crate::renderer::HaltFlag;
use crate::renderer::cull::{CullItem, CulledFrame};
use crate::renderer::environment::EnvironmentData;
use crate::renderer::instruction::{InstructionStream, Opcode, Renderable};
use crate::renderer::profiling::{ProfilingData, RequestData};
use crate::renderer::settings::StateSlot;
use crate::renderer::sort::comparator::{compare_items, same_state};
use crate::renderer::sort::emitter::{self, is_drawable};
use crate::renderer::sort::{PassOrdering, SortCore, SortStage, SortedOutputReceiver};
use crate::scene::{AttributeKey, SceneGraph};

/// Groups items by shared state so each piece of state is installed once
/// per run of items that use it.
///
/// State brackets nest in priority order: when an item differs from its
/// predecessor at some slot, that slot and every less significant one are
/// closed and reopened.
pub struct StateOrdering {
    priority: Vec<StateSlot>,
    order: Vec<usize>,
    light_ids: SmallVec<[u32; 4]>,
    clip_ids: SmallVec<[u32; 2]>,
    shader_ids: [u32; 2],
}

impl StateOrdering {
    #[must_use]
    pub fn new(priority: Vec<StateSlot>) -> Self {
        Self {
            priority,
            order: Vec::new(),
            light_ids: SmallVec::new(),
            clip_ids: SmallVec::new(),
            shader_ids: [0; 2],
        }
    }

    /// Sorted item indices from the most recent pass.
    #[must_use]
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Stable sort of `items` into `self.order`.
    pub fn sort_indices(&mut self, items: &[CullItem]) {
        self.order.clear();
        self.order.extend(0..items.len());
        let priority = &self.priority;
        self.order
            .sort_by(|&a, &b| compare_items(priority, &items[a], &items[b]));
    }

    fn open_slot(&mut self, slot: StateSlot, item: &CullItem, stream: &mut InstructionStream) {
        let appearance = &item.appearance;
        match slot {
            StateSlot::Lights => emitter::open_lights(stream, item, &mut self.light_ids),
            StateSlot::ClipPlanes => emitter::open_clips(stream, item, &mut self.clip_ids),
            StateSlot::Fog => {
                emitter::open_fog(stream, item.fog);
            }
            StateSlot::VertexShader => {
                if let Some(vs) = appearance.vertex_shader {
                    self.shader_ids[0] = emitter::open_shader(stream, vs);
                }
            }
            StateSlot::FragmentShader => {
                if let Some(fs) = appearance.fragment_shader {
                    self.shader_ids[1] = emitter::open_shader(stream, fs);
                }
            }
            StateSlot::Texture0 | StateSlot::Texture1 | StateSlot::Texture2 | StateSlot::Texture3 => {
                let unit = slot.texture_unit().unwrap_or_default();
                if let Some(texture) = appearance.texture_units[unit] {
                    stream.emit(
                        Opcode::StartTexture,
                        Renderable::Texture {
                            unit: unit as u8,
                            texture,
                        },
                    );
                }
            }
            _ => {
                if let Some(attribute) = attribute_for(slot, item) {
                    stream.emit(Opcode::StartRender, Renderable::Attribute(attribute));
                }
            }
        }
    }

    fn close_slot(&mut self, slot: StateSlot, item: &CullItem, stream: &mut InstructionStream) {
        let appearance = &item.appearance;
        match slot {
            StateSlot::Lights => emitter::close_lights(stream, item, &mut self.light_ids),
            StateSlot::ClipPlanes => emitter::close_clips(stream, item, &mut self.clip_ids),
            StateSlot::Fog => emitter::close_fog(stream, item.fog),
            StateSlot::VertexShader => {
                if let Some(vs) = appearance.vertex_shader {
                    emitter::close_shader(stream, vs, self.shader_ids[0]);
                }
            }
            StateSlot::FragmentShader => {
                if let Some(fs) = appearance.fragment_shader {
                    emitter::close_shader(stream, fs, self.shader_ids[1]);
                }
            }
            StateSlot::Texture0 | StateSlot::Texture1 | StateSlot::Texture2 | StateSlot::Texture3 => {
                let unit = slot.texture_unit().unwrap_or_default();
                if let Some(texture) = appearance.texture_units[unit] {
                    stream.emit(
                        Opcode::StopTexture,
                        Renderable::Texture {
                            unit: unit as u8,
                            texture,
                        },
                    );
                }
            }
            _ => {
                if let Some(attribute) = attribute_for(slot, item) {
                    stream.emit(Opcode::StopRender, Renderable::Attribute(attribute));
                }
            }
        }
    }

    fn close_from(&mut self, depth: usize, item: &CullItem, stream: &mut InstructionStream) {
        for index in (depth..self.priority.len()).rev() {
            let slot = self.priority[index];
            self.close_slot(slot, item, stream);
        }
    }

    fn open_from(&mut self, depth: usize, item: &CullItem, stream: &mut InstructionStream) {
        for index in depth..self.priority.len() {
            let slot = self.priority[index];
            self.open_slot(slot, item, stream);
        }
    }
}

fn attribute_for(slot: StateSlot, item: &CullItem) -> Option<AttributeKey> {
    let a = &item.appearance;
    match slot {
        StateSlot::Material => a.material,
        StateSlot::Polygon => a.polygon,
        StateSlot::Line => a.line,
        StateSlot::Point => a.point,
        StateSlot::Blend => a.blend,
        StateSlot::Depth => a.depth,
        StateSlot::Stencil => a.stencil,
        _ => None,
    }
}

impl PassOrdering for StateOrdering {
    fn emit_pass(
        &mut self,
        items: &[CullItem],
        _env: &EnvironmentData,
        _graph: &SceneGraph,
        stream: &mut InstructionStream,
        reporter: &dyn ErrorReporter,
    ) {
        self.sort_indices(items);
        let order = std::mem::take(&mut self.order);

        let mut previous: Option<&CullItem> = None;
        for &index in &order {
            let item = &items[index];
            if !is_drawable(item, reporter) {
                continue;
            }

            let depth = match previous {
                Some(prev) => {
                    let depth = self
                        .priority
                        .iter()
                        .position(|&slot| !same_state(slot, prev, item))
                        .unwrap_or(self.priority.len());
                    self.close_from(depth, prev, stream);
                    depth
                }
                None => 0,
            };
            self.open_from(depth, item, stream);
            emitter::emit_shape(stream, item);
            previous = Some(item);
        }
        if let Some(prev) = previous {
            self.close_from(0, prev, stream);
        }

        self.order = order;
    }
}

/// Sort stage minimising device state changes.
pub struct StateSortStage {
    core: SortCore,
    ordering: StateOrdering,
}

impl StateSortStage {
    #[must_use]
    pub fn new(
        priority: Vec<StateSlot>,
        halt: HaltFlag,
        reporter: SharedReporter,
        capacity: usize,
    ) -> Self {
        Self {
            core: SortCore::new(halt, reporter, capacity),
            ordering: StateOrdering::new(priority),
        }
    }
}

impl SortStage for StateSortStage {
    fn sort(
        &mut self,
        request: &mut RequestData,
        profiling: &mut ProfilingData,
        frame: &CulledFrame,
        graph: &SceneGraph,
        receiver: &mut dyn SortedOutputReceiver,
    ) -> StageStatus {
        self.core
            .sort_frame(request, profiling, frame, graph, &mut self.ordering, receiver)
    }
}
