//! Sort Stage
//!
//! Turns a [`CulledFrame`] into an [`InstructionStream`]. Two orderings are
//! available:
//!
//! - [`StateOrdering`]: groups items by shared state, nesting brackets in a
//!   configurable slot priority
//! - [`DepthOrdering`]: opaque items in cull order, then transparent items
//!   back-to-front
//!
//! Both share the frame walk in [`SortCore`], which brackets surfaces,
//! layers, viewports and scenes, handles multipass scenes and reuses the
//! output of offscreen scenes already sorted this frame.

pub mod comparator;
mod depth_sort;
pub(crate) mod emitter;
mod multipass;
mod state_sort;

pub use comparator::{compare_items, compare_slot, same_state};
pub use depth_sort::{DepthOrdering, DepthSortStage, is_transparent, quantize_depth};
pub use state_sort::{StateOrdering, StateSortStage};

use std::ops::Range;

use rustc_hash::FxHashMap;

use crate::errors::{ErrorReporter, SharedReporter, StageStatus};
use crate::renderer::HaltFlag;
use crate::renderer::cull::{CullItem, CulledFrame, CulledScene};
use crate::renderer::environment::EnvironmentData;
use crate::renderer::instruction::{InstructionStream, Opcode, Renderable};
use crate::renderer::profiling::{ProfilingData, RequestData};
use crate::scene::{SceneGraph, SceneKey, ViewportRect};
use crate::utils::Stopwatch;

/// Orders and emits the items of one render pass.
pub trait PassOrdering {
    fn emit_pass(
        &mut self,
        items: &[CullItem],
        env: &EnvironmentData,
        graph: &SceneGraph,
        stream: &mut InstructionStream,
        reporter: &dyn ErrorReporter,
    );
}

/// Consumer of sort output.
///
/// `stream` is rebuilt by the next sort; copy whatever must outlive the call.
pub trait SortedOutputReceiver {
    fn sorted_output(
        &mut self,
        request: &mut RequestData,
        profiling: &mut ProfilingData,
        stream: &InstructionStream,
    );
}

pub trait SortStage: Send {
    /// Sorts `frame` and pushes the stream to `receiver`. A halted sort never
    /// calls the receiver.
    fn sort(
        &mut self,
        request: &mut RequestData,
        profiling: &mut ProfilingData,
        frame: &CulledFrame,
        graph: &SceneGraph,
        receiver: &mut dyn SortedOutputReceiver,
    ) -> StageStatus;
}

/// Frame walk shared by the sort stages.
pub struct SortCore {
    halt: HaltFlag,
    reporter: SharedReporter,
    stream: InstructionStream,
    /// Offscreen scenes sorted this frame.
    memo: FxHashMap<SceneKey, (Range<usize>, ViewportRect)>,
}

impl SortCore {
    #[must_use]
    pub fn new(halt: HaltFlag, reporter: SharedReporter, capacity: usize) -> Self {
        Self {
            halt,
            reporter,
            stream: InstructionStream::with_capacity(capacity),
            memo: FxHashMap::default(),
        }
    }

    /// Output of the most recent completed sort.
    #[must_use]
    pub fn stream(&self) -> &InstructionStream {
        &self.stream
    }

    pub fn sort_frame(
        &mut self,
        request: &mut RequestData,
        profiling: &mut ProfilingData,
        frame: &CulledFrame,
        graph: &SceneGraph,
        ordering: &mut dyn PassOrdering,
        receiver: &mut dyn SortedOutputReceiver,
    ) -> StageStatus {
        let stopwatch = Stopwatch::start();
        self.stream.clear();
        self.memo.clear();
        profiling.scenes_sorted = 0;
        profiling.scenes_reused = 0;

        for surface in frame.surfaces.iter() {
            self.stream
                .begin_surface(surface.owner, surface.parent, surface.size)
                .clear_color = surface.clear_color;
            let offscreen = surface.owner.is_some();

            for layer in surface.layers.iter() {
                self.stream
                    .emit(Opcode::StartLayer, Renderable::Layer(layer.id));
                for viewport in layer.viewports.iter() {
                    self.stream
                        .emit(Opcode::StartViewport, Renderable::Viewport(viewport.rect));
                    for scene in viewport.scenes.iter() {
                        if self.halt.is_set() {
                            log::debug!("Sort halted");
                            self.stream.clear();
                            return StageStatus::Halted;
                        }
                        if offscreen && self.replay(scene, profiling) {
                            continue;
                        }
                        let start = self.stream.len();
                        self.sort_scene(scene, graph, ordering);
                        profiling.scenes_sorted += 1;
                        if offscreen && let Some(key) = scene.scene {
                            self.memo
                                .insert(key, (start..self.stream.len(), scene.env.viewport));
                        }
                    }
                    self.stream
                        .emit(Opcode::StopViewport, Renderable::Viewport(viewport.rect));
                }
                self.stream
                    .emit(Opcode::StopLayer, Renderable::Layer(layer.id));
            }
            self.stream.end_surface();
        }

        profiling.sort_time = stopwatch.elapsed();
        profiling.instructions = self.stream.len();
        log::debug!(
            "Sorted {} scenes ({} reused) into {} instructions",
            profiling.scenes_sorted,
            profiling.scenes_reused,
            profiling.instructions
        );

        receiver.sorted_output(request, profiling, &self.stream);
        StageStatus::Completed
    }

    /// Replays an earlier sort of the same offscreen scene.
    fn replay(&mut self, scene: &CulledScene, profiling: &mut ProfilingData) -> bool {
        let Some(key) = scene.scene else {
            return false;
        };
        let Some((range, viewport)) = self.memo.get(&key).cloned() else {
            return false;
        };
        if viewport != scene.env.viewport {
            return false;
        }
        log::trace!("Reusing sorted output for scene {key:?}");
        self.stream.replay_range(range);
        profiling.scenes_reused += 1;
        true
    }

    fn sort_scene(
        &mut self,
        scene: &CulledScene,
        graph: &SceneGraph,
        ordering: &mut dyn PassOrdering,
    ) {
        let (lights, clips) = scene
            .passes
            .iter()
            .flat_map(|p| p.items.iter())
            .fold((0, 0), |(l, c), item| (l + item.lights.len(), c + item.clips.len()));
        self.stream.reserve_for(scene.item_count(), lights, clips);

        let env = self.stream.push_environment(scene.env.clone());
        self.stream
            .emit(Opcode::StartScene, Renderable::Environment(env));

        let reporter = self.reporter.as_ref();
        if scene.multipass {
            multipass::emit_multipass(scene, graph, ordering, &mut self.stream, reporter);
        } else if let Some(pass) = scene.passes.as_slice().first() {
            ordering.emit_pass(
                pass.items.as_slice(),
                &scene.env,
                graph,
                &mut self.stream,
                reporter,
            );
        }

        self.stream
            .emit(Opcode::StopScene, Renderable::Environment(env));
    }
}
