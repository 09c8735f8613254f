//! Cull Stage
//!
//! Walks the scene graph for every layer, viewport and scene, producing a
//! flat list of visible shapes per render pass together with the state in
//! scope for each one.
//!
//! # Traversal
//!
//! - Transforms are concatenated root-to-leaf
//! - Group bounds are classified against the scene frustum: `AllOut` skips
//!   the subtree, `AllIn` skips further tests below it
//! - Lights, clip planes and local fog scope to their siblings' subtrees
//! - Textures backed by offscreen sources queue those sources for culling
//!
//! Offscreen sources are culled breadth-first once the on-screen layers are
//! done, each at most once per frame. The resulting surfaces are then
//! reversed so that every surface precedes the surfaces that sample it.

mod output;
mod traversal;

pub use output::{
    CullItem, CulledFrame, CulledLayer, CulledPass, CulledScene, CulledSurface, CulledViewport,
    ScopedLeaf,
};

use std::collections::VecDeque;

use glam::Vec2;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::errors::{Result, SharedReporter, StageStatus};
use crate::renderer::HaltFlag;
use crate::renderer::environment::Projection;
use crate::renderer::profiling::{ProfilingData, RequestData};
use crate::scene::{Layer, OffscreenKey, SceneGraph, SceneKey};
use crate::utils::Stopwatch;

use self::traversal::{PendingOffscreen, SurfaceCuller};

/// Consumer of cull output.
///
/// Called synchronously; `frame` is reused by the next cull, so anything
/// needed later must be copied before returning.
pub trait CullOutputReceiver {
    fn culled_output(
        &mut self,
        request: &mut RequestData,
        profiling: &mut ProfilingData,
        frame: &CulledFrame,
        graph: &SceneGraph,
    );
}

/// Visibility determination over a set of layers.
pub trait CullStage: Send {
    /// Culls `layers`, skipping `None` entries, and pushes the result to
    /// `receiver`. A halted cull never calls the receiver.
    fn cull(
        &mut self,
        request: &mut RequestData,
        profiling: &mut ProfilingData,
        layers: &[Option<Layer>],
        graph: &SceneGraph,
        receiver: &mut dyn CullOutputReceiver,
    ) -> Result<StageStatus>;
}

/// Cull stage testing bounding volumes against the six frustum planes.
pub struct FrustumCullStage {
    halt: HaltFlag,
    reporter: SharedReporter,
    frame: CulledFrame,
    pending: VecDeque<PendingOffscreen>,
    visited: FxHashSet<OffscreenKey>,
    /// Projection of each scene's last cull, for custom viewpoints missing a
    /// matrix. Entries of scenes removed from the graph are dropped.
    last_projection: FxHashMap<SceneKey, Projection>,
    item_capacity: usize,
}

impl FrustumCullStage {
    #[must_use]
    pub fn new(halt: HaltFlag, reporter: SharedReporter) -> Self {
        Self {
            halt,
            reporter,
            frame: CulledFrame::default(),
            pending: VecDeque::new(),
            visited: FxHashSet::default(),
            last_projection: FxHashMap::default(),
            item_capacity: 0,
        }
    }

    /// Presizes every render pass's item pool to hold `capacity` items.
    #[must_use]
    pub fn with_item_capacity(mut self, capacity: usize) -> Self {
        self.item_capacity = capacity;
        self
    }

    /// Output of the most recent completed cull.
    #[must_use]
    pub fn frame(&self) -> &CulledFrame {
        &self.frame
    }

    fn cull_all(&mut self, layers: &[Option<Layer>], graph: &SceneGraph) -> Result<StageStatus> {
        let Self {
            halt,
            reporter,
            frame,
            pending,
            visited,
            last_projection,
            item_capacity,
        } = self;

        frame.clear();
        pending.clear();
        visited.clear();
        last_projection.retain(|key, _| graph.scene(*key).is_some());

        let mut culler = SurfaceCuller {
            graph,
            halt,
            reporter: reporter.as_ref(),
            pending,
            visited,
            last_projection,
            item_capacity: *item_capacity,
            owner: None,
        };

        let main = frame.surfaces.next_slot();
        if culler.cull_surface(layers, main)?.is_halted() {
            return Ok(StageStatus::Halted);
        }

        while let Some((source, parent)) = culler.pending.pop_front() {
            let Some(offscreen) = graph.offscreen(source) else {
                continue;
            };
            let surface = frame.surfaces.next_slot();
            surface.owner = Some(source);
            surface.parent = parent;
            surface.size = Vec2::new(offscreen.width as f32, offscreen.height as f32);
            surface.clear_color = Some(offscreen.clear_color.to_array());

            culler.owner = Some(source);
            if culler.cull_surface(&offscreen.layers, surface)?.is_halted() {
                return Ok(StageStatus::Halted);
            }
        }

        frame.surfaces.reverse();
        Ok(StageStatus::Completed)
    }
}

impl CullStage for FrustumCullStage {
    fn cull(
        &mut self,
        request: &mut RequestData,
        profiling: &mut ProfilingData,
        layers: &[Option<Layer>],
        graph: &SceneGraph,
        receiver: &mut dyn CullOutputReceiver,
    ) -> Result<StageStatus> {
        let stopwatch = Stopwatch::start();
        let status = self.cull_all(layers, graph);

        if !matches!(status, Ok(StageStatus::Completed)) {
            self.frame.clear();
            if matches!(status, Ok(StageStatus::Halted)) {
                log::debug!("Cull halted");
            }
            return status;
        }

        profiling.cull_time = stopwatch.elapsed();
        profiling.culled_items = self.frame.item_count();
        profiling.culled_scenes = self.frame.scene_count();
        log::debug!(
            "Culled {} items in {} scenes across {} surfaces",
            profiling.culled_items,
            profiling.culled_scenes,
            self.frame.surfaces.len()
        );

        receiver.culled_output(request, profiling, &self.frame, graph);
        Ok(StageStatus::Completed)
    }
}
