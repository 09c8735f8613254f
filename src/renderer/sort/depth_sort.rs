use glam::Vec3;

use crate::errors::{ErrorReporter, SharedReporter, StageStatus};
use crate::renderer::HaltFlag;
use crate::renderer::cull::{CullItem, CulledFrame};
use crate::renderer::environment::EnvironmentData;
use crate::renderer::instruction::{InstructionStream, Opcode, Renderable};
use crate::renderer::profiling::{ProfilingData, RequestData};
use crate::renderer::sort::emitter::{emit_bracketed, is_drawable};
use crate::renderer::sort::{PassOrdering, SortCore, SortStage, SortedOutputReceiver};
use crate::scene::SceneGraph;

const RADIX_BITS: u32 = 8;
const RADIX: usize = 1 << RADIX_BITS;

/// Maps a camera-space depth onto `bits`-wide integer keys spanning
/// `[min, max]`. A degenerate range maps everything to zero.
#[must_use]
pub fn quantize_depth(z: f32, min: f32, max: f32, bits: u32) -> u32 {
    let range = max - min;
    if range <= f32::EPSILON || !range.is_finite() {
        return 0;
    }
    let max_key = ((1_u64 << bits) - 1) as f32;
    let t = ((z - min) / range).clamp(0.0, 1.0);
    (t * max_key).round() as u32
}

/// Whether an item may produce fragments with alpha below one.
#[must_use]
pub fn is_transparent(item: &CullItem, graph: &SceneGraph) -> bool {
    if item.custom.as_ref().is_some_and(|c| c.transparent) {
        return true;
    }
    if item
        .geometry
        .and_then(|g| graph.geometry(g))
        .is_some_and(|g| g.has_alpha)
    {
        return true;
    }
    graph.appearance_is_transparent(&item.appearance)
}

/// Opaque items in cull order, then transparent items back-to-front inside
/// one blended block. Every item carries its own light, clip-plane and fog
/// brackets.
pub struct DepthOrdering {
    bits: u32,
    opaque: Vec<usize>,
    transparent: Vec<usize>,
    keyed: Vec<(u32, usize)>,
    scratch: Vec<(u32, usize)>,
    depths: Vec<f32>,
}

impl DepthOrdering {
    #[must_use]
    pub fn new(bits: u32) -> Self {
        Self {
            bits: bits.clamp(1, 24),
            opaque: Vec::new(),
            transparent: Vec::new(),
            keyed: Vec::new(),
            scratch: Vec::new(),
            depths: Vec::new(),
        }
    }

    /// Partitions `items` and orders the transparent ones. Afterwards
    /// `transparent_order` yields indices farthest first.
    pub fn partition(&mut self, items: &[CullItem], env: &EnvironmentData, graph: &SceneGraph) {
        self.opaque.clear();
        self.transparent.clear();
        self.keyed.clear();
        self.depths.clear();

        for (index, item) in items.iter().enumerate() {
            if is_transparent(item, graph) {
                let center = item
                    .geometry
                    .and_then(|g| graph.geometry(g))
                    .map_or(Vec3::ZERO, |g| g.center());
                let eye = (env.camera_transform * item.transform).transform_point3(center);
                self.transparent.push(index);
                self.depths.push(eye.z);
            } else {
                self.opaque.push(index);
            }
        }

        let (min, max) = self
            .depths
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &z| {
                (lo.min(z), hi.max(z))
            });
        for (&index, &z) in self.transparent.iter().zip(&self.depths) {
            self.keyed.push((quantize_depth(z, min, max, self.bits), index));
        }
        self.radix_sort();
    }

    /// LSD radix sort on the quantised keys, one counting pass per byte.
    /// Stable, so equal depths keep cull order.
    fn radix_sort(&mut self) {
        let passes = self.bits.div_ceil(RADIX_BITS);
        self.scratch.clear();
        self.scratch.resize(self.keyed.len(), (0, 0));

        let mut counts = [0_usize; RADIX];
        for pass in 0..passes {
            let shift = pass * RADIX_BITS;
            counts.fill(0);
            for &(key, _) in &self.keyed {
                counts[((key >> shift) as usize) & (RADIX - 1)] += 1;
            }
            let mut total = 0;
            for count in &mut counts {
                let c = *count;
                *count = total;
                total += c;
            }
            for &(key, index) in &self.keyed {
                let bucket = ((key >> shift) as usize) & (RADIX - 1);
                self.scratch[counts[bucket]] = (key, index);
                counts[bucket] += 1;
            }
            std::mem::swap(&mut self.keyed, &mut self.scratch);
        }
    }

    #[must_use]
    pub fn opaque_order(&self) -> &[usize] {
        &self.opaque
    }

    pub fn transparent_order(&self) -> impl Iterator<Item = usize> + '_ {
        self.keyed.iter().map(|&(_, index)| index)
    }
}

impl PassOrdering for DepthOrdering {
    fn emit_pass(
        &mut self,
        items: &[CullItem],
        env: &EnvironmentData,
        graph: &SceneGraph,
        stream: &mut InstructionStream,
        reporter: &dyn ErrorReporter,
    ) {
        self.partition(items, env, graph);

        for &index in &self.opaque {
            let item = &items[index];
            if is_drawable(item, reporter) {
                emit_bracketed(stream, item);
            }
        }

        if self.keyed.is_empty() {
            return;
        }
        stream.emit(Opcode::StartTransparent, Renderable::None);
        for &(_, index) in &self.keyed {
            let item = &items[index];
            if is_drawable(item, reporter) {
                emit_bracketed(stream, item);
            }
        }
        stream.emit(Opcode::StopTransparent, Renderable::None);
    }
}

/// Sort stage with depth-sorted transparency.
pub struct DepthSortStage {
    core: SortCore,
    ordering: DepthOrdering,
}

impl DepthSortStage {
    #[must_use]
    pub fn new(bits: u32, halt: HaltFlag, reporter: SharedReporter, capacity: usize) -> Self {
        Self {
            core: SortCore::new(halt, reporter, capacity),
            ordering: DepthOrdering::new(bits),
        }
    }
}

impl SortStage for DepthSortStage {
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
