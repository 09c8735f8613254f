//! State-sort ordering.
//!
//! Items compare slot by slot in priority order. Within a slot, "no state"
//! orders before any state, so unstyled items gather at the front.

use std::cmp::Ordering;

use crate::renderer::cull::{CullItem, ScopedLeaf};
use crate::renderer::settings::StateSlot;

/// Compares two items on a single slot.
#[must_use]
pub fn compare_slot(slot: StateSlot, a: &CullItem, b: &CullItem) -> Ordering {
    let (x, y) = (&a.appearance, &b.appearance);
    match slot {
        StateSlot::Lights => compare_leaves(&a.lights, &b.lights),
        StateSlot::ClipPlanes => compare_leaves(&a.clips, &b.clips),
        StateSlot::Texture0 | StateSlot::Texture1 | StateSlot::Texture2 | StateSlot::Texture3 => {
            let unit = slot.texture_unit().unwrap_or_default();
            x.texture_units[unit].cmp(&y.texture_units[unit])
        }
        StateSlot::VertexShader => x.vertex_shader.cmp(&y.vertex_shader),
        StateSlot::FragmentShader => x.fragment_shader.cmp(&y.fragment_shader),
        StateSlot::Material => x.material.cmp(&y.material),
        StateSlot::Fog => a.fog.cmp(&b.fog),
        StateSlot::Polygon => x.polygon.cmp(&y.polygon),
        StateSlot::Line => x.line.cmp(&y.line),
        StateSlot::Point => x.point.cmp(&y.point),
        StateSlot::Blend => x.blend.cmp(&y.blend),
        StateSlot::Depth => x.depth.cmp(&y.depth),
        StateSlot::Stencil => x.stencil.cmp(&y.stencil),
    }
}

/// Shorter sets first, then node keys lexicographically.
fn compare_leaves(a: &[ScopedLeaf], b: &[ScopedLeaf]) -> Ordering {
    a.len()
        .cmp(&b.len())
        .then_with(|| a.iter().map(|l| l.node).cmp(b.iter().map(|l| l.node)))
}

/// Full priority-ordered comparison.
#[must_use]
pub fn compare_items(priority: &[StateSlot], a: &CullItem, b: &CullItem) -> Ordering {
    priority
        .iter()
        .map(|&slot| compare_slot(slot, a, b))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Whether two items can share the bracket for `slot`.
///
/// Stricter than [`compare_slot`] for lights and clip planes: the same leaf
/// reached through different transforms must be reinstalled.
#[must_use]
pub fn same_state(slot: StateSlot, a: &CullItem, b: &CullItem) -> bool {
    match slot {
        StateSlot::Lights => a.lights == b.lights,
        StateSlot::ClipPlanes => a.clips == b.clips,
        _ => compare_slot(slot, a, b).is_eq(),
    }
}
