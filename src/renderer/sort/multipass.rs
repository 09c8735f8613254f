//! Buffer-state bracketing for multipass scenes.
//!
//! General, color, depth and stencil buffer states transition per pass:
//! START from nothing, CHANGE between two different states, STOP back to
//! nothing. A newly installed state that requests a clear is followed by a
//! CLEAR.
//!
//! Accumulation runs after each pass has rendered into the color buffer:
//! START opens it before the first accumulating pass, CHANGE accumulates
//! after each such pass, and a state asking for a clear is installed by
//! STOP then START instead of reusing the open accumulation.

use crate::errors::ErrorReporter;
use crate::renderer::cull::CulledScene;
use crate::renderer::instruction::{
    Instruction, InstructionStream, Opcode, Renderable, VIEWPORT_SLOT, buffer_slot,
};
use crate::renderer::sort::PassOrdering;
use crate::scene::{Attribute, AttributeKey, BufferKind, SceneGraph, ViewportRect};

fn buffer(op: Opcode, kind: BufferKind, state: AttributeKey) -> Instruction {
    Instruction::new(op, Renderable::Buffer { kind, state }).with_id(buffer_slot(kind))
}

fn requests_clear(graph: &SceneGraph, state: AttributeKey) -> bool {
    matches!(graph.attribute(state), Some(Attribute::Buffer(b)) if b.clear)
}

fn transition(
    stream: &mut InstructionStream,
    graph: &SceneGraph,
    kind: BufferKind,
    from: Option<AttributeKey>,
    to: Option<AttributeKey>,
) {
    let installed = match (from, to) {
        (None, Some(next)) => {
            stream.push(buffer(Opcode::StartBuffer, kind, next));
            Some(next)
        }
        (Some(prev), Some(next)) if prev != next => {
            stream.push(buffer(Opcode::ChangeBuffer, kind, next));
            Some(next)
        }
        (Some(prev), None) => {
            stream.push(buffer(Opcode::StopBuffer, kind, prev));
            None
        }
        _ => None,
    };
    if let Some(state) = installed
        && requests_clear(graph, state)
    {
        stream.push(buffer(Opcode::ClearBuffer, kind, state));
    }
}

fn viewport_transition(
    stream: &mut InstructionStream,
    from: Option<ViewportRect>,
    to: Option<ViewportRect>,
) {
    let op = match (from, to) {
        (None, Some(_)) => Opcode::StartBuffer,
        (Some(a), Some(b)) if a != b => Opcode::ChangeBuffer,
        (Some(_), None) => Opcode::StopBuffer,
        _ => return,
    };
    let rect = to.or(from).unwrap_or_default();
    stream.push(Instruction::new(op, Renderable::PassViewport(rect)).with_id(VIEWPORT_SLOT));
}

const BRACKETED: [BufferKind; 4] = [
    BufferKind::General,
    BufferKind::Color,
    BufferKind::Depth,
    BufferKind::Stencil,
];

/// Emits every pass of `scene` between START/STOP_MULTIPASS.
pub(crate) fn emit_multipass(
    scene: &CulledScene,
    graph: &SceneGraph,
    ordering: &mut dyn PassOrdering,
    stream: &mut InstructionStream,
    reporter: &dyn ErrorReporter,
) {
    stream.emit(Opcode::StartMultipass, Renderable::None);

    let mut previous = crate::scene::PassBufferState::default();
    let mut accumulation: Option<AttributeKey> = None;

    for (index, pass) in scene.passes.iter().enumerate() {
        let buffers = pass.buffers;

        viewport_transition(stream, previous.viewport, buffers.viewport);
        for kind in BRACKETED {
            transition(stream, graph, kind, slot(&previous, kind), slot(&buffers, kind));
        }

        match (accumulation, buffers.accumulation) {
            (None, Some(next)) => {
                stream.push(buffer(Opcode::StartBuffer, BufferKind::Accumulation, next));
            }
            (Some(open), Some(next)) if requests_clear(graph, next) => {
                stream.push(buffer(Opcode::StopBuffer, BufferKind::Accumulation, open));
                stream.push(buffer(Opcode::StartBuffer, BufferKind::Accumulation, next));
            }
            (Some(open), None) => {
                stream.push(buffer(Opcode::StopBuffer, BufferKind::Accumulation, open));
            }
            _ => {}
        }
        accumulation = buffers.accumulation;

        stream.emit(Opcode::StartMultipassPass, Renderable::Pass(index));
        ordering.emit_pass(pass.items.as_slice(), &scene.env, graph, stream, reporter);
        stream.emit(Opcode::StopMultipassPass, Renderable::Pass(index));

        if let Some(state) = accumulation {
            stream.push(buffer(Opcode::ChangeBuffer, BufferKind::Accumulation, state));
        }
        previous = buffers;
    }

    if let Some(open) = accumulation {
        stream.push(buffer(Opcode::StopBuffer, BufferKind::Accumulation, open));
    }
    for kind in BRACKETED.into_iter().rev() {
        if let Some(state) = slot(&previous, kind) {
            stream.push(buffer(Opcode::StopBuffer, kind, state));
        }
    }
    viewport_transition(stream, previous.viewport, None);

    stream.emit(Opcode::StopMultipass, Renderable::None);
}

fn slot(state: &crate::scene::PassBufferState, kind: BufferKind) -> Option<AttributeKey> {
    match kind {
        BufferKind::General => state.general,
        BufferKind::Color => state.color,
        BufferKind::Depth => state.depth,
        BufferKind::Stencil => state.stencil,
        BufferKind::Accumulation => state.accumulation,
    }
}
