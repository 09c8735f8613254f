//! Instruction emission shared by both sort policies.

use smallvec::SmallVec;

use crate::errors::ErrorReporter;
use crate::renderer::cull::CullItem;
use crate::renderer::instruction::{Instruction, InstructionStream, Opcode, Renderable};
use crate::scene::{Appearance, AttributeKey, NodeKey};

/// Correlation ids handed out while an item's scope is open.
#[derive(Debug, Default)]
pub(crate) struct OpenScope {
    lights: SmallVec<[u32; 4]>,
    clips: SmallVec<[u32; 2]>,
    fog: bool,
}

/// Whether `item` can be turned into instructions.
pub(crate) fn is_drawable(item: &CullItem, reporter: &dyn ErrorReporter) -> bool {
    if item.geometry.is_none() && item.custom.is_none() {
        reporter.warning(&format!(
            "Renderable {:?} has neither geometry nor custom content, skipped",
            item.node
        ));
        return false;
    }
    item.node.is_some()
}

pub(crate) fn open_lights(
    stream: &mut InstructionStream,
    item: &CullItem,
    ids: &mut SmallVec<[u32; 4]>,
) {
    for light in &item.lights {
        let id = stream.next_correlation_id();
        stream.push(
            Instruction::new(Opcode::StartLight, Renderable::Light(light.node))
                .with_transform(light.transform)
                .with_id(id),
        );
        ids.push(id);
    }
}

pub(crate) fn close_lights(
    stream: &mut InstructionStream,
    item: &CullItem,
    ids: &mut SmallVec<[u32; 4]>,
) {
    for (light, id) in item.lights.iter().zip(ids.iter()).rev() {
        stream.push(
            Instruction::new(Opcode::StopLight, Renderable::Light(light.node)).with_id(*id),
        );
    }
    ids.clear();
}

pub(crate) fn open_clips(
    stream: &mut InstructionStream,
    item: &CullItem,
    ids: &mut SmallVec<[u32; 2]>,
) {
    for clip in &item.clips {
        let id = stream.next_correlation_id();
        stream.push(
            Instruction::new(Opcode::StartClipPlane, Renderable::ClipPlane(clip.node))
                .with_transform(clip.transform)
                .with_id(id),
        );
        ids.push(id);
    }
}

pub(crate) fn close_clips(
    stream: &mut InstructionStream,
    item: &CullItem,
    ids: &mut SmallVec<[u32; 2]>,
) {
    for (clip, id) in item.clips.iter().zip(ids.iter()).rev() {
        stream.push(
            Instruction::new(Opcode::StopClipPlane, Renderable::ClipPlane(clip.node)).with_id(*id),
        );
    }
    ids.clear();
}

pub(crate) fn open_fog(stream: &mut InstructionStream, fog: Option<NodeKey>) -> bool {
    match fog {
        Some(node) => {
            stream.emit(Opcode::StartFog, Renderable::Fog(node));
            true
        }
        None => false,
    }
}

pub(crate) fn close_fog(stream: &mut InstructionStream, fog: Option<NodeKey>) {
    if let Some(node) = fog {
        stream.emit(Opcode::StopFog, Renderable::Fog(node));
    }
}

/// Opens lights, clip planes and fog for a single item.
pub(crate) fn open_scope(stream: &mut InstructionStream, item: &CullItem) -> OpenScope {
    let mut scope = OpenScope::default();
    open_lights(stream, item, &mut scope.lights);
    open_clips(stream, item, &mut scope.clips);
    scope.fog = open_fog(stream, item.fog);
    scope
}

pub(crate) fn close_scope(stream: &mut InstructionStream, item: &CullItem, mut scope: OpenScope) {
    if scope.fog {
        close_fog(stream, item.fog);
    }
    close_clips(stream, item, &mut scope.clips);
    close_lights(stream, item, &mut scope.lights);
}

pub(crate) fn open_shader(stream: &mut InstructionStream, shader: AttributeKey) -> u32 {
    let id = stream.next_correlation_id();
    stream.push(
        Instruction::new(Opcode::StartShaderProgram, Renderable::Attribute(shader)).with_id(id),
    );
    id
}

pub(crate) fn close_shader(stream: &mut InstructionStream, shader: AttributeKey, id: u32) {
    stream.push(
        Instruction::new(Opcode::StopShaderProgram, Renderable::Attribute(shader)).with_id(id),
    );
}

/// Installs every state slot of `appearance`. Returns the shader ids to
/// close with.
pub(crate) fn open_appearance(stream: &mut InstructionStream, appearance: &Appearance) -> [u32; 2] {
    let mut shader_ids = [0; 2];
    if let Some(vs) = appearance.vertex_shader {
        shader_ids[0] = open_shader(stream, vs);
    }
    if let Some(fs) = appearance.fragment_shader {
        shader_ids[1] = open_shader(stream, fs);
    }
    for (unit, texture) in appearance.texture_units.iter().enumerate() {
        if let Some(texture) = texture {
            stream.emit(
                Opcode::StartTexture,
                Renderable::Texture {
                    unit: unit as u8,
                    texture: *texture,
                },
            );
        }
    }
    for attribute in appearance.attribute_slots() {
        stream.emit(Opcode::StartRender, Renderable::Attribute(attribute));
    }
    shader_ids
}

pub(crate) fn close_appearance(
    stream: &mut InstructionStream,
    appearance: &Appearance,
    shader_ids: [u32; 2],
) {
    let attributes: SmallVec<[AttributeKey; 8]> = appearance.attribute_slots().collect();
    for attribute in attributes.into_iter().rev() {
        stream.emit(Opcode::StopRender, Renderable::Attribute(attribute));
    }
    for (unit, texture) in appearance.texture_units.iter().enumerate().rev() {
        if let Some(texture) = texture {
            stream.emit(
                Opcode::StopTexture,
                Renderable::Texture {
                    unit: unit as u8,
                    texture: *texture,
                },
            );
        }
    }
    if let Some(fs) = appearance.fragment_shader {
        close_shader(stream, fs, shader_ids[1]);
    }
    if let Some(vs) = appearance.vertex_shader {
        close_shader(stream, vs, shader_ids[0]);
    }
}

/// Pushes the shape transform, draws, pops.
pub(crate) fn emit_shape(stream: &mut InstructionStream, item: &CullItem) {
    let Some(node) = item.node else {
        return;
    };
    if let Some(args) = item.appearance.shader_args {
        stream.emit(Opcode::SetShaderArgs, Renderable::Attribute(args));
    }

    let shape = Renderable::Shape {
        node,
        geometry: item.geometry,
    };
    let custom = item.custom.as_ref().map(|c| c.payload.clone());
    stream.push(
        Instruction::new(Opcode::StartRender, shape)
            .with_transform(item.transform)
            .with_custom(custom.clone()),
    );
    stream.push(
        Instruction::new(Opcode::RenderGeometry, shape)
            .with_transform(item.transform)
            .with_custom(custom),
    );
    stream.emit(Opcode::StopRender, shape);
}

/// Emits one item fully bracketed by its own scope and appearance.
pub(crate) fn emit_bracketed(stream: &mut InstructionStream, item: &CullItem) {
    let scope = open_scope(stream, item);
    let shader_ids = open_appearance(stream, &item.appearance);
    emit_shape(stream, item);
    close_appearance(stream, &item.appearance, shader_ids);
    close_scope(stream, item, scope);
}
