use glam::{Vec3, Vec4};

use crate::scene::TextureKey;

#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointLight {
    pub range: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpotLight {
    pub direction: Vec3,
    pub range: f32,
    pub inner_cone: f32,
    pub outer_cone: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LightKind {
    Directional(DirectionalLight),
    Point(PointLight),
    Spot(SpotLight),
}

/// Light leaf. Illuminates its siblings and their descendants.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub color: Vec3,
    pub intensity: f32,
    pub kind: LightKind,
    pub enabled: bool,
}

impl Light {
    #[must_use]
    pub fn new_directional(color: Vec3, intensity: f32) -> Self {
        Self {
            color,
            intensity,
            kind: LightKind::Directional(DirectionalLight {
                direction: Vec3::NEG_Z,
            }),
            enabled: true,
        }
    }

    #[must_use]
    pub fn new_point(color: Vec3, intensity: f32, range: f32) -> Self {
        Self {
            color,
            intensity,
            kind: LightKind::Point(PointLight { range }),
            enabled: true,
        }
    }

    #[must_use]
    pub fn new_spot(
        color: Vec3,
        intensity: f32,
        range: f32,
        inner_cone: f32,
        outer_cone: f32,
    ) -> Self {
        Self {
            color,
            intensity,
            kind: LightKind::Spot(SpotLight {
                direction: Vec3::NEG_Z,
                range,
                inner_cone,
                outer_cone,
            }),
            enabled: true,
        }
    }
}

/// User clip plane `ax + by + cz + d = 0` in the leaf's local frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipPlane {
    pub plane: Vec4,
    pub enabled: bool,
}

impl ClipPlane {
    #[must_use]
    pub fn new(plane: Vec4) -> Self {
        Self {
            plane,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FogMode {
    Linear { start: f32, end: f32 },
    Exponential { density: f32 },
}

/// Fog leaf.
///
/// A global fog is only meaningful when registered as a scene's fog; inside
/// the graph only local fogs (`global == false`) take effect, and the
/// innermost one wins.
#[derive(Debug, Clone, PartialEq)]
pub struct Fog {
    pub color: Vec3,
    pub mode: FogMode,
    pub global: bool,
}

impl Fog {
    #[must_use]
    pub fn local(color: Vec3, mode: FogMode) -> Self {
        Self {
            color,
            mode,
            global: false,
        }
    }

    #[must_use]
    pub fn global(color: Vec3, mode: FogMode) -> Self {
        Self {
            color,
            mode,
            global: true,
        }
    }
}

/// Background leaf. Follows the viewpoint's rotation but not its position.
#[derive(Debug, Clone, PartialEq)]
pub struct Background {
    pub color: Vec4,
    pub texture: Option<TextureKey>,
}

impl Background {
    #[must_use]
    pub fn color(color: Vec4) -> Self {
        Self {
            color,
            texture: None,
        }
    }
}
