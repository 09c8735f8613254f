use glam::{Mat4, Vec3};

use crate::scene::camera::{frustum_matrix, ortho_matrix};
use crate::scene::{CustomPayload, Fog, NodeKey, SceneKey, ViewportRect};
use crate::utils::Recycle;

/// Projection installed for a scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// `[xmin, xmax, ymin, ymax, near, far]`
    Perspective([f32; 6]),
    /// `[xmin, xmax, ymin, ymax, near, far]`
    Orthographic([f32; 6]),
    Custom(Mat4),
}

impl Default for Projection {
    fn default() -> Self {
        Self::Orthographic([-1.0, 1.0, -1.0, 1.0, -1.0, 1.0])
    }
}

impl Projection {
    #[must_use]
    pub fn matrix(&self) -> Mat4 {
        match self {
            Self::Perspective(f) => frustum_matrix(f),
            Self::Orthographic(f) => ortho_matrix(f),
            Self::Custom(m) => *m,
        }
    }

    /// Frustum parameters, when the projection is parametric.
    #[must_use]
    pub fn frustum(&self) -> Option<&[f32; 6]> {
        match self {
            Self::Perspective(f) | Self::Orthographic(f) => Some(f),
            Self::Custom(_) => None,
        }
    }
}

/// Per-scene rendering environment.
///
/// One record exists for every scene (and every multipass scene, computed
/// once for all of its passes). Records are pooled per frame.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentData {
    pub viewport: ViewportRect,
    pub scissor: Option<ViewportRect>,
    pub projection: Projection,
    /// Camera placement in world space.
    pub view_transform: Mat4,
    /// World-to-eye transform; the inverse of `view_transform`.
    pub camera_transform: Mat4,
    /// Per-eye displacement applied by the device for stereo.
    pub eye_offset: Vec3,
    pub background: Option<NodeKey>,
    /// World-to-eye transform for the background: rotation only.
    pub background_transform: Mat4,
    pub background_projection: Projection,
    /// Scene-wide fog.
    pub fog: Option<Fog>,
    pub user_data: Option<CustomPayload>,
    pub layer_id: i32,
    pub sublayer_id: i32,
    pub head_light: bool,
    pub scene: Option<SceneKey>,
}

impl EnvironmentData {
    /// `camera_transform` as 16 column-major floats.
    #[must_use]
    pub fn camera_matrix_array(&self) -> [f32; 16] {
        self.camera_transform.to_cols_array()
    }

    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.projection.matrix() * self.camera_transform
    }
}

impl Recycle for EnvironmentData {
    fn recycle(&mut self) {
        self.background = None;
        self.fog = None;
        self.user_data = None;
        self.scene = None;
    }
}
