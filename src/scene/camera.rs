use glam::{Mat4, Quat, Vec3, Vec4};

use crate::errors::{PipelineError, Result};
use crate::scene::bounds::{Aabb, Bounds};

/// How a viewpoint derives its projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectionKind {
    Perspective,
    Orthographic,
    /// Projection supplied directly as a matrix via [`Viewpoint::custom_projection`].
    Custom,
}

/// Camera leaf.
///
/// The viewpoint has no transform of its own: its placement is the
/// concatenation of every transform node on the path up to the scene root.
#[derive(Debug, Clone)]
pub struct Viewpoint {
    pub projection: ProjectionKind,
    /// Vertical field of view in degrees (perspective only).
    pub field_of_view: f32,
    pub near: f32,
    pub far: f32,
    /// `[left, right, bottom, top]` for orthographic projections.
    pub ortho_params: [f32; 4],
    /// Matrix used when `projection` is [`ProjectionKind::Custom`].
    pub custom_projection: Option<Mat4>,
    /// Bind a light to the camera (reserved hardware light 0).
    pub head_light: bool,
    screen_orientation: Option<Quat>,
}

impl Default for Viewpoint {
    fn default() -> Self {
        Self::perspective(45.0, 0.1, 1000.0)
    }
}

impl Viewpoint {
    #[must_use]
    pub fn perspective(field_of_view: f32, near: f32, far: f32) -> Self {
        Self {
            projection: ProjectionKind::Perspective,
            field_of_view,
            near,
            far,
            ortho_params: [-1.0, 1.0, -1.0, 1.0],
            custom_projection: None,
            head_light: false,
            screen_orientation: None,
        }
    }

    #[must_use]
    pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Self {
        Self {
            projection: ProjectionKind::Orthographic,
            ortho_params: [left, right, bottom, top],
            near,
            far,
            ..Self::perspective(45.0, near, far)
        }
    }

    #[must_use]
    pub fn custom(matrix: Mat4) -> Self {
        Self {
            projection: ProjectionKind::Custom,
            custom_projection: Some(matrix),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_head_light(mut self, enabled: bool) -> Self {
        self.head_light = enabled;
        self
    }

    /// Rotates the view about `axis` by `angle` radians, for displays whose
    /// screen is not aligned with the viewer's forward direction.
    pub fn set_screen_orientation(&mut self, axis: Vec3, angle: f32) -> Result<()> {
        if axis.length_squared() <= f32::EPSILON {
            return Err(PipelineError::ZeroLengthAxis("screen orientation"));
        }
        self.screen_orientation = Some(Quat::from_axis_angle(axis.normalize(), angle));
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn screen_orientation(&self) -> Option<Quat> {
        self.screen_orientation
    }

    /// Six-parameter frustum `[xmin, xmax, ymin, ymax, near, far]` for a
    /// viewport of the given aspect ratio. `None` for custom projections.
    #[must_use]
    pub fn frustum_params(&self, aspect: f32) -> Option<[f32; 6]> {
        match self.projection {
            ProjectionKind::Perspective => {
                let ymax = self.near * (self.field_of_view.to_radians() * 0.5).tan();
                let xmax = ymax * aspect;
                Some([-xmax, xmax, -ymax, ymax, self.near, self.far])
            }
            ProjectionKind::Orthographic => {
                let [l, r, b, t] = self.ortho_params;
                Some([l, r, b, t, self.near, self.far])
            }
            ProjectionKind::Custom => None,
        }
    }
}

/// Builds an off-centre perspective matrix (OpenGL clip conventions).
#[must_use]
pub fn frustum_matrix(f: &[f32; 6]) -> Mat4 {
    let [l, r, b, t, n, far] = *f;
    Mat4::from_cols(
        Vec4::new(2.0 * n / (r - l), 0.0, 0.0, 0.0),
        Vec4::new(0.0, 2.0 * n / (t - b), 0.0, 0.0),
        Vec4::new(
            (r + l) / (r - l),
            (t + b) / (t - b),
            -(far + n) / (far - n),
            -1.0,
        ),
        Vec4::new(0.0, 0.0, -2.0 * far * n / (far - n), 0.0),
    )
}

/// Builds an orthographic matrix (OpenGL clip conventions).
#[must_use]
pub fn ortho_matrix(f: &[f32; 6]) -> Mat4 {
    let [l, r, b, t, n, far] = *f;
    Mat4::orthographic_rh_gl(l, r, b, t, n, far)
}

/// Result of testing a bounding volume against the view frustum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrustumTest {
    /// Entirely outside: skip the subtree.
    AllOut,
    /// Entirely inside: descendants need no further tests.
    AllIn,
    /// Straddles at least one plane.
    Partial,
}

/// Six clip planes extracted from a view-projection matrix.
#[derive(Debug, Clone, Copy, Default)]
pub struct Frustum {
    planes: [Vec4; 6], // Left, Right, Bottom, Top, Near, Far
}

impl Frustum {
    /// Gribb-Hartmann plane extraction for a clip space with z in `[-w, w]`.
    #[must_use]
    pub fn from_matrix(m: Mat4) -> Self {
        let rows = [m.row(0), m.row(1), m.row(2), m.row(3)];

        let mut planes = [
            rows[3] + rows[0],
            rows[3] - rows[0],
            rows[3] + rows[1],
            rows[3] - rows[1],
            rows[3] + rows[2],
            rows[3] - rows[2],
        ];

        for plane in &mut planes {
            let length = Vec3::new(plane.x, plane.y, plane.z).length();
            if length > 0.0 {
                *plane /= length;
            }
        }

        Self { planes }
    }

    #[inline]
    #[must_use]
    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    #[must_use]
    pub fn classify_sphere(&self, center: Vec3, radius: f32) -> FrustumTest {
        let mut result = FrustumTest::AllIn;
        for plane in &self.planes {
            let dist = plane.truncate().dot(center) + plane.w;
            if dist < -radius {
                return FrustumTest::AllOut;
            }
            if dist < radius {
                result = FrustumTest::Partial;
            }
        }
        result
    }

    /// Positive/negative-vertex test of a world-space box.
    #[must_use]
    pub fn classify_aabb(&self, aabb: &Aabb) -> FrustumTest {
        let mut result = FrustumTest::AllIn;
        for plane in &self.planes {
            let n = plane.truncate();
            let positive = Vec3::new(
                if n.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if n.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if n.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            if n.dot(positive) + plane.w < 0.0 {
                return FrustumTest::AllOut;
            }
            let negative = Vec3::new(
                if n.x >= 0.0 { aabb.min.x } else { aabb.max.x },
                if n.y >= 0.0 { aabb.min.y } else { aabb.max.y },
                if n.z >= 0.0 { aabb.min.z } else { aabb.max.z },
            );
            if n.dot(negative) + plane.w < 0.0 {
                result = FrustumTest::Partial;
            }
        }
        result
    }

    /// Classifies local-space `bounds` placed in the world by `world`.
    #[must_use]
    pub fn classify(&self, bounds: &Bounds, world: &Mat4) -> FrustumTest {
        match bounds {
            Bounds::Void => FrustumTest::AllOut,
            Bounds::Infinite => FrustumTest::Partial,
            Bounds::Box(aabb) => self.classify_aabb(&aabb.transformed(world)),
            Bounds::Sphere { center, radius } => {
                let scale = world
                    .x_axis
                    .truncate()
                    .length()
                    .max(world.y_axis.truncate().length())
                    .max(world.z_axis.truncate().length());
                self.classify_sphere(world.transform_point3(*center), radius * scale)
            }
        }
    }
}
