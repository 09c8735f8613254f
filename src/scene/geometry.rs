use std::any::Any;
use std::fmt;
use std::sync::Arc;

use glam::Vec3;

use crate::scene::bounds::Aabb;

/// Drawable geometry as seen by the pipeline: bounds and transparency only.
/// Vertex data belongs to the graphics binding.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub bounds: Aabb,
    /// Per-vertex colours carry alpha below one.
    pub has_alpha: bool,
    pub vertex_count: u32,
}

impl Geometry {
    #[must_use]
    pub fn new(bounds: Aabb, vertex_count: u32) -> Self {
        Self {
            bounds,
            has_alpha: false,
            vertex_count,
        }
    }

    #[must_use]
    pub fn with_alpha(mut self, has_alpha: bool) -> Self {
        self.has_alpha = has_alpha;
        self
    }

    /// Geometric centre in local coordinates, used for depth sorting.
    #[inline]
    #[must_use]
    pub fn center(&self) -> Vec3 {
        self.bounds.center()
    }
}

/// Opaque user data carried from the scene graph through to the device.
///
/// Equality is identity of the shared allocation.
#[derive(Clone)]
pub struct CustomPayload(Arc<dyn Any + Send + Sync>);

impl CustomPayload {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl PartialEq for CustomPayload {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for CustomPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CustomPayload")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// Application-drawn content attached to a shape.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomRenderable {
    pub transparent: bool,
    pub payload: CustomPayload,
}
