use glam::Mat4;
use smallvec::SmallVec;

use crate::scene::bounds::Bounds;
use crate::scene::camera::Viewpoint;
use crate::scene::geometry::CustomRenderable;
use crate::scene::light::{Background, ClipPlane, Fog, Light};
use crate::scene::{AppearanceKey, GeometryKey, NodeKey};

/// A scene graph node.
///
/// # Hierarchy
///
/// - `parents`: at most one entry unless the node is `shared`
/// - `children`: ordered child keys; only groups, transforms and overrides
///   may hold children
///
/// # Bounds
///
/// `bounds` is expressed in the frame the node's children live in (for a
/// transform node: after its matrix is applied). Groups are classified
/// against the view frustum before their children are visited.
#[derive(Debug, Clone)]
pub struct Node {
    // === Core Hierarchy ===
    pub(crate) parents: SmallVec<[NodeKey; 1]>,
    pub(crate) children: Vec<NodeKey>,

    /// Permits more than one parent. Shared nodes cannot sit on a viewpoint
    /// or background path.
    pub shared: bool,

    pub bounds: Bounds,
    pub kind: NodeKind,
}

impl Node {
    #[must_use]
    pub fn new(kind: NodeKind) -> Self {
        Self {
            parents: SmallVec::new(),
            children: Vec::new(),
            shared: false,
            bounds: Bounds::Infinite,
            kind,
        }
    }

    #[must_use]
    pub fn group() -> Self {
        Self::new(NodeKind::Group)
    }

    #[must_use]
    pub fn transform(matrix: Mat4) -> Self {
        Self::new(NodeKind::Transform(matrix))
    }

    #[must_use]
    pub fn leaf(leaf: Leaf) -> Self {
        Self::new(NodeKind::Leaf(leaf))
    }

    #[must_use]
    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    #[must_use]
    pub fn with_shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    #[inline]
    #[must_use]
    pub fn parents(&self) -> &[NodeKey] {
        &self.parents
    }

    /// The unique parent, if the node has exactly one.
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeKey> {
        match self.parents.as_slice() {
            [p] => Some(*p),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    #[inline]
    #[must_use]
    pub fn can_have_children(&self) -> bool {
        !matches!(self.kind, NodeKind::Leaf(_))
    }
}

/// Tagged node variant dispatched by the traversal.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Group,
    /// Local-to-parent matrix applied to every child.
    Transform(Mat4),
    /// Appearance override for every shape below.
    Override(AppearanceOverride),
    Leaf(Leaf),
}

#[derive(Debug, Clone)]
pub enum Leaf {
    Shape(Shape),
    Light(Light),
    ClipPlane(ClipPlane),
    Fog(Fog),
    Background(Background),
    Viewpoint(Viewpoint),
}

/// Appearance substitution for a subtree.
///
/// Attributes set on the override replace the shape's own; unset attributes
/// fall through. With `override_lower` set, overrides further down the tree
/// are ignored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppearanceOverride {
    pub appearance: AppearanceKey,
    pub override_lower: bool,
}

/// Geometry plus appearance.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub geometry: Option<GeometryKey>,
    pub appearance: Option<AppearanceKey>,
    pub visible: bool,
    pub custom: Option<CustomRenderable>,
}

impl Shape {
    #[must_use]
    pub fn new(geometry: GeometryKey, appearance: Option<AppearanceKey>) -> Self {
        Self {
            geometry: Some(geometry),
            appearance,
            visible: true,
            custom: None,
        }
    }

    /// A shape drawn entirely by application code.
    #[must_use]
    pub fn custom(custom: CustomRenderable) -> Self {
        Self {
            geometry: None,
            appearance: None,
            visible: true,
            custom: Some(custom),
        }
    }

    #[must_use]
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }
}
