use glam::Mat4;
use slotmap::SlotMap;

use crate::errors::{PipelineError, Result};
use crate::scene::appearance::{Appearance, Attribute, Texture};
use crate::scene::geometry::Geometry;
use crate::scene::layer::{OffscreenTexture, Scene};
use crate::scene::node::{Leaf, Node, NodeKind, Shape};
use crate::scene::{
    AppearanceKey, AttributeKey, GeometryKey, NodeKey, OffscreenKey, SceneKey, TextureKey,
};

/// Arena-backed scene graph.
///
/// The pipeline only reads from the graph. All mutation happens between
/// frames through the methods below.
#[derive(Debug, Default)]
pub struct SceneGraph {
    pub(crate) nodes: SlotMap<NodeKey, Node>,
    pub(crate) appearances: SlotMap<AppearanceKey, Appearance>,
    pub(crate) attributes: SlotMap<AttributeKey, Attribute>,
    pub(crate) geometries: SlotMap<GeometryKey, Geometry>,
    pub(crate) textures: SlotMap<TextureKey, Texture>,
    pub(crate) offscreens: SlotMap<OffscreenKey, OffscreenTexture>,
    pub(crate) scenes: SlotMap<SceneKey, Scene>,
}

impl SceneGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    /// Inserts a detached node.
    pub fn add_node(&mut self, node: Node) -> NodeKey {
        self.nodes.insert(node)
    }

    /// Inserts `node` and attaches it under `parent`.
    pub fn add_to_parent(&mut self, node: Node, parent: NodeKey) -> Result<NodeKey> {
        let key = self.nodes.insert(node);
        if let Err(err) = self.attach(key, parent) {
            self.nodes.remove(key);
            return Err(err);
        }
        Ok(key)
    }

    /// Convenience for a shape leaf under `parent`.
    pub fn add_shape(&mut self, shape: Shape, parent: NodeKey) -> Result<NodeKey> {
        self.add_to_parent(Node::leaf(Leaf::Shape(shape)), parent)
    }

    /// Appends `child` to `parent`'s children.
    ///
    /// A node that already has a parent can only gain another one if it is
    /// marked shared.
    pub fn attach(&mut self, child: NodeKey, parent: NodeKey) -> Result<()> {
        let parent_node = self
            .nodes
            .get(parent)
            .ok_or_else(|| PipelineError::NodeNotFound(format!("{parent:?}")))?;
        if !parent_node.can_have_children() {
            return Err(PipelineError::NotAGroup(format!("{parent:?}")));
        }

        let child_node = self
            .nodes
            .get(child)
            .ok_or_else(|| PipelineError::NodeNotFound(format!("{child:?}")))?;
        if !child_node.parents.is_empty() && !child_node.shared {
            return Err(PipelineError::AlreadyParented(format!("{child:?}")));
        }

        if child == parent || self.is_ancestor(child, parent) {
            return Err(PipelineError::WouldCreateCycle {
                child: format!("{child:?}"),
                parent: format!("{parent:?}"),
            });
        }

        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.nodes.get_mut(child) {
            c.parents.push(parent);
        }
        Ok(())
    }

    /// Removes the `child` link under `parent`. The child stays in the arena.
    pub fn detach(&mut self, child: NodeKey, parent: NodeKey) {
        if let Some(p) = self.nodes.get_mut(parent)
            && let Some(i) = p.children.iter().position(|&x| x == child)
        {
            p.children.remove(i);
        }
        if let Some(c) = self.nodes.get_mut(child)
            && let Some(i) = c.parents.iter().position(|&x| x == parent)
        {
            c.parents.remove(i);
        }
    }

    /// Removes a node and, recursively, every child no longer reachable
    /// through another parent.
    pub fn remove_node(&mut self, key: NodeKey) {
        let Some(node) = self.nodes.get(key) else {
            return;
        };
        let children = node.children.clone();
        let parents = node.parents.clone();

        for parent in parents {
            self.detach(key, parent);
        }
        for child in children {
            self.detach(child, key);
            if self.nodes.get(child).is_some_and(|c| c.parents.is_empty()) {
                self.remove_node(child);
            }
        }

        self.nodes.remove(key);
    }

    fn is_ancestor(&self, candidate: NodeKey, of: NodeKey) -> bool {
        let mut pending = vec![of];
        while let Some(key) = pending.pop() {
            let Some(node) = self.nodes.get(key) else {
                continue;
            };
            for &parent in &node.parents {
                if parent == candidate {
                    return true;
                }
                pending.push(parent);
            }
        }
        false
    }

    /// Concatenated transform from the scene root down to `key`.
    ///
    /// The ascent must be unique: a shared node anywhere on the path is a
    /// configuration error.
    pub fn path_transform(&self, key: NodeKey, path: &'static str) -> Result<Mat4> {
        let mut world = Mat4::IDENTITY;
        let mut current = key;
        loop {
            let node = self
                .nodes
                .get(current)
                .ok_or_else(|| PipelineError::NodeNotFound(format!("{current:?}")))?;
            if node.shared || node.parents.len() > 1 {
                return Err(PipelineError::SharedNodeOnViewPath {
                    node: format!("{current:?}"),
                    path,
                });
            }
            if let NodeKind::Transform(m) = &node.kind {
                world = *m * world;
            }
            match node.parents.first() {
                Some(&parent) => current = parent,
                None => return Ok(world),
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    #[inline]
    pub fn node_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.nodes.get_mut(key)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ========================================================================
    // Resources
    // ========================================================================

    pub fn add_appearance(&mut self, appearance: Appearance) -> AppearanceKey {
        self.appearances.insert(appearance)
    }

    #[must_use]
    pub fn appearance(&self, key: AppearanceKey) -> Option<&Appearance> {
        self.appearances.get(key)
    }

    pub fn appearance_mut(&mut self, key: AppearanceKey) -> Option<&mut Appearance> {
        self.appearances.get_mut(key)
    }

    pub fn add_attribute(&mut self, attribute: Attribute) -> AttributeKey {
        self.attributes.insert(attribute)
    }

    #[must_use]
    pub fn attribute(&self, key: AttributeKey) -> Option<&Attribute> {
        self.attributes.get(key)
    }

    pub fn attribute_mut(&mut self, key: AttributeKey) -> Option<&mut Attribute> {
        self.attributes.get_mut(key)
    }

    pub fn add_geometry(&mut self, geometry: Geometry) -> GeometryKey {
        self.geometries.insert(geometry)
    }

    #[must_use]
    pub fn geometry(&self, key: GeometryKey) -> Option<&Geometry> {
        self.geometries.get(key)
    }

    pub fn add_texture(&mut self, texture: Texture) -> TextureKey {
        self.textures.insert(texture)
    }

    #[must_use]
    pub fn texture(&self, key: TextureKey) -> Option<&Texture> {
        self.textures.get(key)
    }

    pub fn add_offscreen(&mut self, offscreen: OffscreenTexture) -> OffscreenKey {
        self.offscreens.insert(offscreen)
    }

    #[must_use]
    pub fn offscreen(&self, key: OffscreenKey) -> Option<&OffscreenTexture> {
        self.offscreens.get(key)
    }

    pub fn offscreen_mut(&mut self, key: OffscreenKey) -> Option<&mut OffscreenTexture> {
        self.offscreens.get_mut(key)
    }

    pub fn add_scene(&mut self, scene: Scene) -> SceneKey {
        self.scenes.insert(scene)
    }

    #[must_use]
    pub fn scene(&self, key: SceneKey) -> Option<&Scene> {
        self.scenes.get(key)
    }

    pub fn remove_scene(&mut self, key: SceneKey) -> Option<Scene> {
        self.scenes.remove(key)
    }

    pub fn scene_mut(&mut self, key: SceneKey) -> Option<&mut Scene> {
        self.scenes.get_mut(key)
    }

    /// Whether the resolved appearance can produce translucent fragments.
    #[must_use]
    pub fn appearance_is_transparent(&self, appearance: &Appearance) -> bool {
        appearance
            .attribute_slots()
            .filter_map(|k| self.attributes.get(k))
            .any(Attribute::is_transparent)
            || appearance
                .texture_units
                .iter()
                .flatten()
                .filter_map(|k| self.textures.get(*k))
                .any(|t| t.has_alpha)
    }
}
