//! Scene graph module
//!
//! The cullable scene graph consumed by the pipeline. The renderer core only
//! ever reads from it; all mutation goes through [`SceneGraph`] between frames.
//!
//! - [`Node`]: hierarchy entry tagged by [`NodeKind`]
//! - [`Bounds`]/[`Frustum`]: bounding volumes and view-frustum classification
//! - [`Appearance`]/[`Attribute`]: render state attached to shapes
//! - [`Layer`]/[`Viewport`]/[`Scene`]: what a surface renders
//! - [`OffscreenTexture`]: nested render-to-texture sources

pub mod appearance;
pub mod bounds;
pub mod camera;
pub mod geometry;
pub mod graph;
pub mod layer;
pub mod light;
pub mod node;

pub use appearance::{
    Appearance, Attribute, BlendAttributes, BufferKind, BufferState, DepthAttributes,
    LineAttributes, Material, PointAttributes, PolygonAttributes, ShaderArguments, ShaderProgram,
    ShaderStage, StencilAttributes, Texture, TextureSource, MAX_TEXTURE_UNITS,
};
pub use bounds::{Aabb, Bounds};
pub use camera::{Frustum, FrustumTest, ProjectionKind, Viewpoint};
pub use geometry::{CustomPayload, CustomRenderable, Geometry};
pub use graph::SceneGraph;
pub use layer::{
    Layer, OffscreenTexture, PassBufferState, RenderPass, Scene, SceneKind, SceneLayer, Viewport,
    ViewportRect,
};
pub use light::{Background, ClipPlane, Fog, FogMode, Light, LightKind};
pub use node::{AppearanceOverride, Leaf, Node, NodeKind, Shape};

use slotmap::new_key_type;

new_key_type! {
    pub struct NodeKey;
    pub struct AppearanceKey;
    pub struct AttributeKey;
    pub struct GeometryKey;
    pub struct TextureKey;
    pub struct OffscreenKey;
    pub struct SceneKey;
}
