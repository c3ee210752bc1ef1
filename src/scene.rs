//! Scene-graph contract
//!
//! The batch engine never touches a concrete document model. Everything it
//! needs from the host (lookup, instantiation, cloning, text and fill writes,
//! font loading, image registration) goes through the [`SceneGraph`] trait.
//! [`InMemoryScene`] is a complete implementation used by tests and the CLI.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod memory;

pub use memory::{InMemoryScene, NodeSpec, SceneDocument};

/// Host identifier of a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        NodeId(id.to_string())
    }
}

/// Closed set of node kinds the engine distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Page,
    Frame,
    Group,
    Component,
    ComponentSet,
    Instance,
    Text,
    Rectangle,
    Ellipse,
    Vector,
}

impl NodeKind {
    /// Whether the node carries editable character content
    pub fn supports_text(self) -> bool {
        matches!(self, NodeKind::Text)
    }

    /// Whether the node exposes a fill list
    pub fn supports_fill(self) -> bool {
        !matches!(self, NodeKind::Page | NodeKind::Group)
    }

    /// Whether the host can create an instance from this node directly
    pub fn is_instantiable(self) -> bool {
        matches!(self, NodeKind::Component)
    }

    /// Whether the node can hold children
    pub fn is_container(self) -> bool {
        matches!(
            self,
            NodeKind::Page
                | NodeKind::Frame
                | NodeKind::Group
                | NodeKind::Component
                | NodeKind::ComponentSet
                | NodeKind::Instance
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Page => "PAGE",
            NodeKind::Frame => "FRAME",
            NodeKind::Group => "GROUP",
            NodeKind::Component => "COMPONENT",
            NodeKind::ComponentSet => "COMPONENT_SET",
            NodeKind::Instance => "INSTANCE",
            NodeKind::Text => "TEXT",
            NodeKind::Rectangle => "RECTANGLE",
            NodeKind::Ellipse => "ELLIPSE",
            NodeKind::Vector => "VECTOR",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Size { width, height }
    }
}

/// Font resource referenced by a text node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FontName {
    pub family: String,
    pub style: String,
}

impl FontName {
    pub fn new(family: impl Into<String>, style: impl Into<String>) -> Self {
        FontName {
            family: family.into(),
            style: style.into(),
        }
    }
}

impl Default for FontName {
    fn default() -> Self {
        FontName::new("Inter", "Regular")
    }
}

impl fmt::Display for FontName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.family, self.style)
    }
}

/// Opaque handle of image bytes registered with the host
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageHandle(pub String);

impl fmt::Display for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScaleMode {
    Fill,
    Fit,
    Crop,
    Tile,
}

/// One entry of a node's fill list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Paint {
    Solid {
        color: String,
    },
    Image {
        #[serde(rename = "scaleMode")]
        scale_mode: ScaleMode,
        #[serde(rename = "imageHash")]
        image: ImageHandle,
    },
}

impl Paint {
    /// Image fill stretched over the whole node
    pub fn image_fill(image: ImageHandle) -> Self {
        Paint::Image {
            scale_mode: ScaleMode::Fill,
            image,
        }
    }
}

/// Lightweight reference to a node, as listed to the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
}

/// Explicit page scope for page-level lookups
///
/// Built once per batch and passed to every page-scoped call instead of
/// relying on a host-global "current page".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneContext {
    pub page: NodeId,
}

impl SceneContext {
    pub fn new(page: NodeId) -> Self {
        SceneContext { page }
    }
}

/// Errors reported by a scene-graph host
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("node {id} ({kind}) cannot hold children")]
    NotAContainer { id: NodeId, kind: NodeKind },

    #[error("node {id} ({kind}) cannot be instantiated")]
    NotInstantiable { id: NodeId, kind: NodeKind },

    #[error("node {id} ({kind}) has no text content")]
    NotText { id: NodeId, kind: NodeKind },

    #[error("node {id} ({kind}) has no fills")]
    NoFills { id: NodeId, kind: NodeKind },

    #[error("font {font} is not loaded, cannot edit {id}")]
    FontNotLoaded { id: NodeId, font: FontName },

    #[error("font {0} is not available")]
    FontUnavailable(FontName),

    #[error("invalid image data: {0}")]
    InvalidImage(String),

    #[error("host error: {0}")]
    Host(String),
}

/// Async trait for the host's scene-graph API
///
/// Reads return `Option` when absence is an expected outcome; writes return
/// `Result` so callers can decide whether a failure is worth reporting.
#[async_trait]
pub trait SceneGraph: Send + Sync {
    /// Make every page's content available for lookup
    async fn load_all_pages(&self) -> Result<(), SceneError>;

    fn node_kind(&self, id: &NodeId) -> Option<NodeKind>;

    fn node_name(&self, id: &NodeId) -> Option<String>;

    /// First node on the page (depth-first) with the given kind and exact name
    fn find_on_page(&self, ctx: &SceneContext, kind: NodeKind, name: &str) -> Option<NodeId>;

    /// All nodes on the page whose kind is one of `kinds`, in document order
    fn list_on_page(&self, ctx: &SceneContext, kinds: &[NodeKind]) -> Vec<NodeRef>;

    /// First descendant of `root` (depth-first, `root` excluded) named `name`
    fn find_descendant(&self, root: &NodeId, name: &str) -> Option<NodeId>;

    /// First descendant of `root` (depth-first, `root` excluded) of `kind`
    fn find_descendant_of_kind(&self, root: &NodeId, kind: NodeKind) -> Option<NodeId>;

    /// Create a detached instance of a component
    fn create_instance(&self, component: &NodeId) -> Result<NodeId, SceneError>;

    /// Structural copy of a node and its subtree, detached
    fn clone_node(&self, id: &NodeId) -> Result<NodeId, SceneError>;

    /// Append `child` as the last child of `parent`, detaching it first
    fn append_child(&self, parent: &NodeId, child: &NodeId) -> Result<(), SceneError>;

    /// Delete a node and its subtree
    fn remove_node(&self, id: &NodeId) -> Result<(), SceneError>;

    fn children(&self, parent: &NodeId) -> Vec<NodeId>;

    fn size(&self, id: &NodeId) -> Option<Size>;

    fn position(&self, id: &NodeId) -> Option<Point>;

    fn set_position(&self, id: &NodeId, position: Point) -> Result<(), SceneError>;

    fn font_name(&self, id: &NodeId) -> Option<FontName>;

    async fn load_font(&self, font: &FontName) -> Result<(), SceneError>;

    fn characters(&self, id: &NodeId) -> Option<String>;

    fn set_characters(&self, id: &NodeId, text: &str) -> Result<(), SceneError>;

    fn fills(&self, id: &NodeId) -> Option<Vec<Paint>>;

    fn set_fills(&self, id: &NodeId, fills: Vec<Paint>) -> Result<(), SceneError>;

    /// Register raw image bytes and obtain a handle usable in fills
    async fn create_image(&self, bytes: &[u8]) -> Result<ImageHandle, SceneError>;

    /// Transient user-facing notification
    fn notify(&self, message: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        assert!(NodeKind::Text.supports_text());
        assert!(!NodeKind::Rectangle.supports_text());
        assert!(NodeKind::Rectangle.supports_fill());
        assert!(NodeKind::Text.supports_fill());
        assert!(!NodeKind::Group.supports_fill());
        assert!(NodeKind::Component.is_instantiable());
        assert!(!NodeKind::ComponentSet.is_instantiable());
        assert!(NodeKind::Frame.is_container());
        assert!(!NodeKind::Text.is_container());
    }

    #[test]
    fn test_paint_wire_format() {
        let paint = Paint::image_fill(ImageHandle("abc".to_string()));
        let json = serde_json::to_string(&paint).unwrap();
        assert_eq!(json, r#"{"type":"IMAGE","scaleMode":"FILL","imageHash":"abc"}"#);
    }

    #[test]
    fn test_kind_wire_name_matches_display() {
        let json = serde_json::to_string(&NodeKind::ComponentSet).unwrap();
        assert_eq!(json, format!("\"{}\"", NodeKind::ComponentSet));
    }
}
