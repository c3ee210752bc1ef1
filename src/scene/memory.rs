//! In-memory scene graph
//!
//! A self-contained node arena implementing [`SceneGraph`]. It mirrors the
//! host behaviours the batch engine depends on: text writes require the
//! node's font to be loaded first, fills only exist on fillable kinds, and
//! instances are deep copies of their component. The whole scene can be
//! loaded from and written back to a JSON [`SceneDocument`].
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{
    FontName, ImageHandle, NodeId, NodeKind, NodeRef, Paint, Point, SceneContext, SceneError,
    SceneGraph, Size,
};

/// Serializable snapshot of a whole scene
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDocument {
    pub pages: Vec<NodeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_page: Option<NodeId>,
    /// Fonts the host refuses to load
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_fonts: Vec<FontName>,
}

/// One node of a [`SceneDocument`], with its subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characters: Option<String>,
    #[serde(default, rename = "fontName", skip_serializing_if = "Option::is_none")]
    pub font: Option<FontName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fills: Vec<Paint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        NodeSpec {
            id: None,
            name: name.into(),
            kind,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            characters: None,
            font: None,
            fills: Vec::new(),
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    name: String,
    kind: NodeKind,
    position: Point,
    size: Size,
    characters: Option<String>,
    font: Option<FontName>,
    fills: Vec<Paint>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl NodeData {
    fn new(kind: NodeKind, name: impl Into<String>, size: Size) -> Self {
        NodeData {
            name: name.into(),
            kind,
            position: Point::default(),
            size,
            characters: None,
            font: None,
            fills: Vec::new(),
            children: Vec::new(),
            parent: None,
        }
    }

    fn effective_font(&self) -> FontName {
        self.font.clone().unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct Store {
    nodes: HashMap<NodeId, NodeData>,
    pages: Vec<NodeId>,
    current_page: Option<NodeId>,
    next_id: u64,
    missing_fonts: HashSet<FontName>,
    loaded_fonts: HashSet<FontName>,
    images: HashMap<ImageHandle, Vec<u8>>,
    notifications: Vec<String>,
    /// Ids declared by a document being imported, not yet inserted
    reserved: HashSet<NodeId>,
    fail_instantiation: bool,
    fail_append: bool,
    fail_page_load: bool,
}

impl Store {
    fn alloc_id(&mut self) -> NodeId {
        loop {
            self.next_id += 1;
            let id = NodeId(format!("1:{}", self.next_id));
            if !self.nodes.contains_key(&id) && !self.reserved.contains(&id) {
                return id;
            }
        }
    }

    fn get(&self, id: &NodeId) -> Result<&NodeData, SceneError> {
        self.nodes
            .get(id)
            .ok_or_else(|| SceneError::NodeNotFound(id.clone()))
    }

    fn get_mut(&mut self, id: &NodeId) -> Result<&mut NodeData, SceneError> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| SceneError::NodeNotFound(id.clone()))
    }

    fn insert_child(&mut self, parent: &NodeId, mut data: NodeData) -> Result<NodeId, SceneError> {
        let parent_data = self.get(parent)?;
        if !parent_data.kind.is_container() {
            return Err(SceneError::NotAContainer {
                id: parent.clone(),
                kind: parent_data.kind,
            });
        }
        let id = self.alloc_id();
        data.parent = Some(parent.clone());
        self.nodes.insert(id.clone(), data);
        self.get_mut(parent)?.children.push(id.clone());
        Ok(id)
    }

    /// Depth-first pre-order walk of the subtree under `root`, `root` excluded
    fn descendants(&self, root: &NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = match self.nodes.get(root) {
            Some(data) => data.children.iter().rev().cloned().collect(),
            None => return out,
        };
        while let Some(id) = stack.pop() {
            if let Some(data) = self.nodes.get(&id) {
                stack.extend(data.children.iter().rev().cloned());
                out.push(id);
            }
        }
        out
    }

    fn is_ancestor(&self, ancestor: &NodeId, id: &NodeId) -> bool {
        let mut current = self.nodes.get(id).and_then(|d| d.parent.clone());
        while let Some(parent) = current {
            if &parent == ancestor {
                return true;
            }
            current = self.nodes.get(&parent).and_then(|d| d.parent.clone());
        }
        false
    }

    /// Deep copy of a subtree; the copy is detached
    fn copy_subtree(&mut self, id: &NodeId, root_kind: Option<NodeKind>) -> Result<NodeId, SceneError> {
        let mut data = self.get(id)?.clone();
        let source_children = std::mem::take(&mut data.children);
        if let Some(kind) = root_kind {
            data.kind = kind;
        }
        data.parent = None;
        let copy_id = self.alloc_id();
        self.nodes.insert(copy_id.clone(), data);

        for child in source_children {
            let child_copy = self.copy_subtree(&child, None)?;
            self.get_mut(&child_copy)?.parent = Some(copy_id.clone());
            self.get_mut(&copy_id)?.children.push(child_copy);
        }
        Ok(copy_id)
    }

    fn detach(&mut self, id: &NodeId) -> Result<(), SceneError> {
        if let Some(parent) = self.get_mut(id)?.parent.take() {
            if let Some(parent_data) = self.nodes.get_mut(&parent) {
                parent_data.children.retain(|c| c != id);
            }
        }
        Ok(())
    }

    /// Reserve every id `spec` declares so generated ids never collide with
    /// one that appears later in the same document
    fn reserve_ids(&mut self, spec: &NodeSpec) -> Result<(), SceneError> {
        if let Some(id) = &spec.id {
            if self.nodes.contains_key(id) || !self.reserved.insert(id.clone()) {
                return Err(SceneError::Host(format!("duplicate node id {}", id)));
            }
        }
        spec.children.iter().try_for_each(|child| self.reserve_ids(child))
    }

    fn import(&mut self, spec: NodeSpec, parent: Option<&NodeId>) -> Result<NodeId, SceneError> {
        let id = match spec.id {
            Some(id) => {
                self.reserved.remove(&id);
                id
            }
            None => self.alloc_id(),
        };
        let data = NodeData {
            name: spec.name,
            kind: spec.kind,
            position: Point::new(spec.x, spec.y),
            size: Size::new(spec.width, spec.height),
            characters: spec.characters,
            font: spec.font,
            fills: spec.fills,
            children: Vec::new(),
            parent: parent.cloned(),
        };
        self.nodes.insert(id.clone(), data);
        for child in spec.children {
            let child_id = self.import(child, Some(&id))?;
            self.get_mut(&id)?.children.push(child_id);
        }
        Ok(id)
    }

    fn export(&self, id: &NodeId) -> Option<NodeSpec> {
        let data = self.nodes.get(id)?;
        Some(NodeSpec {
            id: Some(id.clone()),
            name: data.name.clone(),
            kind: data.kind,
            x: data.position.x,
            y: data.position.y,
            width: data.size.width,
            height: data.size.height,
            characters: data.characters.clone(),
            font: data.font.clone(),
            fills: data.fills.clone(),
            children: data.children.iter().filter_map(|c| self.export(c)).collect(),
        })
    }
}

/// In-memory scene graph
///
/// Cloning shares the underlying store, so a test can keep a handle while
/// the orchestrator owns another.
#[derive(Debug, Clone)]
pub struct InMemoryScene {
    store: Arc<RwLock<Store>>,
}

impl InMemoryScene {
    /// Create a scene holding a single empty page named "Page 1"
    ///
    /// # Example
    /// ```
    /// use gridfill::scene::{InMemoryScene, NodeKind, SceneGraph, Size};
    ///
    /// let scene = InMemoryScene::new();
    /// let ctx = scene.context();
    /// let frame = scene
    ///     .add_node(&ctx.page, NodeKind::Frame, "Grid", Size::new(400.0, 800.0))
    ///     .unwrap();
    /// assert_eq!(scene.children(&ctx.page), vec![frame]);
    /// ```
    pub fn new() -> Self {
        let scene = InMemoryScene {
            store: Arc::new(RwLock::new(Store::default())),
        };
        scene.add_page("Page 1");
        scene
    }

    /// Load a scene from a document snapshot
    pub fn from_document(document: SceneDocument) -> Result<Self, SceneError> {
        let mut store = Store::default();
        for page in &document.pages {
            store.reserve_ids(page)?;
        }
        for mut page in document.pages {
            page.kind = NodeKind::Page;
            let id = store.import(page, None)?;
            store.pages.push(id);
        }
        store.missing_fonts = document.missing_fonts.into_iter().collect();
        store.current_page = match document.current_page {
            Some(page) if store.pages.contains(&page) => Some(page),
            Some(page) => return Err(SceneError::NodeNotFound(page)),
            None => store.pages.first().cloned(),
        };

        let scene = InMemoryScene {
            store: Arc::new(RwLock::new(store)),
        };
        if scene.read().current_page.is_none() {
            scene.add_page("Page 1");
        }
        Ok(scene)
    }

    /// Snapshot the scene as a document
    pub fn to_document(&self) -> SceneDocument {
        let store = self.read();
        let mut missing_fonts: Vec<FontName> = store.missing_fonts.iter().cloned().collect();
        missing_fonts.sort_by(|a, b| (&a.family, &a.style).cmp(&(&b.family, &b.style)));
        SceneDocument {
            pages: store.pages.iter().filter_map(|p| store.export(p)).collect(),
            current_page: store.current_page.clone(),
            missing_fonts,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Store> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Store> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Context scoped to the current page
    pub fn context(&self) -> SceneContext {
        let store = self.read();
        let page = store
            .current_page
            .clone()
            .or_else(|| store.pages.first().cloned())
            .unwrap_or_else(|| NodeId::new("0:0"));
        SceneContext::new(page)
    }

    /// Add a page; the first page added becomes current
    pub fn add_page(&self, name: &str) -> NodeId {
        let mut store = self.write();
        let id = store.alloc_id();
        store
            .nodes
            .insert(id.clone(), NodeData::new(NodeKind::Page, name, Size::default()));
        store.pages.push(id.clone());
        if store.current_page.is_none() {
            store.current_page = Some(id.clone());
        }
        id
    }

    pub fn set_current_page(&self, page: &NodeId) -> Result<(), SceneError> {
        let mut store = self.write();
        if !store.pages.contains(page) {
            return Err(SceneError::NodeNotFound(page.clone()));
        }
        store.current_page = Some(page.clone());
        Ok(())
    }

    /// Append a new node under `parent`
    pub fn add_node(
        &self,
        parent: &NodeId,
        kind: NodeKind,
        name: &str,
        size: Size,
    ) -> Result<NodeId, SceneError> {
        self.write()
            .insert_child(parent, NodeData::new(kind, name, size))
    }

    /// Append a new text node under `parent`
    pub fn add_text(
        &self,
        parent: &NodeId,
        name: &str,
        text: &str,
        font: FontName,
    ) -> Result<NodeId, SceneError> {
        let mut data = NodeData::new(NodeKind::Text, name, Size::new(100.0, 20.0));
        data.characters = Some(text.to_string());
        data.font = Some(font);
        self.write().insert_child(parent, data)
    }

    /// Make the host refuse to load `font`
    pub fn mark_font_missing(&self, font: FontName) {
        let mut store = self.write();
        store.loaded_fonts.remove(&font);
        store.missing_fonts.insert(font);
    }

    /// Make every `create_instance` call fail
    pub fn set_fail_instantiation(&self, fail: bool) {
        self.write().fail_instantiation = fail;
    }

    /// Make every `append_child` call fail
    pub fn set_fail_append(&self, fail: bool) {
        self.write().fail_append = fail;
    }

    /// Make `load_all_pages` fail
    pub fn set_fail_page_load(&self, fail: bool) {
        self.write().fail_page_load = fail;
    }

    /// Notifications emitted so far, oldest first
    pub fn notifications(&self) -> Vec<String> {
        self.read().notifications.clone()
    }

    /// Nodes in the store, detached ones included
    pub fn node_count(&self) -> usize {
        self.read().nodes.len()
    }

    pub fn image_bytes(&self, image: &ImageHandle) -> Option<Vec<u8>> {
        self.read().images.get(image).cloned()
    }
}

impl Default for InMemoryScene {
    fn default() -> Self {
        Self::new()
    }
}

/// Detect a supported image container from its magic bytes
fn sniff_image(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("webp")
    } else {
        None
    }
}

/// FNV-1a digest, used as the image hash
fn image_hash(bytes: &[u8]) -> ImageHandle {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    ImageHandle(format!("{:016x}", hash))
}

#[async_trait]
impl SceneGraph for InMemoryScene {
    async fn load_all_pages(&self) -> Result<(), SceneError> {
        if self.read().fail_page_load {
            return Err(SceneError::Host("pages could not be loaded".to_string()));
        }
        Ok(())
    }

    fn node_kind(&self, id: &NodeId) -> Option<NodeKind> {
        self.read().nodes.get(id).map(|d| d.kind)
    }

    fn node_name(&self, id: &NodeId) -> Option<String> {
        self.read().nodes.get(id).map(|d| d.name.clone())
    }

    fn find_on_page(&self, ctx: &SceneContext, kind: NodeKind, name: &str) -> Option<NodeId> {
        let store = self.read();
        store.descendants(&ctx.page).into_iter().find(|id| {
            store
                .nodes
                .get(id)
                .is_some_and(|d| d.kind == kind && d.name == name)
        })
    }

    fn list_on_page(&self, ctx: &SceneContext, kinds: &[NodeKind]) -> Vec<NodeRef> {
        let store = self.read();
        store
            .descendants(&ctx.page)
            .into_iter()
            .filter_map(|id| {
                let data = store.nodes.get(&id)?;
                kinds.contains(&data.kind).then(|| NodeRef {
                    name: data.name.clone(),
                    kind: data.kind,
                    id,
                })
            })
            .collect()
    }

    fn find_descendant(&self, root: &NodeId, name: &str) -> Option<NodeId> {
        let store = self.read();
        store
            .descendants(root)
            .into_iter()
            .find(|id| store.nodes.get(id).is_some_and(|d| d.name == name))
    }

    fn find_descendant_of_kind(&self, root: &NodeId, kind: NodeKind) -> Option<NodeId> {
        let store = self.read();
        store
            .descendants(root)
            .into_iter()
            .find(|id| store.nodes.get(id).is_some_and(|d| d.kind == kind))
    }

    fn create_instance(&self, component: &NodeId) -> Result<NodeId, SceneError> {
        let mut store = self.write();
        if store.fail_instantiation {
            return Err(SceneError::Host(format!(
                "instantiation of {} failed",
                component
            )));
        }
        let kind = store.get(component)?.kind;
        if !kind.is_instantiable() {
            return Err(SceneError::NotInstantiable {
                id: component.clone(),
                kind,
            });
        }
        store.copy_subtree(component, Some(NodeKind::Instance))
    }

    fn clone_node(&self, id: &NodeId) -> Result<NodeId, SceneError> {
        let mut store = self.write();
        if store.get(id)?.kind == NodeKind::Page {
            return Err(SceneError::Host(format!("page {} cannot be cloned", id)));
        }
        store.copy_subtree(id, None)
    }

    fn append_child(&self, parent: &NodeId, child: &NodeId) -> Result<(), SceneError> {
        let mut store = self.write();
        if store.fail_append {
            return Err(SceneError::Host(format!("could not append {}", child)));
        }
        let parent_kind = store.get(parent)?.kind;
        if !parent_kind.is_container() {
            return Err(SceneError::NotAContainer {
                id: parent.clone(),
                kind: parent_kind,
            });
        }
        store.get(child)?;
        if parent == child || store.is_ancestor(child, parent) {
            return Err(SceneError::Host(format!(
                "cannot append {} inside itself",
                child
            )));
        }
        store.detach(child)?;
        store.get_mut(child)?.parent = Some(parent.clone());
        store.get_mut(parent)?.children.push(child.clone());
        Ok(())
    }

    fn remove_node(&self, id: &NodeId) -> Result<(), SceneError> {
        let mut store = self.write();
        store.detach(id)?;
        let mut doomed = store.descendants(id);
        doomed.push(id.clone());
        for node in doomed {
            store.nodes.remove(&node);
        }
        store.pages.retain(|p| p != id);
        Ok(())
    }

    fn children(&self, parent: &NodeId) -> Vec<NodeId> {
        self.read()
            .nodes
            .get(parent)
            .map(|d| d.children.clone())
            .unwrap_or_default()
    }

    fn size(&self, id: &NodeId) -> Option<Size> {
        self.read().nodes.get(id).map(|d| d.size)
    }

    fn position(&self, id: &NodeId) -> Option<Point> {
        self.read().nodes.get(id).map(|d| d.position)
    }

    fn set_position(&self, id: &NodeId, position: Point) -> Result<(), SceneError> {
        self.write().get_mut(id)?.position = position;
        Ok(())
    }

    fn font_name(&self, id: &NodeId) -> Option<FontName> {
        let store = self.read();
        let data = store.nodes.get(id)?;
        data.kind.supports_text().then(|| data.effective_font())
    }

    async fn load_font(&self, font: &FontName) -> Result<(), SceneError> {
        let mut store = self.write();
        if store.missing_fonts.contains(font) {
            return Err(SceneError::FontUnavailable(font.clone()));
        }
        store.loaded_fonts.insert(font.clone());
        Ok(())
    }

    fn characters(&self, id: &NodeId) -> Option<String> {
        self.read().nodes.get(id).and_then(|d| d.characters.clone())
    }

    fn set_characters(&self, id: &NodeId, text: &str) -> Result<(), SceneError> {
        let mut store = self.write();
        let data = store.get(id)?;
        if !data.kind.supports_text() {
            return Err(SceneError::NotText {
                id: id.clone(),
                kind: data.kind,
            });
        }
        let font = data.effective_font();
        if !store.loaded_fonts.contains(&font) {
            return Err(SceneError::FontNotLoaded {
                id: id.clone(),
                font,
            });
        }
        store.get_mut(id)?.characters = Some(text.to_string());
        Ok(())
    }

    fn fills(&self, id: &NodeId) -> Option<Vec<Paint>> {
        let store = self.read();
        let data = store.nodes.get(id)?;
        data.kind.supports_fill().then(|| data.fills.clone())
    }

    fn set_fills(&self, id: &NodeId, fills: Vec<Paint>) -> Result<(), SceneError> {
        let mut store = self.write();
        let data = store.get_mut(id)?;
        if !data.kind.supports_fill() {
            return Err(SceneError::NoFills {
                id: id.clone(),
                kind: data.kind,
            });
        }
        data.fills = fills;
        Ok(())
    }

    async fn create_image(&self, bytes: &[u8]) -> Result<ImageHandle, SceneError> {
        if sniff_image(bytes).is_none() {
            return Err(SceneError::InvalidImage(format!(
                "unrecognized image format ({} bytes)",
                bytes.len()
            )));
        }
        let handle = image_hash(bytes);
        self.write().images.insert(handle.clone(), bytes.to_vec());
        Ok(handle)
    }

    fn notify(&self, message: &str) {
        tracing::info!(message, "notify");
        self.write().notifications.push(message.to_string());
    }
}
