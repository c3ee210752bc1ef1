/// Template resolution and per-row instance creation
use crate::scene::{NodeId, NodeKind, SceneError, SceneGraph};

/// Shape of the node the batch stamps out, resolved once per batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    /// A component: instantiated directly
    SingleInstance(NodeId),
    /// A component set: its first variant is instantiated. With no variant
    /// the set itself is cloned, and the copies carry no override state of
    /// their own.
    InstanceGroup {
        set: NodeId,
        variant: Option<NodeId>,
    },
    /// Anything else: cloned
    OpaqueNode(NodeId),
}

impl Template {
    /// Look up `id` and classify it; `None` when the node does not exist
    pub fn resolve(scene: &dyn SceneGraph, id: &NodeId) -> Option<Template> {
        let template = match scene.node_kind(id)? {
            NodeKind::Component => Template::SingleInstance(id.clone()),
            NodeKind::ComponentSet => Template::InstanceGroup {
                set: id.clone(),
                variant: scene.find_descendant_of_kind(id, NodeKind::Component),
            },
            _ => Template::OpaqueNode(id.clone()),
        };
        Some(template)
    }

    /// The node cloned when instantiation is unavailable
    pub fn source(&self) -> &NodeId {
        match self {
            Template::SingleInstance(id) => id,
            Template::InstanceGroup { set, .. } => set,
            Template::OpaqueNode(id) => id,
        }
    }

    /// The node instantiated, if the template supports instantiation
    pub fn instantiable(&self) -> Option<&NodeId> {
        match self {
            Template::SingleInstance(id) => Some(id),
            Template::InstanceGroup { variant, .. } => variant.as_ref(),
            Template::OpaqueNode(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationMethod {
    Instantiated,
    Cloned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    pub node: NodeId,
    pub method: CreationMethod,
}

pub struct InstanceFactory<'a> {
    scene: &'a dyn SceneGraph,
    template: &'a Template,
}

impl<'a> InstanceFactory<'a> {
    pub fn new(scene: &'a dyn SceneGraph, template: &'a Template) -> Self {
        InstanceFactory { scene, template }
    }

    /// Create one detached copy of the template
    ///
    /// Instantiation errors fall back to a structural clone; only a failing
    /// clone is reported.
    pub fn create(&self) -> Result<Created, SceneError> {
        if let Some(component) = self.template.instantiable() {
            match self.scene.create_instance(component) {
                Ok(node) => {
                    return Ok(Created {
                        node,
                        method: CreationMethod::Instantiated,
                    })
                }
                Err(e) => {
                    tracing::warn!(component = %component, error = %e, "instantiation failed, cloning instead");
                }
            }
        }

        let node = self.scene.clone_node(self.template.source())?;
        Ok(Created {
            node,
            method: CreationMethod::Cloned,
        })
    }
}
