/// Messages exchanged with the configuration UI
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

use crate::model::BatchRequest;
use crate::scene::{NodeId, NodeRef};

/// Messages sent by the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UiMessage {
    /// Ask for the components on the current page
    #[serde(rename = "requestComponents")]
    RequestComponents,
    /// Run a batch
    #[serde(rename = "manual-grid")]
    ManualGrid(BatchRequest),
}

/// Entry of [`PluginMessage::ComponentsList`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentEntry {
    pub id: NodeId,
    pub name: String,
}

impl From<NodeRef> for ComponentEntry {
    fn from(node: NodeRef) -> Self {
        ComponentEntry {
            id: node.id,
            name: node.name,
        }
    }
}

/// Messages sent to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PluginMessage {
    ComponentsList { components: Vec<ComponentEntry> },
    UpdateTotal { total: usize },
}

/// Outbound channel to the UI
pub trait UiChannel: Send + Sync {
    fn post(&self, message: PluginMessage);
}

/// Channel that drops every message
#[derive(Debug, Clone, Copy, Default)]
pub struct NullChannel;

impl UiChannel for NullChannel {
    fn post(&self, _message: PluginMessage) {}
}

/// Channel that keeps every message, useful for testing
#[derive(Debug, Clone, Default)]
pub struct RecordingChannel {
    messages: Arc<Mutex<Vec<PluginMessage>>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<PluginMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl UiChannel for RecordingChannel {
    fn post(&self, message: PluginMessage) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }
}
