/// Entry point for UI messages
use std::sync::Arc;

use crate::config::Settings;
use crate::fetch::ImageFetcher;
use crate::orchestrator::{BatchError, BatchOrchestrator, Summary};
use crate::protocol::{ComponentEntry, PluginMessage, UiChannel, UiMessage};
use crate::scene::{NodeKind, SceneContext, SceneGraph};

/// Result of handling one UI message
#[derive(Debug, Clone, PartialEq)]
pub enum Handled {
    Components(Vec<ComponentEntry>),
    Batch(Summary),
}

/// Routes UI messages to component listing or a batch run
pub struct Plugin {
    scene: Arc<dyn SceneGraph>,
    ui: Arc<dyn UiChannel>,
    orchestrator: BatchOrchestrator,
}

impl Plugin {
    pub fn new(scene: Arc<dyn SceneGraph>, fetcher: Arc<dyn ImageFetcher>, ui: Arc<dyn UiChannel>) -> Self {
        let orchestrator = BatchOrchestrator::new(scene.clone(), fetcher, ui.clone());
        Plugin {
            scene,
            ui,
            orchestrator,
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.orchestrator = self.orchestrator.with_settings(settings);
        self
    }

    pub async fn handle(&self, ctx: &SceneContext, message: UiMessage) -> Result<Handled, BatchError> {
        match message {
            UiMessage::RequestComponents => Ok(Handled::Components(self.list_components(ctx).await)),
            UiMessage::ManualGrid(request) => self.orchestrator.run(ctx, &request).await.map(Handled::Batch),
        }
    }

    /// Post the components and component sets of the current page to the UI
    pub async fn list_components(&self, ctx: &SceneContext) -> Vec<ComponentEntry> {
        if let Err(e) = self.scene.load_all_pages().await {
            tracing::warn!(error = %e, "loading all pages failed");
        }
        let components: Vec<ComponentEntry> = self
            .scene
            .list_on_page(ctx, &[NodeKind::Component, NodeKind::ComponentSet])
            .into_iter()
            .map(ComponentEntry::from)
            .collect();
        tracing::debug!(count = components.len(), "listing components");
        self.ui.post(PluginMessage::ComponentsList {
            components: components.clone(),
        });
        components
    }
}
