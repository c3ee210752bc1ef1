//! Batch orchestration
//!
//! Drives one batch end to end: resolve the template and containers, then for
//! each row create an instance, append and place it, and bind every field.
//! Rows are processed strictly in order, and fields in declaration order,
//! because placement reads the live sibling count of the target container.
use std::sync::Arc;
use thiserror::Error;

use crate::allocator::ContainerAllocator;
use crate::binder::{FieldBinder, SkipReason};
use crate::config::Settings;
use crate::factory::{CreationMethod, InstanceFactory, Template};
use crate::fetch::ImageFetcher;
use crate::model::{BatchRequest, FieldKind};
use crate::placer::LayoutPlacer;
use crate::protocol::{PluginMessage, UiChannel};
use crate::scene::{NodeId, NodeKind, Point, SceneContext, SceneError, SceneGraph};
use crate::table::ValueTable;

/// Batch-level misconfiguration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BatchError {
    #[error("template not found: {0}")]
    TemplateNotFound(NodeId),
}

/// One instance produced by the batch
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedInstance {
    pub row: usize,
    pub container: usize,
    pub node: NodeId,
    pub method: CreationMethod,
    pub position: Point,
}

/// A field that was not written for one row
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedBinding {
    pub row: usize,
    pub field: usize,
    pub reason: SkipReason,
}

/// A row that got no instance because the host failed to create or attach it;
/// an instance that was created but could not be attached is removed again
#[derive(Debug, Clone, PartialEq)]
pub struct FailedRow {
    pub row: usize,
    pub error: SceneError,
}

/// Outcome of a batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    /// Rows described by the field data
    pub total_rows: usize,
    pub generated: Vec<GeneratedInstance>,
    /// Rows whose container could not be resolved
    pub dropped_rows: Vec<usize>,
    pub failed_rows: Vec<FailedRow>,
    pub skipped: Vec<SkippedBinding>,
}

impl Summary {
    pub fn generated_count(&self) -> usize {
        self.generated.len()
    }

    /// Skips caused by resource or write failures
    pub fn failures(&self) -> impl Iterator<Item = &SkippedBinding> {
        self.skipped.iter().filter(|s| s.reason.is_failure())
    }

    /// Instances placed in container `container`, in row order
    pub fn instances_in(&self, container: usize) -> impl Iterator<Item = &GeneratedInstance> {
        self.generated.iter().filter(move |g| g.container == container)
    }
}

pub struct BatchOrchestrator {
    scene: Arc<dyn SceneGraph>,
    fetcher: Arc<dyn ImageFetcher>,
    ui: Arc<dyn UiChannel>,
    settings: Settings,
}

impl BatchOrchestrator {
    pub fn new(scene: Arc<dyn SceneGraph>, fetcher: Arc<dyn ImageFetcher>, ui: Arc<dyn UiChannel>) -> Self {
        BatchOrchestrator {
            scene,
            fetcher,
            ui,
            settings: Settings::default(),
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Run one batch against the page in `ctx`
    ///
    /// Only a missing template fails the batch. Missing containers drop their
    /// rows, and per-row or per-field problems are recorded in the returned
    /// [`Summary`].
    pub async fn run(&self, ctx: &SceneContext, request: &BatchRequest) -> Result<Summary, BatchError> {
        let scene: &dyn SceneGraph = &*self.scene;

        let Some(template) = Template::resolve(scene, &request.component) else {
            scene.notify("Component not found on page.");
            return Err(BatchError::TemplateNotFound(request.component.clone()));
        };

        let table = ValueTable::new(&request.data, self.settings.placeholder);
        let total_rows = table.row_count();
        self.ui.post(PluginMessage::UpdateTotal { total: total_rows });

        let mut summary = Summary {
            total_rows,
            ..Summary::default()
        };
        if total_rows == 0 {
            tracing::info!(template = %request.component, "no rows to generate");
            scene.notify("Generated 0 components");
            return Ok(summary);
        }

        let containers: Vec<Option<NodeId>> = request
            .grids
            .iter()
            .map(|spec| {
                let found = scene.find_on_page(ctx, NodeKind::Frame, &spec.name);
                if found.is_none() {
                    tracing::warn!(container = %spec.name, "container not found");
                    scene.notify(&format!("Frame \"{}\" not found on page, skipping", spec.name));
                }
                found
            })
            .collect();

        let capacities: Vec<_> = request.grids.iter().map(|spec| spec.capacity).collect();
        let allocator = ContainerAllocator::new(&capacities, total_rows);
        let factory = InstanceFactory::new(scene, &template);
        let placer = LayoutPlacer::new(self.settings.gap);
        let binder = FieldBinder::new(scene, &*self.fetcher);

        tracing::info!(
            template = %request.component,
            rows = total_rows,
            containers = containers.len(),
            "starting batch"
        );

        for row in 0..total_rows {
            let target = allocator
                .slot_for(row)
                .and_then(|slot| Some((slot.container, containers[slot.container].as_ref()?)));
            let Some((container_index, container)) = target else {
                tracing::debug!(row, "row has no resolved container, dropped");
                summary.dropped_rows.push(row);
                continue;
            };

            let created = match factory.create() {
                Ok(created) => created,
                Err(error) => {
                    tracing::warn!(row, error = %error, "could not create instance");
                    summary.failed_rows.push(FailedRow { row, error });
                    continue;
                }
            };
            let position = match scene
                .append_child(container, &created.node)
                .and_then(|()| placer.place(scene, container, &created.node))
            {
                Ok(position) => position,
                Err(error) => {
                    tracing::warn!(row, container = %container, error = %error, "could not place instance");
                    if let Err(e) = scene.remove_node(&created.node) {
                        tracing::warn!(row, node = %created.node, error = %e, "could not remove unplaced instance");
                    }
                    summary.failed_rows.push(FailedRow { row, error });
                    continue;
                }
            };

            for (index, field) in table.fields().iter().enumerate() {
                let value = match field.kind {
                    FieldKind::Text => table.value_at(field, row),
                    FieldKind::Image => table.raw_value_at(field, row).unwrap_or(""),
                };
                if let Err(reason) = binder.bind(&created.node, field, value).await {
                    if reason.is_failure() {
                        tracing::warn!(row, layer = %field.name, "{}", reason);
                    } else {
                        tracing::debug!(row, layer = %field.name, "{}", reason);
                    }
                    summary.skipped.push(SkippedBinding {
                        row,
                        field: index,
                        reason,
                    });
                }
            }

            summary.generated.push(GeneratedInstance {
                row,
                container: container_index,
                node: created.node,
                method: created.method,
                position,
            });
        }

        tracing::info!(
            generated = summary.generated_count(),
            dropped = summary.dropped_rows.len(),
            failed = summary.failed_rows.len(),
            skipped = summary.skipped.len(),
            "batch complete"
        );
        scene.notify(&format!("Generated {} components", summary.generated_count()));
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::InMemoryFetcher;
    use crate::model::{ContainerSpec, FieldDefinition};
    use crate::protocol::RecordingChannel;
    use crate::scene::{FontName, InMemoryScene, Size};

    struct Fixture {
        scene: InMemoryScene,
        ui: RecordingChannel,
        card: NodeId,
        orchestrator: BatchOrchestrator,
    }

    fn fixture(frames: &[&str]) -> Fixture {
        let scene = InMemoryScene::new();
        let page = scene.context().page;
        let card = scene
            .add_node(&page, NodeKind::Component, "Card", Size::new(200.0, 100.0))
            .unwrap();
        scene
            .add_text(&card, "Title", "Title", FontName::default())
            .unwrap();
        for name in frames {
            scene
                .add_node(&page, NodeKind::Frame, name, Size::new(400.0, 1000.0))
                .unwrap();
        }
        let ui = RecordingChannel::new();
        let orchestrator = BatchOrchestrator::new(
            Arc::new(scene.clone()),
            Arc::new(InMemoryFetcher::new()),
            Arc::new(ui.clone()),
        );
        Fixture {
            scene,
            ui,
            card,
            orchestrator,
        }
    }

    fn titles(n: usize) -> FieldDefinition {
        FieldDefinition::text("Title").with_values((0..n).map(|i| format!("Row {}", i)))
    }

    #[tokio::test]
    async fn test_missing_template_aborts() {
        let f = fixture(&["Grid"]);
        let request = BatchRequest::new(NodeId::new("404:1")).with_field(titles(2));

        let result = f.orchestrator.run(&f.scene.context(), &request).await;
        assert_eq!(result, Err(BatchError::TemplateNotFound(NodeId::new("404:1"))));
        assert_eq!(f.scene.notifications(), vec!["Component not found on page."]);
        assert!(f.ui.messages().is_empty());
    }

    #[tokio::test]
    async fn test_zero_rows_halts_early() {
        let f = fixture(&["Grid"]);
        let request = BatchRequest::new(f.card.clone()).with_container(ContainerSpec::unbounded("Grid"));

        let summary = f.orchestrator.run(&f.scene.context(), &request).await.unwrap();
        assert_eq!(summary.total_rows, 0);
        assert_eq!(summary.generated_count(), 0);
        assert_eq!(f.ui.messages(), vec![PluginMessage::UpdateTotal { total: 0 }]);
    }

    #[tokio::test]
    async fn test_progress_and_completion_reported() {
        let f = fixture(&["Grid"]);
        let request = BatchRequest::new(f.card.clone())
            .with_field(titles(3))
            .with_container(ContainerSpec::unbounded("Grid"));

        let summary = f.orchestrator.run(&f.scene.context(), &request).await.unwrap();
        assert_eq!(summary.generated_count(), 3);
        assert_eq!(f.ui.messages(), vec![PluginMessage::UpdateTotal { total: 3 }]);
        assert_eq!(f.scene.notifications(), vec!["Generated 3 components"]);
    }

    #[tokio::test]
    async fn test_missing_container_drops_its_quota() {
        let f = fixture(&["Second"]);
        let request = BatchRequest::new(f.card.clone())
            .with_field(titles(5))
            .with_container(ContainerSpec::fixed("First", 2))
            .with_container(ContainerSpec::unbounded("Second"));

        let summary = f.orchestrator.run(&f.scene.context(), &request).await.unwrap();
        assert_eq!(summary.total_rows, 5);
        assert_eq!(summary.dropped_rows, vec![0, 1]);
        let rows: Vec<usize> = summary.instances_in(1).map(|g| g.row).collect();
        assert_eq!(rows, vec![2, 3, 4]);
        assert_eq!(
            f.scene.notifications(),
            vec![
                "Frame \"First\" not found on page, skipping".to_string(),
                "Generated 3 components".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_clone_failure_is_recorded_per_row() {
        let f = fixture(&["Grid"]);
        let page = f.scene.context().page;
        let request = BatchRequest::new(page.clone())
            .with_field(titles(2))
            .with_container(ContainerSpec::unbounded("Grid"));

        // Pages cannot be cloned, so every row fails without aborting.
        let summary = f.orchestrator.run(&f.scene.context(), &request).await.unwrap();
        assert_eq!(summary.failed_rows.len(), 2);
        assert_eq!(summary.generated_count(), 0);
        let grid = f.scene.find_on_page(&f.scene.context(), NodeKind::Frame, "Grid").unwrap();
        assert!(f.scene.children(&grid).is_empty());
    }

    #[tokio::test]
    async fn test_unattached_instance_is_removed() {
        let f = fixture(&["Grid"]);
        f.scene.set_fail_append(true);
        let before = f.scene.node_count();
        let request = BatchRequest::new(f.card.clone())
            .with_field(titles(2))
            .with_container(ContainerSpec::unbounded("Grid"));

        let summary = f.orchestrator.run(&f.scene.context(), &request).await.unwrap();
        assert_eq!(summary.generated_count(), 0);
        assert_eq!(
            summary.failed_rows.iter().map(|r| r.row).collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert_eq!(f.scene.node_count(), before);
        assert_eq!(f.scene.notifications().last().unwrap(), "Generated 0 components");
    }
}
