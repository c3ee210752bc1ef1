//! gridfill - bulk population of template component instances
//!
//! Given a template node, named field columns and an ordered list of target
//! frames with capacities, this library stamps out one instance per data row,
//! routes it to its frame, stacks it below the previous ones and writes each
//! row's text and image values into the instance's named layers. Missing
//! layers, fonts and images are recorded and skipped; they never abort the
//! batch.
//!
//! # Example
//!
//! ```
//! # tokio_test::block_on(async {
//! use gridfill::model::{BatchRequest, ContainerSpec, FieldDefinition};
//! use gridfill::scene::{FontName, InMemoryScene, NodeKind, Size};
//! use gridfill::fetch::InMemoryFetcher;
//! use std::sync::Arc;
//!
//! let scene = InMemoryScene::new();
//! let ctx = scene.context();
//! let card = scene.add_node(&ctx.page, NodeKind::Component, "Card", Size::new(200.0, 80.0)).unwrap();
//! scene.add_text(&card, "Title", "Title", FontName::default()).unwrap();
//! scene.add_node(&ctx.page, NodeKind::Frame, "Grid", Size::new(400.0, 800.0)).unwrap();
//!
//! let request = BatchRequest::new(card)
//!     .with_field(FieldDefinition::text("Title").with_values(["Q1", "Q2", "Q3"]))
//!     .with_container(ContainerSpec::unbounded("Grid"));
//!
//! let summary = gridfill::run_batch(
//!     Arc::new(scene.clone()),
//!     Arc::new(InMemoryFetcher::new()),
//!     &ctx,
//!     &request,
//! )
//! .await
//! .unwrap();
//! assert_eq!(summary.generated_count(), 3);
//! # });
//! ```

pub mod allocator;
pub mod binder;
pub mod config;
pub mod diagnostic;
pub mod factory;
pub mod fetch;
pub mod model;
pub mod orchestrator;
pub mod placer;
pub mod plugin;
pub mod protocol;
pub mod scene;
pub mod table;

#[cfg(feature = "http")]
pub mod relay;

use std::sync::Arc;

/// Re-export main types for convenience
pub use binder::SkipReason;
pub use config::Settings;
pub use fetch::ImageFetcher;
pub use model::{BatchRequest, Capacity, ContainerSpec, FieldDefinition, FieldKind};
pub use orchestrator::{BatchError, BatchOrchestrator, Summary};
pub use plugin::Plugin;
pub use scene::{SceneContext, SceneGraph};

/// Run one batch with default settings, discarding UI progress messages
pub async fn run_batch(
    scene: Arc<dyn SceneGraph>,
    fetcher: Arc<dyn ImageFetcher>,
    ctx: &SceneContext,
    request: &BatchRequest,
) -> Result<Summary, BatchError> {
    BatchOrchestrator::new(scene, fetcher, Arc::new(protocol::NullChannel))
        .run(ctx, request)
        .await
}
