//! Field binding
//!
//! Writes one row's value into a named layer of a generated instance. Every
//! outcome other than a successful write is reported as a [`SkipReason`];
//! nothing here aborts the batch.
use thiserror::Error;

use crate::fetch::{is_remote_url, FetchError, ImageFetcher};
use crate::model::{FieldDefinition, FieldKind};
use crate::scene::{NodeId, NodeKind, Paint, SceneError, SceneGraph};

/// Why a field was not written
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkipReason {
    #[error("field has no layer name")]
    UnnamedField,

    #[error("layer \"{layer}\" not found")]
    LayerNotFound { layer: String },

    #[error("layer \"{layer}\" is a {found}, cannot take a {expected} value")]
    KindMismatch {
        layer: String,
        expected: FieldKind,
        found: NodeKind,
    },

    #[error("no image url for layer \"{layer}\"")]
    NoImageUrl { layer: String },

    #[error("failed to set text for layer \"{layer}\": {error}")]
    TextWriteFailed { layer: String, error: SceneError },

    #[error("failed to load image for layer \"{layer}\": {error}")]
    ImageFetchFailed { layer: String, error: FetchError },

    #[error("failed to decode image for layer \"{layer}\": {error}")]
    ImageDecodeFailed { layer: String, error: SceneError },

    #[error("failed to set fills for layer \"{layer}\": {error}")]
    FillWriteFailed { layer: String, error: SceneError },
}

impl SkipReason {
    /// Resource or write failures, as opposed to layers that are simply
    /// absent or of another kind
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SkipReason::TextWriteFailed { .. }
                | SkipReason::ImageFetchFailed { .. }
                | SkipReason::ImageDecodeFailed { .. }
                | SkipReason::FillWriteFailed { .. }
        )
    }
}

pub struct FieldBinder<'a> {
    scene: &'a dyn SceneGraph,
    fetcher: &'a dyn ImageFetcher,
}

impl<'a> FieldBinder<'a> {
    pub fn new(scene: &'a dyn SceneGraph, fetcher: &'a dyn ImageFetcher) -> Self {
        FieldBinder { scene, fetcher }
    }

    /// Apply `value` to the layer `field.name` inside `instance`
    pub async fn bind(
        &self,
        instance: &NodeId,
        field: &FieldDefinition,
        value: &str,
    ) -> Result<(), SkipReason> {
        if field.name.is_empty() {
            return Err(SkipReason::UnnamedField);
        }
        let layer = field.name.as_str();
        let target = self
            .scene
            .find_descendant(instance, layer)
            .ok_or_else(|| SkipReason::LayerNotFound {
                layer: layer.to_string(),
            })?;
        let kind = self
            .scene
            .node_kind(&target)
            .ok_or_else(|| SkipReason::LayerNotFound {
                layer: layer.to_string(),
            })?;

        match field.kind {
            FieldKind::Text if kind.supports_text() => self.bind_text(&target, layer, value).await,
            FieldKind::Image if kind.supports_fill() => self.bind_image(&target, layer, value).await,
            expected => Err(SkipReason::KindMismatch {
                layer: layer.to_string(),
                expected,
                found: kind,
            }),
        }
    }

    async fn bind_text(&self, target: &NodeId, layer: &str, value: &str) -> Result<(), SkipReason> {
        if let Some(font) = self.scene.font_name(target) {
            if let Err(e) = self.scene.load_font(&font).await {
                tracing::warn!(layer, font = %font, error = %e, "font load failed");
            }
        }

        self.scene
            .set_characters(target, value)
            .map_err(|error| SkipReason::TextWriteFailed {
                layer: layer.to_string(),
                error,
            })
    }

    async fn bind_image(&self, target: &NodeId, layer: &str, value: &str) -> Result<(), SkipReason> {
        if !is_remote_url(value) {
            return Err(SkipReason::NoImageUrl {
                layer: layer.to_string(),
            });
        }

        let bytes = self
            .fetcher
            .fetch(value.trim())
            .await
            .map_err(|error| SkipReason::ImageFetchFailed {
                layer: layer.to_string(),
                error,
            })?;
        let image = self
            .scene
            .create_image(&bytes)
            .await
            .map_err(|error| SkipReason::ImageDecodeFailed {
                layer: layer.to_string(),
                error,
            })?;

        self.scene
            .set_fills(target, vec![Paint::image_fill(image)])
            .map_err(|error| SkipReason::FillWriteFailed {
                layer: layer.to_string(),
                error,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::InMemoryFetcher;
    use crate::scene::{FontName, InMemoryScene, ScaleMode, Size};
    use pretty_assertions::assert_eq;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    struct Fixture {
        scene: InMemoryScene,
        fetcher: InMemoryFetcher,
        instance: NodeId,
    }

    fn fixture() -> Fixture {
        let scene = InMemoryScene::new();
        let page = scene.context().page;
        let card = scene
            .add_node(&page, NodeKind::Component, "Card", Size::new(200.0, 120.0))
            .unwrap();
        scene
            .add_text(&card, "Title", "Placeholder", FontName::default())
            .unwrap();
        scene
            .add_text(&card, "Brand", "Acme", FontName::new("Brand Sans", "Bold"))
            .unwrap();
        let photo = scene
            .add_node(&card, NodeKind::Rectangle, "Photo", Size::new(200.0, 80.0))
            .unwrap();
        scene
            .set_fills(
                &photo,
                vec![Paint::Solid {
                    color: "#cccccc".to_string(),
                }],
            )
            .unwrap();
        scene
            .add_node(&card, NodeKind::Group, "Badge", Size::default())
            .unwrap();
        let instance = scene.create_instance(&card).unwrap();

        Fixture {
            scene,
            fetcher: InMemoryFetcher::new(),
            instance,
        }
    }

    fn layer(f: &Fixture, name: &str) -> NodeId {
        f.scene.find_descendant(&f.instance, name).unwrap()
    }

    #[tokio::test]
    async fn test_text_binding() {
        let f = fixture();
        let binder = FieldBinder::new(&f.scene, &f.fetcher);

        binder
            .bind(&f.instance, &FieldDefinition::text("Title"), "Q3 Revenue")
            .await
            .unwrap();
        assert_eq!(f.scene.characters(&layer(&f, "Title")).as_deref(), Some("Q3 Revenue"));
    }

    #[tokio::test]
    async fn test_unnamed_and_missing_layers_are_skipped() {
        let f = fixture();
        let binder = FieldBinder::new(&f.scene, &f.fetcher);

        let unnamed = binder.bind(&f.instance, &FieldDefinition::text(""), "x").await;
        assert_eq!(unnamed, Err(SkipReason::UnnamedField));

        let missing = binder
            .bind(&f.instance, &FieldDefinition::text("Subtitle"), "x")
            .await
            .unwrap_err();
        assert_eq!(
            missing,
            SkipReason::LayerNotFound {
                layer: "Subtitle".to_string()
            }
        );
        assert!(!missing.is_failure());
    }

    #[tokio::test]
    async fn test_kind_mismatch() {
        let f = fixture();
        let binder = FieldBinder::new(&f.scene, &f.fetcher);

        let err = binder
            .bind(&f.instance, &FieldDefinition::text("Photo"), "x")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SkipReason::KindMismatch {
                layer: "Photo".to_string(),
                expected: FieldKind::Text,
                found: NodeKind::Rectangle,
            }
        );

        let err = binder
            .bind(&f.instance, &FieldDefinition::image("Badge"), "https://x.test/a.png")
            .await
            .unwrap_err();
        assert!(matches!(err, SkipReason::KindMismatch { found: NodeKind::Group, .. }));
        assert!(f.fetcher.requests().is_empty());
    }

    #[tokio::test]
    async fn test_missing_font_keeps_previous_text() {
        let f = fixture();
        f.scene.mark_font_missing(FontName::new("Brand Sans", "Bold"));
        let binder = FieldBinder::new(&f.scene, &f.fetcher);

        let err = binder
            .bind(&f.instance, &FieldDefinition::text("Brand"), "Globex")
            .await
            .unwrap_err();
        assert!(matches!(err, SkipReason::TextWriteFailed { .. }));
        assert!(err.is_failure());
        assert_eq!(f.scene.characters(&layer(&f, "Brand")).as_deref(), Some("Acme"));
    }

    #[tokio::test]
    async fn test_image_binding_replaces_fills() {
        let f = fixture();
        f.fetcher.add("https://x.test/a.png", PNG);
        let binder = FieldBinder::new(&f.scene, &f.fetcher);

        binder
            .bind(&f.instance, &FieldDefinition::image("Photo"), "https://x.test/a.png")
            .await
            .unwrap();

        let fills = f.scene.fills(&layer(&f, "Photo")).unwrap();
        assert_eq!(fills.len(), 1);
        match &fills[0] {
            Paint::Image { scale_mode, image } => {
                assert_eq!(*scale_mode, ScaleMode::Fill);
                assert_eq!(f.scene.image_bytes(image).as_deref(), Some(PNG));
            }
            other => panic!("expected image fill, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_http_value_is_not_fetched() {
        let f = fixture();
        let binder = FieldBinder::new(&f.scene, &f.fetcher);
        let before = f.scene.fills(&layer(&f, "Photo"));

        for value in ["ftp://notallowed", "", "EMPTY DATA, RE-CHECK"] {
            let err = binder
                .bind(&f.instance, &FieldDefinition::image("Photo"), value)
                .await
                .unwrap_err();
            assert!(matches!(err, SkipReason::NoImageUrl { .. }));
            assert!(!err.is_failure());
        }
        assert!(f.fetcher.requests().is_empty());
        assert_eq!(f.scene.fills(&layer(&f, "Photo")), before);
    }

    #[tokio::test]
    async fn test_failed_fetch_and_decode_keep_fills() {
        let f = fixture();
        f.fetcher.add("https://x.test/page.html", b"<html></html>".to_vec());
        let binder = FieldBinder::new(&f.scene, &f.fetcher);
        let before = f.scene.fills(&layer(&f, "Photo"));

        let err = binder
            .bind(&f.instance, &FieldDefinition::image("Photo"), "https://x.test/404.png")
            .await
            .unwrap_err();
        assert!(matches!(err, SkipReason::ImageFetchFailed { .. }));

        let err = binder
            .bind(&f.instance, &FieldDefinition::image("Photo"), "https://x.test/page.html")
            .await
            .unwrap_err();
        assert!(matches!(err, SkipReason::ImageDecodeFailed { .. }));

        assert_eq!(f.scene.fills(&layer(&f, "Photo")), before);
    }
}
