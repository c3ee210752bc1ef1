/// Vertical column placement of appended instances
use crate::scene::{NodeId, Point, SceneError, SceneGraph};

/// Space left between consecutive instances
pub const DEFAULT_GAP: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutPlacer {
    gap: f64,
}

impl LayoutPlacer {
    /// Negative gaps are raised to zero and non-finite ones fall back to
    /// [`DEFAULT_GAP`], so instances never overlap
    pub fn new(gap: f64) -> Self {
        let gap = if gap.is_finite() { gap.max(0.0) } else { DEFAULT_GAP };
        LayoutPlacer { gap }
    }

    /// Offset for `instance`: below every sibling that precedes it in
    /// `container`, one gap apart
    pub fn offset_for(&self, scene: &dyn SceneGraph, container: &NodeId, instance: &NodeId) -> Point {
        let y: f64 = scene
            .children(container)
            .iter()
            .take_while(|child| *child != instance)
            .map(|child| scene.size(child).map_or(0.0, |s| s.height) + self.gap)
            .sum();
        Point::new(0.0, y)
    }

    /// Position an instance that was just appended to `container`
    pub fn place(
        &self,
        scene: &dyn SceneGraph,
        container: &NodeId,
        instance: &NodeId,
    ) -> Result<Point, SceneError> {
        let position = self.offset_for(scene, container, instance);
        scene.set_position(instance, position)?;
        Ok(position)
    }
}

impl Default for LayoutPlacer {
    fn default() -> Self {
        LayoutPlacer::new(DEFAULT_GAP)
    }
}
