/// Batch input model: field definitions, container specs and the request
/// that bundles them with a template reference.
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::scene::NodeId;

/// How a field's values are applied to its target layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Image,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Text => f.write_str("text"),
            FieldKind::Image => f.write_str("image"),
        }
    }
}

/// A named binding rule: target layer, value kind and one value per row
///
/// `values` is addressed by absolute row index. A `None` entry (a `null` in
/// the UI payload) or an index past the end reads as a placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "layer", default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub values: Vec<Option<String>>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        FieldDefinition {
            name: name.into(),
            kind,
            values: Vec::new(),
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn image(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Image)
    }

    /// Set the values, one per row, all present
    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = values.into_iter().map(|v| Some(v.into())).collect();
        self
    }

    /// Set the values with explicit gaps
    pub fn with_sparse_values(mut self, values: Vec<Option<String>>) -> Self {
        self.values = values;
        self
    }

    /// The stored value at `row`, if any
    pub fn value(&self, row: usize) -> Option<&str> {
        self.values.get(row).and_then(|v| v.as_deref())
    }
}

/// Per-container row quota
///
/// On the wire this is the `positions` number; a missing, null or zero value
/// means the container takes every remaining row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<u64>", into = "Option<u64>")]
pub enum Capacity {
    Fixed(usize),
    #[default]
    Unbounded,
}

impl From<Option<u64>> for Capacity {
    fn from(positions: Option<u64>) -> Self {
        match positions {
            Some(0) | None => Capacity::Unbounded,
            Some(n) => Capacity::Fixed(usize::try_from(n).unwrap_or(usize::MAX)),
        }
    }
}

impl From<Capacity> for Option<u64> {
    fn from(capacity: Capacity) -> Self {
        match capacity {
            Capacity::Fixed(n) => Some(u64::try_from(n).unwrap_or(u64::MAX)),
            Capacity::Unbounded => None,
        }
    }
}

/// Target container, looked up by frame name on the current page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    #[serde(rename = "positions", default)]
    pub capacity: Capacity,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, capacity: Capacity) -> Self {
        ContainerSpec {
            name: name.into(),
            capacity,
        }
    }

    pub fn fixed(name: impl Into<String>, capacity: usize) -> Self {
        Self::new(name, Capacity::Fixed(capacity))
    }

    pub fn unbounded(name: impl Into<String>) -> Self {
        Self::new(name, Capacity::Unbounded)
    }
}

/// One batch: fields, containers and the template to stamp out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub data: Vec<FieldDefinition>,
    #[serde(default)]
    pub grids: Vec<ContainerSpec>,
    pub component: NodeId,
}

impl BatchRequest {
    pub fn new(component: NodeId) -> Self {
        BatchRequest {
            data: Vec::new(),
            grids: Vec::new(),
            component,
        }
    }

    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.data.push(field);
        self
    }

    pub fn with_container(mut self, container: ContainerSpec) -> Self {
        self.grids.push(container);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_from_ui_payload() {
        let json = r#"{"layer":"Title","type":"text","values":["a",null,"c"]}"#;
        let field: FieldDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(field.name, "Title");
        assert_eq!(field.kind, FieldKind::Text);
        assert_eq!(field.value(0), Some("a"));
        assert_eq!(field.value(1), None);
        assert_eq!(field.value(5), None);
    }

    #[test]
    fn test_field_without_layer_has_empty_name() {
        let field: FieldDefinition = serde_json::from_str(r#"{"type":"image"}"#).unwrap();
        assert!(field.name.is_empty());
        assert!(field.values.is_empty());
    }

    #[test]
    fn test_positions_map_to_capacity() {
        let specs: Vec<ContainerSpec> = serde_json::from_str(
            r#"[{"name":"A","positions":3},{"name":"B","positions":0},{"name":"C"},{"name":"D","positions":null}]"#,
        )
        .unwrap();
        let caps: Vec<Capacity> = specs.iter().map(|s| s.capacity).collect();
        assert_eq!(
            caps,
            vec![
                Capacity::Fixed(3),
                Capacity::Unbounded,
                Capacity::Unbounded,
                Capacity::Unbounded
            ]
        );
    }

    #[test]
    fn test_oversized_positions_saturate() {
        let spec: ContainerSpec =
            serde_json::from_str(r#"{"name":"A","positions":18446744073709551615}"#).unwrap();
        let expected = usize::try_from(u64::MAX).unwrap_or(usize::MAX);
        assert_eq!(spec.capacity, Capacity::Fixed(expected));
        assert_eq!(Option::<u64>::from(spec.capacity), Some(expected as u64));
    }

    #[test]
    fn test_request_from_ui_payload() {
        let json = r#"{
            "data": [{"layer": "Title", "type": "text", "values": ["x"]}],
            "grids": [{"name": "Grid", "positions": 4}],
            "component": "1:7"
        }"#;
        let request: BatchRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.component, NodeId::new("1:7"));
        assert_eq!(request.grids, vec![ContainerSpec::fixed("Grid", 4)]);
    }
}
