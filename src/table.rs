/// Row-oriented view over field definitions
use serde::{Deserialize, Serialize};

use crate::model::FieldDefinition;

/// Literal written by [`Placeholder::Sentinel`]
pub const SENTINEL: &str = "EMPTY DATA, RE-CHECK";

/// What a text layer receives when a row has no value for its field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placeholder {
    /// Clear the layer
    #[default]
    Empty,
    /// Write [`SENTINEL`] so gaps stand out in the generated frames
    Sentinel,
}

impl Placeholder {
    pub fn as_str(self) -> &'static str {
        match self {
            Placeholder::Empty => "",
            Placeholder::Sentinel => SENTINEL,
        }
    }
}

/// Number of rows described by `fields`: the longest value array
pub fn row_count(fields: &[FieldDefinition]) -> usize {
    fields.iter().map(|f| f.values.len()).max().unwrap_or(0)
}

#[derive(Debug, Clone, Copy)]
pub struct ValueTable<'a> {
    fields: &'a [FieldDefinition],
    placeholder: Placeholder,
    rows: usize,
}

impl<'a> ValueTable<'a> {
    pub fn new(fields: &'a [FieldDefinition], placeholder: Placeholder) -> Self {
        ValueTable {
            fields,
            placeholder,
            rows: row_count(fields),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Fields in declaration order
    pub fn fields(&self) -> &'a [FieldDefinition] {
        self.fields
    }

    /// The value stored for `field` at `row`, without placeholder substitution
    pub fn raw_value_at<'f>(&self, field: &'f FieldDefinition, row: usize) -> Option<&'f str> {
        field.value(row)
    }

    /// The value for `field` at `row`; missing or empty values read as the
    /// placeholder
    pub fn value_at<'f>(&self, field: &'f FieldDefinition, row: usize) -> &'f str {
        match field.value(row) {
            Some(value) if !value.is_empty() => value,
            _ => self.placeholder.as_str(),
        }
    }
}
