//! Query result shapes returned to the analytics layer

use crate::dimension::DimensionType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata for one result column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMeta {
    /// Column name as returned by the warehouse
    pub name: String,

    /// Mapped dimension type
    #[serde(rename = "type")]
    pub dimension_type: DimensionType,

    /// Native warehouse type name (e.g. `int4`)
    pub warehouse_type: String,
}

impl FieldMeta {
    /// Create field metadata
    pub fn new(
        name: impl Into<String>,
        dimension_type: DimensionType,
        warehouse_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            dimension_type,
            warehouse_type: warehouse_type.into(),
        }
    }
}

/// A single result row, keyed by column name
pub type Row = Map<String, Value>;

/// Column metadata plus row data for one executed query
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryResult {
    /// Result columns, in the order the warehouse returned them
    pub fields: Vec<FieldMeta>,

    /// Row data
    pub rows: Vec<Row>,
}

impl QueryResult {
    /// Create a result from fields and rows
    pub fn new(fields: Vec<FieldMeta>, rows: Vec<Row>) -> Self {
        Self { fields, rows }
    }

    /// Find a field by column name
    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Column names in result order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
