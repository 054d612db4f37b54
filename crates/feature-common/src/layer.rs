//! Layer (collection) metadata consumed by the query compiler.
//!
//! This is read-only input supplied by the catalog; the compiler resolves
//! field references and CRS identifiers against it but never mutates it.

use serde::{Deserialize, Serialize};

use crate::crs::Crs;

/// Declared type of a layer field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Int,
    Float,
    Text,
    Bool,
    Timestamp,
    Uuid,
    Geometry,
}

/// A single field in a layer schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    /// Physical column name; usually identical to `name` but protocol
    /// adapters may alias (e.g. `OBJECTID` onto an integer pk).
    pub column: String,
    pub field_type: FieldType,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            field_type,
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }
}

/// Metadata describing one feature layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerMetadata {
    /// Collection identifier exposed to clients.
    pub collection_id: String,

    /// Physical table name.
    pub table: String,

    /// Optional schema qualifier.
    pub schema: Option<String>,

    /// Name of the id field (must appear in `fields`).
    pub id_field: String,

    /// Name of the geometry field (must appear in `fields`).
    pub geometry_field: String,

    /// Field the `datetime` parameter filters on, when the layer has one.
    pub temporal_field: Option<String>,

    /// Column holding the collection discriminator in multi-collection
    /// search tables; `None` for single-collection layers.
    pub collection_field: Option<String>,

    /// Storage SRID of the geometry column.
    pub srid: i32,

    /// Declared fields, id and geometry included.
    pub fields: Vec<FieldDef>,

    /// CRS identifiers this layer can serve, beyond the service defaults.
    pub supported_crs: Vec<Crs>,

    /// Per-layer cap on page size, if stricter than the service cap.
    pub max_record_count: Option<u32>,
}

impl LayerMetadata {
    /// Look up a field by its exposed name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Declared type of a field, if it exists.
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.field(name).map(|f| f.field_type)
    }

    /// Whether `name` refers to the geometry field.
    pub fn is_geometry_field(&self, name: &str) -> bool {
        name == self.geometry_field
    }

    /// The id field definition.
    pub fn id_field_def(&self) -> Option<&FieldDef> {
        self.field(&self.id_field)
    }
}
