//! CQL filter compilation.
//!
//! Parses filters written in either the CQL text dialect or the CQL2 JSON
//! dialect into one vendor-neutral [`FilterExpression`] tree, resolving
//! every field reference against the layer schema and coercing literals
//! to declared field types. Downstream SQL builders never see dialect or
//! schema concerns.
//!
//! # Example
//!
//! ```rust
//! use cql_filter::{FilterCompiler, FilterLanguage};
//! use feature_common::{FieldDef, FieldType, LayerMetadata};
//!
//! let layer = LayerMetadata {
//!     collection_id: "roads".into(),
//!     table: "roads".into(),
//!     schema: None,
//!     id_field: "id".into(),
//!     geometry_field: "geom".into(),
//!     temporal_field: None,
//!     collection_field: None,
//!     srid: 4326,
//!     fields: vec![
//!         FieldDef::new("id", FieldType::Int),
//!         FieldDef::new("name", FieldType::Text),
//!         FieldDef::new("geom", FieldType::Geometry),
//!     ],
//!     supported_crs: vec![],
//!     max_record_count: None,
//! };
//!
//! let compiler = FilterCompiler::new(&layer);
//! let filter = compiler
//!     .compile("name = 'Main St'", Some(FilterLanguage::CqlText))
//!     .unwrap();
//! ```

mod ast;
mod geometry;
mod json;
mod lexer;
mod resolve;
mod text;

pub use ast::{
    ComparisonOp, FilterExpression, GeometryLiteral, Literal, LogicalOp, ResolvedField, SpatialOp,
    TemporalOp,
};

use feature_common::{FeatureError, FeatureResult, LayerMetadata};

use ast::RawExpr;

/// The two supported filter dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterLanguage {
    CqlText,
    Cql2Json,
}

impl FilterLanguage {
    /// Parse a `filter-lang` parameter value.
    pub fn from_param(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cql-text" | "cql2-text" => Some(FilterLanguage::CqlText),
            "cql2-json" => Some(FilterLanguage::Cql2Json),
            _ => None,
        }
    }

    /// Guess the dialect of a filter payload.
    ///
    /// A payload whose first non-whitespace byte is `{` is treated as CQL2
    /// JSON, anything else as CQL text. An explicit `filter-lang` always
    /// wins over this heuristic.
    pub fn sniff(payload: &str) -> Self {
        match payload.trim_start().as_bytes().first() {
            Some(b'{') => FilterLanguage::Cql2Json,
            _ => FilterLanguage::CqlText,
        }
    }
}

/// Compiles filter payloads against one layer's schema.
pub struct FilterCompiler<'a> {
    layer: &'a LayerMetadata,
    geometry_srid: i32,
    max_vertices: usize,
}

impl<'a> FilterCompiler<'a> {
    /// Create a compiler for a layer. Geometry literals default to the
    /// layer's storage SRID.
    pub fn new(layer: &'a LayerMetadata) -> Self {
        Self {
            layer,
            geometry_srid: layer.srid,
            max_vertices: feature_common::ServiceLimits::default().max_filter_vertices,
        }
    }

    /// Tag geometry literals with a `filter-crs` SRID instead of the
    /// layer default.
    pub fn with_geometry_srid(mut self, srid: i32) -> Self {
        self.geometry_srid = srid;
        self
    }

    /// Override the geometry vertex ceiling.
    pub fn with_max_vertices(mut self, max: usize) -> Self {
        self.max_vertices = max;
        self
    }

    /// Compile a filter payload into a resolved expression tree.
    ///
    /// When `language` is `None` the dialect is sniffed from the payload.
    pub fn compile(
        &self,
        input: &str,
        language: Option<FilterLanguage>,
    ) -> FeatureResult<FilterExpression> {
        let language = language.unwrap_or_else(|| FilterLanguage::sniff(input));

        let raw = match language {
            FilterLanguage::CqlText => text::parse_text(input)
                .map_err(|e| FeatureError::InvalidFilter(e.to_string()))?,
            FilterLanguage::Cql2Json => json::parse_json(input)
                .map_err(|e| FeatureError::InvalidFilter(e.to_string()))?,
        };

        self.check_vertex_ceiling(&raw)?;

        resolve::resolve(raw, self.layer, self.geometry_srid)
            .map_err(|e| FeatureError::InvalidFilter(e.to_string()))
    }

    fn check_vertex_ceiling(&self, raw: &RawExpr) -> FeatureResult<()> {
        match raw {
            RawExpr::Spatial { vertex_count, .. } => {
                if *vertex_count > self.max_vertices {
                    return Err(FeatureError::PayloadTooLarge(format!(
                        "filter geometry has {} vertices, limit is {}",
                        vertex_count, self.max_vertices
                    )));
                }
            }
            RawExpr::Logical { children, .. } => {
                for child in children {
                    self.check_vertex_ceiling(child)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Build the filter node for an `ids` parameter.
pub fn ids_filter(ids: Vec<String>) -> FilterExpression {
    FilterExpression::Ids { ids }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feature_common::{FieldDef, FieldType};

    fn roads() -> LayerMetadata {
        LayerMetadata {
            collection_id: "roads".into(),
            table: "roads".into(),
            schema: None,
            id_field: "id".into(),
            geometry_field: "geom".into(),
            temporal_field: None,
            collection_field: None,
            srid: 4326,
            fields: vec![
                FieldDef::new("id", FieldType::Int),
                FieldDef::new("name", FieldType::Text),
                FieldDef::new("geom", FieldType::Geometry),
            ],
            supported_crs: vec![],
            max_record_count: None,
        }
    }

    #[test]
    fn test_language_from_param() {
        assert_eq!(
            FilterLanguage::from_param("CQL-TEXT"),
            Some(FilterLanguage::CqlText)
        );
        assert_eq!(
            FilterLanguage::from_param("cql2-json"),
            Some(FilterLanguage::Cql2Json)
        );
        assert_eq!(FilterLanguage::from_param("xpath"), None);
    }

    #[test]
    fn test_sniffing() {
        assert_eq!(
            FilterLanguage::sniff(r#"  {"op":"=","args":[]}"#),
            FilterLanguage::Cql2Json
        );
        assert_eq!(FilterLanguage::sniff("name = 'x'"), FilterLanguage::CqlText);
    }

    #[test]
    fn test_both_dialects_compile_to_same_tree() {
        let layer = roads();
        let compiler = FilterCompiler::new(&layer);

        let from_text = compiler
            .compile("name = 'Main St'", Some(FilterLanguage::CqlText))
            .unwrap();
        let from_json = compiler
            .compile(
                r#"{"op":"=","args":[{"property":"name"},"Main St"]}"#,
                Some(FilterLanguage::Cql2Json),
            )
            .unwrap();

        assert_eq!(from_text, from_json);
    }

    #[test]
    fn test_unknown_field_is_invalid_filter() {
        let layer = roads();
        let compiler = FilterCompiler::new(&layer);
        let err = compiler.compile("speed > 3", None).unwrap_err();
        assert!(matches!(err, FeatureError::InvalidFilter(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_vertex_ceiling() {
        let layer = roads();
        let compiler = FilterCompiler::new(&layer).with_max_vertices(3);
        let err = compiler
            .compile("INTERSECTS(geom, POLYGON((0 0, 1 0, 1 1, 0 0)))", None)
            .unwrap_err();
        assert!(matches!(err, FeatureError::PayloadTooLarge(_)));
        assert_eq!(err.status_code(), 413);
    }

    #[test]
    fn test_filter_crs_srid_applied() {
        let layer = roads();
        let compiler = FilterCompiler::new(&layer).with_geometry_srid(3857);
        let expr = compiler
            .compile("INTERSECTS(geom, POINT(0 0))", None)
            .unwrap();
        match expr {
            FilterExpression::Spatial { geometry, .. } => assert_eq!(geometry.srid, 3857),
            other => panic!("expected spatial, got {:?}", other),
        }
    }

    #[test]
    fn test_ids_filter_combines_with_and() {
        let ids = ids_filter(vec!["1".into(), "2".into()]);
        let layer = roads();
        let other = FilterCompiler::new(&layer).compile("name = 'x'", None).unwrap();
        let combined = other.and(ids);
        match combined {
            FilterExpression::Logical { children, .. } => assert_eq!(children.len(), 2),
            other => panic!("expected AND, got {:?}", other),
        }
    }
}
