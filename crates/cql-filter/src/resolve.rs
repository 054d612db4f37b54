//! Schema resolution and literal coercion.
//!
//! Turns the raw parsed tree into the public [`FilterExpression`]: every
//! property reference becomes a `(column, type)` pair and every literal
//! is coerced to the target field's declared type. Mismatches fail here,
//! at compile time — never in the database.

use uuid::Uuid;

use feature_common::{parse_instant, FieldType, LayerMetadata};

use crate::ast::{
    ComparisonOp, FilterExpression, GeometryLiteral, Literal, RawExpr, RawLiteral, ResolvedField,
};

pub(crate) fn resolve(
    raw: RawExpr,
    layer: &LayerMetadata,
    geometry_srid: i32,
) -> Result<FilterExpression, ResolveError> {
    match raw {
        RawExpr::Logical { op, children } => {
            let children = children
                .into_iter()
                .map(|c| resolve(c, layer, geometry_srid))
                .collect::<Result<_, _>>()?;
            Ok(FilterExpression::Logical { op, children })
        }

        RawExpr::Comparison {
            property,
            op,
            value,
        } => {
            let field = lookup(layer, &property)?;
            if field.field_type == FieldType::Geometry {
                return Err(ResolveError::GeometryInComparison(property));
            }
            if op == ComparisonOp::Like && field.field_type != FieldType::Text {
                return Err(ResolveError::LikeOnNonText(property));
            }
            let value = coerce(value, &field)?;
            Ok(FilterExpression::Comparison { field, op, value })
        }

        RawExpr::Spatial {
            op,
            property,
            wkt,
            vertex_count,
        } => {
            let field = lookup(layer, &property)?;
            if field.field_type != FieldType::Geometry {
                return Err(ResolveError::NotGeometryField(property));
            }
            Ok(FilterExpression::Spatial {
                op,
                field,
                geometry: GeometryLiteral {
                    wkt,
                    srid: geometry_srid,
                    vertex_count,
                },
            })
        }

        RawExpr::Temporal {
            op,
            property,
            interval,
        } => {
            let field = lookup(layer, &property)?;
            if field.field_type != FieldType::Timestamp {
                return Err(ResolveError::NotTemporalField(property));
            }
            Ok(FilterExpression::Temporal {
                op,
                field,
                interval,
            })
        }

        RawExpr::InSet { property, values } => {
            let field = lookup(layer, &property)?;
            if field.field_type == FieldType::Geometry {
                return Err(ResolveError::GeometryInComparison(property));
            }
            let values = values
                .into_iter()
                .map(|v| coerce(v, &field))
                .collect::<Result<_, _>>()?;
            Ok(FilterExpression::InSet { field, values })
        }

        RawExpr::Between {
            property,
            low,
            high,
        } => {
            let field = lookup(layer, &property)?;
            if !matches!(
                field.field_type,
                FieldType::Int | FieldType::Float | FieldType::Timestamp | FieldType::Text
            ) {
                return Err(ResolveError::NotOrderable(property));
            }
            let low = coerce(low, &field)?;
            let high = coerce(high, &field)?;
            Ok(FilterExpression::Between { field, low, high })
        }

        RawExpr::IsNull { property } => {
            let field = lookup(layer, &property)?;
            Ok(FilterExpression::IsNull { field })
        }
    }
}

fn lookup(layer: &LayerMetadata, property: &str) -> Result<ResolvedField, ResolveError> {
    let def = layer
        .field(property)
        .ok_or_else(|| ResolveError::UnknownField(property.to_string()))?;
    Ok(ResolvedField {
        name: def.name.clone(),
        column: def.column.clone(),
        field_type: def.field_type,
    })
}

fn coerce(value: RawLiteral, field: &ResolvedField) -> Result<Literal, ResolveError> {
    let mismatch = |value: &RawLiteral| ResolveError::TypeMismatch {
        field: field.name.clone(),
        expected: field.field_type,
        got: value.type_name(),
    };

    match field.field_type {
        FieldType::Int => match value {
            RawLiteral::Int(i) => Ok(Literal::Int(i)),
            other => Err(mismatch(&other)),
        },
        FieldType::Float => match value {
            RawLiteral::Int(i) => Ok(Literal::Float(i as f64)),
            RawLiteral::Float(f) => Ok(Literal::Float(f)),
            other => Err(mismatch(&other)),
        },
        FieldType::Text => match value {
            RawLiteral::Text(s) => Ok(Literal::Text(s)),
            other => Err(mismatch(&other)),
        },
        FieldType::Bool => match value {
            RawLiteral::Bool(b) => Ok(Literal::Bool(b)),
            other => Err(mismatch(&other)),
        },
        FieldType::Timestamp => match value {
            RawLiteral::Text(s) => parse_instant(&s)
                .map(Literal::Timestamp)
                .map_err(|_| ResolveError::BadTimestamp {
                    field: field.name.clone(),
                    value: s,
                }),
            other => Err(mismatch(&other)),
        },
        FieldType::Uuid => match value {
            RawLiteral::Text(s) => Uuid::parse_str(&s)
                .map(Literal::Uuid)
                .map_err(|_| ResolveError::BadUuid {
                    field: field.name.clone(),
                    value: s,
                }),
            other => Err(mismatch(&other)),
        },
        FieldType::Geometry => Err(mismatch(&value)),
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub(crate) enum ResolveError {
    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Field '{0}' is not geometry-typed and cannot be used in a spatial predicate")]
    NotGeometryField(String),

    #[error("Field '{0}' is not timestamp-typed and cannot be used in a temporal predicate")]
    NotTemporalField(String),

    #[error("Geometry field '{0}' can only be used in spatial predicates")]
    GeometryInComparison(String),

    #[error("LIKE requires a text field, '{0}' is not")]
    LikeOnNonText(String),

    #[error("Field '{0}' does not support BETWEEN")]
    NotOrderable(String),

    #[error("Type mismatch for field '{field}': expected {expected:?}, got {got} literal")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        got: &'static str,
    },

    #[error("Invalid timestamp literal '{value}' for field '{field}'")]
    BadTimestamp { field: String, value: String },

    #[error("Invalid UUID literal '{value}' for field '{field}'")]
    BadUuid { field: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SpatialOp;
    use feature_common::FieldDef;

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
                FieldDef::new("lanes", FieldType::Float),
                FieldDef::new("updated", FieldType::Timestamp),
                FieldDef::new("geom", FieldType::Geometry),
            ],
            supported_crs: vec![],
            max_record_count: None,
        }
    }

    #[test]
    fn test_unknown_field() {
        let raw = RawExpr::Comparison {
            property: "speed".into(),
            op: ComparisonOp::Eq,
            value: RawLiteral::Int(1),
        };
        assert_eq!(
            resolve(raw, &roads(), 4326).unwrap_err(),
            ResolveError::UnknownField("speed".into())
        );
    }

    #[test]
    fn test_int_widens_to_float() {
        let raw = RawExpr::Comparison {
            property: "lanes".into(),
            op: ComparisonOp::Gt,
            value: RawLiteral::Int(2),
        };
        match resolve(raw, &roads(), 4326).unwrap() {
            FilterExpression::Comparison { value, .. } => {
                assert_eq!(value, Literal::Float(2.0))
            }
            other => panic!("expected comparison, got {:?}", other),
        }
    }

    #[test]
    fn test_string_on_int_field_rejected() {
        let raw = RawExpr::Comparison {
            property: "id".into(),
            op: ComparisonOp::Eq,
            value: RawLiteral::Text("abc".into()),
        };
        assert!(matches!(
            resolve(raw, &roads(), 4326),
            Err(ResolveError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_timestamp_coercion() {
        let raw = RawExpr::Comparison {
            property: "updated".into(),
            op: ComparisonOp::Gte,
            value: RawLiteral::Text("2024-01-01T00:00:00Z".into()),
        };
        match resolve(raw, &roads(), 4326).unwrap() {
            FilterExpression::Comparison { value, .. } => {
                assert!(matches!(value, Literal::Timestamp(_)))
            }
            other => panic!("expected comparison, got {:?}", other),
        }

        let raw = RawExpr::Comparison {
            property: "updated".into(),
            op: ComparisonOp::Gte,
            value: RawLiteral::Text("garbage".into()),
        };
        assert!(matches!(
            resolve(raw, &roads(), 4326),
            Err(ResolveError::BadTimestamp { .. })
        ));
    }

    #[test]
    fn test_spatial_requires_geometry_field() {
        let raw = RawExpr::Spatial {
            op: SpatialOp::Intersects,
            property: "name".into(),
            wkt: "POINT(0 0)".into(),
            vertex_count: 1,
        };
        assert_eq!(
            resolve(raw, &roads(), 4326).unwrap_err(),
            ResolveError::NotGeometryField("name".into())
        );
    }

    #[test]
    fn test_geometry_field_in_comparison_rejected() {
        let raw = RawExpr::Comparison {
            property: "geom".into(),
            op: ComparisonOp::Eq,
            value: RawLiteral::Text("x".into()),
        };
        assert!(matches!(
            resolve(raw, &roads(), 4326),
            Err(ResolveError::GeometryInComparison(_))
        ));
    }

    #[test]
    fn test_spatial_literal_carries_srid() {
        let raw = RawExpr::Spatial {
            op: SpatialOp::Intersects,
            property: "geom".into(),
            wkt: "POINT(0 0)".into(),
            vertex_count: 1,
        };
        match resolve(raw, &roads(), 3857).unwrap() {
            FilterExpression::Spatial { geometry, .. } => assert_eq!(geometry.srid, 3857),
            other => panic!("expected spatial, got {:?}", other),
        }
    }
}
