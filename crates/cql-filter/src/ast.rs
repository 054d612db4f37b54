//! Filter expression trees.
//!
//! Both filter dialects parse into the same raw tree, which resolution
//! turns into the public [`FilterExpression`]. The trees are built
//! bottom-up during parsing and expose no mutable node-linking API, so
//! they are acyclic by construction.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use feature_common::{FieldType, TemporalInterval};

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
}

impl ComparisonOp {
    /// SQL rendering of the operator; identical across dialects.
    pub fn sql(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Neq => "<>",
            ComparisonOp::Lt => "<",
            ComparisonOp::Lte => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
            ComparisonOp::Like => "LIKE",
        }
    }
}

/// Boolean combinators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

/// Spatial relationship predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpatialOp {
    Intersects,
    Contains,
    Within,
    Touches,
    Crosses,
    Overlaps,
    Disjoint,
    Equals,
}

impl SpatialOp {
    /// Canonical predicate name without any vendor prefix.
    pub fn base_name(&self) -> &'static str {
        match self {
            SpatialOp::Intersects => "Intersects",
            SpatialOp::Contains => "Contains",
            SpatialOp::Within => "Within",
            SpatialOp::Touches => "Touches",
            SpatialOp::Crosses => "Crosses",
            SpatialOp::Overlaps => "Overlaps",
            SpatialOp::Disjoint => "Disjoint",
            SpatialOp::Equals => "Equals",
        }
    }
}

/// Temporal predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalOp {
    Before,
    After,
    During,
}

/// A typed literal value, already coerced to the target field's type.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
}

/// A field reference resolved against the layer schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    /// Exposed property name.
    pub name: String,
    /// Physical column name.
    pub column: String,
    /// Declared type.
    pub field_type: FieldType,
}

/// A geometry literal normalized to WKT.
///
/// Normalization happens exactly once, upstream of any vendor encoding;
/// dialect adapters only decide how to embed or parameterize the WKT.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryLiteral {
    pub wkt: String,
    pub srid: i32,
    pub vertex_count: usize,
}

/// A compiled, immutable filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpression {
    Comparison {
        field: ResolvedField,
        op: ComparisonOp,
        value: Literal,
    },
    Logical {
        op: LogicalOp,
        children: Vec<FilterExpression>,
    },
    Spatial {
        op: SpatialOp,
        field: ResolvedField,
        geometry: GeometryLiteral,
    },
    Temporal {
        op: TemporalOp,
        field: ResolvedField,
        interval: TemporalInterval,
    },
    InSet {
        field: ResolvedField,
        values: Vec<Literal>,
    },
    Between {
        field: ResolvedField,
        low: Literal,
        high: Literal,
    },
    IsNull {
        field: ResolvedField,
    },
    /// Feature-id restriction, produced from the `ids` parameter.
    Ids { ids: Vec<String> },
}

impl FilterExpression {
    /// Combine two expressions with AND, flattening nested AND nodes.
    pub fn and(self, other: FilterExpression) -> FilterExpression {
        let mut children = Vec::new();
        for expr in [self, other] {
            match expr {
                FilterExpression::Logical {
                    op: LogicalOp::And,
                    children: mut inner,
                } => children.append(&mut inner),
                other => children.push(other),
            }
        }
        FilterExpression::Logical {
            op: LogicalOp::And,
            children,
        }
    }

    /// Wrap in a NOT node.
    pub fn negated(self) -> FilterExpression {
        FilterExpression::Logical {
            op: LogicalOp::Not,
            children: vec![self],
        }
    }
}

/// Parsed but not yet schema-resolved expression tree.
///
/// Shared output shape of the text and JSON parsers; `resolve` consumes
/// it and produces the public tree above.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawExpr {
    Comparison {
        property: String,
        op: ComparisonOp,
        value: RawLiteral,
    },
    Logical {
        op: LogicalOp,
        children: Vec<RawExpr>,
    },
    Spatial {
        op: SpatialOp,
        property: String,
        wkt: String,
        vertex_count: usize,
    },
    Temporal {
        op: TemporalOp,
        property: String,
        interval: TemporalInterval,
    },
    InSet {
        property: String,
        values: Vec<RawLiteral>,
    },
    Between {
        property: String,
        low: RawLiteral,
        high: RawLiteral,
    },
    IsNull {
        property: String,
    },
}

/// An untyped literal as written in the filter source.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawLiteral {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl RawLiteral {
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            RawLiteral::Int(_) => "integer",
            RawLiteral::Float(_) => "number",
            RawLiteral::Text(_) => "string",
            RawLiteral::Bool(_) => "boolean",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feature_common::FieldType;

    fn name_eq() -> FilterExpression {
        FilterExpression::Comparison {
            field: ResolvedField {
                name: "name".into(),
                column: "name".into(),
                field_type: FieldType::Text,
            },
            op: ComparisonOp::Eq,
            value: Literal::Text("Main St".into()),
        }
    }

    #[test]
    fn test_and_flattens() {
        let ids = FilterExpression::Ids {
            ids: vec!["1".into()],
        };
        let combined = name_eq().and(name_eq()).and(ids);

        match combined {
            FilterExpression::Logical {
                op: LogicalOp::And,
                children,
            } => assert_eq!(children.len(), 3),
            other => panic!("expected AND, got {:?}", other),
        }
    }

    #[test]
    fn test_comparison_op_sql() {
        assert_eq!(ComparisonOp::Neq.sql(), "<>");
        assert_eq!(ComparisonOp::Like.sql(), "LIKE");
    }
}
