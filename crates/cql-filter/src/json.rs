//! Decoder for the CQL2 JSON dialect.
//!
//! Decodes `{"op": ..., "args": [...]}` trees into the same raw
//! expression shape the text parser produces, so everything downstream is
//! dialect-agnostic.

use serde_json::Value;

use feature_common::TemporalInterval;

use crate::ast::{ComparisonOp, LogicalOp, RawExpr, RawLiteral, SpatialOp, TemporalOp};
use crate::geometry::{self, GeometryError};

/// Parse a CQL2 JSON filter into the raw expression tree.
pub(crate) fn parse_json(input: &str) -> Result<RawExpr, JsonParseError> {
    let value: Value = serde_json::from_str(input)?;
    decode(&value)
}

fn decode(value: &Value) -> Result<RawExpr, JsonParseError> {
    let obj = value
        .as_object()
        .ok_or(JsonParseError::NotAnObject)?;
    let op = obj
        .get("op")
        .and_then(Value::as_str)
        .ok_or(JsonParseError::MissingOp)?;
    let args = obj
        .get("args")
        .and_then(Value::as_array)
        .ok_or_else(|| JsonParseError::bad_args(op, "missing 'args' array"))?;

    match op {
        "and" | "or" => {
            if args.len() < 2 {
                return Err(JsonParseError::bad_args(op, "needs at least two operands"));
            }
            let children: Vec<RawExpr> = args.iter().map(decode).collect::<Result<_, _>>()?;
            let logical = if op == "and" {
                LogicalOp::And
            } else {
                LogicalOp::Or
            };
            Ok(RawExpr::Logical {
                op: logical,
                children,
            })
        }

        "not" => {
            if args.len() != 1 {
                return Err(JsonParseError::bad_args(op, "needs exactly one operand"));
            }
            Ok(RawExpr::Logical {
                op: LogicalOp::Not,
                children: vec![decode(&args[0])?],
            })
        }

        "=" | "<>" | "<" | "<=" | ">" | ">=" | "like" => {
            let (property, rest) = take_property(op, args)?;
            if rest.len() != 1 {
                return Err(JsonParseError::bad_args(op, "needs a property and a value"));
            }
            let cmp = match op {
                "=" => ComparisonOp::Eq,
                "<>" => ComparisonOp::Neq,
                "<" => ComparisonOp::Lt,
                "<=" => ComparisonOp::Lte,
                ">" => ComparisonOp::Gt,
                ">=" => ComparisonOp::Gte,
                "like" => ComparisonOp::Like,
                _ => unreachable!("op matched above"),
            };
            Ok(RawExpr::Comparison {
                property,
                op: cmp,
                value: decode_literal(op, &rest[0])?,
            })
        }

        "in" => {
            let (property, rest) = take_property(op, args)?;
            if rest.len() != 1 {
                return Err(JsonParseError::bad_args(op, "needs a property and a list"));
            }
            let list = rest[0]
                .as_array()
                .ok_or_else(|| JsonParseError::bad_args(op, "second operand must be a list"))?;
            if list.is_empty() {
                return Err(JsonParseError::bad_args(op, "list must not be empty"));
            }
            let values = list
                .iter()
                .map(|v| decode_literal(op, v))
                .collect::<Result<_, _>>()?;
            Ok(RawExpr::InSet { property, values })
        }

        "between" => {
            let (property, rest) = take_property(op, args)?;
            if rest.len() != 2 {
                return Err(JsonParseError::bad_args(op, "needs a property and two bounds"));
            }
            Ok(RawExpr::Between {
                property,
                low: decode_literal(op, &rest[0])?,
                high: decode_literal(op, &rest[1])?,
            })
        }

        "isNull" => {
            let (property, rest) = take_property(op, args)?;
            if !rest.is_empty() {
                return Err(JsonParseError::bad_args(op, "takes only a property"));
            }
            Ok(RawExpr::IsNull { property })
        }

        "s_intersects" | "s_contains" | "s_within" | "s_touches" | "s_crosses"
        | "s_overlaps" | "s_disjoint" | "s_equals" => {
            let (property, rest) = take_property(op, args)?;
            if rest.len() != 1 {
                return Err(JsonParseError::bad_args(op, "needs a property and a geometry"));
            }
            let spatial = match op {
                "s_intersects" => SpatialOp::Intersects,
                "s_contains" => SpatialOp::Contains,
                "s_within" => SpatialOp::Within,
                "s_touches" => SpatialOp::Touches,
                "s_crosses" => SpatialOp::Crosses,
                "s_overlaps" => SpatialOp::Overlaps,
                "s_disjoint" => SpatialOp::Disjoint,
                "s_equals" => SpatialOp::Equals,
                _ => unreachable!("op matched above"),
            };
            let parsed = geometry::from_geojson(&rest[0])?;
            Ok(RawExpr::Spatial {
                op: spatial,
                property,
                wkt: parsed.wkt,
                vertex_count: parsed.vertex_count,
            })
        }

        "t_before" | "t_after" | "t_during" => {
            let (property, rest) = take_property(op, args)?;
            if rest.len() != 1 {
                return Err(JsonParseError::bad_args(op, "needs a property and an operand"));
            }
            let temporal = match op {
                "t_before" => TemporalOp::Before,
                "t_after" => TemporalOp::After,
                "t_during" => TemporalOp::During,
                _ => unreachable!("op matched above"),
            };
            let interval = decode_temporal(op, &rest[0])?;
            Ok(RawExpr::Temporal {
                op: temporal,
                property,
                interval,
            })
        }

        other => Err(JsonParseError::UnknownOp(other.to_string())),
    }
}

/// The first argument must be a `{"property": name}` reference.
fn take_property<'a>(
    op: &str,
    args: &'a [Value],
) -> Result<(String, &'a [Value]), JsonParseError> {
    let first = args
        .first()
        .ok_or_else(|| JsonParseError::bad_args(op, "missing property operand"))?;
    let property = first
        .as_object()
        .and_then(|o| o.get("property"))
        .and_then(Value::as_str)
        .ok_or_else(|| JsonParseError::bad_args(op, "first operand must be a property reference"))?;
    Ok((property.to_string(), &args[1..]))
}

fn decode_literal(op: &str, value: &Value) -> Result<RawLiteral, JsonParseError> {
    match value {
        Value::String(s) => Ok(RawLiteral::Text(s.clone())),
        Value::Bool(b) => Ok(RawLiteral::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(RawLiteral::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(RawLiteral::Float(f))
            } else {
                Err(JsonParseError::bad_args(op, "numeric literal out of range"))
            }
        }
        Value::Object(obj) => {
            // CQL2 wraps temporal literals: {"timestamp": "..."} / {"date": "..."}.
            for key in ["timestamp", "date"] {
                if let Some(Value::String(s)) = obj.get(key) {
                    return Ok(RawLiteral::Text(s.clone()));
                }
            }
            Err(JsonParseError::bad_args(op, "unsupported literal object"))
        }
        _ => Err(JsonParseError::bad_args(op, "unsupported literal")),
    }
}

fn decode_temporal(op: &str, value: &Value) -> Result<TemporalInterval, JsonParseError> {
    // {"interval": ["start", "end"]} with ".." for open sides, or a plain
    // instant (optionally wrapped as {"timestamp": ...}).
    if let Some(interval) = value.as_object().and_then(|o| o.get("interval")) {
        let sides = interval
            .as_array()
            .filter(|a| a.len() == 2)
            .ok_or_else(|| JsonParseError::bad_args(op, "interval must have two sides"))?;
        let raw: Vec<&str> = sides
            .iter()
            .map(|s| {
                s.as_str()
                    .ok_or_else(|| JsonParseError::bad_args(op, "interval sides must be strings"))
            })
            .collect::<Result<_, _>>()?;
        return TemporalInterval::from_query_string(&format!("{}/{}", raw[0], raw[1]))
            .map_err(|e| JsonParseError::Temporal(e.to_string()));
    }

    let instant = match value {
        Value::String(s) => s.as_str(),
        Value::Object(obj) => obj
            .get("timestamp")
            .or_else(|| obj.get("date"))
            .and_then(Value::as_str)
            .ok_or_else(|| JsonParseError::bad_args(op, "unsupported temporal operand"))?,
        _ => return Err(JsonParseError::bad_args(op, "unsupported temporal operand")),
    };
    TemporalInterval::from_query_string(instant)
        .map_err(|e| JsonParseError::Temporal(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum JsonParseError {
    #[error("Filter is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Filter node must be an object")]
    NotAnObject,

    #[error("Filter node missing 'op'")]
    MissingOp,

    #[error("Unknown filter operator: {0}")]
    UnknownOp(String),

    #[error("Invalid arguments for '{op}': {reason}")]
    BadArgs { op: String, reason: String },

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error("Invalid temporal operand: {0}")]
    Temporal(String),
}

impl JsonParseError {
    fn bad_args(op: &str, reason: impl Into<String>) -> Self {
        JsonParseError::BadArgs {
            op: op.to_string(),
            reason: reason.into(),
        }
    }
}
