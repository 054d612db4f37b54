//! Aggregate expression building.
//!
//! Aggregate syntax is dialect-invariant; only identifier quoting varies,
//! so a single renderer serves every vendor profile.

use feature_common::{FeatureError, FeatureResult, FieldType, LayerMetadata};

use crate::profile::VendorProfile;

/// Supported aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregateFunction {
    pub fn sql_name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Avg => "AVG",
        }
    }
}

/// One aggregate output column.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpr {
    pub function: AggregateFunction,
    /// Aggregated field; `None` only for `COUNT(*)`.
    pub field: Option<String>,
    /// Output column alias.
    pub alias: String,
}

impl AggregateExpr {
    /// `COUNT(*) AS alias`.
    pub fn count_all(alias: impl Into<String>) -> Self {
        Self {
            function: AggregateFunction::Count,
            field: None,
            alias: alias.into(),
        }
    }

    pub fn new(
        function: AggregateFunction,
        field: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            function,
            field: Some(field.into()),
            alias: alias.into(),
        }
    }
}

/// Render one aggregate expression, validating the field against the
/// layer schema.
pub fn render(
    profile: &VendorProfile,
    layer: &LayerMetadata,
    expr: &AggregateExpr,
) -> FeatureResult<String> {
    let operand = match &expr.field {
        None => {
            if expr.function != AggregateFunction::Count {
                return Err(FeatureError::invalid_parameter(
                    "outStatistics",
                    format!("{} requires a field", expr.function.sql_name()),
                ));
            }
            "*".to_string()
        }
        Some(name) => {
            let def = layer.field(name).ok_or_else(|| {
                FeatureError::invalid_parameter(
                    "outStatistics",
                    format!("unknown field '{}'", name),
                )
            })?;
            if def.field_type == FieldType::Geometry {
                return Err(FeatureError::invalid_parameter(
                    "outStatistics",
                    format!("cannot aggregate geometry field '{}'", name),
                ));
            }
            profile.quote_ident(&def.column)
        }
    };

    Ok(format!(
        "{}({}) AS {}",
        expr.function.sql_name(),
        operand,
        profile.quote_ident(&expr.alias)
    ))
}
