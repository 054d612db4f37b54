//! The canonical, protocol-neutral feature query.

use cql_filter::FilterExpression;
use feature_common::{BoundingBox, Crs, TemporalInterval};

/// Whether features are materialized or only counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultType {
    /// Return feature rows (the default).
    #[default]
    Results,
    /// Return only the match count; no rows are fetched.
    Hits,
}

impl ResultType {
    /// Parse a `resultType` parameter value.
    pub fn from_param(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "results" => Some(ResultType::Results),
            "hits" => Some(ResultType::Hits),
            _ => None,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// One resolved sort key.
///
/// The field has already been checked against the schema; it is never the
/// geometry field.
#[derive(Debug, Clone, PartialEq)]
pub struct SortOrder {
    /// Exposed property name.
    pub field: String,
    /// Physical column name.
    pub column: String,
    pub direction: SortDirection,
}

/// The canonical query produced by the validator.
///
/// Created once per request and treated as immutable for its lifetime;
/// the compiler pipeline only ever reads it.
#[derive(Debug, Clone)]
pub struct FeatureQuery {
    /// Effective page size, already clamped to `[1, max_allowed]`.
    pub limit: u32,

    /// Number of rows to skip.
    pub offset: u64,

    /// Spatial filter window, in internal X/Y order.
    pub bbox: Option<BoundingBox>,

    /// Temporal filter window.
    pub temporal: Option<TemporalInterval>,

    pub result_type: ResultType,

    /// Projection; `None` means all properties.
    pub property_names: Option<Vec<String>>,

    /// Resolved sort keys; `None` means unsorted.
    pub sort_orders: Option<Vec<SortOrder>>,

    /// Compiled filter (the `filter` and `ids` parameters fused).
    pub filter: Option<FilterExpression>,

    /// CRS for returned geometries.
    pub crs: Crs,
}
