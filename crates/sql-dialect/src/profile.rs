//! Vendor capability profiles.
//!
//! One profile per database engine captures every dialect-specific fact
//! the generic builder needs: identifier quoting, placeholder syntax,
//! spatial function naming, pagination idiom, geometry encoding, and the
//! supported spatial predicate set. The builder itself is shared — adding
//! an engine means adding a profile, not a builder.

use cql_filter::SpatialOp;
use feature_common::LayerMetadata;

use crate::params::PlaceholderStyle;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    Postgres,
    Sqlite,
    MySql,
    SqlServer,
    Oracle,
}

impl Vendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Postgres => "postgres",
            Vendor::Sqlite => "sqlite",
            Vendor::MySql => "mysql",
            Vendor::SqlServer => "sqlserver",
            Vendor::Oracle => "oracle",
        }
    }
}

/// How spatial predicates are spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialStyle {
    /// `ST_Intersects(col, geom)` — Postgres/PostGIS, MySQL.
    Prefixed(&'static str),
    /// `Intersects(col, geom)` — SpatiaLite.
    Plain,
    /// `col.STIntersects(geom) = 1` — SQL Server.
    MethodCall,
    /// `SDO_RELATE(col, geom, 'mask=...') = 'TRUE'` — Oracle Spatial.
    SdoRelate,
}

/// Pagination clause idiom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationStyle {
    /// `LIMIT n OFFSET m`
    LimitOffset,
    /// `OFFSET m ROWS FETCH NEXT n ROWS ONLY`
    OffsetFetch,
    /// Legacy `ROWNUM` wrapper subquery.
    RowNum,
}

/// Identifier quoting characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    /// `"name"`
    DoubleQuote,
    /// `` `name` ``
    Backtick,
    /// `[name]`
    Bracket,
}

const ALL_SPATIAL: &[SpatialOp] = &[
    SpatialOp::Intersects,
    SpatialOp::Contains,
    SpatialOp::Within,
    SpatialOp::Touches,
    SpatialOp::Crosses,
    SpatialOp::Overlaps,
    SpatialOp::Disjoint,
    SpatialOp::Equals,
];

// Oracle's SDO_RELATE mask vocabulary has no equivalent for crosses or
// disjoint in the subset we target.
const ORACLE_SPATIAL: &[SpatialOp] = &[
    SpatialOp::Intersects,
    SpatialOp::Contains,
    SpatialOp::Within,
    SpatialOp::Touches,
    SpatialOp::Overlaps,
    SpatialOp::Equals,
];

/// Dialect facts for one database engine.
#[derive(Debug, Clone)]
pub struct VendorProfile {
    pub vendor: Vendor,
    pub placeholder: PlaceholderStyle,
    pub pagination: PaginationStyle,
    pub quote: QuoteStyle,
    pub spatial_style: SpatialStyle,
    /// Spatial predicates this engine can evaluate.
    pub supported_spatial: &'static [SpatialOp],
    /// Whether an index bbox pre-filter is emitted alongside the exact
    /// spatial predicate.
    pub bbox_prefilter: bool,
    /// Whether `(a, b) > (x, y)` row-value comparison is supported for
    /// keyset continuation.
    pub row_value_comparison: bool,
}

impl VendorProfile {
    pub fn postgres() -> Self {
        Self {
            vendor: Vendor::Postgres,
            placeholder: PlaceholderStyle::Dollar,
            pagination: PaginationStyle::LimitOffset,
            quote: QuoteStyle::DoubleQuote,
            spatial_style: SpatialStyle::Prefixed("ST_"),
            supported_spatial: ALL_SPATIAL,
            bbox_prefilter: true,
            row_value_comparison: true,
        }
    }

    pub fn sqlite() -> Self {
        Self {
            vendor: Vendor::Sqlite,
            placeholder: PlaceholderStyle::Question,
            pagination: PaginationStyle::LimitOffset,
            quote: QuoteStyle::DoubleQuote,
            spatial_style: SpatialStyle::Plain,
            supported_spatial: ALL_SPATIAL,
            bbox_prefilter: true,
            row_value_comparison: true,
        }
    }

    pub fn mysql() -> Self {
        Self {
            vendor: Vendor::MySql,
            placeholder: PlaceholderStyle::Question,
            pagination: PaginationStyle::LimitOffset,
            quote: QuoteStyle::Backtick,
            spatial_style: SpatialStyle::Prefixed("ST_"),
            supported_spatial: ALL_SPATIAL,
            bbox_prefilter: true,
            row_value_comparison: false,
        }
    }

    pub fn sql_server() -> Self {
        Self {
            vendor: Vendor::SqlServer,
            placeholder: PlaceholderStyle::AtName,
            pagination: PaginationStyle::OffsetFetch,
            quote: QuoteStyle::Bracket,
            spatial_style: SpatialStyle::MethodCall,
            supported_spatial: ALL_SPATIAL,
            bbox_prefilter: false,
            row_value_comparison: false,
        }
    }

    pub fn oracle() -> Self {
        Self {
            vendor: Vendor::Oracle,
            placeholder: PlaceholderStyle::ColonName,
            pagination: PaginationStyle::RowNum,
            quote: QuoteStyle::DoubleQuote,
            spatial_style: SpatialStyle::SdoRelate,
            supported_spatial: ORACLE_SPATIAL,
            bbox_prefilter: false,
            row_value_comparison: false,
        }
    }

    /// Quote an identifier for this dialect.
    pub fn quote_ident(&self, name: &str) -> String {
        match self.quote {
            QuoteStyle::DoubleQuote => format!("\"{}\"", name.replace('"', "\"\"")),
            QuoteStyle::Backtick => format!("`{}`", name.replace('`', "``")),
            QuoteStyle::Bracket => format!("[{}]", name.replace(']', "]]")),
        }
    }

    /// Schema-qualified, quoted table reference.
    pub fn qualified_table(&self, layer: &LayerMetadata) -> String {
        match &layer.schema {
            Some(schema) => format!(
                "{}.{}",
                self.quote_ident(schema),
                self.quote_ident(&layer.table)
            ),
            None => self.quote_ident(&layer.table),
        }
    }

    /// Expression decoding a WKT placeholder into the engine's native
    /// geometry type.
    pub fn geometry_decode(&self, placeholder: &str, srid: i32) -> String {
        match self.vendor {
            Vendor::Postgres => format!("ST_GeomFromText({}, {})", placeholder, srid),
            Vendor::Sqlite => format!("GeomFromText({}, {})", placeholder, srid),
            Vendor::MySql => format!("ST_GeomFromText({}, {})", placeholder, srid),
            Vendor::SqlServer => format!("geometry::STGeomFromText({}, {})", placeholder, srid),
            Vendor::Oracle => format!("SDO_GEOMETRY({}, {})", placeholder, srid),
        }
    }

    /// Expression projecting a geometry column as text/GeoJSON instead of
    /// raw binary.
    pub fn geometry_output(&self, quoted_column: &str) -> String {
        match self.vendor {
            Vendor::Postgres | Vendor::MySql => format!("ST_AsGeoJSON({})", quoted_column),
            Vendor::Sqlite => format!("AsGeoJSON({})", quoted_column),
            Vendor::SqlServer => format!("{}.STAsText()", quoted_column),
            Vendor::Oracle => format!("SDO_UTIL.TO_WKTGEOMETRY({})", quoted_column),
        }
    }

    /// Whether this engine supports a spatial predicate.
    pub fn supports_spatial(&self, op: SpatialOp) -> bool {
        self.supported_spatial.contains(&op)
    }

    /// Catalog-statistics row estimate query, when the engine has one.
    ///
    /// Table identifiers come from trusted layer metadata, never from
    /// request input.
    pub fn count_estimate_sql(&self, layer: &LayerMetadata) -> Option<String> {
        match self.vendor {
            Vendor::Postgres => Some(format!(
                "SELECT reltuples::bigint FROM pg_class WHERE oid = '{}'::regclass",
                match &layer.schema {
                    Some(schema) => format!("{}.{}", schema, layer.table),
                    None => layer.table.clone(),
                }
            )),
            Vendor::MySql => Some(format!(
                "SELECT table_rows FROM information_schema.tables WHERE table_name = '{}'",
                layer.table
            )),
            Vendor::SqlServer => Some(format!(
                "SELECT SUM(row_count) FROM sys.dm_db_partition_stats \
                 WHERE object_id = OBJECT_ID('{}') AND index_id IN (0, 1)",
                layer.table
            )),
            Vendor::Oracle => Some(format!(
                "SELECT num_rows FROM all_tables WHERE table_name = '{}'",
                layer.table.to_uppercase()
            )),
            Vendor::Sqlite => None,
        }
    }
}
