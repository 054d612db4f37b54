//! Vendor-neutral SQL generation.
//!
//! One generic [`QueryBuilder`] assembles parameterized SQL (projection,
//! WHERE, ORDER BY, pagination, aggregates) from a [`FeatureQuery`] and a
//! compiled filter tree; every dialect-specific fact lives in a
//! [`VendorProfile`] strategy value. Supported engines: Postgres/PostGIS,
//! SQLite/SpatiaLite, MySQL, SQL Server, Oracle.

pub mod aggregate;
pub mod builder;
pub mod params;
pub mod profile;
mod spatial;

pub use aggregate::{AggregateExpr, AggregateFunction};
pub use builder::{BuiltQuery, KeysetCursor, QueryBuilder, MAX_SQL_LIMIT};
pub use params::{ParamList, PlaceholderStyle, SqlParam};
pub use profile::{PaginationStyle, QuoteStyle, SpatialStyle, Vendor, VendorProfile};
