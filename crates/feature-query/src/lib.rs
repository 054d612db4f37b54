//! Query parameter validation for the feature query compiler.
//!
//! Protocol adapters map their own parameter names onto the fixed surface
//! accepted here (`limit`, `bbox`, `datetime`, `filter`, ...); this crate
//! validates that surface against a layer's metadata and produces the
//! canonical, protocol-neutral [`FeatureQuery`] consumed by the SQL
//! builder.

pub mod negotiate;
pub mod query;
pub mod validator;

pub use negotiate::{negotiate_accept_crs, resolve_crs, supported_crs};
pub use query::{FeatureQuery, ResultType, SortDirection, SortOrder};
pub use validator::{QueryValidator, ALLOWED_PARAMS};
