//! Query execution, pagination and result streaming.
//!
//! The downstream end of the feature query compiler: takes a validated
//! [`feature_query::FeatureQuery`], builds vendor SQL through
//! `sql-dialect`, executes it over a [`FeatureSource`], and exposes
//! bounded pages (`fetch_page` / `fetch_search_page`), streaming rows
//! (`execute`), and counts (`count_only`). Also home to the page token
//! codec, database error classification, the layer metadata snapshot
//! cache, and the incremental GeoJSON writer.

pub mod cache;
pub mod classify;
pub mod executor;
pub mod pagination;
pub mod source;
pub mod stream;

pub use cache::MetadataCache;
pub use classify::{classify_sqlstate, to_feature_error};
pub use executor::{FeatureExecutor, FeaturePage};
pub use pagination::{CountResult, PageToken};
pub use source::{FeatureRow, FeatureSource, PgFeatureSource, RowStream};
pub use stream::{GeoJsonStreamWriter, StreamSummary};
