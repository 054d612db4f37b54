//! Shared types for the feature query compiler.
//!
//! This crate holds the value types every other crate in the workspace
//! consumes: bounding boxes, CRS identifiers, temporal intervals, layer
//! metadata, service limits, and the error taxonomy with its wire
//! exception payload.

pub mod bbox;
pub mod config;
pub mod crs;
pub mod error;
pub mod layer;
pub mod time;

pub use bbox::{BoundingBox, BboxParseError};
pub use config::ServiceLimits;
pub use crs::{AxisOrder, Crs, CrsParseError};
pub use error::{DbErrorClass, ExceptionDocument, FeatureError, FeatureResult};
pub use layer::{FieldDef, FieldType, LayerMetadata};
pub use time::{parse_instant, TemporalInterval, TimeParseError};

impl From<BboxParseError> for FeatureError {
    fn from(err: BboxParseError) -> Self {
        FeatureError::InvalidBbox(err.to_string())
    }
}

impl From<TimeParseError> for FeatureError {
    fn from(err: TimeParseError) -> Self {
        FeatureError::InvalidDatetime(err.to_string())
    }
}

impl From<CrsParseError> for FeatureError {
    fn from(err: CrsParseError) -> Self {
        FeatureError::InvalidCrs(err.to_string())
    }
}
