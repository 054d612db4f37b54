//! Bounding box parsing and operations.

use serde::{Deserialize, Serialize};

use crate::crs::{AxisOrder, Crs};

/// A geographic or projected bounding box.
///
/// Coordinates are always stored X/east, Y/north internally. Wire-format
/// axis swaps (latitude-first CRS identifiers) are resolved by
/// [`BoundingBox::oriented`] at the parsing boundary, never downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub min_z: Option<f64>,
    pub max_z: Option<f64>,
    pub crs: Option<Crs>,
}

impl BoundingBox {
    /// Create a 2D bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
            min_z: None,
            max_z: None,
            crs: None,
        }
    }

    /// Parse a `bbox` query value: 4 or 6 comma-separated numbers with an
    /// optional trailing CRS token.
    ///
    /// Returns the box in the coordinate order given (X/Y assumed) plus the
    /// trailing CRS token, if any; the caller resolves the token and applies
    /// [`BoundingBox::oriented`].
    pub fn from_query_string(s: &str) -> Result<(Self, Option<String>), BboxParseError> {
        let mut parts: Vec<&str> = s.split(',').map(str::trim).collect();

        let crs_token = match parts.len() {
            5 | 7 => {
                let last = parts.pop().expect("len checked");
                if last.parse::<f64>().is_ok() {
                    // A numeric fifth/seventh token is a wrong coordinate count,
                    // not a CRS.
                    return Err(BboxParseError::WrongArity(parts.len() + 1));
                }
                Some(last.to_string())
            }
            4 | 6 => None,
            n => return Err(BboxParseError::WrongArity(n)),
        };

        let coords: Vec<f64> = parts
            .iter()
            .map(|p| {
                p.parse::<f64>()
                    .map_err(|_| BboxParseError::InvalidNumber(p.to_string()))
            })
            .collect::<Result<_, _>>()?;

        let bbox = if coords.len() == 4 {
            Self::new(coords[0], coords[1], coords[2], coords[3])
        } else {
            Self {
                min_x: coords[0],
                min_y: coords[1],
                min_z: Some(coords[2]),
                max_x: coords[3],
                max_y: coords[4],
                max_z: Some(coords[5]),
                crs: None,
            }
        };

        bbox.validate_ordering()?;
        Ok((bbox, crs_token))
    }

    /// Attach the resolved CRS, swapping into internal X/Y order when the
    /// identifier is latitude-first.
    pub fn oriented(mut self, crs: Crs) -> Self {
        if crs.axis_order() == AxisOrder::LatLon {
            std::mem::swap(&mut self.min_x, &mut self.min_y);
            std::mem::swap(&mut self.max_x, &mut self.max_y);
        }
        self.crs = Some(crs);
        self
    }

    fn validate_ordering(&self) -> Result<(), BboxParseError> {
        // The per-pair constraints are unaffected by an axis swap, so one
        // check before orientation covers both wire orders.
        if self.min_x > self.max_x {
            return Err(BboxParseError::MinExceedsMax {
                axis: "x",
                min: self.min_x,
                max: self.max_x,
            });
        }
        if self.min_y > self.max_y {
            return Err(BboxParseError::MinExceedsMax {
                axis: "y",
                min: self.min_y,
                max: self.max_y,
            });
        }
        if let (Some(min_z), Some(max_z)) = (self.min_z, self.max_z) {
            if min_z > max_z {
                return Err(BboxParseError::MinExceedsMax {
                    axis: "z",
                    min: min_z,
                    max: max_z,
                });
            }
        }
        Ok(())
    }

    /// Check if this bbox intersects another.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// Render as a closed WKT polygon ring, for vendors without a native
    /// envelope constructor.
    pub fn to_wkt_polygon(&self) -> String {
        format!(
            "POLYGON(({minx} {miny}, {maxx} {miny}, {maxx} {maxy}, {minx} {maxy}, {minx} {miny}))",
            minx = self.min_x,
            miny = self.min_y,
            maxx = self.max_x,
            maxy = self.max_y,
        )
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BboxParseError {
    #[error("Expected 4 or 6 coordinates (plus optional CRS token), got {0} values")]
    WrongArity(usize),

    #[error("Invalid number in bbox: {0}")]
    InvalidNumber(String),

    #[error("Bbox min exceeds max on {axis} axis: {min} > {max}")]
    MinExceedsMax {
        axis: &'static str,
        min: f64,
        max: f64,
    },
}
