//! Coordinate Reference System identifiers.
//!
//! CRS identifiers arrive in several wire forms (`EPSG:4326`,
//! `http://www.opengis.net/def/crs/EPSG/0/4326`,
//! `urn:ogc:def:crs:EPSG::4326`, `CRS84`). They are normalized here once;
//! everything downstream compares authority/code pairs and asks for the
//! axis order, never re-parses strings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis order for coordinate interpretation on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisOrder {
    /// X (longitude/easting), Y (latitude/northing)
    XY,
    /// Y (latitude/northing), X (longitude/easting)
    LatLon,
}

/// A parsed CRS identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crs {
    /// Identifier exactly as supplied by the client.
    raw: String,
    /// Authority, uppercased ("EPSG", "OGC").
    authority: String,
    /// Code within the authority, uppercased ("4326", "CRS84").
    code: String,
    /// Whether the identifier was given in URI or URN form.
    ///
    /// The authority-mandated axis order only applies to the full forms;
    /// the legacy `EPSG:4326` shorthand is interpreted as X/Y.
    uri_form: bool,
}

impl Crs {
    /// The default CRS: WGS84 longitude/latitude (CRS84).
    pub fn default_crs() -> Self {
        Self::parse("http://www.opengis.net/def/crs/OGC/1.3/CRS84")
            .expect("builtin CRS84 identifier parses")
    }

    /// Parse a CRS identifier in any supported wire form.
    pub fn parse(s: &str) -> Result<Self, CrsParseError> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(CrsParseError::Empty);
        }

        if raw.starts_with("http://") || raw.starts_with("https://") {
            // http://www.opengis.net/def/crs/{authority}/{version}/{code}
            let segments: Vec<&str> = raw.split('/').filter(|p| !p.is_empty()).collect();
            if segments.len() < 3 {
                return Err(CrsParseError::Malformed(raw.to_string()));
            }
            let code = segments[segments.len() - 1];
            let authority = segments[segments.len() - 3];
            return Self::from_parts(raw, authority, code, true);
        }

        if raw.to_ascii_lowercase().starts_with("urn:") {
            // urn:ogc:def:crs:{authority}:{version}:{code}
            let segments: Vec<&str> = raw.split(':').collect();
            if segments.len() < 5 {
                return Err(CrsParseError::Malformed(raw.to_string()));
            }
            let authority = segments[4];
            let code = segments[segments.len() - 1];
            return Self::from_parts(raw, authority, code, true);
        }

        if let Some((authority, code)) = raw.split_once(':') {
            return Self::from_parts(raw, authority, code, false);
        }

        if raw.eq_ignore_ascii_case("CRS84") {
            return Self::from_parts(raw, "OGC", "CRS84", false);
        }

        Err(CrsParseError::Malformed(raw.to_string()))
    }

    fn from_parts(
        raw: &str,
        authority: &str,
        code: &str,
        uri_form: bool,
    ) -> Result<Self, CrsParseError> {
        if authority.is_empty() || code.is_empty() {
            return Err(CrsParseError::Malformed(raw.to_string()));
        }
        Ok(Self {
            raw: raw.to_string(),
            authority: authority.to_ascii_uppercase(),
            code: code.to_ascii_uppercase(),
            uri_form,
        })
    }

    /// The numeric SRID for database geometry literals.
    pub fn srid(&self) -> Option<i32> {
        match (self.authority.as_str(), self.code.as_str()) {
            ("OGC", "CRS84") => Some(4326),
            ("OGC", "CRS83") => Some(4269),
            _ => self.code.parse().ok(),
        }
    }

    /// Axis order mandated for this identifier on the wire.
    ///
    /// EPSG geographic codes in URI/URN form are latitude-first; the
    /// shorthand forms and CRS84 stay longitude-first.
    pub fn axis_order(&self) -> AxisOrder {
        if self.uri_form
            && self.authority == "EPSG"
            && matches!(self.code.as_str(), "4326" | "4269")
        {
            AxisOrder::LatLon
        } else {
            AxisOrder::XY
        }
    }

    /// Whether two identifiers name the same CRS, regardless of wire form.
    pub fn equivalent(&self, other: &Crs) -> bool {
        self.authority == other.authority && self.code == other.code
    }

    /// Canonical URI form, for the Content-Crs response header.
    pub fn uri(&self) -> String {
        if self.authority == "OGC" {
            format!("http://www.opengis.net/def/crs/OGC/1.3/{}", self.code)
        } else {
            format!(
                "http://www.opengis.net/def/crs/{}/0/{}",
                self.authority, self.code
            )
        }
    }

    /// The identifier as supplied by the client.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for Crs {
    fn eq(&self, other: &Self) -> bool {
        self.equivalent(other)
    }
}

impl Eq for Crs {}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::default_crs()
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CrsParseError {
    #[error("Empty CRS identifier")]
    Empty,

    #[error("Unrecognized CRS identifier: {0}")]
    Malformed(String),
}
