//! Geometry literal normalization.
//!
//! Filter geometries arrive as WKT (CQL text) or GeoJSON (CQL2 JSON) and
//! are normalized here to one canonical WKT rendering with a vertex
//! count. Everything downstream — the vendor adapters included — sees
//! only the canonical form.

use serde_json::Value;

/// A normalized geometry literal.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedGeometry {
    pub wkt: String,
    pub vertex_count: usize,
}

const WKT_KEYWORDS: &[&str] = &[
    "POINT",
    "LINESTRING",
    "POLYGON",
    "MULTIPOINT",
    "MULTILINESTRING",
    "MULTIPOLYGON",
];

/// Parse and canonicalize a WKT geometry string.
pub(crate) fn parse_wkt(s: &str) -> Result<ParsedGeometry, GeometryError> {
    let mut parser = WktParser::new(s);
    parser.skip_ws();

    let keyword = parser.take_keyword()?;
    let keyword = keyword.to_ascii_uppercase();
    if !WKT_KEYWORDS.contains(&keyword.as_str()) {
        return Err(GeometryError::UnknownType(keyword));
    }

    parser.skip_ws();
    let (body, vertex_count) = parser.parse_group()?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(GeometryError::TrailingInput(parser.rest()));
    }
    if vertex_count == 0 {
        return Err(GeometryError::Empty);
    }

    Ok(ParsedGeometry {
        wkt: format!("{}{}", keyword, body),
        vertex_count,
    })
}

/// Convert a GeoJSON geometry object to canonical WKT.
pub(crate) fn from_geojson(value: &Value) -> Result<ParsedGeometry, GeometryError> {
    let obj = value
        .as_object()
        .ok_or_else(|| GeometryError::Malformed("geometry must be an object".into()))?;
    let geom_type = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| GeometryError::Malformed("geometry missing 'type'".into()))?;
    let coords = obj
        .get("coordinates")
        .ok_or_else(|| GeometryError::Malformed("geometry missing 'coordinates'".into()))?;

    let mut count = 0usize;
    let body = match geom_type {
        "Point" => position(coords, &mut count)?,
        "LineString" => position_list(coords, &mut count)?,
        "Polygon" => ring_list(coords, &mut count)?,
        "MultiPoint" => position_list(coords, &mut count)?,
        "MultiLineString" => ring_list(coords, &mut count)?,
        "MultiPolygon" => {
            let arr = as_array(coords)?;
            let polys: Vec<String> = arr
                .iter()
                .map(|p| ring_list(p, &mut count))
                .collect::<Result<_, _>>()?;
            format!("({})", polys.join(", "))
        }
        other => return Err(GeometryError::UnknownType(other.to_string())),
    };

    if count == 0 {
        return Err(GeometryError::Empty);
    }

    let keyword = match geom_type {
        "Point" => "POINT",
        "LineString" => "LINESTRING",
        "Polygon" => "POLYGON",
        "MultiPoint" => "MULTIPOINT",
        "MultiLineString" => "MULTILINESTRING",
        "MultiPolygon" => "MULTIPOLYGON",
        _ => unreachable!("type matched above"),
    };

    // Every body already carries its outer parentheses.
    Ok(ParsedGeometry {
        wkt: format!("{}{}", keyword, body),
        vertex_count: count,
    })
}

fn as_array(v: &Value) -> Result<&Vec<Value>, GeometryError> {
    v.as_array()
        .ok_or_else(|| GeometryError::Malformed("expected coordinate array".into()))
}

/// `[x, y]` or `[x, y, z]` → `x y` / `x y z`, wrapped for Point bodies.
fn position(v: &Value, count: &mut usize) -> Result<String, GeometryError> {
    let arr = as_array(v)?;
    if arr.len() < 2 || arr.len() > 3 {
        return Err(GeometryError::Malformed(format!(
            "position must have 2 or 3 components, got {}",
            arr.len()
        )));
    }
    let nums: Vec<String> = arr
        .iter()
        .map(|n| {
            n.as_f64()
                .map(fmt_number)
                .ok_or_else(|| GeometryError::Malformed("non-numeric coordinate".into()))
        })
        .collect::<Result<_, _>>()?;
    *count += 1;
    Ok(format!("({})", nums.join(" ")))
}

fn position_list(v: &Value, count: &mut usize) -> Result<String, GeometryError> {
    let arr = as_array(v)?;
    let coords: Vec<String> = arr
        .iter()
        .map(|p| {
            // position() wraps in parens for the Point case; strip here.
            position(p, count).map(|s| s[1..s.len() - 1].to_string())
        })
        .collect::<Result<_, _>>()?;
    Ok(format!("({})", coords.join(", ")))
}

fn ring_list(v: &Value, count: &mut usize) -> Result<String, GeometryError> {
    let arr = as_array(v)?;
    let rings: Vec<String> = arr
        .iter()
        .map(|r| position_list(r, count))
        .collect::<Result<_, _>>()?;
    Ok(format!("({})", rings.join(", ")))
}

/// Canonical number rendering: integral values print without a decimal
/// point, which keeps repeated compilations byte-identical.
fn fmt_number(n: f64) -> String {
    format!("{}", n)
}

/// Character-level WKT parser. Pragmatic: validates structure and counts
/// vertices while re-emitting the canonical text.
struct WktParser {
    chars: Vec<char>,
    pos: usize,
}

impl WktParser {
    fn new(s: &str) -> Self {
        Self {
            chars: s.chars().collect(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn rest(&self) -> String {
        self.chars[self.pos..].iter().collect()
    }

    fn take_keyword(&mut self) -> Result<String, GeometryError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(GeometryError::Malformed("expected geometry keyword".into()));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    /// Parse a parenthesized group: either nested groups or a coordinate
    /// sequence. Returns the canonical rendering and the vertex count.
    fn parse_group(&mut self) -> Result<(String, usize), GeometryError> {
        if self.bump() != Some('(') {
            return Err(GeometryError::Malformed("expected '('".into()));
        }
        self.skip_ws();

        let mut parts = Vec::new();
        let mut count = 0usize;

        if self.peek() == Some('(') {
            // Nested groups: rings, polygons, multi-part members.
            loop {
                let (inner, n) = self.parse_group()?;
                parts.push(inner);
                count += n;
                self.skip_ws();
                match self.bump() {
                    Some(',') => self.skip_ws(),
                    Some(')') => break,
                    _ => return Err(GeometryError::Malformed("expected ',' or ')'".into())),
                }
            }
        } else {
            // Coordinate sequence.
            loop {
                let coord = self.parse_coord()?;
                parts.push(coord);
                count += 1;
                self.skip_ws();
                match self.bump() {
                    Some(',') => self.skip_ws(),
                    Some(')') => break,
                    _ => return Err(GeometryError::Malformed("expected ',' or ')'".into())),
                }
            }
        }

        Ok((format!("({})", parts.join(", ")), count))
    }

    /// One coordinate: 2 or 3 whitespace-separated numbers.
    fn parse_coord(&mut self) -> Result<String, GeometryError> {
        let mut nums = Vec::new();
        loop {
            nums.push(self.parse_number()?);
            self.skip_ws();
            // The separator (',' or ')') is left for the caller.
            match self.peek() {
                Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => continue,
                _ => break,
            }
        }
        if nums.len() < 2 || nums.len() > 3 {
            return Err(GeometryError::Malformed(format!(
                "coordinate must have 2 or 3 components, got {}",
                nums.len()
            )));
        }
        Ok(nums.join(" "))
    }

    fn parse_number(&mut self) -> Result<String, GeometryError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E')
        {
            // Allow a sign right after an exponent marker.
            if matches!(self.peek(), Some('e') | Some('E')) {
                self.pos += 1;
                if matches!(self.peek(), Some('-') | Some('+')) {
                    self.pos += 1;
                }
            } else {
                self.pos += 1;
            }
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        let value: f64 = raw
            .parse()
            .map_err(|_| GeometryError::Malformed(format!("invalid number '{}'", raw)))?;
        Ok(fmt_number(value))
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub(crate) enum GeometryError {
    #[error("Unknown geometry type: {0}")]
    UnknownType(String),

    #[error("Malformed geometry: {0}")]
    Malformed(String),

    #[error("Empty geometry")]
    Empty,

    #[error("Trailing input after geometry: {0}")]
    TrailingInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_point() {
        let g = parse_wkt("POINT(10 20)").unwrap();
        assert_eq!(g.wkt, "POINT(10 20)");
        assert_eq!(g.vertex_count, 1);
    }

    #[test]
    fn test_canonicalizes_whitespace_and_case() {
        let g = parse_wkt("polygon ( ( 0 0 , 10 0,10 10, 0 10 ,0 0 ) )").unwrap();
        assert_eq!(g.wkt, "POLYGON((0 0, 10 0, 10 10, 0 10, 0 0))");
        assert_eq!(g.vertex_count, 5);
    }

    #[test]
    fn test_multipolygon_vertex_count() {
        let g = parse_wkt("MULTIPOLYGON(((0 0, 1 0, 1 1, 0 0)), ((5 5, 6 5, 6 6, 5 5)))").unwrap();
        assert_eq!(g.vertex_count, 8);
    }

    #[test]
    fn test_reject_unknown_keyword() {
        assert!(matches!(
            parse_wkt("CIRCLE(0 0, 5)"),
            Err(GeometryError::UnknownType(_))
        ));
    }

    #[test]
    fn test_reject_trailing_garbage() {
        assert!(matches!(
            parse_wkt("POINT(1 2) extra"),
            Err(GeometryError::TrailingInput(_))
        ));
    }

    #[test]
    fn test_reject_single_component_coord() {
        assert!(parse_wkt("POINT(1)").is_err());
    }

    #[test]
    fn test_geojson_point() {
        let g = from_geojson(&json!({"type": "Point", "coordinates": [10.5, 20.0]})).unwrap();
        assert_eq!(g.wkt, "POINT(10.5 20)");
        assert_eq!(g.vertex_count, 1);
    }

    #[test]
    fn test_geojson_polygon() {
        let g = from_geojson(&json!({
            "type": "Polygon",
            "coordinates": [[[0, 0], [10, 0], [10, 10], [0, 0]]]
        }))
        .unwrap();
        assert_eq!(g.wkt, "POLYGON((0 0, 10 0, 10 10, 0 0))");
        assert_eq!(g.vertex_count, 4);
    }

    #[test]
    fn test_geojson_matches_wkt_canonical_form() {
        let from_json = from_geojson(&json!({
            "type": "LineString",
            "coordinates": [[0, 0], [5, 5]]
        }))
        .unwrap();
        let from_text = parse_wkt("LINESTRING ( 0 0 , 5 5 )").unwrap();
        assert_eq!(from_json.wkt, from_text.wkt);
    }

    #[test]
    fn test_geojson_rejects_missing_type() {
        assert!(from_geojson(&json!({"coordinates": [1, 2]})).is_err());
    }
}
