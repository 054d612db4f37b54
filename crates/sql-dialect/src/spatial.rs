//! Spatial predicate translation.
//!
//! Maps tree-level spatial predicates onto a vendor's SQL spelling. The
//! geometry literal is already normalized WKT; this module only decides
//! how each engine decodes, reprojects, and names things.

use cql_filter::{GeometryLiteral, SpatialOp};
use feature_common::{BoundingBox, FeatureError, FeatureResult};

use crate::params::{ParamList, SqlParam};
use crate::profile::{SpatialStyle, Vendor, VendorProfile};

/// Render a spatial predicate for one vendor.
pub(crate) fn spatial_predicate(
    profile: &VendorProfile,
    op: SpatialOp,
    quoted_column: &str,
    geometry: &GeometryLiteral,
    layer_srid: i32,
    params: &mut ParamList,
) -> FeatureResult<String> {
    if !profile.supports_spatial(op) {
        return Err(FeatureError::OperationNotSupported(format!(
            "spatial predicate {} is not available on {}",
            op.base_name(),
            profile.vendor.as_str()
        )));
    }

    let geom_expr = geometry_value_expr(profile, geometry, layer_srid, params)?;

    let sql = match profile.spatial_style {
        SpatialStyle::Prefixed(prefix) => format!(
            "{}{}({}, {})",
            prefix,
            op.base_name(),
            quoted_column,
            geom_expr
        ),
        SpatialStyle::Plain => format!("{}({}, {})", op.base_name(), quoted_column, geom_expr),
        SpatialStyle::MethodCall => format!(
            "{}.ST{}({}) = 1",
            quoted_column,
            op.base_name(),
            geom_expr
        ),
        SpatialStyle::SdoRelate => format!(
            "SDO_RELATE({}, {}, 'mask={}') = 'TRUE'",
            quoted_column,
            geom_expr,
            sdo_mask(op)
        ),
    };

    Ok(sql)
}

/// Decode a WKT parameter into the engine's geometry type, reprojecting
/// to the storage SRID when the literal was given in another CRS.
pub(crate) fn geometry_value_expr(
    profile: &VendorProfile,
    geometry: &GeometryLiteral,
    layer_srid: i32,
    params: &mut ParamList,
) -> FeatureResult<String> {
    let placeholder = params.push(SqlParam::Geometry(geometry.wkt.clone()));
    let decoded = profile.geometry_decode(&placeholder, geometry.srid);

    if geometry.srid == layer_srid {
        return Ok(decoded);
    }

    geometry_transform(profile, &decoded, layer_srid).ok_or_else(|| {
        FeatureError::OperationNotSupported(format!(
            "{} cannot reproject filter geometry from SRID {} to {}",
            profile.vendor.as_str(),
            geometry.srid,
            layer_srid
        ))
    })
}

fn geometry_transform(profile: &VendorProfile, expr: &str, srid: i32) -> Option<String> {
    match profile.vendor {
        Vendor::Postgres | Vendor::MySql => Some(format!("ST_Transform({}, {})", expr, srid)),
        Vendor::Sqlite => Some(format!("Transform({}, {})", expr, srid)),
        Vendor::Oracle => Some(format!("SDO_CS.TRANSFORM({}, {})", expr, srid)),
        Vendor::SqlServer => None,
    }
}

/// Render the bbox condition: the exact intersects predicate, preceded by
/// the vendor's cheap index pre-filter when it has one.
pub(crate) fn bbox_condition(
    profile: &VendorProfile,
    quoted_column: &str,
    bbox: &BoundingBox,
    layer_srid: i32,
    params: &mut ParamList,
) -> FeatureResult<String> {
    let bbox_srid = bbox
        .crs
        .as_ref()
        .and_then(|c| c.srid())
        .unwrap_or(layer_srid);

    let prefilter = if profile.bbox_prefilter {
        Some(envelope_prefilter(
            profile,
            quoted_column,
            bbox,
            bbox_srid,
            layer_srid,
            params,
        )?)
    } else {
        None
    };

    let envelope = GeometryLiteral {
        wkt: bbox.to_wkt_polygon(),
        srid: bbox_srid,
        vertex_count: 5,
    };
    let exact = spatial_predicate(
        profile,
        SpatialOp::Intersects,
        quoted_column,
        &envelope,
        layer_srid,
        params,
    )?;

    Ok(match prefilter {
        Some(pre) => format!("({} AND {})", pre, exact),
        None => exact,
    })
}

fn envelope_prefilter(
    profile: &VendorProfile,
    quoted_column: &str,
    bbox: &BoundingBox,
    bbox_srid: i32,
    layer_srid: i32,
    params: &mut ParamList,
) -> FeatureResult<String> {
    match profile.vendor {
        Vendor::Postgres => {
            let corners = push_corners(bbox, params);
            let envelope = format!(
                "ST_MakeEnvelope({}, {}, {}, {}, {})",
                corners[0], corners[1], corners[2], corners[3], bbox_srid
            );
            let envelope = reproject_if_needed(profile, envelope, bbox_srid, layer_srid)?;
            Ok(format!("{} && {}", quoted_column, envelope))
        }
        Vendor::Sqlite => {
            let corners = push_corners(bbox, params);
            let envelope = format!(
                "BuildMbr({}, {}, {}, {}, {})",
                corners[0], corners[1], corners[2], corners[3], bbox_srid
            );
            let envelope = reproject_if_needed(profile, envelope, bbox_srid, layer_srid)?;
            Ok(format!("MbrIntersects({}, {})", quoted_column, envelope))
        }
        Vendor::MySql => {
            let geometry = GeometryLiteral {
                wkt: bbox.to_wkt_polygon(),
                srid: bbox_srid,
                vertex_count: 5,
            };
            let envelope = geometry_value_expr(profile, &geometry, layer_srid, params)?;
            Ok(format!("MBRIntersects({}, {})", quoted_column, envelope))
        }
        // No pre-filter idiom configured for the rest.
        Vendor::SqlServer | Vendor::Oracle => Err(FeatureError::Internal(format!(
            "bbox prefilter requested for {}",
            profile.vendor.as_str()
        ))),
    }
}

fn reproject_if_needed(
    profile: &VendorProfile,
    expr: String,
    from: i32,
    to: i32,
) -> FeatureResult<String> {
    if from == to {
        return Ok(expr);
    }
    geometry_transform(profile, &expr, to).ok_or_else(|| {
        FeatureError::OperationNotSupported(format!(
            "{} cannot reproject bbox from SRID {} to {}",
            profile.vendor.as_str(),
            from,
            to
        ))
    })
}

fn push_corners(bbox: &BoundingBox, params: &mut ParamList) -> [String; 4] {
    [
        params.push(SqlParam::Float(bbox.min_x)),
        params.push(SqlParam::Float(bbox.min_y)),
        params.push(SqlParam::Float(bbox.max_x)),
        params.push(SqlParam::Float(bbox.max_y)),
    ]
}

fn sdo_mask(op: SpatialOp) -> &'static str {
    match op {
        SpatialOp::Intersects => "ANYINTERACT",
        SpatialOp::Contains => "CONTAINS",
        SpatialOp::Within => "INSIDE",
        SpatialOp::Touches => "TOUCH",
        SpatialOp::Overlaps => "OVERLAPBDYINTERSECT",
        SpatialOp::Equals => "EQUAL",
        // Unsupported ops are rejected before mask lookup.
        SpatialOp::Crosses | SpatialOp::Disjoint => "ANYINTERACT",
    }
}
