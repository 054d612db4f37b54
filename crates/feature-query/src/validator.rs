//! Query parameter validation.
//!
//! Parses the raw key/value parameter surface into a [`FeatureQuery`].
//! Every rule is independently testable; any failure is reported before
//! SQL generation begins, with the offending parameter named in the
//! error payload.

use std::collections::HashMap;

use cql_filter::{ids_filter, FilterCompiler, FilterExpression, FilterLanguage};
use feature_common::{
    BoundingBox, Crs, FeatureError, FeatureResult, LayerMetadata, ServiceLimits, TemporalInterval,
};

use crate::negotiate;
use crate::query::{FeatureQuery, ResultType, SortDirection, SortOrder};

/// The fixed parameter whitelist. Unknown keys are rejected at this
/// boundary, not silently ignored.
pub const ALLOWED_PARAMS: &[&str] = &[
    "limit",
    "offset",
    "bbox",
    "bbox-crs",
    "datetime",
    "resultType",
    "properties",
    "crs",
    "count",
    "f",
    "filter",
    "filter-lang",
    "filter-crs",
    "ids",
    "sortby",
];

/// Validates raw request parameters against one layer.
pub struct QueryValidator<'a> {
    layer: &'a LayerMetadata,
    limits: &'a ServiceLimits,
    service_crs: &'a [Crs],
}

impl<'a> QueryValidator<'a> {
    pub fn new(layer: &'a LayerMetadata, limits: &'a ServiceLimits) -> Self {
        Self {
            layer,
            limits,
            service_crs: &[],
        }
    }

    /// Add service-wide CRS identifiers to the layer's supported list.
    pub fn with_service_crs(mut self, service_crs: &'a [Crs]) -> Self {
        self.service_crs = service_crs;
        self
    }

    /// Validate a parameter map into a canonical query.
    pub fn validate(&self, params: &HashMap<String, String>) -> FeatureResult<FeatureQuery> {
        self.validate_with_header(params, None)
    }

    /// Validate with an Accept-Crs style header, which takes priority over
    /// the `crs` parameter and is negotiated by quality factor.
    pub fn validate_with_header(
        &self,
        params: &HashMap<String, String>,
        accept_crs: Option<&str>,
    ) -> FeatureResult<FeatureQuery> {
        for key in params.keys() {
            if !ALLOWED_PARAMS.contains(&key.as_str()) {
                return Err(FeatureError::invalid_parameter(
                    key.clone(),
                    "unknown query parameter",
                ));
            }
        }

        let supported = negotiate::supported_crs(self.layer, self.service_crs);

        let limit = self.parse_limit(params)?;
        let offset = self.parse_offset(params)?;
        let crs = self.parse_crs(params, accept_crs, &supported)?;
        let bbox = self.parse_bbox(params, &supported)?;
        let temporal = self.parse_datetime(params)?;
        let result_type = self.parse_result_type(params)?;
        let property_names = self.parse_properties(params);
        let sort_orders = self.parse_sortby(params)?;
        let filter = self.parse_filter(params, &supported)?;

        Ok(FeatureQuery {
            limit,
            offset,
            bbox,
            temporal,
            result_type,
            property_names,
            sort_orders,
            filter,
            crs,
        })
    }

    fn parse_limit(&self, params: &HashMap<String, String>) -> FeatureResult<u32> {
        let max_allowed = self.limits.max_allowed(self.layer.max_record_count);

        // `count` is the ArcGIS-style alias; `limit` wins when both appear.
        let raw = params.get("limit").or_else(|| params.get("count"));
        let Some(raw) = raw else {
            return Ok(self.limits.default_limit.min(max_allowed).max(1));
        };

        let requested: i64 = raw.trim().parse().map_err(|_| {
            FeatureError::invalid_parameter("limit", format!("'{}' is not an integer", raw))
        })?;
        if requested < 1 {
            return Err(FeatureError::LimitOutOfRange(format!(
                "{} is outside [1, {}]",
                requested, max_allowed
            )));
        }

        Ok((requested.min(max_allowed as i64)) as u32)
    }

    fn parse_offset(&self, params: &HashMap<String, String>) -> FeatureResult<u64> {
        let Some(raw) = params.get("offset") else {
            return Ok(0);
        };
        let offset: i64 = raw.trim().parse().map_err(|_| {
            FeatureError::invalid_parameter("offset", format!("'{}' is not an integer", raw))
        })?;
        if offset < 0 {
            return Err(FeatureError::invalid_parameter(
                "offset",
                format!("{} is negative", offset),
            ));
        }
        Ok(offset as u64)
    }

    fn parse_crs(
        &self,
        params: &HashMap<String, String>,
        accept_crs: Option<&str>,
        supported: &[Crs],
    ) -> FeatureResult<Crs> {
        if let Some(header) = accept_crs {
            return negotiate::negotiate_accept_crs(header, supported);
        }
        match params.get("crs") {
            Some(token) => negotiate::resolve_crs(token, supported),
            None => Ok(Crs::default_crs()),
        }
    }

    fn parse_bbox(
        &self,
        params: &HashMap<String, String>,
        supported: &[Crs],
    ) -> FeatureResult<Option<BoundingBox>> {
        let Some(raw) = params.get("bbox") else {
            if params.contains_key("bbox-crs") {
                return Err(FeatureError::invalid_parameter(
                    "bbox-crs",
                    "bbox-crs given without bbox",
                ));
            }
            return Ok(None);
        };

        let (bbox, trailing) = BoundingBox::from_query_string(raw)?;

        // The bbox-crs parameter wins over a WFS-style trailing token.
        let token = params.get("bbox-crs").cloned().or(trailing);
        let crs = match token {
            Some(token) => negotiate::resolve_crs(&token, supported)?,
            None => Crs::default_crs(),
        };

        Ok(Some(bbox.oriented(crs)))
    }

    fn parse_datetime(
        &self,
        params: &HashMap<String, String>,
    ) -> FeatureResult<Option<TemporalInterval>> {
        match params.get("datetime") {
            Some(raw) => Ok(Some(TemporalInterval::from_query_string(raw)?)),
            None => Ok(None),
        }
    }

    fn parse_result_type(&self, params: &HashMap<String, String>) -> FeatureResult<ResultType> {
        match params.get("resultType") {
            Some(raw) => ResultType::from_param(raw).ok_or_else(|| {
                FeatureError::invalid_parameter(
                    "resultType",
                    format!("'{}' is not 'results' or 'hits'", raw),
                )
            }),
            None => Ok(ResultType::Results),
        }
    }

    /// Projection list. No schema check happens here; unknown property
    /// names simply project nothing, decoupled from filter validation.
    fn parse_properties(&self, params: &HashMap<String, String>) -> Option<Vec<String>> {
        let raw = params.get("properties")?;
        let names: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if names.is_empty() {
            None
        } else {
            Some(names)
        }
    }

    fn parse_sortby(
        &self,
        params: &HashMap<String, String>,
    ) -> FeatureResult<Option<Vec<SortOrder>>> {
        let Some(raw) = params.get("sortby") else {
            // Default: deterministic order by the id field when one exists.
            return Ok(self.layer.id_field_def().map(|def| {
                vec![SortOrder {
                    field: def.name.clone(),
                    column: def.column.clone(),
                    direction: SortDirection::Asc,
                }]
            }));
        };

        let mut orders = Vec::new();
        for token in raw.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }

            let (name, mut direction) = match token.strip_prefix('-') {
                Some(rest) => (rest, SortDirection::Desc),
                None => (token.strip_prefix('+').unwrap_or(token), SortDirection::Asc),
            };

            // Suffix syntax (`name:desc`, `name:d`) overrides any prefix.
            let name = match name.rsplit_once(':') {
                Some((field, suffix)) => {
                    direction = match suffix.to_ascii_lowercase().as_str() {
                        "asc" | "a" | "ascending" => SortDirection::Asc,
                        "desc" | "d" | "descending" => SortDirection::Desc,
                        other => {
                            return Err(FeatureError::invalid_parameter(
                                "sortby",
                                format!("unknown sort direction '{}'", other),
                            ))
                        }
                    };
                    field
                }
                None => name,
            };

            let def = self.layer.field(name).ok_or_else(|| {
                FeatureError::invalid_parameter("sortby", format!("unknown field '{}'", name))
            })?;
            if self.layer.is_geometry_field(name) {
                return Err(FeatureError::invalid_parameter(
                    "sortby",
                    format!("cannot sort by geometry field '{}'", name),
                ));
            }

            orders.push(SortOrder {
                field: def.name.clone(),
                column: def.column.clone(),
                direction,
            });
        }

        if orders.is_empty() {
            return Err(FeatureError::invalid_parameter(
                "sortby",
                "at least one sort field is required",
            ));
        }
        Ok(Some(orders))
    }

    fn parse_filter(
        &self,
        params: &HashMap<String, String>,
        supported: &[Crs],
    ) -> FeatureResult<Option<FilterExpression>> {
        let ids = match params.get("ids") {
            Some(raw) => {
                let ids: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
                if ids.is_empty() {
                    return Err(FeatureError::invalid_parameter(
                        "ids",
                        "at least one id is required",
                    ));
                }
                Some(ids_filter(ids))
            }
            None => None,
        };

        let language = match params.get("filter-lang") {
            Some(raw) => Some(FilterLanguage::from_param(raw).ok_or_else(|| {
                FeatureError::invalid_parameter(
                    "filter-lang",
                    format!("'{}' is not 'cql-text' or 'cql2-json'", raw),
                )
            })?),
            None => None,
        };

        let compiled = match params.get("filter").map(|s| s.trim()).filter(|s| !s.is_empty()) {
            Some(payload) => {
                let mut compiler = FilterCompiler::new(self.layer)
                    .with_max_vertices(self.limits.max_filter_vertices);
                if let Some(token) = params.get("filter-crs") {
                    let crs = negotiate::resolve_crs(token, supported)?;
                    if let Some(srid) = crs.srid() {
                        compiler = compiler.with_geometry_srid(srid);
                    }
                }
                Some(compiler.compile(payload, language)?)
            }
            None => None,
        };

        Ok(match (compiled, ids) {
            (Some(filter), Some(ids)) => Some(filter.and(ids)),
            (Some(filter), None) => Some(filter),
            (None, Some(ids)) => Some(ids),
            (None, None) => None,
        })
    }
}
