//! CRS resolution and Accept-Crs negotiation.

use feature_common::{Crs, FeatureError, FeatureResult, LayerMetadata};

/// Assemble the CRS identifiers a layer can serve: the service default,
/// layer-specific entries, then service-wide extras, deduplicated by
/// equivalence (comparison is case-insensitive across wire forms).
pub fn supported_crs(layer: &LayerMetadata, service_extra: &[Crs]) -> Vec<Crs> {
    let mut out: Vec<Crs> = vec![Crs::default_crs()];
    for crs in layer.supported_crs.iter().chain(service_extra) {
        if !out.iter().any(|c| c.equivalent(crs)) {
            out.push(crs.clone());
        }
    }
    out
}

/// Resolve a `crs`/`bbox-crs`/`filter-crs` parameter value against the
/// supported list.
pub fn resolve_crs(token: &str, supported: &[Crs]) -> FeatureResult<Crs> {
    let requested = Crs::parse(token).map_err(|_| FeatureError::InvalidCrs(token.to_string()))?;
    if supported.iter().any(|c| c.equivalent(&requested)) {
        Ok(requested)
    } else {
        Err(FeatureError::InvalidCrs(token.to_string()))
    }
}

/// Negotiate an Accept-Crs style header against the supported list.
///
/// The header is a comma-separated list of CRS identifiers with optional
/// quality factors (`EPSG:3857;q=0.8`). The highest-quality supported
/// entry wins; when nothing overlaps the result is `NotAcceptable`.
pub fn negotiate_accept_crs(header: &str, supported: &[Crs]) -> FeatureResult<Crs> {
    let mut candidates: Vec<(&str, f32)> = header
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let token = parts.next()?.trim();
            if token.is_empty() {
                return None;
            }

            let quality = parts
                .find_map(|p| {
                    let p = p.trim();
                    p.strip_prefix("q=").and_then(|q| q.parse::<f32>().ok())
                })
                .unwrap_or(1.0);

            Some((token, quality))
        })
        .collect();

    // Highest quality first; ties keep header order (stable sort).
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    for (token, _) in &candidates {
        if *token == "*" {
            return Ok(Crs::default_crs());
        }
        if let Ok(requested) = Crs::parse(token) {
            if supported.iter().any(|c| c.equivalent(&requested)) {
                return Ok(requested);
            }
        }
    }

    Err(FeatureError::NotAcceptable(format!(
        "no supported CRS among '{}'",
        header
    )))
}
