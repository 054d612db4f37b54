//! Service limit configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunable limits for query validation, counting and streaming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceLimits {
    /// Page size applied when `limit` is absent (capped by `max_limit`).
    pub default_limit: u32,

    /// Hard cap on any requested page size.
    pub max_limit: u32,

    /// Budget for an exact `COUNT(*)` before falling back to an estimate.
    pub count_timeout_ms: u64,

    /// Row-count threshold above which the exact count is skipped in favor
    /// of catalog statistics.
    pub count_estimate_threshold: u64,

    /// Ceiling on vertices in a filter geometry literal.
    pub max_filter_vertices: usize,

    /// Stream writer flush interval, in rows.
    pub stream_flush_rows: usize,
}

impl Default for ServiceLimits {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 10_000,
            count_timeout_ms: 5_000,
            count_estimate_threshold: 1_000_000,
            max_filter_vertices: 10_000,
            stream_flush_rows: 100,
        }
    }
}

impl ServiceLimits {
    /// Load limits from a YAML file, falling back to defaults when the file
    /// does not exist.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!("limits config {:?} does not exist, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read limits config: {:?}", path))?;
        let limits: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse limits config: {:?}", path))?;
        Ok(limits)
    }

    /// The effective maximum page size for a layer:
    /// `max(1, service limit, layer limit)`. A layer may raise the
    /// service-wide cap but a zero/unset value never collapses it below 1.
    pub fn max_allowed(&self, layer_cap: Option<u32>) -> u32 {
        self.max_limit.max(layer_cap.unwrap_or(0)).max(1)
    }
}
