//! Incremental GeoJSON result writing.
//!
//! Consumes the row stream as it arrives from the driver and writes a
//! FeatureCollection to the output sink one feature at a time, flushing
//! at a configurable row interval. The full result set is never held in
//! memory.
//!
//! A query failure after the first byte cannot change the HTTP status
//! the caller already sent; the stream is terminated and the failure is
//! logged with its context.

use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use feature_common::{FeatureError, FeatureResult, ServiceLimits};

use crate::pagination::CountResult;
use crate::source::FeatureRow;

/// What a completed write looked like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    pub rows_written: u64,
}

/// Streams a GeoJSON FeatureCollection to an async sink.
pub struct GeoJsonStreamWriter<W> {
    sink: W,
    flush_every: usize,
}

impl<W: AsyncWrite + Unpin> GeoJsonStreamWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            flush_every: ServiceLimits::default().stream_flush_rows,
        }
    }

    pub fn with_flush_every(mut self, rows: usize) -> Self {
        self.flush_every = rows.max(1);
        self
    }

    /// Write the collection, consuming the row stream incrementally.
    ///
    /// `number_matched` is included in the footer when known (exact or
    /// estimated); a skipped count is simply omitted.
    pub async fn write_collection(
        mut self,
        mut rows: impl Stream<Item = FeatureResult<FeatureRow>> + Unpin,
        number_matched: Option<CountResult>,
    ) -> FeatureResult<StreamSummary> {
        self.write(b"{\"type\":\"FeatureCollection\",\"features\":[")
            .await?;

        let mut written: u64 = 0;
        while let Some(item) = rows.next().await {
            let row = match item {
                Ok(row) => row,
                Err(e) => {
                    tracing::error!(
                        rows_emitted = written,
                        error = %e,
                        "query failed after response began streaming; terminating output"
                    );
                    let _ = self.sink.flush().await;
                    return Err(e);
                }
            };

            if written > 0 {
                self.write(b",").await?;
            }
            let feature = feature_json(&row);
            let encoded = serde_json::to_vec(&feature)
                .map_err(|e| FeatureError::Internal(format!("feature encoding failed: {}", e)))?;
            self.write(&encoded).await?;
            written += 1;

            if written % self.flush_every as u64 == 0 {
                self.sink
                    .flush()
                    .await
                    .map_err(|e| FeatureError::Internal(format!("stream flush failed: {}", e)))?;
            }
        }

        let mut footer = format!("],\"numberReturned\":{}", written);
        if let Some(count) = number_matched {
            if let Some(value) = count.value() {
                footer.push_str(&format!(",\"numberMatched\":{}", value));
            }
        }
        footer.push('}');
        self.write(footer.as_bytes()).await?;
        self.sink
            .flush()
            .await
            .map_err(|e| FeatureError::Internal(format!("stream flush failed: {}", e)))?;

        Ok(StreamSummary {
            rows_written: written,
        })
    }

    async fn write(&mut self, bytes: &[u8]) -> FeatureResult<()> {
        self.sink
            .write_all(bytes)
            .await
            .map_err(|e| FeatureError::Internal(format!("stream write failed: {}", e)))
    }
}

fn feature_json(row: &FeatureRow) -> Value {
    json!({
        "type": "Feature",
        "id": row.id,
        "geometry": row.geometry.clone().unwrap_or(Value::Null),
        "properties": Value::Object(row.properties.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde_json::Map;

    fn row(id: u32) -> FeatureResult<FeatureRow> {
        let mut properties = Map::new();
        properties.insert("name".into(), Value::String(format!("road-{}", id)));
        Ok(FeatureRow {
            id: id.to_string(),
            geometry: Some(json!({"type": "Point", "coordinates": [0.0, 0.0]})),
            properties,
        })
    }

    #[tokio::test]
    async fn test_writes_valid_feature_collection() {
        let mut out = Vec::new();
        let rows = stream::iter(vec![row(1), row(2)]);

        let summary = GeoJsonStreamWriter::new(&mut out)
            .write_collection(rows, Some(CountResult::Exact(2)))
            .await
            .unwrap();

        assert_eq!(summary.rows_written, 2);
        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["type"], "FeatureCollection");
        assert_eq!(parsed["features"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["numberReturned"], 2);
        assert_eq!(parsed["numberMatched"], 2);
        assert_eq!(parsed["features"][0]["properties"]["name"], "road-1");
    }

    #[tokio::test]
    async fn test_empty_collection() {
        let mut out = Vec::new();
        let rows = stream::iter(Vec::<FeatureResult<FeatureRow>>::new());

        let summary = GeoJsonStreamWriter::new(&mut out)
            .write_collection(rows, None)
            .await
            .unwrap();

        assert_eq!(summary.rows_written, 0);
        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["features"].as_array().unwrap().len(), 0);
        assert!(parsed.get("numberMatched").is_none());
    }

    #[tokio::test]
    async fn test_skipped_count_omitted() {
        let mut out = Vec::new();
        let rows = stream::iter(vec![row(1)]);

        GeoJsonStreamWriter::new(&mut out)
            .write_collection(rows, Some(CountResult::Skipped))
            .await
            .unwrap();

        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert!(parsed.get("numberMatched").is_none());
    }

    #[tokio::test]
    async fn test_mid_stream_error_terminates_output() {
        let mut out = Vec::new();
        let rows = stream::iter(vec![
            row(1),
            Err(FeatureError::Database {
                message: "connection lost".into(),
                class: feature_common::DbErrorClass::Transient,
            }),
            row(2),
        ]);

        let err = GeoJsonStreamWriter::new(&mut out)
            .write_collection(rows, None)
            .await
            .unwrap_err();
        assert!(err.is_transient());

        // The first feature was already on the wire; the document is left
        // unterminated.
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("road-1"));
        assert!(!text.contains("road-2"));
        assert!(serde_json::from_str::<Value>(&text).is_err());
    }

    #[tokio::test]
    async fn test_null_geometry() {
        let mut out = Vec::new();
        let rows = stream::iter(vec![Ok(FeatureRow {
            id: "1".into(),
            geometry: None,
            properties: Map::new(),
        })]);

        GeoJsonStreamWriter::new(&mut out)
            .write_collection(rows, None)
            .await
            .unwrap();

        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert!(parsed["features"][0]["geometry"].is_null());
    }
}
