//! Row sources.
//!
//! [`FeatureSource`] is the seam between the compiled SQL and a concrete
//! driver. The Postgres implementation ships here; other engines plug in
//! behind the same trait. Streams are channel-bridged from a driver task
//! so cancellation drops the underlying cursor instead of draining it.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row, TypeInfo};

use feature_common::{FeatureError, FeatureResult, LayerMetadata};
use sql_dialect::{BuiltQuery, SqlParam};

use crate::classify;

/// One feature row, driver-neutral.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    /// Feature id, rendered as a string for the wire.
    pub id: String,
    /// GeoJSON geometry (or a WKT string for engines without GeoJSON
    /// output), `None` for null geometries.
    pub geometry: Option<Value>,
    /// Remaining projected properties.
    pub properties: Map<String, Value>,
}

/// A lazy stream of feature rows. Restartable only from the beginning —
/// re-fetch rather than rewind.
pub type RowStream = BoxStream<'static, FeatureResult<FeatureRow>>;

/// Driver abstraction executing compiled statements.
#[async_trait]
pub trait FeatureSource: Send + Sync {
    /// Execute a feature SELECT and stream its rows.
    ///
    /// Cancelling the token closes the cursor; already-buffered rows may
    /// still be delivered.
    async fn fetch_rows(
        &self,
        built: BuiltQuery,
        layer: LayerMetadata,
        cancel: CancellationToken,
    ) -> FeatureResult<RowStream>;

    /// Execute a single-value statement (counts, estimates).
    async fn fetch_scalar(
        &self,
        sql: String,
        params: Vec<(String, SqlParam)>,
    ) -> FeatureResult<Option<i64>>;
}

/// Postgres/PostGIS source over a bounded sqlx pool.
pub struct PgFeatureSource {
    pool: PgPool,
}

impl PgFeatureSource {
    /// Connect with a bounded pool.
    pub async fn connect(database_url: &str, max_connections: u32) -> FeatureResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(classify::to_feature_error)?;
        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeatureSource for PgFeatureSource {
    async fn fetch_rows(
        &self,
        built: BuiltQuery,
        layer: LayerMetadata,
        cancel: CancellationToken,
    ) -> FeatureResult<RowStream> {
        // Bounded channel: backpressure instead of buffering the result
        // set.
        let (tx, rx) = tokio::sync::mpsc::channel::<FeatureResult<FeatureRow>>(64);
        let pool = self.pool.clone();

        tokio::spawn(async move {
            let mut query = sqlx::query(&built.sql);
            for (_, param) in &built.params {
                query = bind_param(query, param);
            }

            let mut rows = query.fetch(&pool);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("row stream cancelled, closing cursor");
                        break;
                    }
                    next = rows.next() => match next {
                        Some(Ok(row)) => {
                            let mapped = map_row(&row, &layer);
                            if tx.send(mapped).await.is_err() {
                                // Receiver gone; dropping `rows` closes the
                                // cursor.
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            let _ = tx.send(Err(classify::to_feature_error(e))).await;
                            break;
                        }
                        None => break,
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(stream.boxed())
    }

    async fn fetch_scalar(
        &self,
        sql: String,
        params: Vec<(String, SqlParam)>,
    ) -> FeatureResult<Option<i64>> {
        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for (_, param) in &params {
            query = bind_scalar_param(query, param);
        }
        query
            .fetch_optional(&self.pool)
            .await
            .map_err(classify::to_feature_error)
    }
}

fn bind_param<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    param: &SqlParam,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    match param {
        SqlParam::Int(v) => query.bind(*v),
        SqlParam::Float(v) => query.bind(*v),
        SqlParam::Text(v) => query.bind(v.clone()),
        SqlParam::Bool(v) => query.bind(*v),
        SqlParam::Timestamp(v) => query.bind(*v),
        SqlParam::Uuid(v) => query.bind(*v),
        SqlParam::Geometry(wkt) => query.bind(wkt.clone()),
    }
}

fn bind_scalar_param<'q>(
    query: sqlx::query::QueryScalar<'q, sqlx::Postgres, i64, sqlx::postgres::PgArguments>,
    param: &SqlParam,
) -> sqlx::query::QueryScalar<'q, sqlx::Postgres, i64, sqlx::postgres::PgArguments> {
    match param {
        SqlParam::Int(v) => query.bind(*v),
        SqlParam::Float(v) => query.bind(*v),
        SqlParam::Text(v) => query.bind(v.clone()),
        SqlParam::Bool(v) => query.bind(*v),
        SqlParam::Timestamp(v) => query.bind(*v),
        SqlParam::Uuid(v) => query.bind(*v),
        SqlParam::Geometry(wkt) => query.bind(wkt.clone()),
    }
}

/// Map a database row to the driver-neutral shape. Columns arrive under
/// their exposed names (the builder aliases physical columns).
fn map_row(row: &PgRow, layer: &LayerMetadata) -> FeatureResult<FeatureRow> {
    let mut id = String::new();
    let mut geometry = None;
    let mut properties = Map::new();

    for (index, column) in row.columns().iter().enumerate() {
        let name = column.name();

        if name == layer.geometry_field {
            let text: Option<String> = row.try_get(index).map_err(decode_error)?;
            geometry = text.map(|t| serde_json::from_str(&t).unwrap_or(Value::String(t)));
            continue;
        }

        let value = decode_value(row, index, column.type_info().name())?;
        if name == layer.id_field {
            id = match &value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
        } else {
            properties.insert(name.to_string(), value);
        }
    }

    Ok(FeatureRow {
        id,
        geometry,
        properties,
    })
}

fn decode_value(row: &PgRow, index: usize, type_name: &str) -> FeatureResult<Value> {
    let value = match type_name {
        "INT2" => row
            .try_get::<Option<i16>, _>(index)
            .map_err(decode_error)?
            .map(|v| Value::from(v as i64)),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)
            .map_err(decode_error)?
            .map(|v| Value::from(v as i64)),
        "INT8" => row
            .try_get::<Option<i64>, _>(index)
            .map_err(decode_error)?
            .map(Value::from),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)
            .map_err(decode_error)?
            .and_then(|v| serde_json::Number::from_f64(v as f64).map(Value::Number)),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(index)
            .map_err(decode_error)?
            .and_then(|v| serde_json::Number::from_f64(v).map(Value::Number)),
        "BOOL" => row
            .try_get::<Option<bool>, _>(index)
            .map_err(decode_error)?
            .map(Value::Bool),
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(index)
            .map_err(decode_error)?
            .map(|v| Value::String(v.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)
            .map_err(decode_error)?
            .map(|v| Value::String(v.to_rfc3339())),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)
            .map_err(decode_error)?
            .map(|v| Value::String(format!("{}", v.format("%Y-%m-%dT%H:%M:%S")))),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)
            .map_err(decode_error)?
            .map(|v| Value::String(v.to_string())),
        "JSON" | "JSONB" => row
            .try_get::<Option<Value>, _>(index)
            .map_err(decode_error)?,
        // TEXT, VARCHAR and anything else that decodes as text.
        _ => row
            .try_get::<Option<String>, _>(index)
            .unwrap_or(None)
            .map(Value::String),
    };

    Ok(value.unwrap_or(Value::Null))
}

fn decode_error(err: sqlx::Error) -> FeatureError {
    FeatureError::Internal(format!("row decode failed: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_row_shape() {
        let row = FeatureRow {
            id: "7".into(),
            geometry: Some(serde_json::json!({"type": "Point", "coordinates": [1.0, 2.0]})),
            properties: Map::new(),
        };
        assert_eq!(row.id, "7");
        assert!(row.geometry.is_some());
    }
}
