//! Query execution entry points.
//!
//! `execute` streams rows; `count_only` returns an exact, estimated or
//! skipped count. Both are pure functions of the query plus database
//! state: validation and compilation have already finished before any
//! SQL runs, so a failing request never partially executes.

use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use feature_common::{
    DbErrorClass, FeatureError, FeatureResult, LayerMetadata, ServiceLimits,
};
use feature_query::{FeatureQuery, ResultType};
use sql_dialect::{KeysetCursor, QueryBuilder, VendorProfile};

use crate::pagination::{CountResult, PageToken};
use crate::source::{FeatureRow, FeatureSource, RowStream};

/// One bounded page of results with continuation info.
#[derive(Debug)]
pub struct FeaturePage {
    pub rows: Vec<FeatureRow>,
    pub has_more: bool,
    /// Token for the next page, when there is one.
    pub next_token: Option<String>,
}

/// Executes canonical queries against one vendor.
pub struct FeatureExecutor<S> {
    source: S,
    profile: VendorProfile,
    limits: ServiceLimits,
}

impl<S: FeatureSource> FeatureExecutor<S> {
    pub fn new(source: S, profile: VendorProfile) -> Self {
        Self {
            source,
            profile,
            limits: ServiceLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ServiceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Execute a query and stream its rows.
    ///
    /// `resultType=hits` requests must go through [`Self::count_only`];
    /// they never materialize rows.
    pub async fn execute(
        &self,
        layer: &LayerMetadata,
        query: &FeatureQuery,
        cancel: CancellationToken,
    ) -> FeatureResult<RowStream> {
        if query.result_type == ResultType::Hits {
            return Err(FeatureError::Internal(
                "hits queries must use count_only".into(),
            ));
        }

        let built = QueryBuilder::new(&self.profile, layer).build_select(query, false)?;
        tracing::debug!(
            vendor = self.profile.vendor.as_str(),
            collection = %layer.collection_id,
            sql = %built.sql,
            "executing feature query"
        );
        self.source.fetch_rows(built, layer.clone(), cancel).await
    }

    /// Fetch one offset-paginated page, with has-more detection and the
    /// next-page token minted when a further page exists.
    pub async fn fetch_page(
        &self,
        layer: &LayerMetadata,
        query: &FeatureQuery,
        cancel: CancellationToken,
    ) -> FeatureResult<FeaturePage> {
        let built = QueryBuilder::new(&self.profile, layer).build_select(query, true)?;
        let stream = self.source.fetch_rows(built, layer.clone(), cancel).await?;
        let (rows, has_more) = collect_page(stream, query.limit as usize).await?;

        let next_token = has_more.then(|| PageToken::next_offset(query).encode());
        Ok(FeaturePage {
            rows,
            has_more,
            next_token,
        })
    }

    /// Fetch one keyset-paginated page (catalog search).
    ///
    /// As long as the sort key is stable no row is skipped or duplicated
    /// under concurrent inserts elsewhere in the result set; deletes at
    /// already-returned positions are best-effort.
    pub async fn fetch_search_page(
        &self,
        layer: &LayerMetadata,
        query: &FeatureQuery,
        token: Option<&str>,
        cancel: CancellationToken,
    ) -> FeatureResult<FeaturePage> {
        let cursor = match token {
            Some(token) => match PageToken::decode(token)? {
                PageToken::Keyset(cursor) => {
                    if layer.collection_field.is_none()
                        && cursor.collection_id != layer.collection_id
                    {
                        return Err(FeatureError::invalid_parameter(
                            "token",
                            "page token belongs to another collection",
                        ));
                    }
                    Some(cursor)
                }
                PageToken::Offset { .. } => {
                    return Err(FeatureError::invalid_parameter(
                        "token",
                        "offset token given to a keyset-paginated endpoint",
                    ))
                }
            },
            None => None,
        };

        let built = QueryBuilder::new(&self.profile, layer).build_keyset_select(
            query,
            cursor.as_ref(),
            true,
        )?;
        let stream = self.source.fetch_rows(built, layer.clone(), cancel).await?;
        let (rows, has_more) = collect_page(stream, query.limit as usize).await?;

        let next_token = if has_more {
            rows.last().map(|last| {
                let collection = layer
                    .collection_field
                    .as_ref()
                    .and_then(|f| last.properties.get(f))
                    .and_then(|v| v.as_str())
                    .unwrap_or(&layer.collection_id);
                PageToken::Keyset(KeysetCursor {
                    collection_id: collection.to_string(),
                    item_id: last.id.clone(),
                })
                .encode()
            })
        } else {
            None
        };

        Ok(FeaturePage {
            rows,
            has_more,
            next_token,
        })
    }

    /// Count matching rows without materializing features.
    ///
    /// The exact count runs under the configured time budget; unfiltered
    /// counts past the row threshold use the vendor's catalog estimate
    /// instead, and when nothing completes in budget the count is
    /// reported skipped rather than blocking the response.
    pub async fn count_only(
        &self,
        layer: &LayerMetadata,
        query: &FeatureQuery,
        cancel: CancellationToken,
    ) -> FeatureResult<CountResult> {
        let unfiltered =
            query.bbox.is_none() && query.temporal.is_none() && query.filter.is_none();

        let estimate = if unfiltered {
            self.table_estimate(layer).await
        } else {
            // Catalog statistics describe the whole table; they cannot
            // stand in for a filtered count.
            None
        };

        if let Some(estimate) = estimate {
            if estimate > self.limits.count_estimate_threshold {
                tracing::debug!(
                    collection = %layer.collection_id,
                    estimate,
                    "row estimate above threshold, skipping exact count"
                );
                return Ok(CountResult::Estimated(estimate));
            }
        }

        let built = QueryBuilder::new(&self.profile, layer).build_count(query)?;
        let budget = Duration::from_millis(self.limits.count_timeout_ms);
        let exact = tokio::time::timeout(
            budget,
            self.cancellable(cancel, self.source.fetch_scalar(built.sql, built.params)),
        )
        .await;

        match exact {
            Ok(Ok(n)) => Ok(CountResult::Exact(n.unwrap_or(0).max(0) as u64)),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::debug!(
                    collection = %layer.collection_id,
                    budget_ms = self.limits.count_timeout_ms,
                    "exact count timed out"
                );
                Ok(match estimate {
                    Some(estimate) => CountResult::Estimated(estimate),
                    None => CountResult::Skipped,
                })
            }
        }
    }

    async fn table_estimate(&self, layer: &LayerMetadata) -> Option<u64> {
        let sql = self.profile.count_estimate_sql(layer)?;
        match self.source.fetch_scalar(sql, Vec::new()).await {
            Ok(Some(n)) if n >= 0 => Some(n as u64),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "row estimate query failed");
                None
            }
        }
    }

    async fn cancellable<T>(
        &self,
        cancel: CancellationToken,
        fut: impl std::future::Future<Output = FeatureResult<T>>,
    ) -> FeatureResult<T> {
        tokio::select! {
            _ = cancel.cancelled() => Err(FeatureError::Database {
                message: "query cancelled".into(),
                class: DbErrorClass::Transient,
            }),
            result = fut => result,
        }
    }
}

/// Drain up to `limit + 1` rows, trimming the lookahead row.
async fn collect_page(
    mut stream: RowStream,
    limit: usize,
) -> FeatureResult<(Vec<FeatureRow>, bool)> {
    let mut rows = Vec::new();
    while let Some(item) = stream.next().await {
        rows.push(item?);
        if rows.len() > limit {
            break;
        }
    }
    let has_more = rows.len() > limit;
    rows.truncate(limit);
    Ok((rows, has_more))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use feature_common::{Crs, FieldDef, FieldType};
    use futures::stream;
    use serde_json::Map;
    use sql_dialect::{BuiltQuery, SqlParam};
    use std::sync::Mutex;

    /// Source returning canned rows and scalars, recording built SQL.
    struct MockSource {
        rows: Vec<FeatureRow>,
        scalar: Option<i64>,
        scalar_delay: Option<Duration>,
        seen_sql: Mutex<Vec<String>>,
    }

    impl MockSource {
        fn with_rows(rows: Vec<FeatureRow>) -> Self {
            Self {
                rows,
                scalar: Some(0),
                scalar_delay: None,
                seen_sql: Mutex::new(Vec::new()),
            }
        }

        fn with_scalar(scalar: Option<i64>, delay: Option<Duration>) -> Self {
            Self {
                rows: Vec::new(),
                scalar,
                scalar_delay: delay,
                seen_sql: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl FeatureSource for MockSource {
        async fn fetch_rows(
            &self,
            built: BuiltQuery,
            _layer: LayerMetadata,
            _cancel: CancellationToken,
        ) -> FeatureResult<RowStream> {
            self.seen_sql.lock().unwrap().push(built.sql);
            let rows: Vec<FeatureResult<FeatureRow>> =
                self.rows.iter().cloned().map(Ok).collect();
            Ok(stream::iter(rows).boxed())
        }

        async fn fetch_scalar(
            &self,
            sql: String,
            _params: Vec<(String, SqlParam)>,
        ) -> FeatureResult<Option<i64>> {
            self.seen_sql.lock().unwrap().push(sql);
            if let Some(delay) = self.scalar_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.scalar)
        }
    }

    fn roads() -> LayerMetadata {
        LayerMetadata {
            collection_id: "roads".into(),
            table: "roads".into(),
            schema: None,
            id_field: "id".into(),
            geometry_field: "geom".into(),
            temporal_field: None,
            collection_field: None,
            srid: 4326,
            fields: vec![
                FieldDef::new("id", FieldType::Int),
                FieldDef::new("name", FieldType::Text),
                FieldDef::new("geom", FieldType::Geometry),
            ],
            supported_crs: vec![],
            max_record_count: None,
        }
    }

    fn query(limit: u32) -> FeatureQuery {
        FeatureQuery {
            limit,
            offset: 0,
            bbox: None,
            temporal: None,
            result_type: ResultType::Results,
            property_names: None,
            sort_orders: None,
            filter: None,
            crs: Crs::default_crs(),
        }
    }

    fn row(id: u32) -> FeatureRow {
        FeatureRow {
            id: id.to_string(),
            geometry: None,
            properties: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_fetch_page_trims_lookahead_row() {
        let source = MockSource::with_rows((1..=4).map(row).collect());
        let executor = FeatureExecutor::new(source, VendorProfile::postgres());

        let page = executor
            .fetch_page(&roads(), &query(3), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(page.rows.len(), 3);
        assert!(page.has_more);
        assert!(page.next_token.is_some());

        match PageToken::decode(&page.next_token.unwrap()).unwrap() {
            PageToken::Offset { offset, limit } => {
                assert_eq!(offset, 3);
                assert_eq!(limit, 3);
            }
            other => panic!("expected offset token, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_page_last_page_has_no_token() {
        let source = MockSource::with_rows((1..=2).map(row).collect());
        let executor = FeatureExecutor::new(source, VendorProfile::postgres());

        let page = executor
            .fetch_page(&roads(), &query(5), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(page.rows.len(), 2);
        assert!(!page.has_more);
        assert!(page.next_token.is_none());
    }

    #[tokio::test]
    async fn test_search_page_keyset_round_trip() {
        let source = MockSource::with_rows((1..=3).map(row).collect());
        let executor = FeatureExecutor::new(source, VendorProfile::postgres());

        let page = executor
            .fetch_search_page(&roads(), &query(2), None, CancellationToken::new())
            .await
            .unwrap();
        assert!(page.has_more);

        // Re-encoding the last emitted row reproduces a token continuing
        // from exactly the next row.
        let token = page.next_token.unwrap();
        match PageToken::decode(&token).unwrap() {
            PageToken::Keyset(cursor) => {
                assert_eq!(cursor.collection_id, "roads");
                assert_eq!(cursor.item_id, page.rows.last().unwrap().id);
            }
            other => panic!("expected keyset token, got {:?}", other),
        }

        // The continuation must be usable.
        let next = executor
            .fetch_search_page(&roads(), &query(2), Some(&token), CancellationToken::new())
            .await
            .unwrap();
        assert!(!next.rows.is_empty());
    }

    #[tokio::test]
    async fn test_search_page_rejects_offset_token() {
        let source = MockSource::with_rows(vec![]);
        let executor = FeatureExecutor::new(source, VendorProfile::postgres());
        let offset_token = PageToken::next_offset(&query(5)).encode();

        let err = executor
            .fetch_search_page(
                &roads(),
                &query(5),
                Some(&offset_token),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.parameter(), Some("token"));
    }

    #[tokio::test]
    async fn test_search_page_rejects_foreign_collection_token() {
        let source = MockSource::with_rows(vec![]);
        let executor = FeatureExecutor::new(source, VendorProfile::postgres());
        let token = PageToken::next_keyset("rivers", "9").encode();

        let err = executor
            .fetch_search_page(&roads(), &query(5), Some(&token), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.parameter(), Some("token"));
    }

    #[tokio::test]
    async fn test_execute_refuses_hits() {
        let source = MockSource::with_rows(vec![]);
        let executor = FeatureExecutor::new(source, VendorProfile::postgres());
        let mut q = query(5);
        q.result_type = ResultType::Hits;

        assert!(executor
            .execute(&roads(), &q, CancellationToken::new())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_count_exact() {
        let source = MockSource::with_scalar(Some(42), None);
        let executor = FeatureExecutor::new(source, VendorProfile::sqlite());

        let count = executor
            .count_only(&roads(), &query(5), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(count, CountResult::Exact(42));
    }

    #[tokio::test]
    async fn test_count_estimate_above_threshold() {
        // Postgres profile has an estimate query; the mock returns a huge
        // table estimate, so the exact count is skipped entirely.
        let source = MockSource::with_scalar(Some(5_000_000), None);
        let executor = FeatureExecutor::new(source, VendorProfile::postgres());

        let count = executor
            .count_only(&roads(), &query(5), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(count, CountResult::Estimated(5_000_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_budget_exhausted_without_estimate() {
        // SQLite has no estimate query; a slow exact count is reported
        // skipped rather than blocking the page response.
        let source = MockSource::with_scalar(Some(1), Some(Duration::from_secs(60)));
        let executor = FeatureExecutor::new(source, VendorProfile::sqlite());

        let count = executor
            .count_only(&roads(), &query(5), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(count, CountResult::Skipped);
    }

    #[tokio::test]
    async fn test_count_cancellation_is_transient() {
        let source = MockSource::with_scalar(Some(1), Some(Duration::from_secs(1)));
        let executor = FeatureExecutor::new(source, VendorProfile::sqlite());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = executor
            .count_only(&roads(), &query(5), cancel)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
