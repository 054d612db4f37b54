//! The generic feature query builder.
//!
//! One builder serves every vendor; all dialect-specific facts come from
//! the [`VendorProfile`] strategy value. Output is always a parameterized
//! statement — user-supplied values never appear in the SQL text.

use cql_filter::{FilterExpression, LogicalOp, TemporalOp};
use feature_common::{
    FeatureError, FeatureResult, FieldType, LayerMetadata, TemporalInterval,
};
use feature_query::{FeatureQuery, SortDirection, SortOrder};
use uuid::Uuid;

use crate::aggregate::{self, AggregateExpr};
use crate::params::{ParamList, SqlParam};
use crate::profile::{PaginationStyle, VendorProfile};
use crate::spatial;

/// Absolute ceiling on any single page fetch, independent of
/// configuration. Exceeding it fails before SQL is generated.
pub const MAX_SQL_LIMIT: u32 = 100_000;

/// A complete parameterized SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<(String, SqlParam)>,
}

/// Keyset continuation point: the last row the previous page emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct KeysetCursor {
    pub collection_id: String,
    pub item_id: String,
}

/// Builds SQL for one layer on one vendor.
pub struct QueryBuilder<'a> {
    profile: &'a VendorProfile,
    layer: &'a LayerMetadata,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(profile: &'a VendorProfile, layer: &'a LayerMetadata) -> Self {
        Self { profile, layer }
    }

    /// Build the feature page SELECT.
    ///
    /// With `lookahead` the statement fetches `limit + 1` rows so the
    /// caller can detect a further page; the extra row is trimmed before
    /// leaving the executor.
    pub fn build_select(&self, query: &FeatureQuery, lookahead: bool) -> FeatureResult<BuiltQuery> {
        self.check_limit(query.limit)?;

        let mut params = ParamList::new(self.profile.placeholder);
        let projection = self.projection(query);
        let where_clause = self.where_clause(query, &mut params)?;
        let order_by = self.order_by(query.sort_orders.as_deref());

        let mut sql = format!(
            "SELECT {} FROM {}",
            projection,
            self.profile.qualified_table(self.layer)
        );
        if let Some(cond) = where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&cond);
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&order_by);

        let fetch = if lookahead {
            query.limit as u64 + 1
        } else {
            query.limit as u64
        };
        let sql = self.paginate(sql, fetch, query.offset, &mut params);

        Ok(BuiltQuery {
            sql,
            params: params.into_vec(),
        })
    }

    /// Build the keyset-paginated SELECT used by catalog search.
    ///
    /// The cursor adds a tuple-comparison predicate consistent with the
    /// sort order; offset is ignored in this mode.
    pub fn build_keyset_select(
        &self,
        query: &FeatureQuery,
        cursor: Option<&KeysetCursor>,
        lookahead: bool,
    ) -> FeatureResult<BuiltQuery> {
        self.check_limit(query.limit)?;

        let direction = self.keyset_direction(query);
        let mut params = ParamList::new(self.profile.placeholder);
        let projection = self.projection(query);
        let mut conditions = Vec::new();
        if let Some(cond) = self.where_clause(query, &mut params)? {
            conditions.push(cond);
        }
        if let Some(cursor) = cursor {
            conditions.push(self.keyset_predicate(cursor, direction, &mut params)?);
        }

        let mut sql = format!(
            "SELECT {} FROM {}",
            projection,
            self.profile.qualified_table(self.layer)
        );
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        sql.push_str(" ORDER BY ");
        sql.push_str(&self.keyset_order_by(direction));

        let fetch = if lookahead {
            query.limit as u64 + 1
        } else {
            query.limit as u64
        };
        let sql = self.paginate(sql, fetch, 0, &mut params);

        Ok(BuiltQuery {
            sql,
            params: params.into_vec(),
        })
    }

    /// Build the `COUNT(*)` statement sharing the page's WHERE clause.
    /// This is the whole query for `resultType=hits`; no feature columns
    /// are projected.
    pub fn build_count(&self, query: &FeatureQuery) -> FeatureResult<BuiltQuery> {
        self.build_aggregates(query, &[AggregateExpr::count_all("count")])
    }

    /// Build an aggregate statement over the filtered rows.
    pub fn build_aggregates(
        &self,
        query: &FeatureQuery,
        aggregates: &[AggregateExpr],
    ) -> FeatureResult<BuiltQuery> {
        if aggregates.is_empty() {
            return Err(FeatureError::invalid_parameter(
                "outStatistics",
                "at least one aggregate is required",
            ));
        }

        let mut params = ParamList::new(self.profile.placeholder);
        let columns: Vec<String> = aggregates
            .iter()
            .map(|a| aggregate::render(self.profile, self.layer, a))
            .collect::<FeatureResult<_>>()?;

        let mut sql = format!(
            "SELECT {} FROM {}",
            columns.join(", "),
            self.profile.qualified_table(self.layer)
        );
        if let Some(cond) = self.where_clause(query, &mut params)? {
            sql.push_str(" WHERE ");
            sql.push_str(&cond);
        }

        Ok(BuiltQuery {
            sql,
            params: params.into_vec(),
        })
    }

    fn check_limit(&self, limit: u32) -> FeatureResult<()> {
        if limit == 0 || limit > MAX_SQL_LIMIT {
            return Err(FeatureError::LimitOutOfRange(format!(
                "{} is outside [1, {}]",
                limit, MAX_SQL_LIMIT
            )));
        }
        Ok(())
    }

    /// Projection list: requested properties (id always included) with the
    /// geometry column replaced by the vendor's to-text expression.
    fn projection(&self, query: &FeatureQuery) -> String {
        let mut columns = Vec::new();

        match &query.property_names {
            None => {
                for def in &self.layer.fields {
                    columns.push(self.projected_column(&def.name));
                }
            }
            Some(names) => {
                // Id first, for stable pagination and link generation.
                columns.push(self.projected_column(&self.layer.id_field));
                for name in names {
                    if *name == self.layer.id_field {
                        continue;
                    }
                    // Unknown property names are skipped, not errors; the
                    // projection surface is decoupled from filter
                    // validation.
                    if self.layer.field(name).is_some() {
                        columns.push(self.projected_column(name));
                    }
                }
            }
        }

        columns.join(", ")
    }

    fn projected_column(&self, name: &str) -> String {
        let def = match self.layer.field(name) {
            Some(def) => def,
            None => return self.profile.quote_ident(name),
        };
        let quoted = self.profile.quote_ident(&def.column);

        if self.layer.is_geometry_field(name) {
            // Never project raw geometry binary.
            format!(
                "{} AS {}",
                self.profile.geometry_output(&quoted),
                self.profile.quote_ident(&def.name)
            )
        } else if def.column != def.name {
            format!("{} AS {}", quoted, self.profile.quote_ident(&def.name))
        } else {
            quoted
        }
    }

    /// WHERE clause: bbox pre-filter and exact predicate, the temporal
    /// window, and the compiled filter tree, all ANDed.
    fn where_clause(
        &self,
        query: &FeatureQuery,
        params: &mut ParamList,
    ) -> FeatureResult<Option<String>> {
        let mut conditions = Vec::new();

        if let Some(bbox) = &query.bbox {
            let geom_column = self
                .layer
                .field(&self.layer.geometry_field)
                .map(|def| self.profile.quote_ident(&def.column))
                .unwrap_or_else(|| self.profile.quote_ident(&self.layer.geometry_field));
            conditions.push(spatial::bbox_condition(
                self.profile,
                &geom_column,
                bbox,
                self.layer.srid,
                params,
            )?);
        }

        if let Some(interval) = &query.temporal {
            conditions.push(self.temporal_condition(interval, params)?);
        }

        if let Some(filter) = &query.filter {
            conditions.push(self.render_filter(filter, params)?);
        }

        if conditions.is_empty() {
            Ok(None)
        } else {
            Ok(Some(conditions.join(" AND ")))
        }
    }

    fn temporal_condition(
        &self,
        interval: &TemporalInterval,
        params: &mut ParamList,
    ) -> FeatureResult<String> {
        let field = self.layer.temporal_field.as_ref().ok_or_else(|| {
            FeatureError::invalid_parameter(
                "datetime",
                format!(
                    "collection '{}' has no temporal field",
                    self.layer.collection_id
                ),
            )
        })?;
        let column = self
            .layer
            .field(field)
            .map(|def| self.profile.quote_ident(&def.column))
            .unwrap_or_else(|| self.profile.quote_ident(field));

        if interval.is_instant() {
            let at = interval.start.expect("instant has a start");
            let ph = params.push(SqlParam::Timestamp(at));
            return Ok(format!("{} = {}", column, ph));
        }

        let mut bounds = Vec::new();
        if let Some(start) = interval.start {
            let ph = params.push(SqlParam::Timestamp(start));
            bounds.push(format!("{} >= {}", column, ph));
        }
        if let Some(end) = interval.end {
            let ph = params.push(SqlParam::Timestamp(end));
            bounds.push(format!("{} <= {}", column, ph));
        }
        Ok(if bounds.len() == 1 {
            bounds.pop().expect("len checked")
        } else {
            format!("({})", bounds.join(" AND "))
        })
    }

    fn render_filter(
        &self,
        expr: &FilterExpression,
        params: &mut ParamList,
    ) -> FeatureResult<String> {
        match expr {
            FilterExpression::Comparison { field, op, value } => {
                let column = self.profile.quote_ident(&field.column);
                let ph = params.push(SqlParam::from(value));
                Ok(format!("{} {} {}", column, op.sql(), ph))
            }

            FilterExpression::Logical { op, children } => match op {
                LogicalOp::Not => {
                    let child = children.first().ok_or_else(|| {
                        FeatureError::InvalidFilter("NOT requires an operand".into())
                    })?;
                    Ok(format!("NOT ({})", self.render_filter(child, params)?))
                }
                LogicalOp::And | LogicalOp::Or => {
                    if children.is_empty() {
                        return Err(FeatureError::InvalidFilter(
                            "empty logical expression".into(),
                        ));
                    }
                    let sep = if *op == LogicalOp::And {
                        " AND "
                    } else {
                        " OR "
                    };
                    let parts: Vec<String> = children
                        .iter()
                        .map(|c| self.render_filter(c, params))
                        .collect::<FeatureResult<_>>()?;
                    Ok(format!("({})", parts.join(sep)))
                }
            },

            FilterExpression::Spatial {
                op,
                field,
                geometry,
            } => spatial::spatial_predicate(
                self.profile,
                *op,
                &self.profile.quote_ident(&field.column),
                geometry,
                self.layer.srid,
                params,
            ),

            FilterExpression::Temporal {
                op,
                field,
                interval,
            } => {
                let column = self.profile.quote_ident(&field.column);
                match op {
                    TemporalOp::Before => {
                        let at = interval.start.or(interval.end).ok_or_else(|| {
                            FeatureError::InvalidFilter("BEFORE requires an instant".into())
                        })?;
                        let ph = params.push(SqlParam::Timestamp(at));
                        Ok(format!("{} < {}", column, ph))
                    }
                    TemporalOp::After => {
                        let at = interval.end.or(interval.start).ok_or_else(|| {
                            FeatureError::InvalidFilter("AFTER requires an instant".into())
                        })?;
                        let ph = params.push(SqlParam::Timestamp(at));
                        Ok(format!("{} > {}", column, ph))
                    }
                    TemporalOp::During => {
                        let mut bounds = Vec::new();
                        if let Some(start) = interval.start {
                            let ph = params.push(SqlParam::Timestamp(start));
                            bounds.push(format!("{} >= {}", column, ph));
                        }
                        if let Some(end) = interval.end {
                            let ph = params.push(SqlParam::Timestamp(end));
                            bounds.push(format!("{} <= {}", column, ph));
                        }
                        Ok(format!("({})", bounds.join(" AND ")))
                    }
                }
            }

            FilterExpression::InSet { field, values } => {
                let column = self.profile.quote_ident(&field.column);
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| params.push(SqlParam::from(v)))
                    .collect();
                Ok(format!("{} IN ({})", column, placeholders.join(", ")))
            }

            FilterExpression::Between { field, low, high } => {
                let column = self.profile.quote_ident(&field.column);
                let low_ph = params.push(SqlParam::from(low));
                let high_ph = params.push(SqlParam::from(high));
                Ok(format!("{} BETWEEN {} AND {}", column, low_ph, high_ph))
            }

            FilterExpression::IsNull { field } => {
                Ok(format!("{} IS NULL", self.profile.quote_ident(&field.column)))
            }

            FilterExpression::Ids { ids } => {
                let def = self.layer.id_field_def().ok_or_else(|| {
                    FeatureError::Internal(format!(
                        "layer '{}' has no id field",
                        self.layer.collection_id
                    ))
                })?;
                let column = self.profile.quote_ident(&def.column);
                let placeholders: Vec<String> = ids
                    .iter()
                    .map(|id| {
                        self.id_param(def.field_type, id)
                            .map(|param| params.push(param))
                    })
                    .collect::<FeatureResult<_>>()?;
                Ok(format!("{} IN ({})", column, placeholders.join(", ")))
            }
        }
    }

    /// Coerce a wire-format id to the id column's declared type.
    fn id_param(&self, field_type: FieldType, id: &str) -> FeatureResult<SqlParam> {
        match field_type {
            FieldType::Int => id.parse::<i64>().map(SqlParam::Int).map_err(|_| {
                FeatureError::invalid_parameter("ids", format!("'{}' is not an integer id", id))
            }),
            FieldType::Uuid => Uuid::parse_str(id).map(SqlParam::Uuid).map_err(|_| {
                FeatureError::invalid_parameter("ids", format!("'{}' is not a UUID id", id))
            }),
            _ => Ok(SqlParam::Text(id.to_string())),
        }
    }

    fn order_by(&self, sort_orders: Option<&[SortOrder]>) -> String {
        match sort_orders {
            Some(orders) if !orders.is_empty() => orders
                .iter()
                .map(|o| {
                    format!(
                        "{} {}",
                        self.profile.quote_ident(&o.column),
                        o.direction.sql()
                    )
                })
                .collect::<Vec<_>>()
                .join(", "),
            // Fall back to the id field for deterministic pagination.
            _ => {
                let column = self
                    .layer
                    .id_field_def()
                    .map(|def| def.column.clone())
                    .unwrap_or_else(|| self.layer.id_field.clone());
                format!("{} ASC", self.profile.quote_ident(&column))
            }
        }
    }

    fn keyset_direction(&self, query: &FeatureQuery) -> SortDirection {
        query
            .sort_orders
            .as_ref()
            .and_then(|orders| orders.iter().find(|o| o.field == self.layer.id_field))
            .map(|o| o.direction)
            .unwrap_or(SortDirection::Asc)
    }

    fn keyset_order_by(&self, direction: SortDirection) -> String {
        let id_column = self
            .layer
            .id_field_def()
            .map(|def| def.column.clone())
            .unwrap_or_else(|| self.layer.id_field.clone());

        match &self.layer.collection_field {
            Some(collection) => format!(
                "{} {}, {} {}",
                self.profile.quote_ident(collection),
                direction.sql(),
                self.profile.quote_ident(&id_column),
                direction.sql()
            ),
            None => format!("{} {}", self.profile.quote_ident(&id_column), direction.sql()),
        }
    }

    /// Tuple-comparison continuation predicate. Engines with row-value
    /// comparison get the compact form; the rest get the expanded OR.
    fn keyset_predicate(
        &self,
        cursor: &KeysetCursor,
        direction: SortDirection,
        params: &mut ParamList,
    ) -> FeatureResult<String> {
        let id_def = self.layer.id_field_def().ok_or_else(|| {
            FeatureError::Internal(format!(
                "layer '{}' has no id field",
                self.layer.collection_id
            ))
        })?;
        let id_column = self.profile.quote_ident(&id_def.column);
        let id_value = self.id_param(id_def.field_type, &cursor.item_id)?;
        let cmp = match direction {
            SortDirection::Asc => ">",
            SortDirection::Desc => "<",
        };

        let Some(collection) = &self.layer.collection_field else {
            let ph = params.push(id_value);
            return Ok(format!("{} {} {}", id_column, cmp, ph));
        };
        let collection_column = self.profile.quote_ident(collection);

        if self.profile.row_value_comparison {
            let c_ph = params.push(SqlParam::Text(cursor.collection_id.clone()));
            let i_ph = params.push(id_value);
            Ok(format!(
                "({}, {}) {} ({}, {})",
                collection_column, id_column, cmp, c_ph, i_ph
            ))
        } else {
            let c_gt = params.push(SqlParam::Text(cursor.collection_id.clone()));
            let c_eq = params.push(SqlParam::Text(cursor.collection_id.clone()));
            let i_ph = params.push(id_value);
            Ok(format!(
                "({} {} {} OR ({} = {} AND {} {} {}))",
                collection_column, cmp, c_gt, collection_column, c_eq, id_column, cmp, i_ph
            ))
        }
    }

    /// Append the vendor's pagination clause.
    fn paginate(&self, sql: String, limit: u64, offset: u64, params: &mut ParamList) -> String {
        match self.profile.pagination {
            PaginationStyle::LimitOffset => {
                let limit_ph = params.push(SqlParam::Int(limit as i64));
                let offset_ph = params.push(SqlParam::Int(offset as i64));
                format!("{} LIMIT {} OFFSET {}", sql, limit_ph, offset_ph)
            }
            PaginationStyle::OffsetFetch => {
                let offset_ph = params.push(SqlParam::Int(offset as i64));
                let limit_ph = params.push(SqlParam::Int(limit as i64));
                format!(
                    "{} OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
                    sql, offset_ph, limit_ph
                )
            }
            PaginationStyle::RowNum => {
                let max_ph = params.push(SqlParam::Int((offset + limit) as i64));
                let min_ph = params.push(SqlParam::Int(offset as i64));
                format!(
                    "SELECT * FROM (SELECT q.*, ROWNUM rnum FROM ({}) q WHERE ROWNUM <= {}) WHERE rnum > {}",
                    sql, max_ph, min_ph
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cql_filter::{FilterCompiler, FilterLanguage};
    use feature_common::{BoundingBox, Crs, FieldDef};
    use feature_query::ResultType;

    fn roads() -> LayerMetadata {
        LayerMetadata {
            collection_id: "roads".into(),
            table: "roads".into(),
            schema: Some("public".into()),
            id_field: "id".into(),
            geometry_field: "geom".into(),
            temporal_field: Some("updated".into()),
            collection_field: None,
            srid: 4326,
            fields: vec![
                FieldDef::new("id", FieldType::Int),
                FieldDef::new("name", FieldType::Text),
                FieldDef::new("updated", FieldType::Timestamp),
                FieldDef::new("geom", FieldType::Geometry),
            ],
            supported_crs: vec![],
            max_record_count: None,
        }
    }

    fn base_query() -> FeatureQuery {
        FeatureQuery {
            limit: 10,
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

    #[test]
    fn test_plain_select_postgres() {
        let profile = VendorProfile::postgres();
        let layer = roads();
        let built = QueryBuilder::new(&profile, &layer)
            .build_select(&base_query(), false)
            .unwrap();

        assert_eq!(
            built.sql,
            "SELECT \"id\", \"name\", \"updated\", ST_AsGeoJSON(\"geom\") AS \"geom\" \
             FROM \"public\".\"roads\" ORDER BY \"id\" ASC LIMIT $1 OFFSET $2"
        );
        assert_eq!(built.params[0].1, SqlParam::Int(10));
        assert_eq!(built.params[1].1, SqlParam::Int(0));
    }

    #[test]
    fn test_lookahead_fetches_one_extra_row() {
        let profile = VendorProfile::postgres();
        let layer = roads();
        let built = QueryBuilder::new(&profile, &layer)
            .build_select(&base_query(), true)
            .unwrap();
        assert_eq!(built.params[0].1, SqlParam::Int(11));
    }

    #[test]
    fn test_projection_always_includes_id() {
        let profile = VendorProfile::postgres();
        let layer = roads();
        let mut query = base_query();
        query.property_names = Some(vec!["name".into(), "no_such_field".into()]);

        let built = QueryBuilder::new(&profile, &layer)
            .build_select(&query, false)
            .unwrap();
        assert!(built.sql.starts_with("SELECT \"id\", \"name\" FROM"));
        // Unknown properties are skipped, not errors.
        assert!(!built.sql.contains("no_such_field"));
    }

    #[test]
    fn test_where_combines_bbox_temporal_filter() {
        let profile = VendorProfile::postgres();
        let layer = roads();
        let mut query = base_query();
        query.bbox = Some(BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        query.temporal =
            Some(TemporalInterval::from_query_string("2024-01-01T00:00:00Z/..").unwrap());
        query.filter = Some(
            FilterCompiler::new(&layer)
                .compile("name = 'Main St'", Some(FilterLanguage::CqlText))
                .unwrap(),
        );

        let built = QueryBuilder::new(&profile, &layer)
            .build_select(&query, false)
            .unwrap();
        assert!(built.sql.contains("\"geom\" && ST_MakeEnvelope"));
        assert!(built.sql.contains("ST_Intersects"));
        assert!(built.sql.contains("\"updated\" >="));
        assert!(built.sql.contains("\"name\" ="));
    }

    #[test]
    fn test_datetime_without_temporal_field_rejected() {
        let profile = VendorProfile::postgres();
        let mut layer = roads();
        layer.temporal_field = None;
        let mut query = base_query();
        query.temporal =
            Some(TemporalInterval::from_query_string("2024-01-01T00:00:00Z").unwrap());

        let err = QueryBuilder::new(&profile, &layer)
            .build_select(&query, false)
            .unwrap_err();
        assert_eq!(err.parameter(), Some("datetime"));
    }

    #[test]
    fn test_pagination_styles() {
        let layer = roads();
        let mut query = base_query();
        query.limit = 20;
        query.offset = 40;

        let pg = QueryBuilder::new(&VendorProfile::postgres(), &layer)
            .build_select(&query, false)
            .unwrap();
        assert!(pg.sql.ends_with("LIMIT $1 OFFSET $2"));

        let mssql = QueryBuilder::new(&VendorProfile::sql_server(), &layer)
            .build_select(&query, false)
            .unwrap();
        assert!(mssql
            .sql
            .ends_with("OFFSET @p1 ROWS FETCH NEXT @p2 ROWS ONLY"));
        assert_eq!(mssql.params[0].1, SqlParam::Int(40));
        assert_eq!(mssql.params[1].1, SqlParam::Int(20));

        let oracle = QueryBuilder::new(&VendorProfile::oracle(), &layer)
            .build_select(&query, false)
            .unwrap();
        assert!(oracle.sql.starts_with("SELECT * FROM (SELECT q.*, ROWNUM rnum"));
        assert!(oracle.sql.ends_with("WHERE rnum > :p2"));
        assert_eq!(oracle.params[0].1, SqlParam::Int(60));
        assert_eq!(oracle.params[1].1, SqlParam::Int(40));
    }

    #[test]
    fn test_sort_orders_rendered_in_order() {
        let profile = VendorProfile::postgres();
        let layer = roads();
        let mut query = base_query();
        query.sort_orders = Some(vec![
            SortOrder {
                field: "name".into(),
                column: "name".into(),
                direction: SortDirection::Desc,
            },
            SortOrder {
                field: "id".into(),
                column: "id".into(),
                direction: SortDirection::Asc,
            },
        ]);

        let built = QueryBuilder::new(&profile, &layer)
            .build_select(&query, false)
            .unwrap();
        assert!(built.sql.contains("ORDER BY \"name\" DESC, \"id\" ASC"));
    }

    #[test]
    fn test_count_projects_no_feature_columns() {
        let profile = VendorProfile::postgres();
        let layer = roads();
        let mut query = base_query();
        query.result_type = ResultType::Hits;
        query.filter = Some(
            FilterCompiler::new(&layer)
                .compile("name = 'Main St'", None)
                .unwrap(),
        );

        let built = QueryBuilder::new(&profile, &layer).build_count(&query).unwrap();
        assert!(built.sql.starts_with("SELECT COUNT(*) AS \"count\" FROM"));
        assert!(!built.sql.contains("\"name\","));
        assert!(!built.sql.contains("ST_AsGeoJSON"));
        assert!(!built.sql.contains("ORDER BY"));
        assert!(!built.sql.contains("LIMIT"));
    }

    #[test]
    fn test_ids_filter_coerces_to_id_type() {
        let profile = VendorProfile::postgres();
        let layer = roads();
        let mut query = base_query();
        query.filter = Some(cql_filter::ids_filter(vec!["7".into(), "9".into()]));

        let built = QueryBuilder::new(&profile, &layer)
            .build_select(&query, false)
            .unwrap();
        assert!(built.sql.contains("\"id\" IN ($1, $2)"));
        assert_eq!(built.params[0].1, SqlParam::Int(7));

        query.filter = Some(cql_filter::ids_filter(vec!["seven".into()]));
        let err = QueryBuilder::new(&profile, &layer)
            .build_select(&query, false)
            .unwrap_err();
        assert_eq!(err.parameter(), Some("ids"));
    }

    #[test]
    fn test_limit_ceiling_fails_before_sql() {
        let profile = VendorProfile::postgres();
        let layer = roads();
        let mut query = base_query();
        query.limit = MAX_SQL_LIMIT + 1;

        let err = QueryBuilder::new(&profile, &layer)
            .build_select(&query, false)
            .unwrap_err();
        assert!(matches!(err, FeatureError::LimitOutOfRange(_)));
    }

    #[test]
    fn test_determinism_same_input_same_sql() {
        let profile = VendorProfile::postgres();
        let layer = roads();
        let compiler = FilterCompiler::new(&layer);
        let payload = r#"{"op":"and","args":[
            {"op":"=","args":[{"property":"name"},"Main St"]},
            {"op":">","args":[{"property":"id"},5]}
        ]}"#;

        let mut first = base_query();
        first.filter = Some(compiler.compile(payload, Some(FilterLanguage::Cql2Json)).unwrap());
        let mut second = base_query();
        second.filter = Some(compiler.compile(payload, Some(FilterLanguage::Cql2Json)).unwrap());

        let builder = QueryBuilder::new(&profile, &layer);
        let a = builder.build_select(&first, false).unwrap();
        let b = builder.build_select(&second, false).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_keyset_select_single_collection() {
        let profile = VendorProfile::postgres();
        let layer = roads();
        let cursor = KeysetCursor {
            collection_id: "roads".into(),
            item_id: "42".into(),
        };

        let built = QueryBuilder::new(&profile, &layer)
            .build_keyset_select(&base_query(), Some(&cursor), true)
            .unwrap();
        assert!(built.sql.contains("\"id\" > $1"));
        assert!(built.sql.contains("ORDER BY \"id\" ASC"));
        assert_eq!(built.params[0].1, SqlParam::Int(42));
    }

    #[test]
    fn test_keyset_tuple_comparison_forms() {
        let mut layer = roads();
        layer.collection_field = Some("collection".into());
        let cursor = KeysetCursor {
            collection_id: "roads".into(),
            item_id: "42".into(),
        };

        let pg = QueryBuilder::new(&VendorProfile::postgres(), &layer)
            .build_keyset_select(&base_query(), Some(&cursor), false)
            .unwrap();
        assert!(pg.sql.contains("(\"collection\", \"id\") > ($1, $2)"));

        let mysql = QueryBuilder::new(&VendorProfile::mysql(), &layer)
            .build_keyset_select(&base_query(), Some(&cursor), false)
            .unwrap();
        assert!(mysql
            .sql
            .contains("(`collection` > ? OR (`collection` = ? AND `id` > ?))"));
    }

    #[test]
    fn test_keyset_descending_flips_comparator() {
        let profile = VendorProfile::postgres();
        let layer = roads();
        let mut query = base_query();
        query.sort_orders = Some(vec![SortOrder {
            field: "id".into(),
            column: "id".into(),
            direction: SortDirection::Desc,
        }]);
        let cursor = KeysetCursor {
            collection_id: "roads".into(),
            item_id: "42".into(),
        };

        let built = QueryBuilder::new(&profile, &layer)
            .build_keyset_select(&query, Some(&cursor), false)
            .unwrap();
        assert!(built.sql.contains("\"id\" < $1"));
        assert!(built.sql.contains("ORDER BY \"id\" DESC"));
    }
}
