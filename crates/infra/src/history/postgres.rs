//! Postgres-backed historical series.
//!
//! Reads daily aggregates maintained by the order pipeline:
//!
//! | metric | table | value column |
//! |--------|-------|--------------|
//! | demand | `demand_history` | `quantity` |
//! | cost   | `cost_history`   | `amount`   |
//!
//! Both tables are keyed by `(tenant_id, item_id, vendor_id, day)`; a `NULL`
//! value marks a day with a row but no usable measurement.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use tracing::{Span, instrument};

use vendorflow_forecast::{Metric, Observation};

use super::{HistoricalDataSource, HistoryError, SeriesQuery};

pub struct PostgresHistoricalData {
    pool: Arc<PgPool>,
}

impl PostgresHistoricalData {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn series_sql(metric: Metric) -> &'static str {
    match metric {
        Metric::Demand => {
            r#"
            SELECT day, quantity::double precision AS value
            FROM demand_history
            WHERE tenant_id = $1
                AND item_id = $2
                AND vendor_id = $3
                AND ($4::date IS NULL OR day >= $4)
                AND ($5::date IS NULL OR day <= $5)
            ORDER BY day ASC
            "#
        }
        Metric::Cost => {
            r#"
            SELECT day, amount::double precision AS value
            FROM cost_history
            WHERE tenant_id = $1
                AND item_id = $2
                AND vendor_id = $3
                AND ($4::date IS NULL OR day >= $4)
                AND ($5::date IS NULL OR day <= $5)
            ORDER BY day ASC
            "#
        }
    }
}

#[async_trait]
impl HistoricalDataSource for PostgresHistoricalData {
    #[instrument(
        skip(self, query),
        fields(tenant_id = %query.tenant_id, item_id = %query.item_id, metric = query.metric.as_str(), row_count),
        err
    )]
    async fn get_series(&self, query: &SeriesQuery) -> Result<Vec<Observation>, HistoryError> {
        let rows = sqlx::query(series_sql(query.metric))
            .bind(query.tenant_id.as_uuid())
            .bind(query.item_id.as_str())
            .bind(query.vendor_id.as_str())
            .bind(query.range.start)
            .bind(query.range.end)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_series", e))?;

        let mut series = Vec::with_capacity(rows.len());
        for row in rows {
            let date: NaiveDate = row
                .try_get("day")
                .map_err(|e| map_sqlx_error("get_series.day", e))?;
            let value: Option<f64> = row
                .try_get("value")
                .map_err(|e| map_sqlx_error("get_series.value", e))?;
            series.push(Observation { date, value });
        }

        Span::current().record("row_count", series.len());
        Ok(series)
    }
}

fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> HistoryError {
    let message = match err {
        sqlx::Error::Database(db_err) => format!("database error: {}", db_err.message()),
        sqlx::Error::PoolClosed => "connection pool closed".to_string(),
        sqlx::Error::ColumnNotFound(column) => format!("column not found: {column}"),
        other => format!("sqlx error: {other}"),
    };
    HistoryError::Query { operation, message }
}
