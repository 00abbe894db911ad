//! Historical series retrieval.
//!
//! The engine only needs one read: a tenant-scoped daily series for an item,
//! vendor and metric over a date window. Sources return an empty series when
//! there is no data; errors are reserved for the source itself failing.

pub mod postgres;

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

use vendorflow_core::{ItemId, TenantId, VendorId};
use vendorflow_forecast::{DateRange, ForecastRequest, Metric, Observation};

pub use postgres::PostgresHistoricalData;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesQuery {
    pub tenant_id: TenantId,
    pub item_id: ItemId,
    pub vendor_id: VendorId,
    pub metric: Metric,
    pub range: DateRange,
}

impl SeriesQuery {
    /// Training history for a forecast request.
    pub fn for_request(request: &ForecastRequest) -> Self {
        Self {
            tenant_id: request.tenant_id,
            item_id: request.item_id.clone(),
            vendor_id: request.vendor_id.clone(),
            metric: request.metric,
            range: request.history_range(),
        }
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history query failed in {operation}: {message}")]
    Query {
        operation: &'static str,
        message: String,
    },
}

#[async_trait]
pub trait HistoricalDataSource: Send + Sync + 'static {
    /// Observations ordered by date, restricted to `query.range`.
    async fn get_series(&self, query: &SeriesQuery) -> Result<Vec<Observation>, HistoryError>;
}

type SeriesKey = (TenantId, ItemId, VendorId, Metric);

/// In-memory source for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryHistoricalData {
    inner: RwLock<HashMap<SeriesKey, Vec<Observation>>>,
}

impl InMemoryHistoricalData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the series stored for a key.
    pub fn insert(
        &self,
        tenant_id: TenantId,
        item_id: ItemId,
        vendor_id: VendorId,
        metric: Metric,
        mut series: Vec<Observation>,
    ) {
        series.sort_by_key(|o| o.date);
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((tenant_id, item_id, vendor_id, metric), series);
    }
}

#[async_trait]
impl HistoricalDataSource for InMemoryHistoricalData {
    async fn get_series(&self, query: &SeriesQuery) -> Result<Vec<Observation>, HistoryError> {
        let key = (
            query.tenant_id,
            query.item_id.clone(),
            query.vendor_id.clone(),
            query.metric,
        );
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(inner
            .get(&key)
            .map(|series| {
                series
                    .iter()
                    .filter(|o| query.range.contains(o.date))
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn in_memory_source_is_tenant_scoped_and_ranged() {
        let source = InMemoryHistoricalData::new();
        let tenant = TenantId::new();
        let item = ItemId::new("item").unwrap();
        let vendor = VendorId::new("vendor").unwrap();
        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        source.insert(
            tenant,
            item.clone(),
            vendor.clone(),
            Metric::Demand,
            vec![Observation::new(d(3), 3.0), Observation::new(d(1), 1.0), Observation::new(d(2), 2.0)],
        );

        let mut query = SeriesQuery {
            tenant_id: tenant,
            item_id: item.clone(),
            vendor_id: vendor.clone(),
            metric: Metric::Demand,
            range: DateRange::until(d(2)),
        };
        let got = source.get_series(&query).await.unwrap();
        assert_eq!(got.iter().map(|o| o.date).collect::<Vec<_>>(), vec![d(1), d(2)]);

        query.tenant_id = TenantId::new();
        assert!(source.get_series(&query).await.unwrap().is_empty());

        query.tenant_id = tenant;
        query.metric = Metric::Cost;
        assert!(source.get_series(&query).await.unwrap().is_empty());
    }
}
