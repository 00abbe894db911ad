//! Backtest a forecast against recorded actuals.

use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use tracing::{info, instrument, warn};

use vendorflow_core::{ItemId, TenantId, VendorId};
use vendorflow_forecast::{
    AccuracyError, AccuracyReport, DateRange, EvaluationPeriod, ForecastRequest, MAX_HORIZON, Metric,
    compare,
};

use crate::history::{HistoricalDataSource, SeriesQuery};
use crate::local::LocalModel;
use crate::managed::ManagedForecastBackend;
use crate::orchestrator::ForecastOrchestrator;

pub struct AccuracyEvaluator<H, M, B> {
    orchestrator: Arc<ForecastOrchestrator<H, M, B>>,
}

impl<H, M, B> AccuracyEvaluator<H, M, B>
where
    H: HistoricalDataSource,
    M: LocalModel,
    B: ManagedForecastBackend,
{
    pub fn new(orchestrator: Arc<ForecastOrchestrator<H, M, B>>) -> Self {
        Self { orchestrator }
    }

    /// Score the trailing `days_back` days up to today.
    pub async fn evaluate(
        &self,
        tenant_id: TenantId,
        item_id: &ItemId,
        vendor_id: &VendorId,
        days_back: u32,
    ) -> Result<AccuracyReport, AccuracyError> {
        let today = Utc::now().date_naive();
        self.evaluate_as_of(tenant_id, item_id, vendor_id, days_back, today)
            .await
    }

    /// Score the window `[end - days_back, end]`.
    ///
    /// The forecast is trained only on history before the window start, so
    /// its predictions cover the same dates as the actuals.
    #[instrument(skip(self, item_id, vendor_id), fields(tenant = %tenant_id, item = %item_id), err)]
    pub async fn evaluate_as_of(
        &self,
        tenant_id: TenantId,
        item_id: &ItemId,
        vendor_id: &VendorId,
        days_back: u32,
        end: NaiveDate,
    ) -> Result<AccuracyReport, AccuracyError> {
        if days_back == 0 || days_back > MAX_HORIZON {
            return Err(AccuracyError::InvalidWindow(format!(
                "days_back must be within 1..={MAX_HORIZON}, got {days_back}"
            )));
        }
        let start = end
            .checked_sub_days(Days::new(u64::from(days_back)))
            .ok_or_else(|| AccuracyError::InvalidWindow(format!("window before {end} is out of range")))?;

        let actuals = self
            .orchestrator
            .history()
            .get_series(&SeriesQuery {
                tenant_id,
                item_id: item_id.clone(),
                vendor_id: vendor_id.clone(),
                metric: Metric::Demand,
                range: DateRange::between(start, end),
            })
            .await
            .map_err(|e| AccuracyError::History(e.to_string()))?;
        if actuals.iter().all(|o| o.finite_value().is_none()) {
            return Err(AccuracyError::NoActualData);
        }

        let request =
            ForecastRequest::new(tenant_id, item_id.clone(), vendor_id.clone(), days_back).with_as_of(start);
        let forecast = self.orchestrator.generate(&request).await.map_err(|e| {
            warn!(error = %e, "forecast for accuracy evaluation failed");
            AccuracyError::Forecast(e.to_string())
        })?;

        let (metrics, compared) = compare(&actuals, &forecast.predictions)?;
        info!(
            method = %forecast.method,
            compared,
            mae = metrics.mae,
            "accuracy evaluation finished"
        );

        Ok(AccuracyReport {
            accuracy_metrics: metrics,
            evaluation_period: EvaluationPeriod {
                start_date: start,
                end_date: end,
                days_evaluated: compared,
            },
            method_used: forecast.method,
            data_points_compared: compared,
            generated_at: Utc::now(),
        })
    }
}
