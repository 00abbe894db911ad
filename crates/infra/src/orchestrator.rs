//! Forecast orchestration: method selection, dispatch, hybrid fusion and
//! the seasonal-local fallback.
//!
//! Callers only ever see two errors: `InvalidInput` for requests that can
//! never succeed, and `TerminalFailure` once every method has been tried.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use vendorflow_forecast::{
    DataQualitySignals, ForecastError, ForecastMethod, ForecastRequest, ForecastResult, LocalMethod,
    Observation, ResultMethod, SelectionPolicy, assess, fuse, select_method,
};

use crate::budget::ConcurrencyBudget;
use crate::config::ForecastConfig;
use crate::history::{HistoricalDataSource, SeriesQuery};
use crate::local::{LocalForecastRunner, LocalModel};
use crate::managed::{
    CleanupSweeper, ManagedForecastBackend, ManagedForecastPipeline, ResourceLedger, SweepReport,
    SweeperHandle,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub managed_available: bool,
    pub in_flight_managed: usize,
    pub max_managed: usize,
    /// Managed resources not yet deleted remotely.
    pub tracked_resources: usize,
    pub generated_at: DateTime<Utc>,
}

pub struct ForecastOrchestrator<H, M, B> {
    history: Arc<H>,
    local: LocalForecastRunner<M>,
    managed: ManagedForecastPipeline<B>,
    backend: Arc<B>,
    budget: ConcurrencyBudget,
    policy: SelectionPolicy,
    hybrid_wait: Duration,
    config: ForecastConfig,
}

impl<H, M, B> ForecastOrchestrator<H, M, B>
where
    H: HistoricalDataSource,
    M: LocalModel,
    B: ManagedForecastBackend,
{
    pub fn new(config: &ForecastConfig, history: Arc<H>, model: Arc<M>, backend: Arc<B>) -> Self {
        let ledger = Arc::new(ResourceLedger::new());
        Self {
            history,
            local: LocalForecastRunner::new(model),
            managed: ManagedForecastPipeline::new(backend.clone(), config, ledger),
            backend,
            budget: ConcurrencyBudget::new(config.max_concurrent_managed_jobs),
            policy: config.selection_policy(),
            hybrid_wait: config.hybrid_wait,
            config: config.clone(),
        }
    }

    pub fn history(&self) -> &Arc<H> {
        &self.history
    }

    pub fn budget(&self) -> &ConcurrencyBudget {
        &self.budget
    }

    pub fn ledger(&self) -> &Arc<ResourceLedger> {
        self.managed.ledger()
    }

    #[instrument(
        skip(self, request),
        fields(tenant = %request.tenant_id, item = %request.item_id, horizon = request.horizon),
        err
    )]
    pub async fn generate(&self, request: &ForecastRequest) -> Result<ForecastResult, ForecastError> {
        request.validate()?;

        let series = self
            .history
            .get_series(&SeriesQuery::for_request(request))
            .await
            .map_err(|e| ForecastError::TerminalFailure(format!("historical data unavailable: {e}")))?;
        if series.is_empty() {
            return Err(ForecastError::InvalidInput(
                "no historical data available for forecasting".to_string(),
            ));
        }

        let signals = assess(&series);
        let capacity = self.budget.capacity(self.managed.is_available());
        let method = select_method(
            &signals,
            request.preferred_method,
            request.force_method,
            capacity,
            &self.policy,
        );
        info!(
            method = %method,
            points = signals.point_count,
            completeness = signals.completeness,
            in_flight = capacity.in_flight,
            "forecast method selected"
        );

        let result = match self.dispatch(method, request, &series, &signals).await {
            Ok(result) => result,
            Err(e) if e.is_seasonal_failure() => {
                warn!(method = %method, error = %e, "seasonal local forecast failed; no fallback left");
                return Err(ForecastError::TerminalFailure(e.to_string()));
            }
            Err(e) => {
                warn!(method = %method, error = %e, "forecast method failed; falling back to seasonal local");
                let fallback = self
                    .local
                    .run(LocalMethod::Seasonal, request, &series, &signals)
                    .await
                    .map_err(|fallback| {
                        ForecastError::TerminalFailure(format!(
                            "{method} failed ({e}); seasonal fallback failed ({fallback})"
                        ))
                    })?;
                mark_fallback(fallback, method, &e)
            }
        };

        let requested = request
            .preferred_method
            .filter(|preferred| !honours(*preferred, &result));
        Ok(result.with_requested_method(requested))
    }

    async fn dispatch(
        &self,
        method: ForecastMethod,
        request: &ForecastRequest,
        series: &[Observation],
        signals: &DataQualitySignals,
    ) -> Result<ForecastResult, ForecastError> {
        match method {
            ForecastMethod::ManagedCloud => self.run_managed(request, series, signals).await,
            ForecastMethod::Hybrid => self.run_hybrid(request, series, signals).await,
            ForecastMethod::SeasonalLocal => {
                self.local
                    .run(LocalMethod::Seasonal, request, series, signals)
                    .await
            }
            ForecastMethod::TreeLocal => {
                self.local
                    .run(LocalMethod::Tree, request, series, signals)
                    .await
            }
        }
    }

    async fn run_managed(
        &self,
        request: &ForecastRequest,
        series: &[Observation],
        signals: &DataQualitySignals,
    ) -> Result<ForecastResult, ForecastError> {
        if !self.managed.is_available() {
            return Err(ForecastError::BackendUnavailable(
                "managed backend is not configured".to_string(),
            ));
        }
        let Some(_permit) = self.budget.try_acquire() else {
            return Err(ForecastError::BackendUnavailable(format!(
                "managed job budget exhausted ({} in flight)",
                self.budget.max()
            )));
        };

        let result = self.managed.run(request, series, signals).await?;
        if result.predictions.is_empty() {
            return Err(ForecastError::StageFailure {
                stage: "results_retrieved".to_string(),
                reason: "managed forecast returned no predictions".to_string(),
            });
        }
        Ok(result)
    }

    /// Managed and seasonal-local concurrently; only the managed branch is
    /// bounded by `hybrid_wait`.
    async fn run_hybrid(
        &self,
        request: &ForecastRequest,
        series: &[Observation],
        signals: &DataQualitySignals,
    ) -> Result<ForecastResult, ForecastError> {
        let managed = async {
            let permit = if self.managed.is_available() {
                self.budget.try_acquire()
            } else {
                None
            };
            let Some(_permit) = permit else {
                debug!("hybrid run without managed branch");
                return None;
            };

            match timeout(self.hybrid_wait, self.managed.run(request, series, signals)).await {
                Ok(Ok(result)) => Some(result),
                Ok(Err(e)) => {
                    warn!(error = %e, "managed branch of hybrid run failed");
                    None
                }
                Err(_) => {
                    warn!(
                        wait_secs = self.hybrid_wait.as_secs(),
                        tracked = self.managed.ledger().len(),
                        "managed branch of hybrid run timed out; resources left for the sweeper"
                    );
                    None
                }
            }
        };
        let local = self.local.run(LocalMethod::Seasonal, request, series, signals);

        let (managed, local) = tokio::join!(managed, local);
        fuse(managed, local)
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            managed_available: self.managed.is_available(),
            in_flight_managed: self.budget.in_flight(),
            max_managed: self.budget.max(),
            tracked_resources: self.managed.ledger().len(),
            generated_at: Utc::now(),
        }
    }

    fn sweeper(&self) -> CleanupSweeper<B> {
        CleanupSweeper::new(self.backend.clone(), self.managed.ledger().clone(), &self.config)
    }

    /// One sweep of managed resources past the retention period.
    pub async fn cleanup_expired(&self) -> SweepReport {
        self.sweeper().sweep_once().await
    }

    /// Start the periodic sweeper on the current runtime.
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        self.sweeper().spawn()
    }
}

/// Whether `result` is what a caller asking for `preferred` expects.
fn honours(preferred: ForecastMethod, result: &ForecastResult) -> bool {
    match preferred {
        ForecastMethod::ManagedCloud => result.method == ResultMethod::ManagedCloud,
        ForecastMethod::SeasonalLocal => result.method == ResultMethod::SeasonalLocal,
        ForecastMethod::TreeLocal => result.method == ResultMethod::TreeLocal,
        ForecastMethod::Hybrid => result.combined,
    }
}

fn mark_fallback(mut result: ForecastResult, failed: ForecastMethod, error: &ForecastError) -> ForecastResult {
    if let JsonValue::Object(map) = &mut result.metadata {
        map.insert("fallback_from".to_string(), JsonValue::from(failed.as_str()));
        map.insert("fallback_reason".to_string(), JsonValue::from(error.to_string()));
    }
    result
}
