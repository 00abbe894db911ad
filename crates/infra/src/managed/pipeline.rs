//! End-to-end managed forecasting run.
//!
//! prepare → group → dataset → upload → import (wait) → predictor (wait) →
//! forecast (wait) → query. Every created handle goes into the
//! [`ResourceLedger`] the moment it exists, so a run that is abandoned
//! half-way still leaves a record for the sweeper.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::json;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, info, instrument, warn};

use vendorflow_forecast::{
    DataQualitySignals, ForecastRequest, ForecastResult, Observation, Prediction, QualityMetrics,
    ResultMethod, prepare_daily_series,
};

use crate::config::{ForecastConfig, ManagedBackendSettings, PipelineTimeouts};

use super::backend::{
    AttributeType, DataUpload, DatasetGroupSpec, DatasetSpec, ForecastQuery, ForecastSpec,
    ImportJobSpec, ManagedForecastBackend, PredictorSpec, QuantileSeries, ResourceHandle,
    ResourceKind, ResourceStatus, ResourceTags, SchemaAttribute,
};
use super::ledger::ResourceLedger;
use super::stage::{PipelineError, PipelineJob, StageEvent};
use super::sweeper::{SweepReport, delete_resources};

pub const MANAGED_ALGORITHM_ARN: &str = "arn:aws:forecast:::algorithm/Prophet";
/// Predictor horizon; longer requests come back `partial`.
pub const MANAGED_HORIZON_DAYS: u32 = 30;
pub const DAILY_FREQUENCY: &str = "D";
pub const FORECAST_QUANTILES: [&str; 3] = ["0.1", "0.5", "0.9"];
pub const MANAGED_CONFIDENCE: f64 = 0.9;

const ALGORITHM_LABEL: &str = "managed_prophet";
const NAME_PREFIX: &str = "vf";
/// Stand-in deadline for limits too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

pub struct ManagedForecastPipeline<B> {
    backend: Arc<B>,
    settings: ManagedBackendSettings,
    timeouts: PipelineTimeouts,
    auto_cleanup: bool,
    ledger: Arc<ResourceLedger>,
}

impl<B> Clone for ManagedForecastPipeline<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            settings: self.settings.clone(),
            timeouts: self.timeouts,
            auto_cleanup: self.auto_cleanup,
            ledger: self.ledger.clone(),
        }
    }
}

impl<B: ManagedForecastBackend> ManagedForecastPipeline<B> {
    pub fn new(backend: Arc<B>, config: &ForecastConfig, ledger: Arc<ResourceLedger>) -> Self {
        Self {
            backend,
            settings: config.managed.clone(),
            timeouts: config.timeouts,
            auto_cleanup: config.auto_cleanup,
            ledger,
        }
    }

    /// Both our settings and the client are ready.
    pub fn is_available(&self) -> bool {
        self.settings.is_configured() && self.backend.is_configured()
    }

    pub fn ledger(&self) -> &Arc<ResourceLedger> {
        &self.ledger
    }

    #[instrument(
        skip(self, request, series, signals),
        fields(tenant = %request.tenant_id, item = %request.item_id),
        err
    )]
    pub async fn run(
        &self,
        request: &ForecastRequest,
        series: &[Observation],
        signals: &DataQualitySignals,
    ) -> Result<ForecastResult, PipelineError> {
        if !self.is_available() {
            return Err(PipelineError::NotConfigured);
        }

        let mut job = PipelineJob::new(request.tenant_id, request.item_id.clone());
        info!(job = %job.job_id, "managed pipeline started");

        let outcome = self.drive(&mut job, request, series, signals).await;
        match &outcome {
            Ok(result) => info!(
                job = %job.job_id,
                points = result.predictions.len(),
                status = ?result.status,
                "managed pipeline completed"
            ),
            Err(e) => {
                let stage = job.stage().kind();
                job.fail(e.to_string());
                warn!(job = %job.job_id, stage = %stage, error = %e, "managed pipeline failed");
            }
        }

        if self.auto_cleanup {
            self.cleanup(&job).await;
        }
        outcome
    }

    async fn drive(
        &self,
        job: &mut PipelineJob,
        request: &ForecastRequest,
        series: &[Observation],
        signals: &DataQualitySignals,
    ) -> Result<ForecastResult, PipelineError> {
        let prepared = prepare_daily_series(&request.item_id, series)
            .map_err(|e| PipelineError::Preparation(e.to_string()))?;
        let start_date = prepared
            .last_date()
            .and_then(|d| d.succ_opt())
            .ok_or_else(|| PipelineError::Preparation("prepared series is empty".to_string()))?;
        let (Some(bucket), Some(role_arn)) = (&self.settings.bucket, &self.settings.role_arn) else {
            return Err(PipelineError::NotConfigured);
        };

        let base = resource_name(job);
        let tags = resource_tags(job);

        job.ensure_active()?;
        let group = self
            .backend
            .create_dataset_group(&DatasetGroupSpec {
                name: format!("{base}_group"),
                tags: tags.clone(),
            })
            .await
            .map_err(|e| PipelineError::call(job.stage().kind(), "create_dataset_group", e))?;
        self.track(job, ResourceKind::DatasetGroup, &group);
        job.advance(StageEvent::GroupCreated(group.clone()))?;

        let dataset = self
            .backend
            .create_dataset(&DatasetSpec {
                name: format!("{base}_dataset"),
                group: group.clone(),
                frequency: DAILY_FREQUENCY,
                schema: daily_schema(),
                tags: tags.clone(),
            })
            .await
            .map_err(|e| PipelineError::call(job.stage().kind(), "create_dataset", e))?;
        self.track(job, ResourceKind::Dataset, &dataset);
        job.advance(StageEvent::DatasetCreated(dataset.clone()))?;

        let mut metadata = BTreeMap::new();
        metadata.insert("tenant-id".to_string(), job.tenant_id.to_string());
        metadata.insert("item-id".to_string(), job.item_id.to_string());
        metadata.insert("job-id".to_string(), job.job_id.to_string());
        metadata.insert("rows".to_string(), prepared.len().to_string());
        let source_uri = self
            .backend
            .put_data(&DataUpload {
                bucket: bucket.clone(),
                key: format!(
                    "forecast-data/{}/{}/{}.csv",
                    job.tenant_id,
                    sanitize(job.item_id.as_str(), usize::MAX),
                    job.job_id
                ),
                body: prepared.to_csv(),
                content_type: "text/csv",
                metadata,
            })
            .await
            .map_err(|e| PipelineError::call(job.stage().kind(), "put_data", e))?;
        job.advance(StageEvent::DataUploaded(source_uri.clone()))?;

        let import_job = self
            .backend
            .create_import_job(&ImportJobSpec {
                name: format!("{base}_import"),
                dataset: dataset.clone(),
                source_uri,
                role_arn: role_arn.clone(),
                tags: tags.clone(),
            })
            .await
            .map_err(|e| PipelineError::call(job.stage().kind(), "create_import_job", e))?;
        self.track(job, ResourceKind::ImportJob, &import_job);
        job.advance(StageEvent::ImportStarted(import_job.clone()))?;
        self.wait_for(job, ResourceKind::ImportJob, &import_job, self.timeouts.import)
            .await?;
        job.advance(StageEvent::ImportCompleted)?;

        let predictor = self
            .backend
            .create_predictor(&PredictorSpec {
                name: format!("{base}_predictor"),
                group: group.clone(),
                horizon_days: MANAGED_HORIZON_DAYS,
                frequency: DAILY_FREQUENCY,
                algorithm: MANAGED_ALGORITHM_ARN,
                dimensions: vec!["item_id".to_string()],
                tags: tags.clone(),
            })
            .await
            .map_err(|e| PipelineError::call(job.stage().kind(), "create_predictor", e))?;
        self.track(job, ResourceKind::Predictor, &predictor);
        job.advance(StageEvent::PredictorStarted(predictor.clone()))?;
        self.wait_for(job, ResourceKind::Predictor, &predictor, self.timeouts.predictor)
            .await?;
        job.advance(StageEvent::PredictorCompleted)?;

        let forecast = self
            .backend
            .create_forecast(&ForecastSpec {
                name: format!("{base}_forecast"),
                predictor: predictor.clone(),
                quantiles: FORECAST_QUANTILES.to_vec(),
                tags,
            })
            .await
            .map_err(|e| PipelineError::call(job.stage().kind(), "create_forecast", e))?;
        self.track(job, ResourceKind::Forecast, &forecast);
        job.advance(StageEvent::ForecastStarted(forecast.clone()))?;
        self.wait_for(job, ResourceKind::Forecast, &forecast, self.timeouts.forecast)
            .await?;
        job.advance(StageEvent::ForecastCompleted)?;

        job.ensure_active()?;
        let quantiles = self
            .backend
            .query_forecast(&ForecastQuery {
                forecast: forecast.clone(),
                item_id: request.item_id.clone(),
                start_date,
            })
            .await
            .map_err(|e| PipelineError::call(job.stage().kind(), "query_forecast", e))?;
        job.advance(StageEvent::ResultsRetrieved)?;

        let quality = QualityMetrics::new(ALGORITHM_LABEL, MANAGED_CONFIDENCE, prepared.len())
            .with_signals(*signals);
        Ok(ForecastResult::from_predictions(
            ResultMethod::ManagedCloud,
            request.horizon,
            pivot_quantiles(&quantiles),
            quality,
        )
        .with_metadata(json!({
            "tenant_id": request.tenant_id.to_string(),
            "item_id": request.item_id.as_str(),
            "vendor_id": request.vendor_id.as_str(),
            "job_id": job.job_id.to_string(),
            "forecast_handle": forecast.as_str(),
            "predictor_handle": predictor.as_str(),
            "algorithm": ALGORITHM_LABEL,
            "data_points_used": prepared.len(),
        })))
    }

    fn track(&self, job: &PipelineJob, kind: ResourceKind, handle: &ResourceHandle) {
        debug!(job = %job.job_id, kind = %kind, handle = %handle, "managed resource created");
        self.ledger
            .record(job.job_id, job.tenant_id, kind, handle.clone());
    }

    /// Poll `describe` until the resource is active or failed. Both the
    /// polling and each individual call are bounded by `limit`.
    async fn wait_for(
        &self,
        job: &mut PipelineJob,
        kind: ResourceKind,
        handle: &ResourceHandle,
        limit: Duration,
    ) -> Result<(), PipelineError> {
        let stage = job.stage().kind();
        let now = Instant::now();
        let deadline = now.checked_add(limit).unwrap_or_else(|| now + FAR_FUTURE);
        job.set_deadline(Some(deadline));

        let outcome = loop {
            job.ensure_active()?;
            let Ok(described) = timeout_at(deadline, self.backend.describe(kind, handle)).await else {
                warn!(job = %job.job_id, stage = %stage, "status check still pending at the stage deadline");
                break Err(PipelineError::Timeout {
                    stage,
                    waited: limit,
                });
            };
            match described {
                Ok(ResourceStatus::Active) => {
                    debug!(job = %job.job_id, stage = %stage, "stage completed");
                    break Ok(());
                }
                Ok(status) if status.is_failure() => {
                    break Err(PipelineError::StageFailed {
                        stage,
                        status: status.to_string(),
                    });
                }
                Ok(status) => {
                    debug!(job = %job.job_id, stage = %stage, status = %status, "stage in progress");
                }
                Err(e) => {
                    warn!(job = %job.job_id, stage = %stage, error = %e, "status check failed; polling continues");
                }
            }

            sleep(self.timeouts.poll_interval).await;
            if Instant::now() >= deadline {
                break Err(PipelineError::Timeout {
                    stage,
                    waited: limit,
                });
            }
        };

        job.set_deadline(None);
        outcome
    }

    /// Best-effort removal of everything `job` created. Failures are logged
    /// and the handles stay in the ledger for the sweeper.
    pub async fn cleanup(&self, job: &PipelineJob) -> SweepReport {
        let handles = job.handles();
        if handles.is_empty() {
            return SweepReport::default();
        }
        let report =
            delete_resources(self.backend.as_ref(), &self.ledger, handles.deletion_order()).await;
        if report.failed > 0 {
            warn!(job = %job.job_id, failed = report.failed, "managed cleanup incomplete");
        }
        report
    }
}

fn daily_schema() -> Vec<SchemaAttribute> {
    vec![
        SchemaAttribute {
            name: "timestamp",
            attribute_type: AttributeType::Timestamp,
        },
        SchemaAttribute {
            name: "target_value",
            attribute_type: AttributeType::Float,
        },
        SchemaAttribute {
            name: "item_id",
            attribute_type: AttributeType::String,
        },
    ]
}

/// Backend names allow `[A-Za-z0-9_]`, start with a letter, max 63 chars.
fn resource_name(job: &PipelineJob) -> String {
    let uuid = job.job_id.as_uuid().simple().to_string();
    let suffix = &uuid[uuid.len() - 16..];
    format!("{NAME_PREFIX}_{}_{suffix}", sanitize(job.item_id.as_str(), 20))
}

fn sanitize(raw: &str, max: usize) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(max)
        .collect()
}

fn resource_tags(job: &PipelineJob) -> ResourceTags {
    vec![
        ("tenant_id".to_string(), job.tenant_id.to_string()),
        ("item_id".to_string(), job.item_id.to_string()),
        ("job_id".to_string(), job.job_id.to_string()),
        ("created_by".to_string(), "vendorflow".to_string()),
    ]
}

/// Pivot per-quantile series into one prediction per date.
///
/// Dates without a median are dropped; a missing bound collapses onto the
/// median.
pub fn pivot_quantiles(series: &[QuantileSeries]) -> Vec<Prediction> {
    let mut by_date: BTreeMap<NaiveDate, HashMap<&str, f64>> = BTreeMap::new();
    for s in series {
        let Some(label) = FORECAST_QUANTILES.iter().find(|q| **q == s.quantile) else {
            continue;
        };
        for point in &s.points {
            by_date
                .entry(point.timestamp)
                .or_default()
                .insert(*label, point.value);
        }
    }

    by_date
        .into_iter()
        .filter_map(|(date, values)| {
            let point = *values.get("0.5")?;
            let lower = values.get("0.1").copied().unwrap_or(point);
            let upper = values.get("0.9").copied().unwrap_or(point);
            Some(Prediction::new(date, point, lower, upper))
        })
        .collect()
}
