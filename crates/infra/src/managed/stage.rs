//! Managed pipeline state machine.
//!
//! Stages are strictly sequential; `Failed` can be entered from any
//! non-terminal stage and nothing leaves `Failed` or `ResultsRetrieved`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use vendorflow_core::{ItemId, TenantId};
use vendorflow_forecast::ForecastError;

use super::backend::{BackendError, ResourceHandle, ResourceKind};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineJobId(Uuid);

impl PipelineJobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PipelineJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for PipelineJobId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Preparing,
    GroupCreated,
    DatasetCreated,
    DataUploaded,
    Importing,
    Imported,
    TrainingPredictor,
    PredictorReady,
    Forecasting,
    ForecastReady,
    ResultsRetrieved,
    Failed,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Preparing => "preparing",
            StageKind::GroupCreated => "group_created",
            StageKind::DatasetCreated => "dataset_created",
            StageKind::DataUploaded => "data_uploaded",
            StageKind::Importing => "importing",
            StageKind::Imported => "imported",
            StageKind::TrainingPredictor => "training_predictor",
            StageKind::PredictorReady => "predictor_ready",
            StageKind::Forecasting => "forecasting",
            StageKind::ForecastReady => "forecast_ready",
            StageKind::ResultsRetrieved => "results_retrieved",
            StageKind::Failed => "failed",
        }
    }
}

impl core::fmt::Display for StageKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handles of a run that has created its dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetHandles {
    pub group: ResourceHandle,
    pub dataset: ResourceHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportHandles {
    pub data: DatasetHandles,
    pub import_job: ResourceHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictorHandles {
    pub import: ImportHandles,
    pub predictor: ResourceHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastHandles {
    pub trained: PredictorHandles,
    pub forecast: ResourceHandle,
}

/// Current stage, carrying exactly the handles collected so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStage {
    Preparing,
    GroupCreated { group: ResourceHandle },
    DatasetCreated(DatasetHandles),
    DataUploaded { data: DatasetHandles, source_uri: String },
    Importing(ImportHandles),
    Imported(ImportHandles),
    TrainingPredictor(PredictorHandles),
    PredictorReady(PredictorHandles),
    Forecasting(ForecastHandles),
    ForecastReady(ForecastHandles),
    ResultsRetrieved(ForecastHandles),
    Failed {
        at: StageKind,
        handles: ResourceHandles,
        reason: String,
    },
}

impl PipelineStage {
    pub fn kind(&self) -> StageKind {
        match self {
            PipelineStage::Preparing => StageKind::Preparing,
            PipelineStage::GroupCreated { .. } => StageKind::GroupCreated,
            PipelineStage::DatasetCreated(_) => StageKind::DatasetCreated,
            PipelineStage::DataUploaded { .. } => StageKind::DataUploaded,
            PipelineStage::Importing(_) => StageKind::Importing,
            PipelineStage::Imported(_) => StageKind::Imported,
            PipelineStage::TrainingPredictor(_) => StageKind::TrainingPredictor,
            PipelineStage::PredictorReady(_) => StageKind::PredictorReady,
            PipelineStage::Forecasting(_) => StageKind::Forecasting,
            PipelineStage::ForecastReady(_) => StageKind::ForecastReady,
            PipelineStage::ResultsRetrieved(_) => StageKind::ResultsRetrieved,
            PipelineStage::Failed { .. } => StageKind::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStage::ResultsRetrieved(_) | PipelineStage::Failed { .. }
        )
    }

    pub fn handles(&self) -> ResourceHandles {
        fn dataset(d: &DatasetHandles) -> ResourceHandles {
            ResourceHandles {
                group: Some(d.group.clone()),
                dataset: Some(d.dataset.clone()),
                ..Default::default()
            }
        }
        fn import(i: &ImportHandles) -> ResourceHandles {
            ResourceHandles {
                import_job: Some(i.import_job.clone()),
                ..dataset(&i.data)
            }
        }
        fn trained(p: &PredictorHandles) -> ResourceHandles {
            ResourceHandles {
                predictor: Some(p.predictor.clone()),
                ..import(&p.import)
            }
        }
        fn forecast(f: &ForecastHandles) -> ResourceHandles {
            ResourceHandles {
                forecast: Some(f.forecast.clone()),
                ..trained(&f.trained)
            }
        }

        match self {
            PipelineStage::Preparing => ResourceHandles::default(),
            PipelineStage::GroupCreated { group } => ResourceHandles {
                group: Some(group.clone()),
                ..Default::default()
            },
            PipelineStage::DatasetCreated(d) | PipelineStage::DataUploaded { data: d, .. } => dataset(d),
            PipelineStage::Importing(i) | PipelineStage::Imported(i) => import(i),
            PipelineStage::TrainingPredictor(p) | PipelineStage::PredictorReady(p) => trained(p),
            PipelineStage::Forecasting(f)
            | PipelineStage::ForecastReady(f)
            | PipelineStage::ResultsRetrieved(f) => forecast(f),
            PipelineStage::Failed { handles, .. } => handles.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    GroupCreated(ResourceHandle),
    DatasetCreated(ResourceHandle),
    DataUploaded(String),
    ImportStarted(ResourceHandle),
    ImportCompleted,
    PredictorStarted(ResourceHandle),
    PredictorCompleted,
    ForecastStarted(ResourceHandle),
    ForecastCompleted,
    ResultsRetrieved,
}

impl StageEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StageEvent::GroupCreated(_) => "group_created",
            StageEvent::DatasetCreated(_) => "dataset_created",
            StageEvent::DataUploaded(_) => "data_uploaded",
            StageEvent::ImportStarted(_) => "import_started",
            StageEvent::ImportCompleted => "import_completed",
            StageEvent::PredictorStarted(_) => "predictor_started",
            StageEvent::PredictorCompleted => "predictor_completed",
            StageEvent::ForecastStarted(_) => "forecast_started",
            StageEvent::ForecastCompleted => "forecast_completed",
            StageEvent::ResultsRetrieved => "results_retrieved",
        }
    }
}

/// Next stage, or the unchanged stage back when `event` does not apply.
fn transition(stage: PipelineStage, event: StageEvent) -> Result<PipelineStage, PipelineStage> {
    use PipelineStage as S;
    use StageEvent as E;

    Ok(match (stage, event) {
        (S::Preparing, E::GroupCreated(group)) => S::GroupCreated { group },
        (S::GroupCreated { group }, E::DatasetCreated(dataset)) => {
            S::DatasetCreated(DatasetHandles { group, dataset })
        }
        (S::DatasetCreated(data), E::DataUploaded(source_uri)) => S::DataUploaded { data, source_uri },
        (S::DataUploaded { data, .. }, E::ImportStarted(import_job)) => {
            S::Importing(ImportHandles { data, import_job })
        }
        (S::Importing(import), E::ImportCompleted) => S::Imported(import),
        (S::Imported(import), E::PredictorStarted(predictor)) => {
            S::TrainingPredictor(PredictorHandles { import, predictor })
        }
        (S::TrainingPredictor(trained), E::PredictorCompleted) => S::PredictorReady(trained),
        (S::PredictorReady(trained), E::ForecastStarted(forecast)) => {
            S::Forecasting(ForecastHandles { trained, forecast })
        }
        (S::Forecasting(done), E::ForecastCompleted) => S::ForecastReady(done),
        (S::ForecastReady(done), E::ResultsRetrieved) => S::ResultsRetrieved(done),
        (stage, _) => return Err(stage),
    })
}

/// Every backend resource a run has created so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceHandles {
    pub group: Option<ResourceHandle>,
    pub dataset: Option<ResourceHandle>,
    pub import_job: Option<ResourceHandle>,
    pub predictor: Option<ResourceHandle>,
    pub forecast: Option<ResourceHandle>,
}

impl ResourceHandles {
    pub fn is_empty(&self) -> bool {
        self.deletion_order().is_empty()
    }

    /// Forecast, predictor, import job, dataset, group.
    pub fn deletion_order(&self) -> Vec<(ResourceKind, ResourceHandle)> {
        [
            (ResourceKind::Forecast, &self.forecast),
            (ResourceKind::Predictor, &self.predictor),
            (ResourceKind::ImportJob, &self.import_job),
            (ResourceKind::Dataset, &self.dataset),
            (ResourceKind::DatasetGroup, &self.group),
        ]
        .into_iter()
        .filter_map(|(kind, handle)| handle.clone().map(|h| (kind, h)))
        .collect()
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("managed backend is not configured")]
    NotConfigured,

    #[error("data preparation failed: {0}")]
    Preparation(String),

    #[error("{operation} failed during {stage}: {source}")]
    Call {
        stage: StageKind,
        operation: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("{stage} ended with status {status}")]
    StageFailed { stage: StageKind, status: String },

    #[error("{stage} did not complete within {}s", waited.as_secs())]
    Timeout { stage: StageKind, waited: Duration },

    #[error("illegal transition from {from} on {event}")]
    IllegalTransition { from: StageKind, event: &'static str },

    #[error("pipeline already failed at {at}")]
    AlreadyFailed { at: StageKind },
}

impl PipelineError {
    pub fn call(stage: StageKind, operation: &'static str, source: BackendError) -> Self {
        Self::Call {
            stage,
            operation,
            source,
        }
    }
}

impl From<PipelineError> for ForecastError {
    fn from(value: PipelineError) -> Self {
        let reason = value.to_string();
        match value {
            PipelineError::NotConfigured => {
                ForecastError::BackendUnavailable("managed backend is not configured".to_string())
            }
            PipelineError::Preparation(reason) => ForecastError::InvalidInput(reason),
            PipelineError::Timeout { stage, waited } => ForecastError::StageTimeout {
                stage: stage.to_string(),
                waited_secs: waited.as_secs(),
            },
            PipelineError::Call { stage, .. }
            | PipelineError::StageFailed { stage, .. }
            | PipelineError::AlreadyFailed { at: stage }
            | PipelineError::IllegalTransition { from: stage, .. } => ForecastError::StageFailure {
                stage: stage.to_string(),
                reason,
            },
        }
    }
}

/// One end-to-end managed run for a single item.
#[derive(Debug, Clone)]
pub struct PipelineJob {
    pub job_id: PipelineJobId,
    pub tenant_id: TenantId,
    pub item_id: ItemId,
    pub started_at: DateTime<Utc>,
    stage: PipelineStage,
    /// Deadline of the stage currently being awaited.
    deadline: Option<Instant>,
}

impl PipelineJob {
    pub fn new(tenant_id: TenantId, item_id: ItemId) -> Self {
        Self {
            job_id: PipelineJobId::new(),
            tenant_id,
            item_id,
            started_at: Utc::now(),
            stage: PipelineStage::Preparing,
            deadline: None,
        }
    }

    pub fn stage(&self) -> &PipelineStage {
        &self.stage
    }

    pub fn handles(&self) -> ResourceHandles {
        self.stage.handles()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    /// Errors once the job has failed; checked before every backend call.
    pub fn ensure_active(&self) -> Result<(), PipelineError> {
        match &self.stage {
            PipelineStage::Failed { at, .. } => Err(PipelineError::AlreadyFailed { at: *at }),
            _ => Ok(()),
        }
    }

    pub fn advance(&mut self, event: StageEvent) -> Result<(), PipelineError> {
        self.ensure_active()?;
        let name = event.name();
        let current = std::mem::replace(&mut self.stage, PipelineStage::Preparing);
        match transition(current, event) {
            Ok(next) => {
                self.stage = next;
                Ok(())
            }
            Err(unchanged) => {
                let from = unchanged.kind();
                self.stage = unchanged;
                Err(PipelineError::IllegalTransition { from, event: name })
            }
        }
    }

    /// Move to `Failed`, keeping the handles. Returns false when the job was
    /// already terminal.
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        if self.stage.is_terminal() {
            return false;
        }
        self.stage = PipelineStage::Failed {
            at: self.stage.kind(),
            handles: self.stage.handles(),
            reason: reason.into(),
        };
        self.deadline = None;
        true
    }
}
