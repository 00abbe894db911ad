//! Test doubles shared by the adapter tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Days, NaiveDate};

use vendorflow_core::{ItemId, TenantId, VendorId};
use vendorflow_forecast::{ForecastRequest, LocalMethod, Observation, Prediction};

use crate::config::{ForecastConfig, ManagedBackendSettings};
use crate::history::InMemoryHistoricalData;
use crate::local::{LocalModel, ModelError, ModelHandle, TrainParams};
use crate::managed::backend::{
    BackendError, DataUpload, DatasetGroupSpec, DatasetSpec, ForecastQuery, ForecastSpec, ImportJobSpec,
    ManagedForecastBackend, PredictorSpec, QuantilePoint, QuantileSeries, ResourceHandle, ResourceKind,
    ResourceStatus,
};

pub fn init_tracing() {
    vendorflow_observability::init_for_tests();
}

pub fn day(offset: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.checked_add_days(Days::new(offset)))
        .unwrap()
}

/// `n` consecutive daily observations from 2024-01-01.
pub fn daily_series(n: usize, value: impl Fn(usize) -> f64) -> Vec<Observation> {
    (0..n)
        .map(|i| Observation::new(day(i as u64), value(i)))
        .collect()
}

/// Request for a fresh tenant, item `SKU-1`, vendor `V-1`.
pub fn request(horizon: u32) -> ForecastRequest {
    ForecastRequest::new(
        TenantId::new(),
        ItemId::new("SKU-1").unwrap(),
        VendorId::new("V-1").unwrap(),
        horizon,
    )
}

pub fn seed(history: &InMemoryHistoricalData, request: &ForecastRequest, series: Vec<Observation>) {
    history.insert(
        request.tenant_id,
        request.item_id.clone(),
        request.vendor_id.clone(),
        request.metric,
        series,
    );
}

/// Defaults plus a role, so the managed backend counts as configured.
pub fn managed_config() -> ForecastConfig {
    ForecastConfig::default().with_managed(ManagedBackendSettings {
        role_arn: Some("arn:aws:iam::000000000000:role/forecast".to_string()),
        ..Default::default()
    })
}

/// Deterministic local model: flat predictions starting the day after training.
#[derive(Debug)]
pub struct FakeModel {
    failing: HashSet<LocalMethod>,
    output_len: Option<usize>,
    value: f64,
    offset_days: u64,
    trained: Mutex<Vec<LocalMethod>>,
}

impl FakeModel {
    pub fn new() -> Self {
        Self {
            failing: HashSet::new(),
            output_len: None,
            value: 5.0,
            offset_days: 0,
            trained: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self, method: LocalMethod) -> Self {
        self.failing.insert(method);
        self
    }

    pub fn with_output_len(mut self, len: usize) -> Self {
        self.output_len = Some(len);
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }

    /// Shift predictions this many days past the end of training.
    pub fn with_offset_days(mut self, days: u64) -> Self {
        self.offset_days = days;
        self
    }

    /// Methods `train` was called with, in order (failed attempts included).
    pub fn trained(&self) -> Vec<LocalMethod> {
        self.trained.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocalModel for FakeModel {
    async fn train(
        &self,
        method: LocalMethod,
        series: &[Observation],
        _params: &TrainParams,
    ) -> Result<ModelHandle, ModelError> {
        self.trained.lock().unwrap().push(method);
        if self.failing.contains(&method) {
            return Err(ModelError::Training(format!("{method} refused to fit")));
        }
        Ok(ModelHandle {
            model_id: format!("{method}-{}", series.len()),
            method,
            trained_through: series.last().map(|o| o.date),
        })
    }

    async fn predict(&self, model: &ModelHandle, horizon: u32) -> Result<Vec<Prediction>, ModelError> {
        let first = model.trained_through.unwrap_or_else(|| day(0)) + Days::new(1 + self.offset_days);
        let len = self.output_len.unwrap_or(horizon as usize);
        Ok((0..len as u64)
            .map(|i| Prediction::new(first + Days::new(i), self.value, self.value - 1.0, self.value + 1.0))
            .collect())
    }
}

#[derive(Debug, Default)]
struct BackendState {
    calls: Vec<String>,
    describe: HashMap<ResourceKind, VecDeque<Result<ResourceStatus, BackendError>>>,
    deleted: Vec<(ResourceKind, ResourceHandle)>,
    uploads: Vec<DataUpload>,
    next_id: u64,
    live_groups: usize,
    peak_groups: usize,
}

/// Managed backend double. Every resource is `ACTIVE` on first describe
/// unless a script says otherwise.
#[derive(Debug)]
pub struct ScriptedBackend {
    configured: bool,
    stuck: HashSet<ResourceKind>,
    hanging: HashSet<ResourceKind>,
    failing_calls: HashSet<&'static str>,
    failing_deletes: HashSet<ResourceKind>,
    state: Mutex<BackendState>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            configured: true,
            stuck: HashSet::new(),
            hanging: HashSet::new(),
            failing_calls: HashSet::new(),
            failing_deletes: HashSet::new(),
            state: Mutex::new(BackendState::default()),
        }
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    /// Queue describe results for `kind`; `ACTIVE` once the queue drains.
    pub fn with_statuses(self, kind: ResourceKind, statuses: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let queue = state.describe.entry(kind).or_default();
            queue.extend(statuses.iter().map(|s| Ok(ResourceStatus::parse(s))));
        }
        self
    }

    pub fn with_describe_errors(self, kind: ResourceKind, count: usize) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let queue = state.describe.entry(kind).or_default();
            for _ in 0..count {
                queue.push_back(Err(BackendError::request("describe", "throttled")));
            }
        }
        self
    }

    /// `kind` never leaves `CREATE_IN_PROGRESS`.
    pub fn stuck(mut self, kind: ResourceKind) -> Self {
        self.stuck.insert(kind);
        self
    }

    /// `describe` for `kind` never resolves.
    pub fn hanging(mut self, kind: ResourceKind) -> Self {
        self.hanging.insert(kind);
        self
    }

    pub fn failing_call(mut self, operation: &'static str) -> Self {
        self.failing_calls.insert(operation);
        self
    }

    pub fn failing_delete(mut self, kind: ResourceKind) -> Self {
        self.failing_deletes.insert(kind);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Successful deletions, in order.
    pub fn deleted(&self) -> Vec<(ResourceKind, ResourceHandle)> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn last_upload(&self) -> Option<DataUpload> {
        self.state.lock().unwrap().uploads.last().cloned()
    }

    /// Most dataset groups alive at once, i.e. concurrent runs.
    pub fn peak_concurrency(&self) -> usize {
        self.state.lock().unwrap().peak_groups
    }

    fn create(&self, operation: &'static str, kind: ResourceKind) -> Result<ResourceHandle, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(operation.to_string());
        if self.failing_calls.contains(operation) {
            return Err(BackendError::request(operation, "rejected"));
        }
        state.next_id += 1;
        if kind == ResourceKind::DatasetGroup {
            state.live_groups += 1;
            state.peak_groups = state.peak_groups.max(state.live_groups);
        }
        Ok(ResourceHandle::new(format!("arn:test:{kind}/{}", state.next_id)))
    }
}

#[async_trait]
impl ManagedForecastBackend for ScriptedBackend {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn create_dataset_group(&self, _spec: &DatasetGroupSpec) -> Result<ResourceHandle, BackendError> {
        self.create("create_dataset_group", ResourceKind::DatasetGroup)
    }

    async fn create_dataset(&self, _spec: &DatasetSpec) -> Result<ResourceHandle, BackendError> {
        self.create("create_dataset", ResourceKind::Dataset)
    }

    async fn put_data(&self, upload: &DataUpload) -> Result<String, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("put_data".to_string());
        if self.failing_calls.contains("put_data") {
            return Err(BackendError::request("put_data", "access denied"));
        }
        state.uploads.push(upload.clone());
        Ok(format!("s3://{}/{}", upload.bucket, upload.key))
    }

    async fn create_import_job(&self, _spec: &ImportJobSpec) -> Result<ResourceHandle, BackendError> {
        self.create("create_import_job", ResourceKind::ImportJob)
    }

    async fn create_predictor(&self, _spec: &PredictorSpec) -> Result<ResourceHandle, BackendError> {
        self.create("create_predictor", ResourceKind::Predictor)
    }

    async fn create_forecast(&self, _spec: &ForecastSpec) -> Result<ResourceHandle, BackendError> {
        self.create("create_forecast", ResourceKind::Forecast)
    }

    async fn describe(
        &self,
        kind: ResourceKind,
        _handle: &ResourceHandle,
    ) -> Result<ResourceStatus, BackendError> {
        if self.hanging.contains(&kind) {
            self.state.lock().unwrap().calls.push(format!("describe:{kind}"));
            return std::future::pending().await;
        }
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("describe:{kind}"));
        if self.stuck.contains(&kind) {
            return Ok(ResourceStatus::InProgress("CREATE_IN_PROGRESS".to_string()));
        }
        state
            .describe
            .get_mut(&kind)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(Ok(ResourceStatus::Active))
    }

    async fn query_forecast(&self, query: &ForecastQuery) -> Result<Vec<QuantileSeries>, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("query_forecast".to_string());
        if self.failing_calls.contains("query_forecast") {
            return Err(BackendError::NotFound(query.forecast.to_string()));
        }
        let series = |quantile: &str, value: f64| QuantileSeries {
            quantile: quantile.to_string(),
            points: (0..30)
                .map(|i| QuantilePoint {
                    timestamp: query.start_date + Days::new(i),
                    value,
                })
                .collect(),
        };
        Ok(vec![series("0.1", 8.0), series("0.5", 10.0), series("0.9", 12.0)])
    }

    async fn delete(&self, kind: ResourceKind, handle: &ResourceHandle) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("delete:{kind}"));
        if self.failing_deletes.contains(&kind) {
            return Err(BackendError::request("delete", "resource in use"));
        }
        if kind == ResourceKind::DatasetGroup {
            state.live_groups = state.live_groups.saturating_sub(1);
        }
        state.deleted.push((kind, handle.clone()));
        Ok(())
    }
}
