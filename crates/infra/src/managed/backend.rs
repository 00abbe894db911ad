//! Contract of the managed forecasting backend.
//!
//! Every create call returns an opaque resource handle; long-running
//! resources are then observed through `describe` until they reach a
//! terminal status.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use vendorflow_core::ItemId;

/// Opaque, ARN-like identifier of a backend resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceHandle(String);

impl ResourceHandle {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    DatasetGroup,
    Dataset,
    ImportJob,
    Predictor,
    Forecast,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::DatasetGroup => "dataset_group",
            ResourceKind::Dataset => "dataset",
            ResourceKind::ImportJob => "import_job",
            ResourceKind::Predictor => "predictor",
            ResourceKind::Forecast => "forecast",
        }
    }

    /// Dependents must go before what they depend on.
    pub fn deletion_rank(&self) -> u8 {
        match self {
            ResourceKind::Forecast => 0,
            ResourceKind::Predictor => 1,
            ResourceKind::ImportJob => 2,
            ResourceKind::Dataset => 3,
            ResourceKind::DatasetGroup => 4,
        }
    }
}

impl core::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceStatus {
    Active,
    CreateFailed,
    DeleteFailed,
    /// Any non-terminal status (`CREATE_PENDING`, `CREATE_IN_PROGRESS`, ...).
    InProgress(String),
}

impl ResourceStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "ACTIVE" => ResourceStatus::Active,
            "CREATE_FAILED" => ResourceStatus::CreateFailed,
            "DELETE_FAILED" => ResourceStatus::DeleteFailed,
            other => ResourceStatus::InProgress(other.to_string()),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ResourceStatus::CreateFailed | ResourceStatus::DeleteFailed)
    }
}

impl core::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ResourceStatus::Active => f.write_str("ACTIVE"),
            ResourceStatus::CreateFailed => f.write_str("CREATE_FAILED"),
            ResourceStatus::DeleteFailed => f.write_str("DELETE_FAILED"),
            ResourceStatus::InProgress(s) => f.write_str(s),
        }
    }
}

pub type ResourceTags = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetGroupSpec {
    pub name: String,
    pub tags: ResourceTags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    Timestamp,
    Float,
    String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaAttribute {
    pub name: &'static str,
    pub attribute_type: AttributeType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSpec {
    pub name: String,
    pub group: ResourceHandle,
    /// Data frequency code, `"D"` for daily.
    pub frequency: &'static str,
    pub schema: Vec<SchemaAttribute>,
    pub tags: ResourceTags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUpload {
    pub bucket: String,
    pub key: String,
    pub body: String,
    pub content_type: &'static str,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportJobSpec {
    pub name: String,
    pub dataset: ResourceHandle,
    pub source_uri: String,
    pub role_arn: String,
    pub tags: ResourceTags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictorSpec {
    pub name: String,
    pub group: ResourceHandle,
    pub horizon_days: u32,
    pub frequency: &'static str,
    pub algorithm: &'static str,
    pub dimensions: Vec<String>,
    pub tags: ResourceTags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastSpec {
    pub name: String,
    pub predictor: ResourceHandle,
    pub quantiles: Vec<&'static str>,
    pub tags: ResourceTags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastQuery {
    pub forecast: ResourceHandle,
    pub item_id: ItemId,
    pub start_date: NaiveDate,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantilePoint {
    pub timestamp: NaiveDate,
    pub value: f64,
}

/// Query output for one quantile label (`"0.1"`, `"0.5"`, `"0.9"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileSeries {
    pub quantile: String,
    pub points: Vec<QuantilePoint>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("{operation} request failed: {message}")]
    Request {
        operation: &'static str,
        message: String,
    },

    #[error("resource not found: {0}")]
    NotFound(String),
}

impl BackendError {
    pub fn request(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Request {
            operation,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait ManagedForecastBackend: Send + Sync + 'static {
    /// Client has credentials and endpoints to reach the service.
    fn is_configured(&self) -> bool;

    async fn create_dataset_group(&self, spec: &DatasetGroupSpec) -> Result<ResourceHandle, BackendError>;

    async fn create_dataset(&self, spec: &DatasetSpec) -> Result<ResourceHandle, BackendError>;

    /// Store an object and return its URI.
    async fn put_data(&self, upload: &DataUpload) -> Result<String, BackendError>;

    async fn create_import_job(&self, spec: &ImportJobSpec) -> Result<ResourceHandle, BackendError>;

    async fn create_predictor(&self, spec: &PredictorSpec) -> Result<ResourceHandle, BackendError>;

    async fn create_forecast(&self, spec: &ForecastSpec) -> Result<ResourceHandle, BackendError>;

    async fn describe(
        &self,
        kind: ResourceKind,
        handle: &ResourceHandle,
    ) -> Result<ResourceStatus, BackendError>;

    async fn query_forecast(&self, query: &ForecastQuery) -> Result<Vec<QuantileSeries>, BackendError>;

    async fn delete(&self, kind: ResourceKind, handle: &ResourceHandle) -> Result<(), BackendError>;
}
