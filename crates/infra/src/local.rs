//! Local model adapter.
//!
//! Model implementations are opaque to the engine; this runner only trains,
//! predicts and normalizes their output into a [`ForecastResult`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use vendorflow_forecast::{
    DataQualitySignals, ForecastError, ForecastRequest, ForecastResult, ForecastStatus, LocalMethod,
    Observation, Prediction, QualityMetrics,
};

/// Confidence reported for local model output.
pub const LOCAL_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainParams {
    pub horizon: u32,
    pub include_confidence: bool,
}

/// Trained model reference returned by [`LocalModel::train`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelHandle {
    pub model_id: String,
    pub method: LocalMethod,
    /// Last date of the training data; predictions start the day after.
    pub trained_through: Option<NaiveDate>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("training failed: {0}")]
    Training(String),

    #[error("prediction failed: {0}")]
    Prediction(String),
}

#[async_trait]
pub trait LocalModel: Send + Sync + 'static {
    async fn train(
        &self,
        method: LocalMethod,
        series: &[Observation],
        params: &TrainParams,
    ) -> Result<ModelHandle, ModelError>;

    async fn predict(&self, model: &ModelHandle, horizon: u32) -> Result<Vec<Prediction>, ModelError>;
}

pub struct LocalForecastRunner<M> {
    model: Arc<M>,
}

impl<M> Clone for LocalForecastRunner<M> {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
        }
    }
}

impl<M: LocalModel> LocalForecastRunner<M> {
    pub fn new(model: Arc<M>) -> Self {
        Self { model }
    }

    pub async fn run(
        &self,
        method: LocalMethod,
        request: &ForecastRequest,
        series: &[Observation],
        signals: &DataQualitySignals,
    ) -> Result<ForecastResult, ForecastError> {
        let params = TrainParams {
            horizon: request.horizon,
            include_confidence: true,
        };

        let handle = self
            .model
            .train(method, series, &params)
            .await
            .map_err(|e| {
                warn!(tenant = %request.tenant_id, item = %request.item_id, method = %method, error = %e, "local model training failed");
                ForecastError::model(method, e.to_string())
            })?;

        let raw = self
            .model
            .predict(&handle, request.horizon)
            .await
            .map_err(|e| {
                warn!(tenant = %request.tenant_id, item = %request.item_id, method = %method, error = %e, "local model prediction failed");
                ForecastError::model(method, e.to_string())
            })?;

        let quality = QualityMetrics::new(method.as_str(), LOCAL_CONFIDENCE, series.len())
            .with_signals(*signals);
        let result = ForecastResult::from_predictions(method.into(), request.horizon, raw, quality)
            .with_metadata(json!({
                "tenant_id": request.tenant_id.to_string(),
                "item_id": request.item_id.as_str(),
                "vendor_id": request.vendor_id.as_str(),
                "model_id": handle.model_id,
                "algorithm": method.as_str(),
            }));

        if result.status == ForecastStatus::Error {
            return Err(ForecastError::model(method, "model produced no usable predictions"));
        }

        debug!(
            tenant = %request.tenant_id,
            item = %request.item_id,
            method = %method,
            points = result.predictions.len(),
            "local forecast completed"
        );
        Ok(result)
    }
}
