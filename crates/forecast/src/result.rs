use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use vendorflow_core::DomainError;

use crate::method::{ForecastMethod, LocalMethod, ResultMethod};
use crate::quality::DataQualitySignals;

/// One forecast point with its uncertainty band.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub date: NaiveDate,
    pub point: f64,
    pub lower: f64,
    pub upper: f64,
}

impl Prediction {
    /// Build a point, widening the band so that `lower <= point <= upper`.
    pub fn new(date: NaiveDate, point: f64, lower: f64, upper: f64) -> Self {
        Self {
            date,
            point,
            lower: lower.min(point),
            upper: upper.max(point),
        }
    }

    fn is_finite(&self) -> bool {
        self.point.is_finite() && self.lower.is_finite() && self.upper.is_finite()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastStatus {
    /// Exactly `horizon` points.
    Success,
    /// Fewer points than requested.
    Partial,
    /// No usable points.
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub algorithm: String,
    /// Backend's own confidence in \[0, 1\] (convention, not enforced).
    pub confidence_score: f64,
    pub data_points_used: usize,
    pub signals: Option<DataQualitySignals>,
}

impl QualityMetrics {
    pub fn new(algorithm: impl Into<String>, confidence_score: f64, data_points_used: usize) -> Self {
        Self {
            algorithm: algorithm.into(),
            confidence_score,
            data_points_used,
            signals: None,
        }
    }

    pub fn with_signals(mut self, signals: DataQualitySignals) -> Self {
        self.signals = Some(signals);
        self
    }
}

/// Normalized output of every backend.
///
/// Invariant: at most `horizon` predictions, dates non-decreasing, and
/// `lower <= point <= upper` for each. [`ForecastResult::from_predictions`]
/// is the only constructor and establishes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub method: ResultMethod,
    pub horizon: u32,
    pub predictions: Vec<Prediction>,
    pub quality_metrics: QualityMetrics,
    pub generated_at: DateTime<Utc>,
    pub status: ForecastStatus,
    pub fallback_method: Option<ResultMethod>,
    pub combined: bool,
    /// Caller's preference, when the engine resolved to something else.
    pub requested_method: Option<ForecastMethod>,
    /// Free-form metadata (job ids, backend handles, timings).
    pub metadata: JsonValue,
}

impl ForecastResult {
    /// Normalize raw backend output into a result.
    ///
    /// Non-finite points are dropped, points are sorted by date, bands are
    /// widened to contain the point estimate and the sequence is cut to
    /// `horizon`.
    pub fn from_predictions(
        method: ResultMethod,
        horizon: u32,
        raw: Vec<Prediction>,
        quality_metrics: QualityMetrics,
    ) -> Self {
        let mut predictions: Vec<Prediction> = raw
            .into_iter()
            .filter(Prediction::is_finite)
            .map(|p| Prediction::new(p.date, p.point, p.lower, p.upper))
            .collect();
        predictions.sort_by_key(|p| p.date);
        predictions.truncate(horizon as usize);

        let status = if predictions.is_empty() {
            ForecastStatus::Error
        } else if predictions.len() < horizon as usize {
            ForecastStatus::Partial
        } else {
            ForecastStatus::Success
        };

        Self {
            method,
            horizon,
            predictions,
            quality_metrics,
            generated_at: Utc::now(),
            status,
            fallback_method: None,
            combined: false,
            requested_method: None,
            metadata: JsonValue::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_requested_method(mut self, requested: Option<ForecastMethod>) -> Self {
        self.requested_method = requested;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ForecastStatus::Success
    }

    pub fn satisfies_invariants(&self) -> bool {
        self.predictions.len() <= self.horizon as usize
            && self
                .predictions
                .iter()
                .all(|p| p.lower <= p.point && p.point <= p.upper)
            && self.predictions.windows(2).all(|w| w[0].date <= w[1].date)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    #[error("invalid forecast input: {0}")]
    InvalidInput(String),

    #[error("managed backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("managed pipeline stage {stage} failed: {reason}")]
    StageFailure { stage: String, reason: String },

    #[error("managed pipeline stage {stage} timed out after {waited_secs}s")]
    StageTimeout { stage: String, waited_secs: u64 },

    #[error("{method} model failed: {reason}")]
    Model { method: LocalMethod, reason: String },

    #[error("forecast generation failed: {0}")]
    TerminalFailure(String),
}

impl ForecastError {
    pub fn model(method: LocalMethod, reason: impl Into<String>) -> Self {
        Self::Model {
            method,
            reason: reason.into(),
        }
    }

    /// Whether a seasonal-local run already failed (so falling back to it is pointless).
    pub fn is_seasonal_failure(&self) -> bool {
        matches!(
            self,
            ForecastError::Model {
                method: LocalMethod::Seasonal,
                ..
            }
        )
    }
}

impl From<DomainError> for ForecastError {
    fn from(value: DomainError) -> Self {
        ForecastError::InvalidInput(value.to_string())
    }
}
