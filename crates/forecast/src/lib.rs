//! `vendorflow-forecast`
//!
//! **Responsibility:** the pure forecasting domain.
//!
//! Everything in this crate is deterministic and free of I/O:
//! - request and method types shared with callers
//! - data-quality assessment and method selection
//! - managed-backend data preparation
//! - result normalization, hybrid fusion and accuracy math
//!
//! Backends, polling, budgets and fallbacks live in `vendorflow-infra`.

pub mod accuracy;
pub mod fusion;
pub mod method;
pub mod prepare;
pub mod quality;
pub mod request;
pub mod result;
pub mod selection;
pub mod series;

pub use accuracy::{AccuracyError, AccuracyMetrics, AccuracyReport, EvaluationPeriod, compare};
pub use fusion::fuse;
pub use method::{ForecastMethod, LocalMethod, ResultMethod};
pub use prepare::{PreparedRow, PreparedSeries, prepare_daily_series};
pub use quality::{DataQualitySignals, assess};
pub use request::{ForecastRequest, MAX_HORIZON, MIN_HORIZON, Metric};
pub use result::{ForecastError, ForecastResult, ForecastStatus, Prediction, QualityMetrics};
pub use selection::{ManagedCapacity, SelectionPolicy, select_method};
pub use series::{DateRange, Observation};
