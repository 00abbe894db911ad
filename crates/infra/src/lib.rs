//! Infrastructure layer: configuration, history sources, local and managed
//! forecast runners, orchestration and accuracy evaluation.

pub mod budget;
pub mod config;
pub mod evaluator;
pub mod history;
pub mod local;
pub mod managed;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod testing;

pub use budget::{BudgetPermit, ConcurrencyBudget};
pub use config::{ConfigError, ForecastConfig, ManagedBackendSettings, PipelineTimeouts};
pub use evaluator::AccuracyEvaluator;
pub use history::{HistoricalDataSource, HistoryError, InMemoryHistoricalData, PostgresHistoricalData, SeriesQuery};
pub use local::{LocalForecastRunner, LocalModel, ModelError, ModelHandle, TrainParams};
pub use managed::{CleanupSweeper, ManagedForecastBackend, ManagedForecastPipeline, ResourceLedger, SweeperHandle};
pub use orchestrator::{ForecastOrchestrator, ServiceStatus};
