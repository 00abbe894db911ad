//! Managed (cloud) forecasting backend: contract, stage machine, pipeline
//! runner and resource cleanup.

pub mod backend;
pub mod ledger;
pub mod pipeline;
pub mod stage;
pub mod sweeper;

pub use backend::{
    BackendError, ManagedForecastBackend, QuantilePoint, QuantileSeries, ResourceHandle, ResourceKind,
    ResourceStatus,
};
pub use ledger::{LedgerEntry, ResourceLedger};
pub use pipeline::ManagedForecastPipeline;
pub use stage::{
    PipelineError, PipelineJob, PipelineJobId, PipelineStage, ResourceHandles, StageEvent, StageKind,
};
pub use sweeper::{CleanupSweeper, SweepReport, SweeperHandle};
