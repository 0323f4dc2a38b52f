// brdata-pipeline - Incremental ingestion coordinator
//
// Freshness gate, download, transform, partition, upload and the optional
// downstream materialization, driven as an explicit state machine over
// injected collaborators.

pub mod collaborators;
pub mod coordinator;
pub mod error;
pub mod retry;
pub mod state;
pub mod transform;

pub use collaborators::{
    Collaborators, FreshnessSignal, MaterializationParams, MaterializationTrigger, MetadataUpdater,
    RunHandle, RunStatus, SourceFetcher, WarehouseLoader, WatermarkStore,
};
pub use coordinator::{Coordinator, RunReport};
pub use error::{PipelineError, Result, StageFailure};
pub use retry::{Attempt, RetryPolicy};
pub use state::PipelineState;
