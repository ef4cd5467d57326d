pub mod error;
pub mod host_pool;
pub mod io_struct;
pub mod orchestrator;
pub mod server;
pub mod stage_client;
pub mod stats;

pub use host_pool::{SelectionPolicy, StageKind, StagePools};
pub use io_struct::{ProcessRequest, ProcessResponse, ProcessingOptions, ProcessingStats, StatusInfo};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use stage_client::{HttpStageClient, StageInvoker, StageOutcome, StageParams};
