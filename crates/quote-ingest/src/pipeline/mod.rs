//! Ingestion pipeline: state machine, stage events, and the orchestrator

pub mod observer;
pub mod orchestrator;
pub mod state;

pub use observer::{PipelineEvent, PipelineObserver, TracingObserver};
pub use orchestrator::{PipelineLimits, PipelineOrchestrator, PipelineOutput};
pub use state::{PipelineState, Stage};
