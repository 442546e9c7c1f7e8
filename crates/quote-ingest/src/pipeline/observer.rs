//! Stage lifecycle events

use std::time::Duration;

use uuid::Uuid;

use super::state::{PipelineState, Stage};

/// Something that happened to one request in one stage
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    StageEntered {
        stage: Stage,
    },
    StageSucceeded {
        stage: Stage,
        elapsed: Duration,
    },
    StageFailed {
        stage: Stage,
        /// Terminal state the request ends in
        state: PipelineState,
        kind: &'static str,
        message: String,
    },
}

impl PipelineEvent {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineEvent::StageEntered { stage }
            | PipelineEvent::StageSucceeded { stage, .. }
            | PipelineEvent::StageFailed { stage, .. } => *stage,
        }
    }
}

/// Sink for pipeline events
pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, request_id: Uuid, event: &PipelineEvent);
}

/// Emits events as structured `tracing` records
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_event(&self, request_id: Uuid, event: &PipelineEvent) {
        match event {
            PipelineEvent::StageEntered { stage } => {
                tracing::info!(%request_id, stage = stage.as_str(), "stage started");
            }
            PipelineEvent::StageSucceeded { stage, elapsed } => {
                tracing::info!(
                    %request_id,
                    stage = stage.as_str(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "stage completed"
                );
            }
            PipelineEvent::StageFailed {
                stage,
                state,
                kind,
                message,
            } => {
                tracing::error!(
                    %request_id,
                    stage = stage.as_str(),
                    state = ?state,
                    kind = *kind,
                    error = %message,
                    "stage failed"
                );
            }
        }
    }
}
