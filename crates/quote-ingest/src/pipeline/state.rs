//! Per-request pipeline state machine

use std::fmt;

use crate::error::{Error, Result};

/// External stage of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Upload,
    Extract,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Extract => "extract",
            Stage::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one ingestion request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    Uploading,
    Uploaded,
    Extracting,
    Extracted,
    Persisting,
    Complete,
    FailedValidation,
    FailedUpload,
    FailedExtraction,
    FailedPersist,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Complete
                | PipelineState::FailedValidation
                | PipelineState::FailedUpload
                | PipelineState::FailedExtraction
                | PipelineState::FailedPersist
        )
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_advance_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Received, Uploading)
                | (Received, FailedValidation)
                | (Uploading, Uploaded)
                | (Uploading, FailedUpload)
                | (Uploaded, Extracting)
                | (Extracting, Extracted)
                | (Extracting, FailedExtraction)
                | (Extracted, Persisting)
                | (Persisting, Complete)
                | (Persisting, FailedPersist)
        )
    }

    /// Move to `next`, rejecting illegal transitions
    pub fn advance(self, next: PipelineState) -> Result<PipelineState> {
        if self.can_advance_to(next) {
            Ok(next)
        } else {
            Err(Error::internal(format!(
                "illegal pipeline transition {:?} -> {:?}",
                self, next
            )))
        }
    }

    /// Failure state for a stage
    pub fn failed(stage: Stage) -> PipelineState {
        match stage {
            Stage::Upload => PipelineState::FailedUpload,
            Stage::Extract => PipelineState::FailedExtraction,
            Stage::Persist => PipelineState::FailedPersist,
        }
    }
}
