// Per-request failure taxonomy and its HTTP mapping.

use std::fmt;

use axum::http::StatusCode;
use taiga_sync_common::payload::PayloadError;
use taiga_sync_common::render::RenderError;
use thiserror::Error;

use crate::git::commit::CommitError;
use crate::publish::WriteError;

/// Pipeline stage a request failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decode,
    Render,
    Write,
    Commit,
    Internal,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::Render => "render",
            Self::Write => "write",
            Self::Commit => "commit",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to read request body: {0}")]
    Body(#[source] axum::Error),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error("publish task did not complete: {0}")]
    Internal(String),
}

impl PipelineError {
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Body(_) | Self::Payload(_) => Stage::Decode,
            Self::Render(_) => Stage::Render,
            Self::Write(_) => Stage::Write,
            Self::Commit(_) => Stage::Commit,
            Self::Internal(_) => Stage::Internal,
        }
    }

    /// Client input faults are 400; everything after decoding is 500.
    pub const fn status(&self) -> StatusCode {
        match self.stage() {
            Stage::Decode => StatusCode::BAD_REQUEST,
            Stage::Render | Stage::Write | Stage::Commit | Stage::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
