use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::config::ConfigError;
use crate::executor::ExecError;
use crate::pipeline::ResolutionFailure;

#[derive(Error, Debug)]
pub enum ClipscoutError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Executor setup failed: {0}")]
    Executor(#[from] ExecError),

    #[error("Analysis setup failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Resolution failed: {0}")]
    Resolution(#[from] ResolutionFailure),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ClipscoutError>;
