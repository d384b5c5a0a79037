use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GearError {
    #[error("no config file could be found at {0}")]
    ConfigNotFound(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    #[error("invalid API key: {0}")]
    InvalidApiKey(String),

    #[error("destination parent must be a 'session', got '{0}'")]
    #[diagnostic(help("run the gear as an analysis attached to a session"))]
    UnsupportedContainerType(String),

    #[error("no input files found")]
    NoInputFilesFound,

    #[error("Flywheel request failed: {0}")]
    RemoteUnavailable(String),

    #[error("Flywheel returned status {status}: {message}")]
    RemoteStatus { status: u16, message: String },

    #[error("not found on Flywheel: {0}")]
    NotFound(String),

    #[error("refusing unsafe path component from Flywheel: {0:?}")]
    UnsafePathComponent(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to launch analysis: {0}")]
    AnalysisLaunch(String),
}

impl GearError {
    /// Process exit code for a run that ended with this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            GearError::ConfigNotFound(_)
            | GearError::ConfigRead(_)
            | GearError::ConfigParse(_)
            | GearError::ConfigInvalid(_)
            | GearError::InvalidApiKey(_)
            | GearError::UnsupportedContainerType(_) => 2,
            GearError::RemoteUnavailable(_)
            | GearError::RemoteStatus { .. }
            | GearError::NotFound(_)
            | GearError::UnsafePathComponent(_) => 3,
            GearError::NoInputFilesFound
            | GearError::Filesystem(_)
            | GearError::AnalysisLaunch(_) => 1,
        }
    }
}
