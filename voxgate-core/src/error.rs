use thiserror::Error;

/// All errors produced by voxgate-core.
#[derive(Debug, Error)]
pub enum VoxgateError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, VoxgateError>;
