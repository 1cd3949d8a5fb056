use thiserror::Error;

/// All errors produced by analog-mic-core.
///
/// The `Display` text of the two bring-up variants is the diagnostic line
/// written to the sample stream before the process halts.
#[derive(Debug, Error)]
pub enum MicError {
    #[error("analog microphone initialization failed!")]
    InitializationFailure { status: i32 },

    #[error("analog microphone start failed!")]
    StartFailure { status: i32 },

    #[error("indicator LED initialization failed (status {status})")]
    Indicator { status: i32 },

    #[error("capture engine has not been started")]
    NotStarted,

    #[error("invalid microphone configuration: {0}")]
    InvalidConfig(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MicError {
    /// Driver status code carried by the error, if it came from a driver call.
    pub fn status(&self) -> Option<i32> {
        match self {
            MicError::InitializationFailure { status }
            | MicError::StartFailure { status }
            | MicError::Indicator { status } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MicError>;
