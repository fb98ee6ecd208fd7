use std::io;

use emuhost_cothread::CothreadError;
use emuhost_engine::ScriptError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Everything that can go wrong between the host and the guest.
///
/// None of these cross the host boundary as a failure: the public accessors return a defined
/// default and report the error on the log sink's error channel.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("return type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("can't free buffer: no matching handle found")]
    HandleNotFound,

    #[error("nvram {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("guest terminated abnormally with exit code {0}")]
    AbnormalTermination(i32),

    #[error("guest has not been launched")]
    NotLaunched,

    #[error("guest was already launched")]
    AlreadyLaunched,

    #[error("guest is not suspended (it exited with code {exit_code})")]
    NotSuspended { exit_code: i32 },

    #[error("no device at {0}")]
    UnknownDevice(String),

    #[error("failed to create guest context: {0}")]
    Spawn(#[source] io::Error),

    #[error("invalid {var}: {value:?}")]
    InvalidConfig { var: &'static str, value: String },

    #[error(transparent)]
    Cothread(CothreadError),
}

impl From<CothreadError> for BridgeError {
    fn from(err: CothreadError) -> Self {
        match err {
            CothreadError::Spawn(source) => BridgeError::Spawn(source),
            CothreadError::Terminated { exit_code } => BridgeError::NotSuspended { exit_code },
            other => BridgeError::Cothread(other),
        }
    }
}
