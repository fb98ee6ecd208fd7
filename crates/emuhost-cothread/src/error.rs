use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CothreadError>;

#[derive(Debug, Error)]
pub enum CothreadError {
    #[error("failed to create guest context: {0}")]
    Spawn(#[from] io::Error),

    /// The guest entry point has returned; the context is in its zombie loop.
    #[error("guest context terminated with exit code {exit_code}")]
    Terminated { exit_code: i32 },

    #[error("host call panicked inside the guest context")]
    CallPanicked,

    /// The guest side of the hand-off channel disappeared without reporting termination.
    #[error("guest context was lost")]
    Lost,
}
