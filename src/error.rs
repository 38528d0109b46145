//! Engine-level errors.
//!
//! Only lifecycle failures surface here. Errors local to one transfer
//! travel inside the transfer's own state and reach the caller through
//! its completion callback.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to spawn reactor thread: {0}")]
    Spawn(io::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
