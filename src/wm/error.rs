//! Error Module
//!
//! Domain errors of the window-management core. Rejected input never changes
//! state and never reaches the event loop as a failure: handlers log it and
//! carry on. Only environment conflicts are fatal.

use thiserror::Error;
use tracing::warn;
use x11rb::protocol::xproto::Window;

/// Input the core refused to act on
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("invalid window size: {width}x{height}")]
    InvalidSize { width: i32, height: i32 },

    #[error("invalid window position: {x},{y}")]
    InvalidPosition { x: i32, y: i32 },

    #[error("maximum number of windows ({max}) reached in workspace {workspace}")]
    WorkspaceFull { workspace: u8, max: usize },

    #[error("workspace {workspace} holds {count} clients, more than the limit of {max}")]
    OverCapacity { workspace: u8, count: usize, max: usize },

    #[error("workspace {0} is out of range (1-9)")]
    WorkspaceOutOfRange(i64),

    #[error("window 0x{0:x} is already managed")]
    AlreadyManaged(Window),

    #[error("master factor {0:.2} is out of range")]
    MasterFactorOutOfRange(f64),

    #[error("empty command")]
    EmptyCommand,

    #[error("command argument contains shell metacharacters: {0:?}")]
    UnsafeArgument(String),

    #[error("command not found on PATH: {0}")]
    CommandNotFound(String),
}

/// Errors of the window manager as a whole
#[derive(Debug, Error)]
pub enum WmError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("another window manager is already running")]
    AnotherWmRunning,
}

/// Log a rejection at warn level and swallow it
pub fn log_rejection<T>(result: Result<T, Rejection>, operation: &str) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Rejected {}: {}", operation, e);
            None
        }
    }
}
