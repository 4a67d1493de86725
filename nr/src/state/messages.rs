//! State manager messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use super::app::{Action, AppState, Applied};
use super::store::StoreError;

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Channel error")]
    ChannelError,
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

/// Commands sent to the StateManager actor
#[derive(Debug)]
pub enum StateCommand {
    Dispatch {
        action: Action,
        reply: oneshot::Sender<StateResponse<Applied>>,
    },
    Snapshot {
        reply: oneshot::Sender<AppState>,
    },
    Shutdown,
}
