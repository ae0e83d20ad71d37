use thiserror::Error;

use crate::stack::DialogKind;

/// Failures raised while wiring the bot or driving a turn.
///
/// Rejected user input is never an error; it surfaces as an
/// [`UpdateProblem`](crate::ticket::UpdateProblem) instead.
#[derive(Debug, Error)]
pub enum DialogError {
    #[error("missing dependency: {0}")]
    MissingDependency(&'static str),

    #[error("no active dialog")]
    NoActiveDialog,

    #[error("ticket is not ready for submission: {0}")]
    IncompleteRecord(String),

    #[error("invalid state for dialog {dialog}: {detail}")]
    InvalidFrameState { dialog: DialogKind, detail: String },

    #[error("state serialization failed: {0}")]
    State(#[from] serde_json::Error),

    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

pub type DialogResult<T> = std::result::Result<T, DialogError>;
