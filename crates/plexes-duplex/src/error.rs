use plexes_stream::{describe, ControllerError, Reason};

/// Errors returned by simplex and duplex operations.
#[derive(Debug, thiserror::Error)]
pub enum PlexError {
    /// The underlying stream controller refused the operation.
    #[error("controller error: {0}")]
    Controller(#[from] ControllerError),

    /// The simplex already stopped; the item was dropped.
    #[error("{label} stopped ({})", describe(.reason.as_ref()))]
    Stopped {
        label: String,
        reason: Option<Reason>,
    },

    /// A single-consumer endpoint was already handed out.
    #[error("{label}: readable endpoint already taken")]
    EndpointTaken { label: String },
}

pub type Result<T> = std::result::Result<T, PlexError>;
