use crate::reason::{describe, Reason};

/// Errors raised by stream controllers and endpoints.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ControllerError {
    /// The stream was closed gracefully and accepts no further signals.
    #[error("stream already closed")]
    Closed,

    /// The stream was errored; carries the reason it was errored with.
    #[error("stream errored: {}", describe(.0.as_ref()))]
    Errored(Option<Reason>),

    /// The other end of the stream has been dropped.
    #[error("stream endpoint detached")]
    Detached,
}

impl ControllerError {
    /// Reason attached to an errored stream, if any.
    pub fn reason(&self) -> Option<&Reason> {
        match self {
            ControllerError::Errored(reason) => reason.as_ref(),
            _ => None,
        }
    }

    /// Convert into a reason suitable for propagation to a peer.
    pub fn into_reason(self) -> Reason {
        match self {
            ControllerError::Errored(Some(reason)) => reason,
            other => Reason::new(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;
