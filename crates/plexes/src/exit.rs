use std::fmt;
use std::io;

use plexes_duplex::PlexError;
use plexes_stream::ControllerError;
use tokio_util::codec::LinesCodecError;

// 64 and up follow sysexits.h; 124 matches timeout(1).
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::BrokenPipe => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn stream_error(context: &str, err: ControllerError) -> CliError {
    match err {
        ControllerError::Closed | ControllerError::Errored(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        ControllerError::Detached => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

pub fn plex_error(context: &str, err: PlexError) -> CliError {
    match err {
        PlexError::Controller(err) => stream_error(context, err),
        PlexError::Stopped { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
        PlexError::EndpointTaken { .. } => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

pub fn lines_error(context: &str, err: LinesCodecError) -> CliError {
    match err {
        LinesCodecError::Io(source) => io_error(context, source),
        LinesCodecError::MaxLineLengthExceeded => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use plexes_stream::Reason;

    use super::*;

    #[test]
    fn stopped_simplex_is_a_plain_failure() {
        let err = plex_error(
            "send",
            PlexError::Stopped {
                label: "a.output".to_string(),
                reason: Some(Reason::msg("gone")),
            },
        );
        assert_eq!(err.code, FAILURE);
        assert!(err.message.starts_with("send: "));
    }

    #[test]
    fn taken_endpoint_is_internal() {
        let err = plex_error(
            "endpoints",
            PlexError::EndpointTaken {
                label: "relay.output".to_string(),
            },
        );
        assert_eq!(err.code, INTERNAL);
    }

    #[test]
    fn long_lines_are_invalid_data() {
        let err = lines_error("stdin", LinesCodecError::MaxLineLengthExceeded);
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn io_kinds_map_to_codes() {
        let denied = io_error("x", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(denied.code, PERMISSION_DENIED);
        let other = io_error("x", io::Error::other("boom"));
        assert_eq!(other.code, INTERNAL);
    }
}
