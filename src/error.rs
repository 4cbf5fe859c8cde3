use std::env;
use std::fmt::Debug;

/// Crate-wide error. The code selects the failure class: 1-99 internal,
/// 100-199 conflict, 200-299 not found, 300-399 authorization, 400-499
/// validation, 500-599 transport/upstream.
#[derive(Debug)]
pub struct Error {
    pub code: i32,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Internal,
    Conflict,
    NotFound,
    Unauthorized,
    Validation,
    Transport,
}

impl Error {
    pub fn kind(&self) -> Kind {
        match self.code {
            100..=199 => Kind::Conflict,
            200..=299 => Kind::NotFound,
            300..=399 => Kind::Unauthorized,
            400..=499 => Kind::Validation,
            500..=599 => Kind::Transport,
            _ => Kind::Internal,
        }
    }

    /// Conflicts retry after a refresh, transport failures retry manually.
    /// Everything else is fatal for the attempted action.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), Kind::Conflict | Kind::Transport)
    }
}

impl From<env::VarError> for Error {
    fn from(err: env::VarError) -> Self {
        env_var_error(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        serialization_error(err)
    }
}

impl From<oso::OsoError> for Error {
    fn from(err: oso::OsoError) -> Self {
        policy_error(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            timeout_error()
        } else {
            transport_error(err)
        }
    }
}

pub fn env_var_error(_: env::VarError) -> Error {
    Error {
        code: 1,
        message: "environment variable error".into(),
    }
}

pub fn serialization_error<T: Debug>(_: T) -> Error {
    Error {
        code: 2,
        message: "serialization error".into(),
    }
}

pub fn policy_error<T: Debug>(_: T) -> Error {
    Error {
        code: 3,
        message: "authorization policy error".into(),
    }
}

pub fn unexpected_error() -> Error {
    Error {
        code: 5,
        message: "unexpected error".into(),
    }
}

pub fn conflict_error() -> Error {
    Error {
        code: 100,
        message: "conflicting update, refresh and retry".into(),
    }
}

pub fn ride_busy_error() -> Error {
    Error {
        code: 101,
        message: "another action for this ride is in flight".into(),
    }
}

pub fn invalid_transition_error() -> Error {
    Error {
        code: 102,
        message: "invalid status transition".into(),
    }
}

pub fn not_found_error() -> Error {
    Error {
        code: 200,
        message: "not found".into(),
    }
}

pub fn unauthorized_error() -> Error {
    Error {
        code: 300,
        message: "unauthorized".into(),
    }
}

pub fn blocked_user_error() -> Error {
    Error {
        code: 301,
        message: "account is blocked".into(),
    }
}

pub fn signed_out_error() -> Error {
    Error {
        code: 302,
        message: "sign in required".into(),
    }
}

pub fn forbidden_error() -> Error {
    Error {
        code: 303,
        message: "forbidden".into(),
    }
}

pub fn validation_error(message: &str) -> Error {
    Error {
        code: 400,
        message: message.into(),
    }
}

pub fn transport_error<T: Debug>(_: T) -> Error {
    Error {
        code: 500,
        message: "network error".into(),
    }
}

pub fn timeout_error() -> Error {
    Error {
        code: 501,
        message: "request timed out".into(),
    }
}

pub fn upstream_error() -> Error {
    Error {
        code: 502,
        message: "upstream service error".into(),
    }
}

#[test]
fn codes_map_to_kinds() {
    assert_eq!(conflict_error().kind(), Kind::Conflict);
    assert_eq!(invalid_transition_error().kind(), Kind::Conflict);
    assert_eq!(not_found_error().kind(), Kind::NotFound);
    assert_eq!(blocked_user_error().kind(), Kind::Unauthorized);
    assert_eq!(validation_error("bad").kind(), Kind::Validation);
    assert_eq!(timeout_error().kind(), Kind::Transport);
    assert_eq!(unexpected_error().kind(), Kind::Internal);
}

#[test]
fn only_conflicts_and_transport_failures_retry() {
    assert!(conflict_error().is_retryable());
    assert!(ride_busy_error().is_retryable());
    assert!(upstream_error().is_retryable());
    assert!(!unauthorized_error().is_retryable());
    assert!(!validation_error("bad").is_retryable());
    assert!(!not_found_error().is_retryable());
}
