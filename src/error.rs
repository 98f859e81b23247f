//! Crate-wide error type.
//!
//! Typed, matchable failures via `thiserror` inside the library;
//! callers at the outer supervisor/CLI boundary convert into
//! `anyhow::Error` where they only care that something failed and want
//! a message.

use thiserror::Error;

/// Everything that can go wrong inside the KGB core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed change string: {0:?}")]
    BadChange(String),

    #[error("commit log is not valid UTF-8")]
    BadUtf8,

    #[error("unknown repository: {0}")]
    UnknownRepo(String),

    #[error("unknown protocol version: {0}")]
    UnknownProtocolVersion(i64),

    #[error("protocol version {0} is below the configured minimum")]
    ProtocolVersionTooOld(i64),

    #[error("wrong argument count: expected one of {expected:?}, got {got}")]
    BadArity { expected: Vec<usize>, got: usize },

    #[error("authentication failed for repository {0}")]
    AuthFailed(String),

    #[error("send queue saturated")]
    Slowdown,

    #[error("branch/module regex must have exactly two capture groups: {0}")]
    BadBranchModuleRegex(String),

    #[error("no server reference succeeded")]
    AllServersFailed,

    #[error("http request failed: {0}")]
    Http(String),

    #[error("irc protocol error: {0}")]
    Irc(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The RPC fault codes the wire protocol actually exposes.
/// Every [`Error`] that can reach the RPC boundary maps to exactly one
/// of these; anything else is a bug, not a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    /// `Client.Arguments` — bad arity, unknown protocol, unknown repo,
    /// bad UTF-8, auth failure.
    Arguments,
    /// `Client.Slowdown` — the IRC send backlog is saturated.
    Slowdown,
}

impl FaultCode {
    pub fn as_str(self) -> &'static str {
        match self {
            FaultCode::Arguments => "Client.Arguments",
            FaultCode::Slowdown => "Client.Slowdown",
        }
    }
}

impl Error {
    /// Classify this error as an RPC fault, if it is one. Errors that
    /// never reach the RPC boundary (e.g. `Io`, `Config`) return
    /// `None`.
    pub fn fault_code(&self) -> Option<FaultCode> {
        match self {
            Error::BadChange(_)
            | Error::BadUtf8
            | Error::UnknownRepo(_)
            | Error::UnknownProtocolVersion(_)
            | Error::ProtocolVersionTooOld(_)
            | Error::BadArity { .. }
            | Error::AuthFailed(_) => Some(FaultCode::Arguments),
            Error::Slowdown => Some(FaultCode::Slowdown),
            _ => None,
        }
    }
}
