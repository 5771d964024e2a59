//! Error kinds callers need to tell apart.
//!
//! Operations return [`anyhow::Result`]; these types travel inside the [`anyhow::Error`] and are recovered with
//! `downcast_ref` where the kind changes behaviour (retry, tolerate absence, report a precondition).

use serde_json::Value;

use crate::state::Category;

/// An operation ran before the flag it depends on was in the expected state.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("check for state {category}:{tag}:{expected} failed (found {})", .actual.as_deref().unwrap_or("nothing"))]
pub struct StateCheckError {
    pub category: Category,
    pub tag: String,
    pub expected: String,
    pub actual: Option<String>,
}

/// Failures reported by the host node, its containers or a daemon running inside one.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SalError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("can't reserve port")]
    NoFreePort,
    #[error("{0} is busy")]
    Busy(String),
    #[error("{0} is not reachable")]
    Unreachable(String),
    #[error("{what} failed: {reason}")]
    Failed { what: String, reason: String },
}

impl SalError {
    /// Whether waiting and trying again may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SalError::Busy(_) | SalError::Unreachable(_))
    }
}

/// Returns true if the error is, or wraps, a [`SalError::NotFound`].
pub fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<SalError>(), Some(SalError::NotFound(_)))
}

/// Returns true if the error is worth retrying.
pub fn is_transient(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SalError>()
        .is_some_and(SalError::is_transient)
}

/// A JSON-RPC reply that does not belong to the request we sent.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct InvalidResponseError {
    pub message: String,
    /// The unexpected response, as returned by the daemon.
    pub response: Value,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("service {template}/{name} not found")]
pub struct ServiceNotFoundError {
    pub template: String,
    pub name: String,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("template {template} has no action {action}")]
pub struct UnknownActionError {
    pub template: String,
    pub action: String,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid template uid {0:?}: expected <host>/<account>/<repo>/<name>/<version>")]
pub struct InvalidTemplateUid(pub String);
