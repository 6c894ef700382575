//! Refresh Functions
//!
//! A refresh function is a parameterless probe bound to one remote resource.
//! Each call performs exactly one lookup and classifies the result as an
//! observed status, the [`Status::Absent`] sentinel, or a hard error.

use anyhow::Result;
use std::fmt;

/// Status reported by a single poll
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    /// Status string reported by the remote system
    Reported(String),
    /// The lookup said the resource does not exist
    Absent,
}

impl Status {
    /// Build a reported status
    pub fn reported(status: impl Into<String>) -> Self {
        Self::Reported(status.into())
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl From<&str> for Status {
    fn from(value: &str) -> Self {
        Self::Reported(value.to_string())
    }
}

impl From<String> for Status {
    fn from(value: String) -> Self {
        Self::Reported(value)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reported(s) => write!(f, "{}", s),
            Self::Absent => write!(f, "<absent>"),
        }
    }
}

/// Outcome of one successful refresh
#[derive(Debug, Clone)]
pub struct PollOutcome<T> {
    /// Snapshot of the resource, if the lookup returned one
    pub object: Option<T>,
    pub status: Status,
}

impl<T> PollOutcome<T> {
    pub fn observed(object: T, status: impl Into<Status>) -> Self {
        Self {
            object: Some(object),
            status: status.into(),
        }
    }

    pub fn absent() -> Self {
        Self {
            object: None,
            status: Status::Absent,
        }
    }
}

/// Transport errors that can signal "this resource does not exist".
///
/// Implementors own the mapping table from their transport-level signals
/// (HTTP status codes, SDK error codes) to the absent sentinel, which keeps
/// the waiter itself transport-agnostic.
pub trait MissingResource: std::error::Error + Send + Sync + 'static {
    fn is_missing(&self) -> bool;
}

/// Classify the result of a lookup into a poll outcome.
///
/// * `Ok(snapshot)` - the snapshot's own status, via `status_of`
/// * `Err` carrying an `E` whose [`MissingResource::is_missing`] holds - [`Status::Absent`]
/// * any other error - returned unchanged; the waiter decides what to do
pub fn classify<T, E, S>(result: Result<T>, status_of: S) -> Result<PollOutcome<T>>
where
    E: MissingResource,
    S: FnOnce(&T) -> String,
{
    match result {
        Ok(object) => {
            let status = status_of(&object);
            Ok(PollOutcome::observed(object, status))
        }
        Err(err) if is_missing::<E>(&err) => Ok(PollOutcome::absent()),
        Err(err) => Err(err),
    }
}

/// Check whether any error in the chain is a missing-resource signal
pub fn is_missing<E: MissingResource>(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<E>())
        .any(|cause| cause.is_missing())
}
