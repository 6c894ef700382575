//! State convergence for eventually-consistent resources
//!
//! Mutating calls against the block storage API return immediately with the
//! resource in a transitional state. This module blocks the caller until the
//! resource actually converges.
//!
//! # Module Structure
//!
//! - [`refresh`] - Refresh function contract and lookup classification
//! - [`waiter`] - The polling state machine
//! - [`backoff`] - Poll interval schedule
//!
//! # Example
//!
//! ```ignore
//! use crate::wait::{wait_for, Status, WaitSpec};
//!
//! let outcome = wait_for(
//!     WaitSpec::new(volumes::state_refresh(&client, &id))
//!         .pending(["deleting"])
//!         .target([Status::Absent]),
//! )
//! .await?;
//! ```

pub mod backoff;
pub mod refresh;
pub mod waiter;

pub use backoff::PollBackoff;
pub use refresh::{classify, is_missing, MissingResource, PollOutcome, Status};
pub use waiter::{wait_for, WaitError, WaitOutcome, WaitSpec, DEFAULT_TIMEOUT};
