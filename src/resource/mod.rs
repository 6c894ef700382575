//! Resource handlers
//!
//! Create/read/update/delete handlers that translate a declarative
//! description into block storage API calls and wait for the result to
//! converge.
//!
//! # Architecture
//!
//! - [`volume`] - Block storage volume lifecycle
//!
//! # Example
//!
//! ```ignore
//! use crate::resource::{self, VolumeArgs, WaitTimings};
//!
//! async fn make_volume(client: &BlockStorageClient) -> anyhow::Result<Volume> {
//!     let args = VolumeArgs { size: 10, ..Default::default() };
//!     resource::create(client, &args, &WaitTimings::default()).await
//! }
//! ```

pub mod volume;

pub use volume::{
    create, delete, parse_target, read, update, wait_for_status, VolumeArgs, VolumeChanges,
    WaitTimings, DELETED_TARGET,
};
