//! OpenStack API interaction module
//!
//! This module provides the block storage client used by the volume
//! resource handlers and their refresh functions.
//!
//! # Module Structure
//!
//! - [`client`] - Block storage client bound to one region's endpoint
//! - [`http`] - HTTP utilities and typed API errors
//! - [`volumes`] - Volume endpoints and the volume refresh function
//!
//! # Example
//!
//! ```ignore
//! use crate::openstack::{client::BlockStorageClient, volumes};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = BlockStorageClient::new("https://cinder:8776/v1/abc", "token", "RegionOne")?;
//!     let volume = volumes::get(&client, "521752a6").await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod http;
pub mod volumes;
