//! Volume Resource
//!
//! Create, read, update and delete handlers for block storage volumes. Every
//! mutating call is followed by a wait until the volume converges.

use crate::openstack::client::BlockStorageClient;
use crate::openstack::http::ApiError;
use crate::openstack::volumes::{
    self, CreateOpts, UpdateOpts, Volume, STATUS_AVAILABLE, STATUS_CREATING, STATUS_DELETING,
    STATUS_DOWNLOADING,
};
use crate::wait::{is_missing, wait_for, Status, WaitOutcome, WaitSpec};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::time::Duration;

/// Timing parameters for the waits issued by the handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTimings {
    pub create_timeout: Duration,
    pub delete_timeout: Duration,
    /// Delay before the first poll after a mutating call
    pub delay: Duration,
    pub min_poll_interval: Duration,
}

impl Default for WaitTimings {
    fn default() -> Self {
        Self {
            create_timeout: Duration::from_secs(10 * 60),
            delete_timeout: Duration::from_secs(10 * 60),
            delay: Duration::from_secs(10),
            min_poll_interval: Duration::from_secs(3),
        }
    }
}

impl WaitTimings {
    fn apply<F>(&self, spec: WaitSpec<F>, timeout: Duration) -> WaitSpec<F> {
        spec.timeout(timeout)
            .initial_delay(self.delay)
            .min_poll_interval(self.min_poll_interval)
    }
}

/// Desired state of a volume
#[derive(Debug, Clone, Default)]
pub struct VolumeArgs {
    /// Size in GB
    pub size: u32,
    pub name: Option<String>,
    pub description: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub snapshot_id: Option<String>,
    pub source_vol_id: Option<String>,
    pub image_id: Option<String>,
    pub volume_type: Option<String>,
    pub availability_zone: Option<String>,
}

impl VolumeArgs {
    fn create_opts(&self) -> CreateOpts {
        CreateOpts {
            size: self.size,
            name: self.name.clone(),
            description: self.description.clone(),
            snapshot_id: self.snapshot_id.clone(),
            source_vol_id: self.source_vol_id.clone(),
            image_id: self.image_id.clone(),
            volume_type: self.volume_type.clone(),
            availability_zone: self.availability_zone.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Create a volume and block until it is available.
///
/// Transitional statuses are enumerated explicitly; any other status (for
/// example `error`) fails the create instead of timing out.
pub async fn create(
    client: &BlockStorageClient,
    args: &VolumeArgs,
    timings: &WaitTimings,
) -> Result<Volume> {
    if args.size == 0 {
        anyhow::bail!("Volume size must be at least 1 GB");
    }

    tracing::info!("Requesting volume creation");
    let volume = volumes::create(client, &args.create_opts())
        .await
        .context("Error creating OpenStack volume")?;
    tracing::info!("Volume ID: {}", volume.id);

    tracing::debug!("Waiting for volume ({}) to become available", volume.id);
    let spec = WaitSpec::new(volumes::state_refresh(client, &volume.id))
        .target([STATUS_AVAILABLE])
        .pending([STATUS_CREATING, STATUS_DOWNLOADING]);

    wait_for(timings.apply(spec, timings.create_timeout))
        .await
        .with_context(|| format!("Error waiting for volume ({}) to become ready", volume.id))?;

    read(client, &volume.id)
        .await?
        .with_context(|| format!("Volume ({}) disappeared after creation", volume.id))
}

/// Fetch the current state of a volume. `Ok(None)` means it no longer exists.
pub async fn read(client: &BlockStorageClient, volume_id: &str) -> Result<Option<Volume>> {
    match volumes::get(client, volume_id).await {
        Ok(volume) => {
            tracing::debug!("Retrieved volume {}: {:?}", volume_id, volume);
            Ok(Some(volume))
        }
        Err(err) if is_missing::<ApiError>(&err) => {
            tracing::warn!("Volume ({}) not found", volume_id);
            Ok(None)
        }
        Err(err) => {
            Err(err.context(format!("Error retrieving OpenStack volume ({})", volume_id)))
        }
    }
}

/// In-place changes to an existing volume
#[derive(Debug, Clone, Default)]
pub struct VolumeChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Replaces the whole metadata map when set
    pub metadata: Option<BTreeMap<String, String>>,
}

/// Apply in-place changes, then read the volume back
pub async fn update(
    client: &BlockStorageClient,
    volume_id: &str,
    changes: &VolumeChanges,
) -> Result<Volume> {
    let opts = UpdateOpts {
        name: changes.name.clone(),
        description: changes.description.clone(),
        metadata: changes.metadata.clone(),
    };

    if !opts.is_empty() {
        volumes::update(client, volume_id, &opts)
            .await
            .context("Error updating OpenStack volume")?;
    }

    read(client, volume_id)
        .await?
        .with_context(|| format!("Volume ({}) not found", volume_id))
}

/// Delete a volume and block until the API no longer knows it.
///
/// If the wait fails the volume is left as observed; nothing is retried.
pub async fn delete(
    client: &BlockStorageClient,
    volume_id: &str,
    timings: &WaitTimings,
) -> Result<()> {
    volumes::delete(client, volume_id)
        .await
        .context("Error deleting OpenStack volume")?;

    tracing::debug!("Waiting for volume ({}) to delete", volume_id);
    let spec = WaitSpec::new(volumes::state_refresh(client, volume_id))
        .pending([STATUS_DELETING])
        .target([Status::Absent]);

    wait_for(timings.apply(spec, timings.delete_timeout))
        .await
        .with_context(|| format!("Error waiting for volume ({}) to delete", volume_id))?;

    tracing::info!("Volume ({}) deleted", volume_id);
    Ok(())
}

/// Target name that stands for the volume no longer existing
pub const DELETED_TARGET: &str = "deleted";

/// Parse a user-supplied target status; [`DELETED_TARGET`] maps to [`Status::Absent`]
pub fn parse_target(status: &str) -> Status {
    if status.eq_ignore_ascii_case(DELETED_TARGET) {
        Status::Absent
    } else {
        Status::from(status)
    }
}

/// Wait for an arbitrary status transition without mutating anything
pub async fn wait_for_status(
    client: &BlockStorageClient,
    volume_id: &str,
    target: Vec<Status>,
    pending: Vec<Status>,
    timeout: Duration,
    min_poll_interval: Duration,
) -> Result<WaitOutcome<Volume>> {
    let spec = WaitSpec::new(volumes::state_refresh(client, volume_id))
        .target(target)
        .pending(pending)
        .timeout(timeout)
        .min_poll_interval(min_poll_interval);

    wait_for(spec)
        .await
        .with_context(|| format!("Error waiting for volume ({})", volume_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wait::PollOutcome;

    #[test]
    fn test_deleted_target_means_absent() {
        assert_eq!(parse_target("deleted"), Status::Absent);
        assert_eq!(parse_target("DELETED"), Status::Absent);
        assert_eq!(parse_target("available"), Status::reported("available"));
        assert_eq!(parse_target("deleting"), Status::reported("deleting"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_target_converges_on_not_found() {
        let target: Vec<Status> = ["deleted"].into_iter().map(parse_target).collect();
        let spec = WaitSpec::new(|| std::future::ready(Ok(PollOutcome::<Volume>::absent())))
        .target(target)
        .pending([STATUS_DELETING])
        .timeout(Duration::from_secs(5));

        let outcome = wait_for(spec).await.unwrap();
        assert!(outcome.status.is_absent());
        assert!(outcome.object.is_none());
    }
}
