//! Block Storage Volumes
//!
//! Typed wrappers over the `/volumes` endpoints and the volume refresh
//! function used to wait on status changes.

use super::client::BlockStorageClient;
use super::http::ApiError;
use crate::wait::{classify, PollOutcome};
use anyhow::{Context, Result};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Volume status once creation has finished
pub const STATUS_AVAILABLE: &str = "available";
/// Volume is being provisioned
pub const STATUS_CREATING: &str = "creating";
/// Volume is being populated from an image
pub const STATUS_DOWNLOADING: &str = "downloading";
/// Volume deletion is in progress
pub const STATUS_DELETING: &str = "deleting";

/// Volume as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "display_name")]
    pub name: Option<String>,
    #[serde(default, rename = "display_description")]
    pub description: Option<String>,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub availability_zone: Option<String>,
    #[serde(default)]
    pub volume_type: Option<String>,
    #[serde(default)]
    pub snapshot_id: Option<String>,
    #[serde(default, rename = "source_volid")]
    pub source_vol_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub bootable: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Value>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Request body for volume creation
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateOpts {
    pub size: u32,
    #[serde(rename = "display_name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "display_description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    #[serde(rename = "source_volid", skip_serializing_if = "Option::is_none")]
    pub source_vol_id: Option<String>,
    #[serde(rename = "imageRef", skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// Request body for volume updates. Unset fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateOpts {
    #[serde(rename = "display_name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "display_description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl UpdateOpts {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.metadata.is_none()
    }
}

/// Pull the `volume` object out of a response envelope
fn extract_volume(response: Value) -> Result<Volume> {
    let volume = response
        .get("volume")
        .cloned()
        .context("Response has no 'volume' object")?;
    serde_json::from_value(volume).context("Failed to parse volume")
}

/// Fetch a single volume
pub async fn get(client: &BlockStorageClient, volume_id: &str) -> Result<Volume> {
    let response = client.get(&client.volume_url(volume_id)).await?;
    extract_volume(response)
}

/// Request a new volume. Returns as soon as the API accepts the request.
pub async fn create(client: &BlockStorageClient, opts: &CreateOpts) -> Result<Volume> {
    let body = json!({ "volume": opts });
    let response = client.post(&client.volumes_url(), Some(&body)).await?;
    extract_volume(response)
}

/// Update volume name, description or metadata
pub async fn update(
    client: &BlockStorageClient,
    volume_id: &str,
    opts: &UpdateOpts,
) -> Result<Volume> {
    let body = json!({ "volume": opts });
    let response = client.put(&client.volume_url(volume_id), Some(&body)).await?;
    extract_volume(response)
}

/// Request deletion. The volume goes through `deleting` before it disappears.
pub async fn delete(client: &BlockStorageClient, volume_id: &str) -> Result<()> {
    client.delete(&client.volume_url(volume_id)).await?;
    Ok(())
}

/// Refresh function watching one volume.
///
/// A 404/410 lookup is reported as [`crate::wait::Status::Absent`]; any other
/// failure is returned as an error.
pub fn state_refresh(
    client: &BlockStorageClient,
    volume_id: &str,
) -> impl FnMut() -> BoxFuture<'static, Result<PollOutcome<Volume>>> + Clone {
    let client = client.clone();
    let volume_id = volume_id.to_string();

    move || {
        let client = client.clone();
        let volume_id = volume_id.clone();
        async move {
            let result = get(&client, &volume_id).await;
            classify::<_, ApiError, _>(result, |v| v.status.clone())
        }
        .boxed()
    }
}
