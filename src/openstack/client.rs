//! Block Storage Client
//!
//! Client for the OpenStack block storage (Cinder v1) API, combining the
//! volume endpoint, a token and the HTTP layer.

use super::http::OsHttpClient;
use anyhow::{Context, Result};
use serde_json::Value;
use url::Url;

/// Block storage API client bound to one region's endpoint
#[derive(Clone)]
pub struct BlockStorageClient {
    pub http: OsHttpClient,
    /// Volume API base, e.g. `https://cinder.example.com:8776/v1/<project_id>`
    pub endpoint: Url,
    pub region: String,
    token: String,
}

impl BlockStorageClient {
    /// Create a new block storage client
    pub fn new(endpoint: &str, token: &str, region: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint.trim_end_matches('/'))
            .with_context(|| format!("Invalid block storage endpoint: {}", endpoint))?;

        if endpoint.cannot_be_a_base() {
            anyhow::bail!("Invalid block storage endpoint: {}", endpoint);
        }

        let http = OsHttpClient::new()?;

        Ok(Self {
            http,
            endpoint,
            region: region.to_string(),
            token: token.to_string(),
        })
    }

    /// Make a GET request to the block storage API
    pub async fn get(&self, url: &str) -> Result<Value> {
        self.http.get(url, &self.token).await
    }

    /// Make a POST request to the block storage API
    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        self.http.post(url, &self.token, body).await
    }

    /// Make a PUT request to the block storage API
    pub async fn put(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        self.http.put(url, &self.token, body).await
    }

    /// Make a DELETE request to the block storage API
    pub async fn delete(&self, url: &str) -> Result<Value> {
        self.http.delete(url, &self.token).await
    }

    /// Build a URL under the volume API endpoint
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.endpoint.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// URL of the volume collection
    pub fn volumes_url(&self) -> String {
        self.url("volumes")
    }

    /// URL of a single volume
    pub fn volume_url(&self, volume_id: &str) -> String {
        self.url(&format!("volumes/{}", urlencoding::encode(volume_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_urls() {
        let client =
            BlockStorageClient::new("https://cinder.example.com:8776/v1/abc123/", "t", "RegionOne")
                .unwrap();
        assert_eq!(
            client.volumes_url(),
            "https://cinder.example.com:8776/v1/abc123/volumes"
        );
        assert_eq!(
            client.volume_url("vol 1"),
            "https://cinder.example.com:8776/v1/abc123/volumes/vol%201"
        );
    }

    #[test]
    fn test_rejects_invalid_endpoint() {
        assert!(BlockStorageClient::new("not a url", "t", "RegionOne").is_err());
        assert!(BlockStorageClient::new("mailto:ops@example.com", "t", "RegionOne").is_err());
    }
}
