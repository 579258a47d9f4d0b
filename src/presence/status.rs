//! Instance occupancy fetched from a remote status endpoint

use crate::host::{FetchError, InstanceDirectory, InstanceId, InstanceSnapshot};

#[derive(Debug, serde::Deserialize)]
pub struct InstanceStatus {
    pub id: String,
    pub capacity: u32,
    pub players: u32,
}

impl From<InstanceStatus> for InstanceSnapshot {
    fn from(status: InstanceStatus) -> Self {
        InstanceSnapshot {
            id: InstanceId::new(status.id),
            capacity: status.capacity,
            player_count: status.players,
        }
    }
}

/// Looks instances up at `{base_url}/instances/{id}`
pub struct HttpInstanceDirectory {
    client: reqwest::Client,
    base_url: url::Url,
}

impl HttpInstanceDirectory {
    pub fn new(base_url: &str) -> Result<Self, url::ParseError> {
        let mut base_url = url::Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
        })
    }

    pub fn instance_url(&self, id: &InstanceId) -> Result<url::Url, FetchError> {
        let encoded =
            url::form_urlencoded::byte_serialize(id.as_str().as_bytes()).collect::<String>();
        self.base_url
            .join(&format!("instances/{}", encoded))
            .map_err(|e| FetchError::Other(e.to_string()))
    }
}

#[async_trait::async_trait]
impl InstanceDirectory for HttpInstanceDirectory {
    async fn fetch(&self, id: &InstanceId) -> Result<InstanceSnapshot, FetchError> {
        if !id.is_valid() {
            return Err(FetchError::InvalidId(id.clone()));
        }

        let url = self.instance_url(id)?;
        tracing::trace!("Fetching instance status from {}", url);

        let response = self.client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(id.clone()));
        }

        let status: InstanceStatus = response.error_for_status()?.json().await?;
        Ok(status.into())
    }
}
