//! Client for the hierarchical remote store (a realtime JSON tree addressed
//! by path). Constructed explicitly and passed where needed; there is no
//! module-level app handle.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("remote store returned {status} for {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("failed to parse remote store response: {source}\nbody: {body}")]
    Parse {
        body: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug)]
pub struct RemoteStore {
    config: RemoteConfig,
    client: reqwest::Client,
}

impl RemoteStore {
    pub fn new(config: RemoteConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// Endpoint for a tree path. The auth token travels as a query parameter
    /// added separately, so it never shows up in error messages.
    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}.json", self.config.base_url.trim_end_matches('/'))
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.auth_token {
            Some(token) => builder.query(&[("auth", token.as_str())]),
            None => builder,
        }
    }

    async fn read_body(url: &str, response: reqwest::Response) -> Result<String, RemoteError> {
        let status = response.status();
        let body = response.text().await.map_err(|source| RemoteError::Transport {
            url: url.to_string(),
            source,
        })?;
        if !status.is_success() {
            return Err(RemoteError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    /// Point read. A stored `null` (or nothing at all) reads back as `None`.
    pub async fn get(&self, path: &str) -> Result<Option<Value>, RemoteError> {
        let url = self.endpoint(path);
        let response = self
            .with_auth(self.client.get(&url))
            .send()
            .await
            .map_err(|source| RemoteError::Transport {
                url: url.clone(),
                source,
            })?;
        let body = Self::read_body(&url, response).await?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|source| RemoteError::Parse { body, source })?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    /// Children of a tree node, keyed by sub-key. A missing node lists as
    /// empty.
    pub async fn list(&self, path: &str) -> Result<BTreeMap<String, Value>, RemoteError> {
        match self.get(path).await? {
            Some(value) => {
                let body = value.to_string();
                serde_json::from_value(value)
                    .map_err(|source| RemoteError::Parse { body, source })
            }
            None => Ok(BTreeMap::new()),
        }
    }

    /// Full-value overwrite of the node at `path`. There are no partial
    /// updates.
    pub async fn put(&self, path: &str, value: &impl Serialize) -> Result<(), RemoteError> {
        let url = self.endpoint(path);
        let response = self
            .with_auth(self.client.put(&url))
            .json(value)
            .send()
            .await
            .map_err(|source| RemoteError::Transport {
                url: url.clone(),
                source,
            })?;
        Self::read_body(&url, response).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> Result<(), RemoteError> {
        let url = self.endpoint(path);
        let response = self
            .with_auth(self.client.delete(&url))
            .send()
            .await
            .map_err(|source| RemoteError::Transport {
                url: url.clone(),
                source,
            })?;
        Self::read_body(&url, response).await?;
        Ok(())
    }
}
