//! Upstream incidents search client.

use crate::error::RefreshError;
use crate::incident::Incident;
use serde_json::Value;
use std::time::Duration;
use url::Url;

const DATA_KEY: &str = "data";

pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new(timeout: Option<Duration>) -> Result<Self, RefreshError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Issues a single GET and decodes the `data` array. No retries.
    pub async fn fetch(&self, url: &Url) -> Result<Vec<Incident>, RefreshError> {
        log::debug!("fetching {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;
        decode(&body)
    }
}

pub fn decode(body: &[u8]) -> Result<Vec<Incident>, RefreshError> {
    let mut payload: Value = serde_json::from_slice(body)?;
    let data = payload
        .get_mut(DATA_KEY)
        .map(Value::take)
        .ok_or(RefreshError::MissingKey(DATA_KEY))?;
    Ok(serde_json::from_value(data)?)
}
