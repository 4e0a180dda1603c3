//! REST client for the hosted key-value store
//!
//! Protocol:
//! - `GET  <base>/get/<key>`          -> `{"result": "<value>" | null}`
//! - `POST <base>/set/<key>/<value>`  -> `{"result": "OK"}`
//! - `POST <base>` with a JSON command array, used for the compare-and-swap script
//!
//! Every call carries `Authorization: Bearer <token>`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::{CounterStore, StoreError};

/// Sets KEYS[1] to ARGV[2] when it currently equals ARGV[1]; an empty
/// ARGV[1] matches a missing key.
const CAS_SCRIPT: &str = r#"local current = redis.call('GET', KEYS[1])
if (current == false and ARGV[1] == '') or current == ARGV[1] then
  redis.call('SET', KEYS[1], ARGV[2])
  return 1
end
return 0"#;

#[derive(Debug, Deserialize)]
struct KvResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Counter store reached over the store's REST API
#[derive(Clone)]
pub struct KvRestStore {
    client: Client,
    base_url: Url,
    token: String,
}

impl KvRestStore {
    /// Create a store client with a fresh HTTP client
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, StoreError> {
        Self::with_client(Client::builder().build()?, base_url, token)
    }

    /// Create a store client sharing an existing HTTP client
    pub fn with_client(
        client: Client,
        base_url: &str,
        token: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let base_url =
            Url::parse(base_url).map_err(|e| StoreError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl(base_url.to_string()));
        }

        Ok(Self {
            client,
            base_url,
            token: token.into(),
        })
    }

    /// Build `<base>/<segments...>` with each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Turn an HTTP response into the `result` field of the store's envelope
    async fn read_result(response: reqwest::Response) -> Result<Option<Value>, StoreError> {
        let status = response.status();
        let text = response.text().await?;

        let parsed: Result<KvResponse, _> = serde_json::from_str(&text);

        if !status.is_success() {
            let message = parsed
                .ok()
                .and_then(|r| r.error)
                .unwrap_or(text);
            return Err(StoreError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let envelope = parsed.map_err(|e| StoreError::Malformed(e.to_string()))?;
        if let Some(error) = envelope.error {
            return Err(StoreError::Status {
                status: status.as_u16(),
                message: error,
            });
        }

        Ok(envelope.result.filter(|v| !v.is_null()))
    }
}

#[async_trait]
impl CounterStore for KvRestStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let url = self.endpoint(&["get", key])?;

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        match Self::read_result(response).await? {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(StoreError::Malformed(format!(
                "unexpected result type: {}",
                other
            ))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let url = self.endpoint(&["set", key, value])?;

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        Self::read_result(response).await?;
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<bool, StoreError> {
        let command = ["EVAL", CAS_SCRIPT, "1", key, expected.unwrap_or(""), new];

        let response = self
            .client
            .post(self.base_url.clone())
            .bearer_auth(&self.token)
            .json(&command)
            .send()
            .await?;

        match Self::read_result(response).await? {
            Some(Value::Number(n)) => Ok(n.as_i64() == Some(1)),
            Some(other) => Err(StoreError::Malformed(format!(
                "unexpected compare-and-swap result: {}",
                other
            ))),
            None => Err(StoreError::Malformed("missing compare-and-swap result".to_string())),
        }
    }
}
