//! Shared request plumbing and the response envelope.

use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Every API response is wrapped in this envelope; the payload sits under
/// a per-kind key inside `data`.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    #[serde(default)]
    #[allow(dead_code)]
    pub code: i32,
    #[serde(default)]
    #[allow(dead_code)]
    pub error: serde_json::Value,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    /// Pull the typed payload out of `data`.
    pub fn data_field<T: DeserializeOwned>(self, key: &str) -> Result<T> {
        let value = self
            .data
            .get(key)
            .cloned()
            .ok_or_else(|| Error::MissingField(key.to_string()))?;
        Ok(serde_json::from_value(value)?)
    }

    /// Like [`Envelope::data_field`] but tolerates a missing or null key,
    /// which the server emits for empty lists.
    pub fn list_field<T: DeserializeOwned + Default>(self, key: &str) -> Result<T> {
        match self.data.get(key) {
            None | Some(serde_json::Value::Null) => Ok(T::default()),
            Some(value) => Ok(serde_json::from_value(value.clone())?),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Rest {
    http: reqwest::Client,
    base_url: String,
}

impl Rest {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> Result<Envelope> {
        let request = self.http.get(self.url(path));
        self.finish(request, path).await
    }

    pub async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<Envelope> {
        let request = self.http.post(self.url(path)).json(body);
        self.finish(request, path).await
    }

    pub async fn put<B: Serialize>(&self, path: &str, body: &B) -> Result<Envelope> {
        let request = self.http.put(self.url(path)).json(body);
        self.finish(request, path).await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.url(path))
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        self.check_status(response, path).await?;
        Ok(())
    }

    /// Raw streaming GET; the caller consumes the body chunk by chunk.
    pub async fn stream(&self, path: &str) -> Result<reqwest::Response> {
        let response = self.http.get(self.url(path)).send().await?;
        self.check_status(response, path).await
    }

    async fn finish(&self, request: reqwest::RequestBuilder, path: &str) -> Result<Envelope> {
        let response = request.header(ACCEPT, "application/json").send().await?;
        let response = self.check_status(response, path).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn check_status(
        &self,
        response: reqwest::Response,
        path: &str,
    ) -> Result<reqwest::Response> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}
