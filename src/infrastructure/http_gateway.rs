//! HTTP transport to a hosted payment gateway.
//!
//! Authentication follows the usual hosted-gateway scheme: the secret API key
//! is sent as the basic-auth user name with an empty password.

use crate::domain::ports::Gateway;
use crate::error::GatewayError;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct HttpGateway {
    inner: Arc<HttpGatewayInner>,
}

struct HttpGatewayInner {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<SecretString>,
}

impl HttpGateway {
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(base_url: Url, api_key: Option<SecretString>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Unreachable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            inner: Arc::new(HttpGatewayInner {
                client,
                base_url,
                api_key,
            }),
        })
    }

    fn url(&self, path: &str) -> Result<Url, GatewayError> {
        // Keep any path prefix of the base URL.
        let mut base = self.inner.base_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        base.join(path.trim_start_matches('/'))
            .map_err(|e| GatewayError::Unreachable(format!("invalid gateway path {path}: {e}")))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.inner.api_key {
            Some(key) => request.basic_auth(key.expose_secret(), Some("")),
            None => request,
        }
    }

    async fn handle_response(&self, response: reqwest::Response) -> Result<Value, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| GatewayError::Decode(format!("Failed to parse response: {e}")));
        }
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn post(&self, path: &str, body: Value) -> Result<Value, GatewayError> {
        let url = self.url(path)?;
        tracing::debug!(%url, "gateway POST");
        let response = self
            .authorize(self.inner.client.post(url))
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;
        self.handle_response(response).await
    }

    async fn get(&self, path: &str) -> Result<Value, GatewayError> {
        let url = self.url(path)?;
        tracing::debug!(%url, "gateway GET");
        let response = self
            .authorize(self.inner.client.get(url))
            .send()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;
        self.handle_response(response).await
    }
}
