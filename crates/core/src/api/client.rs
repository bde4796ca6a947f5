#![allow(missing_docs)]

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::{config::AppConfig, error::ApiError};

/// Stateless HTTP client for the EQDB REST API.
///
/// The client holds no credentials: the bearer token is threaded into
/// each request explicitly by the caller, so concurrent requests can
/// never observe a half-updated default header.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Build a client from configuration.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Issue a request, attaching the bearer token when given, and map
    /// transport failures and non-2xx statuses into [`ApiError`].
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> Result<Response, ApiError> {
        let mut request = self.http.request(method, self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(ApiError::Network)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = read_message(response).await;
        match status.as_u16() {
            401 => Err(ApiError::Unauthorized { message }),
            status @ 400..=499 => Err(ApiError::Rejected { status, message }),
            status => Err(ApiError::Server { status }),
        }
    }

    /// GET a JSON payload.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<T, ApiError> {
        let response = self.send(Method::GET, path, token, None).await?;
        response.json().await.map_err(ApiError::Decode)
    }

    /// POST an optional JSON body and decode the JSON response.
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        let response = self.send(Method::POST, path, token, body).await?;
        response.json().await.map_err(ApiError::Decode)
    }
}

/// Best-effort extraction of the server's `{"message": ...}` payload.
async fn read_message(response: Response) -> Option<String> {
    let payload = response.json::<ServerMessage>().await.ok()?;
    payload.message.filter(|message| !message.is_empty())
}

#[derive(Debug, Deserialize)]
struct ServerMessage {
    #[serde(default)]
    message: Option<String>,
}
