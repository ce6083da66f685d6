use super::FetchError;
use crate::config::NetworkConfig;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{debug, info};

/// Response head of a network fetch. The body is read separately so that the
/// status can be checked before any payload is pulled.
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Box<dyn ResponseBody>,
}

/// Response payload still on the wire.
#[async_trait]
pub trait ResponseBody: Send {
    async fn bytes(self: Box<Self>) -> Result<Vec<u8>, FetchError>;
}

/// Issues binary GET requests for network locators.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError>;
}

/// [`HttpFetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(config: &NetworkConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ResponseBody for reqwest::Response {
    async fn bytes(self: Box<Self>) -> Result<Vec<u8>, FetchError> {
        reqwest::Response::bytes(*self)
            .await
            .map(|b| b.to_vec())
            .map_err(|e| FetchError::Conversion(e.to_string()))
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        info!("Sending request to {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        debug!("{} responded {}", url, response.status());

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(HttpResponse {
            status: response.status().as_u16(),
            content_type,
            body: Box::new(response),
        })
    }
}
