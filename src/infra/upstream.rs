//! HTTP client for the upstream content API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::cache::RootHashSource;
use crate::domain::blog::{BlogPost, ListingItem, posts_from_listing};

use super::error::InfraError;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream resource not found: {0}")]
    NotFound(String),
    #[error("upstream returned status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode upstream payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("failed to render `{template}`: {detail}")]
    Render {
        template: &'static str,
        detail: String,
    },
    #[error("invalid upstream base url `{0}`")]
    InvalidBaseUrl(String),
}

impl From<url::ParseError> for UpstreamError {
    fn from(error: url::ParseError) -> Self {
        UpstreamError::InvalidBaseUrl(error.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct RootHashBody {
    hash: Option<String>,
}

/// Thin wrapper over a shared `reqwest::Client`.
///
/// The base URL is passed per call so request handlers and startup
/// prewarming share the same fetchers.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
}

impl UpstreamClient {
    pub fn new(timeout: Duration) -> Result<Self, InfraError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("isr-cache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| InfraError::upstream(format!("failed to build http client: {err}")))?;
        Ok(Self { client })
    }

    /// All published posts, newest first.
    pub async fn list_posts(&self, base_url: &str) -> Result<Vec<BlogPost>, UpstreamError> {
        let mut url = endpoint(base_url, &["blog"])?;
        url.set_query(Some("deep=true"));

        let items: Vec<ListingItem> = self.get_json(url).await?;
        Ok(posts_from_listing(&items))
    }

    /// One post with its rendered HTML body.
    pub async fn read_post(
        &self,
        base_url: &str,
        category: &str,
        name: &str,
    ) -> Result<BlogPost, UpstreamError> {
        let not_found = || UpstreamError::NotFound(format!("/blog/{category}/{name}"));

        let items: Vec<ListingItem> = self
            .get_json(endpoint(base_url, &["blog", category])?)
            .await?;
        let object = items
            .iter()
            .find(|item| !item.is_dir && item.path.rsplit('/').next() == Some(name))
            .and_then(|item| item.object.as_ref())
            .ok_or_else(not_found)?;
        let mut post = BlogPost::from_object(category, name, object).ok_or_else(not_found)?;

        let mut content_url = endpoint(base_url, &["blog", category, name])?;
        content_url.set_query(Some("html=true"));
        post.content = Some(self.get(content_url).await?.text().await?);

        Ok(post)
    }

    async fn get(&self, url: Url) -> Result<Response, UpstreamError> {
        let response = self.client.get(url.clone()).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(UpstreamError::NotFound(url.path().to_string())),
            status if !status.is_success() => Err(UpstreamError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }),
            _ => Ok(response),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, UpstreamError> {
        let bytes = self.get(url).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl RootHashSource for UpstreamClient {
    async fn root_hash(&self, base_url: &str) -> Option<String> {
        let url = endpoint(base_url, &["api", "v0", "root"]).ok()?;
        match self.get_json::<RootHashBody>(url).await {
            Ok(body) => body.hash,
            Err(error) => {
                debug!(base_url, error = %error, "root hash request failed");
                None
            }
        }
    }
}

/// `base_url` with `segments` appended as percent-encoded path segments.
fn endpoint(base_url: &str, segments: &[&str]) -> Result<Url, UpstreamError> {
    let mut url = Url::parse(base_url)?;
    url.path_segments_mut()
        .map_err(|()| UpstreamError::InvalidBaseUrl(base_url.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
