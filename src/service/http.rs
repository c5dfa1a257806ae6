//! Plain HTTP fetching for site-level resources (robots.txt, sitemap.xml).

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Status and body of a fetched resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResource {
    pub status: u16,
    pub body: String,
}

impl FetchedResource {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP GET capability used by the crawlability check.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// GET `url`; errors only on transport failure, never on HTTP status.
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchedResource>;
}

/// Factory for the shared HTTP client.
pub fn create_client(user_agent: &str, timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .context("Failed to build HTTP client")
}

pub struct HttpResourceFetcher {
    client: Client,
}

impl HttpResourceFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: create_client(user_agent, timeout)?,
        })
    }
}

#[async_trait]
impl ResourceFetcher for HttpResourceFetcher {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchedResource> {
        log::trace!("[RESOURCE] Fetching: {}", url);
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read body of {url}"))?;

        log::debug!("[RESOURCE] {} -> {} ({} bytes)", url, status, body.len());
        Ok(FetchedResource { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> HttpResourceFetcher {
        HttpResourceFetcher::new("test-agent", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_returns_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/robots.txt")
            .with_status(200)
            .with_body("User-agent: *\nDisallow:")
            .create_async()
            .await;

        let url = Url::parse(&server.url()).unwrap().join("/robots.txt").unwrap();
        let resource = fetcher().fetch(&url, Duration::from_secs(5)).await.unwrap();

        assert!(resource.is_success());
        assert_eq!(resource.body, "User-agent: *\nDisallow:");
    }

    #[tokio::test]
    async fn test_http_error_status_is_not_a_transport_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/sitemap.xml")
            .with_status(404)
            .create_async()
            .await;

        let url = Url::parse(&server.url()).unwrap().join("/sitemap.xml").unwrap();
        let resource = fetcher().fetch(&url, Duration::from_secs(5)).await.unwrap();

        assert_eq!(resource.status, 404);
        assert!(!resource.is_success());
    }

    #[tokio::test]
    async fn test_connection_refused_is_an_error() {
        let url = Url::parse("http://127.0.0.1:1/robots.txt").unwrap();
        assert!(fetcher().fetch(&url, Duration::from_secs(2)).await.is_err());
    }
}
