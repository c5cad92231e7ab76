use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use tracing::debug;

use vellum_core::error::{Result, VellumError};
use vellum_core::traits::DocumentSource;

/// HTTP document fetcher used by `download_document` steps.
pub struct HttpFetcher {
    http: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            timeout,
        }
    }
}

impl DocumentSource for HttpFetcher {
    fn fetch(&self, url: &str) -> BoxFuture<'_, Result<String>> {
        let url = url.to_string();

        Box::pin(async move {
            debug!(%url, "fetching document");

            let response = self
                .http
                .get(&url)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        VellumError::Timeout {
                            seconds: self.timeout.as_secs(),
                        }
                    } else {
                        VellumError::Fetch {
                            url: url.clone(),
                            message: e.without_url().to_string(),
                        }
                    }
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(VellumError::Fetch {
                    url,
                    message: format!("HTTP {}", status),
                });
            }

            response.text().await.map_err(|e| VellumError::Fetch {
                url,
                message: e.without_url().to_string(),
            })
        })
    }
}
