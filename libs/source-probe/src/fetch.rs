use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, RANGE};
use tokio_util::sync::CancellationToken;

use crate::errors::ProbeError;
use crate::PLAYLIST_TIMEOUT;

/// One successful playlist download
#[derive(Debug, Clone)]
pub struct PlaylistFetch {
    pub text: String,
    /// URL that actually produced the response, after redirects
    pub final_url: String,
}

/// Result of a ranged request. The status is reported instead of checked
/// here: the ping probe counts any HTTP-level completion, the throughput
/// probe requires 2xx.
#[derive(Debug, Clone)]
pub struct RangeFetch {
    pub status: reqwest::StatusCode,
    pub bytes: u64,
}

/// The single network primitive everything above builds on. One call is one
/// request with an enforced deadline and external cancellation; retry and
/// fallback belong to the resolver layer.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET a playlist document with the manifest timeout. Non-2xx is an error.
    async fn fetch_playlist(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<PlaylistFetch, ProbeError>;

    /// GET a byte range within the given deadline
    async fn fetch_range(
        &self,
        url: &str,
        range: (u64, u64),
        deadline: Duration,
        token: &CancellationToken,
    ) -> Result<RangeFetch, ProbeError>;
}

/// Races a request against its deadline and the caller's cancellation token,
/// so an outer candidate loop cancels the in-flight request it started.
pub(crate) async fn bounded<T>(
    fut: impl Future<Output = Result<T, ProbeError>> + Send,
    deadline: Duration,
    token: &CancellationToken,
) -> Result<T, ProbeError> {
    if token.is_cancelled() {
        return Err(ProbeError::Cancelled);
    }

    tokio::select! {
        _ = token.cancelled() => Err(ProbeError::Cancelled),
        result = tokio::time::timeout(deadline, fut) => match result {
            Ok(inner) => inner,
            Err(_) => Err(ProbeError::Timeout(deadline)),
        },
    }
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Responses must never come from an intermediate cache, the probe is
    /// only meaningful against the origin.
    fn no_store_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_playlist(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<PlaylistFetch, ProbeError> {
        let request = self.client.get(url).headers(Self::no_store_headers());

        bounded(
            async move {
                let response = request.send().await?;
                if !response.status().is_success() {
                    return Err(ProbeError::Status {
                        status: response.status(),
                        url: response.url().to_string(),
                    });
                }
                let final_url = response.url().to_string();
                let text = response.text().await?;
                Ok(PlaylistFetch { text, final_url })
            },
            PLAYLIST_TIMEOUT,
            token,
        )
        .await
    }

    async fn fetch_range(
        &self,
        url: &str,
        range: (u64, u64),
        deadline: Duration,
        token: &CancellationToken,
    ) -> Result<RangeFetch, ProbeError> {
        let mut headers = Self::no_store_headers();
        let range_value = format!("bytes={}-{}", range.0, range.1);
        headers.insert(RANGE, range_value.parse().unwrap());
        let request = self.client.get(url).headers(headers);

        bounded(
            async move {
                let response = request.send().await?;
                let status = response.status();
                let bytes = response.bytes().await?;
                Ok(RangeFetch {
                    status,
                    bytes: bytes.len() as u64,
                })
            },
            deadline,
            token,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let token = CancellationToken::new();
        let result = bounded::<()>(
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            },
            Duration::from_secs(6),
            &token,
        )
        .await;
        assert!(matches!(result, Err(ProbeError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let result = bounded(async { Ok(1u32) }, Duration::from_secs(6), &token).await;
        assert!(matches!(result, Err(ProbeError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_cancelled_in_flight() {
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });
        let result = bounded::<()>(
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            },
            Duration::from_secs(120),
            &token,
        )
        .await;
        assert!(matches!(result, Err(ProbeError::Cancelled)));
    }

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let token = CancellationToken::new();
        let result = bounded(async { Ok(7u32) }, Duration::from_secs(6), &token).await;
        assert_eq!(result.unwrap(), 7);
    }
}
