use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cache::TtlCache;
use crate::candidates::{build_candidates, is_http_url, is_playlist_url};
use crate::config::ProbeConfig;
use crate::errors::ProbeError;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::playlist::{extract_quality, first_playable_url};
use crate::resolver::{measure_ping_over, measure_speed_over, resolve_playlist};
use crate::{SourceStats, QUALITY_CACHE_TTL, STATS_CACHE_TTL, UNKNOWN_LABEL};

/// Probing surface the scheduler drives; mockable in tests.
#[async_trait]
pub trait SourceProbe: Send + Sync {
    /// One end-to-end measurement pass for a single source. Never fails past
    /// this boundary; errors come back as `has_error` stats.
    async fn probe(
        &self,
        url: &str,
        source_key: Option<&str>,
        token: &CancellationToken,
    ) -> SourceStats;

    /// Whether a probe result for this source is still within its TTL
    fn has_fresh_stats(&self, url: &str, source_key: Option<&str>) -> bool;
}

/// Owns the HTTP client, both TTL caches and the proxy configuration.
///
/// Construct one per process and share it; the caches are the process-wide
/// store and nothing else writes to them.
pub struct SourceProber {
    fetcher: Box<dyn Fetcher>,
    config: ProbeConfig,
    /// Playlist quality per raw URL, 5 minute TTL. Negative results are
    /// cached too, a playlist without quality hints stays that way.
    quality_cache: TtlCache<Option<String>>,
    /// Composite stats per `{source_key|"default"}::{url}`, 2 minute TTL.
    /// Failed probes are never written here so a later retry can recover.
    stats_cache: TtlCache<SourceStats>,
}

impl SourceProber {
    pub fn new(config: ProbeConfig) -> Self {
        Self::with_fetcher(Box::new(HttpFetcher::default()), config)
    }

    pub fn with_fetcher(fetcher: Box<dyn Fetcher>, config: ProbeConfig) -> Self {
        Self {
            fetcher,
            config,
            quality_cache: TtlCache::new(QUALITY_CACHE_TTL),
            stats_cache: TtlCache::new(STATS_CACHE_TTL),
        }
    }

    fn stats_key(url: &str, source_key: Option<&str>) -> String {
        format!("{}::{}", source_key.unwrap_or("default"), url)
    }

    /// Quality label of a playlist URL, through the quality cache.
    ///
    /// Returns `None` for non-playlist URLs and on fetch failure; only
    /// completed lookups are cached.
    pub async fn detect_quality(&self, url: &str, token: &CancellationToken) -> Option<String> {
        if let Some(cached) = self.quality_cache.get(url) {
            return cached;
        }

        if !is_playlist_url(url) {
            log::debug!("Quality detection skipped, not a playlist URL: {}", url);
            return None;
        }

        let candidates = build_candidates(url, None, self.config.proxy_base.as_deref());
        match resolve_playlist(self.fetcher.as_ref(), &candidates, token).await {
            Ok(fetched) => {
                let quality = extract_quality(&fetched.text, Some(&fetched.final_url));
                self.quality_cache.set(url, quality.clone());
                quality
            }
            Err(error) => {
                log::debug!("Quality detection failed for {}: {}", url, error);
                None
            }
        }
    }

    async fn probe_inner(
        &self,
        url: &str,
        source_key: Option<&str>,
        token: &CancellationToken,
    ) -> Result<SourceStats, ProbeError> {
        let proxy_base = self.config.proxy_base.as_deref();
        let candidates = build_candidates(url, source_key, proxy_base);

        let (playlist, ping_ms) = tokio::join!(
            resolve_playlist(self.fetcher.as_ref(), &candidates, token),
            measure_ping_over(self.fetcher.as_ref(), &candidates, token),
        );
        let playlist = playlist?;

        let mut quality = extract_quality(&playlist.text, Some(&playlist.final_url));
        let mut speed_target = first_playable_url(&playlist.text, &playlist.final_url)
            .unwrap_or_else(|| playlist.final_url.clone());

        if is_playlist_url(&speed_target) {
            // Master playlist pointing at a variant playlist: descend one
            // level. A broken variant keeps the outer quality and target.
            let nested_candidates = build_candidates(&speed_target, source_key, proxy_base);
            match resolve_playlist(self.fetcher.as_ref(), &nested_candidates, token).await {
                Ok(child) => {
                    quality = extract_quality(&child.text, Some(&child.final_url)).or(quality);
                    speed_target =
                        first_playable_url(&child.text, &child.final_url).unwrap_or(speed_target);
                }
                Err(error) => {
                    log::debug!(
                        "Nested playlist fetch failed, keeping outer result for {}: {}",
                        url,
                        error
                    );
                }
            }
        }

        let speed_candidates = build_candidates(&speed_target, source_key, proxy_base);
        let load_speed = measure_speed_over(self.fetcher.as_ref(), &speed_candidates, token).await?;

        Ok(SourceStats {
            quality: quality.unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
            load_speed,
            ping_time_ms: ping_ms.max(1),
            has_error: false,
        })
    }
}

#[async_trait]
impl SourceProbe for SourceProber {
    async fn probe(
        &self,
        url: &str,
        source_key: Option<&str>,
        token: &CancellationToken,
    ) -> SourceStats {
        let key = Self::stats_key(url, source_key);
        if let Some(stats) = self.stats_cache.get(&key) {
            return stats;
        }

        if !is_playlist_url(url) && !is_http_url(url) {
            // Transient classification, not a network outcome; never cached.
            return SourceStats::unavailable(url);
        }

        match self.probe_inner(url, source_key, token).await {
            Ok(stats) => {
                self.stats_cache.set(&key, stats.clone());
                stats
            }
            Err(error) => {
                log::info!("Source stats probe failed for {}: {}", url, error);
                SourceStats::unavailable(url)
            }
        }
    }

    fn has_fresh_stats(&self, url: &str, source_key: Option<&str>) -> bool {
        self.stats_cache
            .contains_fresh(&Self::stats_key(url, source_key))
    }
}
