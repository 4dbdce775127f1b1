pub mod cache;
pub mod candidates;
pub mod config;
pub mod errors;
pub mod fetch;
pub mod playlist;
pub mod probe;
pub mod resolver;
pub mod scheduler;

use serde::{Deserialize, Serialize};
use std::time::Duration;

// Re-export main types
pub use cache::TtlCache;
pub use config::ProbeConfig;
pub use errors::ProbeError;
pub use fetch::{Fetcher, HttpFetcher, PlaylistFetch};
pub use probe::{SourceProbe, SourceProber};
pub use scheduler::{resolve_episode_url, ProbeRequest, ProbeScheduler, SourceId};

/// Label rendered for a metric that could not be determined
pub const UNKNOWN_LABEL: &str = "unknown";

/// Timeout for manifest and throughput requests
pub const PLAYLIST_TIMEOUT: Duration = Duration::from_secs(6);
/// Timeout for a single ping attempt, shorter than the playlist timeout
pub const PING_TIMEOUT: Duration = Duration::from_millis(4500);

/// Two bytes are enough to measure connection latency
pub(crate) const PING_RANGE: (u64, u64) = (0, 1);
/// 256 KiB sample for the throughput measurement
pub(crate) const SPEED_SAMPLE_RANGE: (u64, u64) = (0, 262_143);

pub(crate) const QUALITY_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
pub(crate) const STATS_CACHE_TTL: Duration = Duration::from_secs(2 * 60);

/// Composite measurement for one source at one episode.
///
/// This is what callers render next to a source entry; a probe never fails
/// past this boundary, it only comes back with `has_error` set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStats {
    /// Quality label, e.g. "4K", "1080p", or "unknown"
    pub quality: String,
    /// Formatted throughput label, e.g. "2.0 MB/s", or "unknown"
    pub load_speed: String,
    /// Round-trip time of the fastest candidate, clamped to >= 1 on success
    pub ping_time_ms: u64,
    pub has_error: bool,
}

impl SourceStats {
    /// The failed-probe shape: quality inferred from the URL text when
    /// possible, everything else unknown.
    pub fn unavailable(url: &str) -> Self {
        Self {
            quality: playlist::infer_quality_from_url(url)
                .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
            load_speed: UNKNOWN_LABEL.to_string(),
            ping_time_ms: 0,
            has_error: true,
        }
    }
}
