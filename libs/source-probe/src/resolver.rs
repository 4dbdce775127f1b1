use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::ProbeError;
use crate::fetch::{Fetcher, PlaylistFetch};
use crate::playlist::format_speed;
use crate::{PING_RANGE, PING_TIMEOUT, SPEED_SAMPLE_RANGE, PLAYLIST_TIMEOUT, UNKNOWN_LABEL};

/// Tries candidates strictly in order until one yields a playlist.
///
/// Individual failures are absorbed and logged; the first success returns
/// immediately, so no fetch happens beyond it. When every candidate fails
/// the last observed error surfaces.
pub async fn resolve_playlist<F: Fetcher + ?Sized>(
    fetcher: &F,
    candidates: &[String],
    token: &CancellationToken,
) -> Result<PlaylistFetch, ProbeError> {
    let mut last_error = None;

    for candidate in candidates {
        match fetcher.fetch_playlist(candidate, token).await {
            Ok(fetched) => return Ok(fetched),
            Err(ProbeError::Cancelled) => return Err(ProbeError::Cancelled),
            Err(error) => {
                log::debug!("Failed to fetch candidate playlist {}: {}", candidate, error);
                last_error = Some(error);
            }
        }
    }

    Err(last_error.unwrap_or(ProbeError::Exhausted {
        tried: candidates.len(),
    }))
}

/// Round-trip time in milliseconds of a two-byte ranged request.
///
/// Returns the elapsed time of the first candidate that completes at the
/// HTTP level, whatever its status code. When every candidate fails, the
/// longest elapsed time among the failures is reported instead, so the
/// caller still sees how slow the source was.
pub async fn measure_ping_over<F: Fetcher + ?Sized>(
    fetcher: &F,
    candidates: &[String],
    token: &CancellationToken,
) -> u64 {
    let mut fallback_ms = 0u64;

    for candidate in candidates {
        let started = Instant::now();
        match fetcher
            .fetch_range(candidate, PING_RANGE, PING_TIMEOUT, token)
            .await
        {
            Ok(_) => return (started.elapsed().as_millis() as u64).max(1),
            Err(ProbeError::Cancelled) => return fallback_ms,
            Err(_) => {
                fallback_ms = fallback_ms.max(started.elapsed().as_millis() as u64);
            }
        }
    }

    fallback_ms
}

/// Downloads a fixed-size sample from the first candidate that serves it and
/// formats the observed throughput. Same absorb-and-advance policy as
/// `resolve_playlist`.
pub async fn measure_speed_over<F: Fetcher + ?Sized>(
    fetcher: &F,
    candidates: &[String],
    token: &CancellationToken,
) -> Result<String, ProbeError> {
    let mut last_error = None;

    for candidate in candidates {
        match sample_speed(fetcher, candidate, token).await {
            Ok(label) => return Ok(label),
            Err(ProbeError::Cancelled) => return Err(ProbeError::Cancelled),
            Err(error) => {
                log::debug!(
                    "Failed to measure source speed from candidate {}: {}",
                    candidate,
                    error
                );
                last_error = Some(error);
            }
        }
    }

    Err(last_error.unwrap_or(ProbeError::Exhausted {
        tried: candidates.len(),
    }))
}

async fn sample_speed<F: Fetcher + ?Sized>(
    fetcher: &F,
    url: &str,
    token: &CancellationToken,
) -> Result<String, ProbeError> {
    let started = Instant::now();
    let sample = fetcher
        .fetch_range(url, SPEED_SAMPLE_RANGE, PLAYLIST_TIMEOUT, token)
        .await?;
    if !sample.status.is_success() {
        return Err(ProbeError::Status {
            status: sample.status,
            url: url.to_string(),
        });
    }

    let elapsed_secs = started.elapsed().as_secs_f64().max(0.001);
    let speed_kbps = sample.bytes as f64 / 1024.0 / elapsed_secs;
    Ok(format_speed(speed_kbps).unwrap_or_else(|| UNKNOWN_LABEL.to_string()))
}
