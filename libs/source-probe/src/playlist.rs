use m3u8_rs::Playlist;
use regex::Regex;
use url::Url;

/// Highest advertised quality in a manifest.
///
/// Explicit RESOLUTION tags win, then BANDWIDTH mapped through fixed
/// thresholds, then resolution hints in the source URL itself. `None` means
/// the caller renders "unknown".
pub fn extract_quality(text: &str, source_url: Option<&str>) -> Option<String> {
    let (mut height, mut bandwidth) = scan_master_variants(text);
    if height == 0 && bandwidth == 0 {
        // m3u8-rs rejected the document or found no variants; fall back to a
        // plain directive-line scan so partial manifests still yield a label
        (height, bandwidth) = scan_variant_lines(text);
    }

    if height > 0 {
        return Some(format!("{}p", height));
    }
    if let Some(label) = quality_from_bandwidth(bandwidth) {
        return Some(label.to_string());
    }
    source_url.and_then(infer_quality_from_url)
}

fn scan_master_variants(text: &str) -> (u64, u64) {
    match m3u8_rs::parse_playlist(text.as_bytes()) {
        Ok((_, Playlist::MasterPlaylist(master))) => {
            let mut height = 0u64;
            let mut bandwidth = 0u64;
            for variant in &master.variants {
                if let Some(resolution) = variant.resolution {
                    height = height.max(resolution.height);
                }
                bandwidth = bandwidth.max(variant.bandwidth);
            }
            (height, bandwidth)
        }
        Ok((_, Playlist::MediaPlaylist(_))) => (0, 0),
        Err(_) => (0, 0),
    }
}

fn scan_variant_lines(text: &str) -> (u64, u64) {
    let resolution_re = Regex::new(r"(?i)RESOLUTION=(\d+)x(\d+)").unwrap();
    let bandwidth_re = Regex::new(r"(?i)BANDWIDTH=(\d+)").unwrap();

    let mut height = 0u64;
    let mut bandwidth = 0u64;
    for line in text.lines() {
        let line = line.trim();
        if !line.starts_with("#EXT-X-STREAM-INF") {
            continue;
        }
        if let Some(caps) = resolution_re.captures(line) {
            if let Ok(parsed) = caps[2].parse::<u64>() {
                height = height.max(parsed);
            }
        }
        if let Some(caps) = bandwidth_re.captures(line) {
            if let Ok(parsed) = caps[1].parse::<u64>() {
                bandwidth = bandwidth.max(parsed);
            }
        }
    }
    (height, bandwidth)
}

fn quality_from_bandwidth(bandwidth: u64) -> Option<&'static str> {
    if bandwidth >= 12_000_000 {
        Some("4K")
    } else if bandwidth >= 7_000_000 {
        Some("2K")
    } else if bandwidth >= 3_500_000 {
        Some("1080p")
    } else if bandwidth >= 1_800_000 {
        Some("720p")
    } else if bandwidth >= 900_000 {
        Some("480p")
    } else if bandwidth > 0 {
        Some("360p")
    } else {
        None
    }
}

/// Guesses a quality label from resolution hints in the URL text,
/// percent-decoded first when possible.
pub fn infer_quality_from_url(url: &str) -> Option<String> {
    if url.is_empty() {
        return None;
    }

    let normalized = match urlencoding::decode(url) {
        Ok(decoded) => decoded.to_lowercase(),
        Err(_) => url.to_lowercase(),
    };

    let label = if normalized.contains("2160") || normalized.contains("4k") {
        "4K"
    } else if normalized.contains("1440") || normalized.contains("2k") {
        "2K"
    } else if normalized.contains("1080") {
        "1080p"
    } else if normalized.contains("720") {
        "720p"
    } else if normalized.contains("480") {
        "480p"
    } else if normalized.contains("360") {
        "360p"
    } else {
        return None;
    };
    Some(label.to_string())
}

/// First non-comment, non-empty line of the playlist, resolved against the
/// playlist's own URL. For a master playlist this is the first variant,
/// which allows one level of recursive descent.
pub fn first_playable_url(text: &str, playlist_url: &str) -> Option<String> {
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        return Some(resolve_against(playlist_url, line));
    }
    None
}

fn resolve_against(base: &str, target: &str) -> String {
    match Url::parse(base).and_then(|base| base.join(target)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => target.to_string(),
    }
}

/// Formats a KB/s rate as a user-facing label; `None` for rates that are not
/// finite positive numbers.
pub fn format_speed(speed_kbps: f64) -> Option<String> {
    if !speed_kbps.is_finite() || speed_kbps <= 0.0 {
        return None;
    }
    if speed_kbps >= 1024.0 {
        Some(format!("{:.1} MB/s", speed_kbps / 1024.0))
    } else {
        Some(format!("{:.1} KB/s", speed_kbps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "#EXTM3U\n\
#EXT-X-STREAM-INF:BANDWIDTH=3000000,RESOLUTION=1920x1080\n\
variant-hi.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=1200000,RESOLUTION=1280x720\n\
variant-lo.m3u8\n";

    const MASTER_BANDWIDTH_ONLY: &str = "#EXTM3U\n\
#EXT-X-STREAM-INF:BANDWIDTH=8000000\n\
variant.m3u8\n";

    const MEDIA: &str = "#EXTM3U\n\
#EXT-X-VERSION:3\n\
#EXT-X-TARGETDURATION:6\n\
#EXT-X-MEDIA-SEQUENCE:0\n\
#EXTINF:6.0,\n\
seg-0001.ts\n\
#EXTINF:6.0,\n\
seg-0002.ts\n";

    #[test]
    fn test_resolution_wins_over_bandwidth() {
        assert_eq!(extract_quality(MASTER, None).as_deref(), Some("1080p"));
    }

    #[test]
    fn test_bandwidth_inference() {
        assert_eq!(
            extract_quality(MASTER_BANDWIDTH_ONLY, None).as_deref(),
            Some("2K")
        );
    }

    #[test]
    fn test_bandwidth_thresholds() {
        assert_eq!(quality_from_bandwidth(12_000_000), Some("4K"));
        assert_eq!(quality_from_bandwidth(7_000_000), Some("2K"));
        assert_eq!(quality_from_bandwidth(3_500_000), Some("1080p"));
        assert_eq!(quality_from_bandwidth(1_800_000), Some("720p"));
        assert_eq!(quality_from_bandwidth(900_000), Some("480p"));
        assert_eq!(quality_from_bandwidth(1), Some("360p"));
        assert_eq!(quality_from_bandwidth(0), None);
    }

    #[test]
    fn test_url_fallback_when_manifest_has_no_hints() {
        assert_eq!(
            extract_quality(MEDIA, Some("https://cdn.example.com/live/ch1_1080.m3u8")).as_deref(),
            Some("1080p")
        );
        assert_eq!(extract_quality(MEDIA, Some("https://cdn.example.com/live/ch1.m3u8")), None);
    }

    #[test]
    fn test_unparsable_text_still_scanned() {
        // no #EXTM3U header, m3u8-rs has nothing to work with
        let partial = "#EXT-X-STREAM-INF:BANDWIDTH=2000000,RESOLUTION=854x480\nvariant.m3u8\n";
        assert_eq!(extract_quality(partial, None).as_deref(), Some("480p"));
    }

    #[test]
    fn test_infer_quality_from_url() {
        assert_eq!(infer_quality_from_url("https://c.example.com/live/2160/a.m3u8").as_deref(), Some("4K"));
        assert_eq!(infer_quality_from_url("https://c.example.com/4K/a.m3u8").as_deref(), Some("4K"));
        assert_eq!(infer_quality_from_url("https://c.example.com/1440/a.m3u8").as_deref(), Some("2K"));
        assert_eq!(infer_quality_from_url("https://c.example.com/hd1080.m3u8").as_deref(), Some("1080p"));
        assert_eq!(
            infer_quality_from_url("https://t.example.com/p?u=https%3A%2F%2Fc.example.com%2F720%2Fa").as_deref(),
            Some("720p")
        );
        assert_eq!(infer_quality_from_url("https://c.example.com/live/a.m3u8"), None);
        assert_eq!(infer_quality_from_url(""), None);
    }

    #[test]
    fn test_first_playable_url_relative() {
        assert_eq!(
            first_playable_url(MASTER, "https://cdn.example.com/live/index.m3u8").as_deref(),
            Some("https://cdn.example.com/live/variant-hi.m3u8")
        );
        assert_eq!(
            first_playable_url(MEDIA, "https://cdn.example.com/live/chunklist.m3u8").as_deref(),
            Some("https://cdn.example.com/live/seg-0001.ts")
        );
    }

    #[test]
    fn test_first_playable_url_absolute_and_empty() {
        let absolute = "#EXTM3U\n\nhttps://other.example.com/v.m3u8\n";
        assert_eq!(
            first_playable_url(absolute, "https://cdn.example.com/live/index.m3u8").as_deref(),
            Some("https://other.example.com/v.m3u8")
        );
        assert_eq!(first_playable_url("#EXTM3U\n#EXT-X-ENDLIST\n", "https://cdn.example.com/a.m3u8"), None);
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(2048.0).as_deref(), Some("2.0 MB/s"));
        assert_eq!(format_speed(512.0).as_deref(), Some("512.0 KB/s"));
        assert_eq!(format_speed(0.0), None);
        assert_eq!(format_speed(-1.0), None);
        assert_eq!(format_speed(f64::NAN), None);
        assert_eq!(format_speed(f64::INFINITY), None);
    }
}
