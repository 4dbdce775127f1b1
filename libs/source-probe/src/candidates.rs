use regex::Regex;
use std::collections::HashSet;

/// Checks whether a URL points at a playlist: proxy endpoints count, as does
/// a `.m3u8` extension before query/fragment, plain or percent-encoded.
pub fn is_playlist_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }

    let proxy_path = Regex::new(r"(?i)/api/proxy(-m3u8|/m3u8)").unwrap();
    if proxy_path.is_match(url) {
        return true;
    }

    let m3u8_suffix = Regex::new(r"(?i)\.m3u8($|[?#&])").unwrap();
    if m3u8_suffix.is_match(url) {
        return true;
    }

    match urlencoding::decode(url) {
        Ok(decoded) => m3u8_suffix.is_match(&decoded),
        Err(_) => false,
    }
}

pub fn is_http_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Builds the ordered list of URL variants to try for one logical resource.
///
/// When a proxy base is configured and the URL is absolute HTTP(S), the
/// proxied variants come first: the ad-filtered endpoint (source-key
/// specific), the generic endpoint, then the legacy keyless endpoint. The
/// original URL is always the final fallback. Order-preserving dedup, so the
/// result is non-empty for any non-empty input.
pub fn build_candidates(url: &str, source_key: Option<&str>, proxy_base: Option<&str>) -> Vec<String> {
    if url.is_empty() {
        return Vec::new();
    }

    let mut candidates = Vec::new();

    if let Some(base) = proxy_base {
        let base = base.trim_end_matches('/');
        if !base.is_empty() && is_http_url(url) {
            let encoded_url = urlencoding::encode(url);
            match source_key {
                Some(key) => {
                    let encoded_key = urlencoding::encode(key);
                    candidates.push(format!(
                        "{}/api/proxy-m3u8?url={}&source={}&x-source={}",
                        base, encoded_url, encoded_key, encoded_key
                    ));
                    candidates.push(format!(
                        "{}/api/proxy/m3u8?url={}&x-source={}",
                        base, encoded_url, encoded_key
                    ));
                    candidates.push(format!("{}/api/proxy-m3u8?url={}", base, encoded_url));
                }
                None => {
                    candidates.push(format!("{}/api/proxy-m3u8?url={}", base, encoded_url));
                    candidates.push(format!("{}/api/proxy/m3u8?url={}", base, encoded_url));
                }
            }
        }
    }

    candidates.push(url.to_string());

    let mut seen = HashSet::new();
    candidates.retain(|candidate| seen.insert(candidate.clone()));
    candidates
}
