use serde::{Deserialize, Serialize};

/// Engine configuration.
///
/// Protocol timeouts and cache TTLs are deliberately compile-time constants;
/// only deployment-specific knobs live here.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ProbeConfig {
    /// Base URL of the playlist proxy, e.g. "https://tv.example.com".
    /// When unset, only the direct URL is probed.
    #[serde(default)]
    pub proxy_base: Option<String>,
    /// Upper bound on probes running at the same time
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,
}

fn default_max_concurrent_probes() -> usize {
    2
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            proxy_base: None,
            max_concurrent_probes: default_max_concurrent_probes(),
        }
    }
}

impl ProbeConfig {
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProbeConfig::default();
        assert!(config.proxy_base.is_none());
        assert_eq!(config.max_concurrent_probes, 2);
    }

    #[test]
    fn test_from_toml() {
        let config = ProbeConfig::from_toml("proxy_base = \"https://tv.example.com\"").unwrap();
        assert_eq!(config.proxy_base.as_deref(), Some("https://tv.example.com"));
        assert_eq!(config.max_concurrent_probes, 2);

        let config = ProbeConfig::from_toml("max_concurrent_probes = 4").unwrap();
        assert!(config.proxy_base.is_none());
        assert_eq!(config.max_concurrent_probes, 4);
    }
}
