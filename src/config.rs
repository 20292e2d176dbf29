use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Crawl configuration loaded from `config.json`. Written out with the
/// defaults below when the file does not exist yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    pub urls: Vec<String>,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_delay")]
    pub delay: f64,
}

fn default_max_pages() -> usize {
    5
}

fn default_delay() -> f64 {
    1.0
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            urls: vec![
                "https://sh.lianjia.com/zufang/jingan/rco11rt200600000001ra1ra2ra3ra4ra5rp6rp7rp4rp5"
                    .to_string(),
                "https://sh.lianjia.com/zufang/xuhui/rco11rt200600000001ra1ra2ra3ra4ra5rp6rp7rp4rp5"
                    .to_string(),
            ],
            max_pages: default_max_pages(),
            delay: 3.0,
        }
    }
}

/// Loads the crawl configuration, creating a default file first if none
/// exists so the user has something to edit.
pub fn load_or_init(path: &Path) -> Result<CrawlConfig> {
    if !path.exists() {
        let config = CrawlConfig::default();
        let raw = serde_json::to_string_pretty(&config)?;
        fs::write(path, raw)
            .with_context(|| format!("Failed to write default config file: {}", path.display()))?;
        println!("Created default config file {}", path.display());
        return Ok(config);
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_default_config_when_absent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = load_or_init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.max_pages, 5);
        assert_eq!(config.urls.len(), 2);

        // Reloading reads the file that was just written.
        let reloaded = load_or_init(&path).unwrap();
        assert_eq!(reloaded.urls, config.urls);
    }

    #[test]
    fn missing_optional_fields_fall_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"urls": ["https://sh.lianjia.com/zufang/pudong/"]}"#).unwrap();

        let config = load_or_init(&path).unwrap();
        assert_eq!(config.max_pages, 5);
        assert_eq!(config.delay, 1.0);
        assert_eq!(config.urls.len(), 1);
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();

        assert!(load_or_init(&path).is_err());
    }
}
