use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_SESSION_FILE: &str = "lianjia_session.json";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Cookies and headers captured from a browser session that passed the
/// site's bot checks. Opaque to the crawl core, which only turns it into a
/// preloaded HTTP client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub cookies: HashMap<String, String>,
    pub headers: HashMap<String, String>,
}

pub fn load_session(path: &Path) -> Result<SessionState> {
    let raw = fs::read_to_string(path).with_context(|| {
        format!(
            "Failed to read session file {} (run session-saver first)",
            path.display()
        )
    })?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse session file: {}", path.display()))
}

pub fn save_session(state: &SessionState, path: &Path) -> Result<()> {
    let raw = serde_json::to_string_pretty(state)?;
    fs::write(path, raw)
        .with_context(|| format!("Failed to write session file: {}", path.display()))
}

/// Builds a blocking client that sends the captured headers plus a `Cookie`
/// header assembled from the cookie map on every request.
pub fn build_client(state: &SessionState) -> Result<Client> {
    let mut headers = HeaderMap::new();
    for (name, value) in &state.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("Invalid session header name: {}", name))?;
        let value = HeaderValue::from_str(value)
            .with_context(|| format!("Invalid session header value for {}", name))?;
        headers.insert(name, value);
    }

    if !state.cookies.is_empty() {
        let cookie = state
            .cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ");
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&cookie).context("Invalid session cookie value")?,
        );
    }

    Client::builder()
        .default_headers(headers)
        .cookie_store(true)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}
