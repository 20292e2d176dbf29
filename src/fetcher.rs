use crate::debug_eprintln;
use rand::Rng;
use reqwest::blocking::Client;
use std::thread;
use std::time::Duration;
use thiserror::Error;

const RETRY_COOLDOWN: Duration = Duration::from_secs(5);

/// Why a page could not be fetched. Challenge pages are kept distinct from
/// network errors so callers (and the browser variant) can react to them.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("challenge page encountered at {url}")]
    Challenge { url: String },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("browser error: {0}")]
    Browser(String),
}

/// Anything that can turn a listing-page URL into page HTML. The crawl
/// controller only talks to this seam, so tests and the browser variant can
/// swap in their own sources.
pub trait PageSource {
    fn fetch_page(&mut self, url: &str) -> Result<String, FetchError>;
}

/// Session-backed HTTP source with bounded retries. Each attempt is
/// preceded by a short randomized delay so requests do not fall into a
/// lockstep pattern, and failed attempts cool down for a fixed period
/// before the next try. No retry state carries over between URLs.
pub struct HttpSource {
    client: Client,
    max_retries: usize,
}

impl HttpSource {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            max_retries: 3,
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    fn attempt(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send()?;

        // The site substitutes a verification interstitial for real content
        // and signals it through the resolved URL.
        if response.url().as_str().contains("captcha") {
            return Err(FetchError::Challenge {
                url: response.url().to_string(),
            });
        }

        let response = response.error_for_status()?;
        Ok(response.text()?)
    }
}

impl PageSource for HttpSource {
    fn fetch_page(&mut self, url: &str) -> Result<String, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let jitter = rand::thread_rng().gen_range(0.8..1.4);
            thread::sleep(Duration::from_secs_f64(jitter));

            match self.attempt(url) {
                Ok(body) => return Ok(body),
                Err(e) if attempt >= self.max_retries => {
                    eprintln!("Request failed (retries exhausted): {} - {}", url, e);
                    return Err(e);
                }
                Err(e) => {
                    debug_eprintln!("Request failed (will retry): {} - {}", url, e);
                    thread::sleep(RETRY_COOLDOWN);
                }
            }
        }
    }
}
