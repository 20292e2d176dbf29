use crate::debug_println;
use crate::fetcher::{FetchError, PageSource};
use crate::session::SessionState;
use anyhow::{Context, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const HOME_URL: &str = "https://sh.lianjia.com/";
pub const ZUFANG_URL: &str = "https://sh.lianjia.com/zufang/";

// Give client-side rendering a moment before the page is read.
const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Launches Chrome. The returned handle owns the process; dropping it on
/// any exit path closes the browser.
pub fn launch(headless: bool) -> Result<Browser> {
    let options = LaunchOptions::default_builder()
        .headless(headless)
        .build()
        .context("Failed to build launch options")?;

    Browser::new(options).context("Failed to launch Chrome browser")
}

/// Visits the site in the given browser, waits for the user to clear any
/// verification, then snapshots cookies and the live User-Agent into a
/// session the HTTP crawler can replay.
pub fn capture_session(browser: &Browser) -> Result<SessionState> {
    let tab = browser.new_tab()?;

    tab.navigate_to(HOME_URL)?;
    tab.wait_until_navigated()?;
    thread::sleep(SETTLE_DELAY);

    tab.navigate_to(ZUFANG_URL)?;
    tab.wait_until_navigated()?;

    println!("Complete any human verification in the browser window.");
    wait_for_enter("👉 Press Enter once the listing page is visible...")?;

    let cookies = tab
        .get_cookies()
        .context("Failed to read cookies from the browser")?
        .into_iter()
        .map(|c| (c.name, c.value))
        .collect::<HashMap<_, _>>();

    let user_agent = tab
        .evaluate("navigator.userAgent", false)?
        .value
        .and_then(|v| v.as_str().map(str::to_string))
        .context("Browser did not report a User-Agent")?;

    let mut headers = HashMap::new();
    headers.insert("User-Agent".to_string(), user_agent);
    headers.insert("Referer".to_string(), HOME_URL.to_string());
    headers.insert("Accept-Language".to_string(), "zh-CN,zh;q=0.9".to_string());

    debug_println!("Captured {} cookies", cookies.len());
    Ok(SessionState { cookies, headers })
}

/// Page source backed by a live browser tab. Challenge pages pause the run
/// so a human can solve them instead of being retried blind.
pub struct BrowserSource {
    tab: Arc<Tab>,
}

impl BrowserSource {
    pub fn new(browser: &Browser) -> Result<Self> {
        Ok(Self {
            tab: browser.new_tab()?,
        })
    }

    fn navigate(&self, url: &str) -> Result<String> {
        self.tab.navigate_to(url)?;
        self.tab.wait_until_navigated()?;
        thread::sleep(SETTLE_DELAY);

        let current = self.tab.get_url();
        if current.contains("captcha")
            || current.contains("verify")
            || current.contains("unauthorized")
        {
            println!("⚠️  Challenge page detected, complete the verification in the browser.");
            wait_for_enter("👉 Press Enter once back on the listing page...")?;
        }

        self.page_html()
    }

    fn page_html(&self) -> Result<String> {
        let result = self
            .tab
            .evaluate("document.documentElement.outerHTML", false)?;
        result
            .value
            .and_then(|v| v.as_str().map(str::to_string))
            .context("Page HTML evaluation returned no value")
    }
}

impl PageSource for BrowserSource {
    fn fetch_page(&mut self, url: &str) -> Result<String, FetchError> {
        self.navigate(url)
            .map_err(|e| FetchError::Browser(e.to_string()))
    }
}

fn wait_for_enter(prompt: &str) -> Result<()> {
    print!("{} ", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(())
}
