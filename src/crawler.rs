use crate::extractor;
use crate::fetcher::PageSource;
use crate::models::Listing;
use crate::tui::CrawlTui;
use crate::{debug_eprintln, debug_println};
use rand::Rng;
use scraper::Html;
use std::thread;
use std::time::Duration;

/// How a target decides it has reached the last page, beyond the hard
/// page ceiling and the zero-records stop that always apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPolicy {
    /// Trust the total-page marker discovered on page 1; fall back to the
    /// presence of an enabled "next page" control when no marker exists.
    PageMarker,
    /// A page with fewer records than the threshold is the last page.
    /// Used by the browser variant, where no reliable marker is rendered.
    RecordThreshold(usize),
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub max_pages: usize,
    pub delay_secs: f64,
    pub policy: StopPolicy,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_pages: 5,
            delay_secs: 1.0,
            policy: StopPolicy::PageMarker,
        }
    }
}

/// Pagination state for one configured search URL. The page number only
/// ever moves forward and never passes the configured ceiling.
struct CrawlTarget {
    base_url: String,
    page: usize,
    total_pages: Option<usize>,
}

impl CrawlTarget {
    fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            page: 1,
            total_pages: None,
        }
    }

    fn page_url(&self) -> String {
        format!("{}pg{}/", self.base_url, self.page)
    }
}

/// Crawls every configured target in order. Records accumulate in target
/// order, then page order, then in-page order; one target failing never
/// stops the others.
pub fn crawl_targets<S: PageSource>(
    source: &mut S,
    urls: &[String],
    options: &CrawlOptions,
    mut tui: Option<&mut CrawlTui>,
) -> Vec<Listing> {
    let mut all_listings = Vec::new();

    for base_url in urls {
        debug_println!("Crawling target: {}", base_url);
        let listings = crawl_target(source, base_url, options, tui.as_deref_mut());
        all_listings.extend(listings);
    }

    if let Some(tui) = tui.as_mut() {
        let _ = tui.summary();
    }

    all_listings
}

/// Crawls one target until a stop condition fires: the fetcher gives up on
/// a page, a page yields no records, the page ceiling is reached, or the
/// stop policy signals the last page.
pub fn crawl_target<S: PageSource>(
    source: &mut S,
    base_url: &str,
    options: &CrawlOptions,
    mut tui: Option<&mut CrawlTui>,
) -> Vec<Listing> {
    let mut target = CrawlTarget::new(base_url);
    let mut listings = Vec::new();
    let mut partial_count = 0usize;

    if let Some(tui) = tui.as_mut() {
        let _ = tui.start_target(base_url, options.max_pages);
    }

    loop {
        if target.page > options.max_pages {
            break;
        }

        let url = target.page_url();
        debug_println!("Fetching page {}: {}", target.page, url);

        let body = match source.fetch_page(&url) {
            Ok(body) => body,
            Err(e) => {
                eprintln!("Page {} unavailable, stopping target: {}", target.page, e);
                break;
            }
        };
        let document = Html::parse_document(&body);

        if target.page == 1 && target.total_pages.is_none() {
            if let Some(total) = extractor::total_page_marker(&document) {
                debug_println!("Detected total page count: {}", total);
                target.total_pages = Some(total);
            }
        }

        let extractions = extractor::extract_listings(&document);
        if extractions.is_empty() {
            debug_println!("No listings on page {}, stopping", target.page);
            break;
        }

        let page_count = extractions.len();
        for extraction in extractions {
            if let Some(note) = &extraction.error {
                partial_count += 1;
                debug_eprintln!("Partial listing on page {}: {}", target.page, note);
            }
            listings.push(extraction.listing);
        }

        if let Some(tui) = tui.as_mut() {
            let _ = tui.page_done(target.page, options.max_pages, listings.len());
        }

        let last_page = match options.policy {
            StopPolicy::PageMarker => match target.total_pages {
                Some(total) => target.page >= total,
                None => !extractor::next_control_active(&document),
            },
            StopPolicy::RecordThreshold(threshold) => page_count < threshold,
        };
        if last_page {
            debug_println!("Last page reached, stopping");
            break;
        }

        if target.page >= options.max_pages {
            debug_println!("Reached page ceiling ({}), stopping", options.max_pages);
            break;
        }

        target.page += 1;
        page_pause(options.delay_secs);
    }

    if partial_count > 0 {
        eprintln!(
            "{} listings from {} extracted with missing fields",
            partial_count, base_url
        );
    }

    if let Some(tui) = tui.as_mut() {
        let _ = tui.finish_target(target.page, listings.len());
    }

    listings
}

/// Courtesy pause between pages, separate from the fetcher's per-attempt
/// jitter. A non-positive base delay disables it entirely.
fn page_pause(delay_secs: f64) {
    if delay_secs <= 0.0 {
        return;
    }
    let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
    thread::sleep(Duration::from_secs_f64(delay_secs + jitter));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchError;
    use std::collections::HashMap;

    struct FakeSource {
        pages: HashMap<String, String>,
        default_page: Option<String>,
        fetched: Vec<String>,
    }

    impl FakeSource {
        fn new() -> Self {
            Self {
                pages: HashMap::new(),
                default_page: None,
                fetched: Vec::new(),
            }
        }

        fn page(mut self, url: &str, body: String) -> Self {
            self.pages.insert(url.to_string(), body);
            self
        }

        fn default_page(mut self, body: String) -> Self {
            self.default_page = Some(body);
            self
        }
    }

    impl PageSource for FakeSource {
        fn fetch_page(&mut self, url: &str) -> Result<String, FetchError> {
            self.fetched.push(url.to_string());
            if let Some(body) = self.pages.get(url) {
                return Ok(body.clone());
            }
            match &self.default_page {
                Some(body) => Ok(body.clone()),
                None => Err(FetchError::Browser(format!("no page for {}", url))),
            }
        }
    }

    fn page_html(items: usize, total_pages: Option<usize>, next_active: bool) -> String {
        let mut html = String::from("<html><body>");
        for i in 0..items {
            html.push_str(&format!(
                r#"<div class="content__list--item">
                    <a class="content__list--item--aside" href="/zufang/SH{i}.html" title="房源{i}"></a>
                    <span class="content__list--item-price">3000元/月</span>
                </div>"#
            ));
        }
        if let Some(total) = total_pages {
            html.push_str(&format!(
                r#"<div class="content__pg" data-totalpage="{total}"></div>"#
            ));
        }
        if next_active {
            html.push_str(r##"<a class="content__pg--next" href="#">下一页</a>"##);
        }
        html.push_str("</body></html>");
        html
    }

    fn options(max_pages: usize, policy: StopPolicy) -> CrawlOptions {
        CrawlOptions {
            max_pages,
            delay_secs: 0.0,
            policy,
        }
    }

    #[test]
    fn page_ceiling_bounds_fetch_attempts() {
        // The site never signals a last page and the next control is
        // always present; the ceiling must still terminate the target.
        let mut source = FakeSource::new().default_page(page_html(30, None, true));
        let opts = options(5, StopPolicy::PageMarker);

        let listings = crawl_target(&mut source, "https://sh.lianjia.com/zufang/jingan/", &opts, None);

        assert_eq!(source.fetched.len(), 5);
        assert_eq!(listings.len(), 150);
        assert_eq!(
            source.fetched[0],
            "https://sh.lianjia.com/zufang/jingan/pg1/"
        );
        assert_eq!(
            source.fetched[4],
            "https://sh.lianjia.com/zufang/jingan/pg5/"
        );
    }

    #[test]
    fn empty_page_stops_without_another_fetch() {
        let base = "https://sh.lianjia.com/zufang/jingan/";
        let mut source = FakeSource::new()
            .page(&format!("{base}pg1/"), page_html(30, None, true))
            .page(&format!("{base}pg2/"), page_html(0, None, true));
        let opts = options(10, StopPolicy::PageMarker);

        let listings = crawl_target(&mut source, base, &opts, None);

        assert_eq!(source.fetched.len(), 2);
        assert_eq!(listings.len(), 30);
    }

    #[test]
    fn total_page_marker_is_authoritative() {
        // Marker says 2 pages; the still-active next control on page 2 is
        // ignored.
        let base = "https://sh.lianjia.com/zufang/jingan/";
        let mut source = FakeSource::new()
            .page(&format!("{base}pg1/"), page_html(30, Some(2), true))
            .page(&format!("{base}pg2/"), page_html(30, None, true));
        let opts = options(10, StopPolicy::PageMarker);

        let listings = crawl_target(&mut source, base, &opts, None);

        assert_eq!(source.fetched.len(), 2);
        assert_eq!(listings.len(), 60);
    }

    #[test]
    fn missing_marker_falls_back_to_next_control() {
        let base = "https://sh.lianjia.com/zufang/jingan/";
        let mut source = FakeSource::new()
            .page(&format!("{base}pg1/"), page_html(30, None, true))
            .page(&format!("{base}pg2/"), page_html(30, None, false));
        let opts = options(10, StopPolicy::PageMarker);

        let listings = crawl_target(&mut source, base, &opts, None);

        assert_eq!(source.fetched.len(), 2);
        assert_eq!(listings.len(), 60);
    }

    #[test]
    fn record_threshold_policy_stops_on_a_short_page() {
        let base = "https://sh.lianjia.com/zufang/jingan/";
        let mut source = FakeSource::new()
            .page(&format!("{base}pg1/"), page_html(30, None, false))
            .page(&format!("{base}pg2/"), page_html(10, None, false));
        let opts = options(10, StopPolicy::RecordThreshold(30));

        let listings = crawl_target(&mut source, base, &opts, None);

        assert_eq!(source.fetched.len(), 2);
        assert_eq!(listings.len(), 40);
    }

    #[test]
    fn fetch_failure_keeps_earlier_pages() {
        let base = "https://sh.lianjia.com/zufang/jingan/";
        let mut source =
            FakeSource::new().page(&format!("{base}pg1/"), page_html(30, None, true));
        let opts = options(10, StopPolicy::PageMarker);

        let listings = crawl_target(&mut source, base, &opts, None);

        // Page 2 errored; page 1's records survive.
        assert_eq!(source.fetched.len(), 2);
        assert_eq!(listings.len(), 30);
    }

    #[test]
    fn targets_accumulate_in_order() {
        fn titled_page(title: &str) -> String {
            format!(
                r#"<div class="content__list--item">
                    <a class="content__list--item--aside" href="/zufang/SH1.html" title="{title}"></a>
                    <span class="content__list--item-price">3000元/月</span>
                </div>
                <div class="content__pg" data-totalpage="1"></div>"#
            )
        }

        let first = "https://sh.lianjia.com/zufang/jingan/";
        let second = "https://sh.lianjia.com/zufang/xuhui/";
        let mut source = FakeSource::new()
            .page(&format!("{first}pg1/"), titled_page("静安房源"))
            .page(&format!("{second}pg1/"), titled_page("徐汇房源"));
        let opts = options(5, StopPolicy::PageMarker);

        let listings = crawl_targets(
            &mut source,
            &[first.to_string(), second.to_string()],
            &opts,
            None,
        );

        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].title, "静安房源");
        assert_eq!(listings[1].title, "徐汇房源");
        assert_eq!(source.fetched.len(), 2);
    }

    #[test]
    fn single_page_site_with_disabled_next_stops_after_one_fetch() {
        let base = "https://sh.lianjia.com/zufang/jingan/";
        let mut source =
            FakeSource::new().page(&format!("{base}pg1/"), page_html(12, None, false));
        let opts = options(5, StopPolicy::PageMarker);

        let listings = crawl_target(&mut source, base, &opts, None);

        assert_eq!(source.fetched.len(), 1);
        assert_eq!(listings.len(), 12);
    }
}
