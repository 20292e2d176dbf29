use anyhow::Result;
use chrono::Local;
use clap::Parser;
use std::path::{Path, PathBuf};
use zufangfinder::browser::{self, BrowserSource};
use zufangfinder::crawler::{self, CrawlOptions, StopPolicy};
use zufangfinder::tui::CrawlTui;
use zufangfinder::{config, debug, storage};

/// A full results page carries 30 listings; fewer means the last page.
const LAST_PAGE_THRESHOLD: usize = 30;

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about = "Crawl Lianjia rentals through a live Chrome window, pausing for human verification"
)]
struct Args {
    /// Path to the crawl configuration file
    #[clap(short, long, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Directory for output workbooks
    #[clap(long, default_value = "data")]
    data_dir: PathBuf,

    /// Override the configured page ceiling
    #[clap(short, long)]
    max_pages: Option<usize>,

    /// Run Chrome without a window (challenge pages cannot be solved)
    #[clap(long)]
    headless: bool,

    /// Enable debug output
    #[clap(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.debug {
        debug::enable();
    }

    println!("Zufangfinder - Browser Crawl");
    println!("============================");

    let run_started = Local::now();
    let config = config::load_or_init(&args.config)?;

    let chrome = browser::launch(args.headless)?;
    let mut source = BrowserSource::new(&chrome)?;

    let options = CrawlOptions {
        max_pages: args.max_pages.unwrap_or(config.max_pages),
        delay_secs: config.delay,
        policy: StopPolicy::RecordThreshold(LAST_PAGE_THRESHOLD),
    };

    let mut tui = CrawlTui::new();
    let listings = crawler::crawl_targets(&mut source, &config.urls, &options, Some(&mut tui));

    if listings.is_empty() {
        println!("No listings scraped.");
        return Ok(());
    }

    let output = storage::output_path(&args.data_dir, &run_started);
    let written = storage::save_listings(&listings, &output)?;
    storage::record_last_file(Path::new(storage::LAST_FILE), &written)?;

    println!("\n=== Summary ===");
    println!("Total listings scraped: {}", listings.len());
    println!("Saved to: {}", written.display());

    Ok(())
}
