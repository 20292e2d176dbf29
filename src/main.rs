use anyhow::Result;
use chrono::Local;
use clap::Parser;
use std::path::{Path, PathBuf};
use zufangfinder::crawler::{self, CrawlOptions, StopPolicy};
use zufangfinder::fetcher::HttpSource;
use zufangfinder::tui::CrawlTui;
use zufangfinder::{config, debug, session, storage};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Zufangfinder - Rental Listing Scraper for Shanghai Lianjia")]
struct Args {
    /// Path to the crawl configuration file
    #[clap(short, long, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Path to the saved session file
    #[clap(short, long, default_value = session::DEFAULT_SESSION_FILE)]
    session: PathBuf,

    /// Directory for output workbooks
    #[clap(long, default_value = "data")]
    data_dir: PathBuf,

    /// Override the configured page ceiling
    #[clap(short, long)]
    max_pages: Option<usize>,

    /// Retry attempts per page request
    #[clap(short, long, default_value = "3")]
    retries: usize,

    /// Enable debug output
    #[clap(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.debug {
        debug::enable();
    }

    println!("Zufangfinder - Rental Listing Scraper");
    println!("=====================================");

    let run_started = Local::now();
    let config = config::load_or_init(&args.config)?;
    let state = session::load_session(&args.session)?;
    let client = session::build_client(&state)?;
    let mut source = HttpSource::new(client).with_max_retries(args.retries);

    let options = CrawlOptions {
        max_pages: args.max_pages.unwrap_or(config.max_pages),
        delay_secs: config.delay,
        policy: StopPolicy::PageMarker,
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
