use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use zufangfinder::distance::{self, BaiduMapApi, EnrichTui};
use zufangfinder::{debug, storage};

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about = "Enrich a row file with geocoded coordinates and route data from Baidu Maps"
)]
struct Args {
    /// Input CSV with `origin` and `dest_coords` columns
    input: PathBuf,

    /// Output file (defaults to "<input>-routes.csv")
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Baidu Maps API key (falls back to the BAIDU_MAP_AK environment variable)
    #[clap(short, long)]
    api_key: Option<String>,

    /// City used to scope geocoding
    #[clap(long, default_value = "上海市")]
    city: String,

    /// Seconds to wait between API calls
    #[clap(short, long, default_value = "1")]
    pace: u64,

    /// Enable debug output
    #[clap(short, long)]
    debug: bool,
}

fn derive_output(input: &PathBuf) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "rows".to_string());
    input.with_file_name(format!("{}-routes.csv", stem))
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.debug {
        debug::enable();
    }

    let api_key = args
        .api_key
        .or_else(|| std::env::var("BAIDU_MAP_AK").ok())
        .context("No API key: pass --api-key or set BAIDU_MAP_AK")?;

    let output = args.output.unwrap_or_else(|| derive_output(&args.input));
    println!("Processing {} -> {}", args.input.display(), output.display());

    let mut rows = storage::load_rows(&args.input)?;
    let api = BaiduMapApi::new(&api_key, &args.city)?;

    let mut tui = EnrichTui::new(rows.len());
    let _ = tui.start();

    let stats = distance::enrich_rows(
        &api,
        &mut rows,
        &output,
        Duration::from_secs(args.pace),
        Some(&mut tui),
    )?;

    println!("Results saved to {}", output.display());
    if stats.quota_hit {
        println!("Run again tomorrow (or with a fresh key) to finish the remaining rows.");
    }

    Ok(())
}
