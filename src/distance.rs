use crate::debug_eprintln;
use crate::models::EnrichmentRow;
use crate::storage;
use anyhow::{Context, Result};
use crossterm::{
    cursor::MoveToPreviousLine,
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use reqwest::blocking::Client;
use serde_json::Value;
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;

const STATUS_OK: i64 = 0;
const STATUS_QUOTA: i64 = 302;
const CHECKPOINT_EVERY: usize = 5;

/// Outcome of one external map-API call. A soft failure leaves the field
/// unset and the run continues; quota exhaustion aborts every remaining
/// row of the run.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiOutcome<T> {
    Value(T),
    Failed(String),
    QuotaExceeded,
}

impl<T> ApiOutcome<T> {
    fn and_then<U>(self, f: impl FnOnce(T) -> ApiOutcome<U>) -> ApiOutcome<U> {
        match self {
            ApiOutcome::Value(v) => f(v),
            ApiOutcome::Failed(m) => ApiOutcome::Failed(m),
            ApiOutcome::QuotaExceeded => ApiOutcome::QuotaExceeded,
        }
    }
}

/// The three lookups the enrichment pass needs. Implemented by the Baidu
/// client below and by fakes in tests.
pub trait RouteApi {
    /// Coordinates for a street address, as (lat, lng).
    fn geocode(&self, address: &str) -> ApiOutcome<(f64, f64)>;
    /// Driving route as (distance km, duration minutes).
    fn driving(&self, origin: (f64, f64), dest: (f64, f64)) -> ApiOutcome<(f64, f64)>;
    /// Best transit duration in minutes.
    fn transit(&self, origin: (f64, f64), dest: (f64, f64)) -> ApiOutcome<f64>;
}

pub struct BaiduMapApi {
    client: Client,
    api_key: String,
    city: String,
}

impl BaiduMapApi {
    pub fn new(api_key: &str, city: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            city: city.to_string(),
        })
    }

    /// Fetches a JSON response and classifies it by the service's status
    /// field: 0 is success, 302 means the daily quota is gone, anything
    /// else is a failure with a message.
    fn get_json(&self, url: &str) -> ApiOutcome<Value> {
        let response = match self.client.get(url).send().and_then(|r| r.json::<Value>()) {
            Ok(json) => json,
            Err(e) => return ApiOutcome::Failed(e.to_string()),
        };

        match response["status"].as_i64() {
            Some(STATUS_OK) => ApiOutcome::Value(response),
            Some(STATUS_QUOTA) => ApiOutcome::QuotaExceeded,
            _ => ApiOutcome::Failed(
                response["message"]
                    .as_str()
                    .unwrap_or("unknown error")
                    .to_string(),
            ),
        }
    }
}

impl RouteApi for BaiduMapApi {
    fn geocode(&self, address: &str) -> ApiOutcome<(f64, f64)> {
        let url = format!(
            "http://api.map.baidu.com/geocoding/v3/?address={}&city={}&output=json&ak={}",
            urlencoding::encode(address),
            urlencoding::encode(&self.city),
            self.api_key
        );

        self.get_json(&url).and_then(|json| {
            let location = &json["result"]["location"];
            match (location["lat"].as_f64(), location["lng"].as_f64()) {
                (Some(lat), Some(lng)) => ApiOutcome::Value((lat, lng)),
                _ => ApiOutcome::Failed("geocode response missing location".to_string()),
            }
        })
    }

    fn driving(&self, origin: (f64, f64), dest: (f64, f64)) -> ApiOutcome<(f64, f64)> {
        let url = format!(
            "http://api.map.baidu.com/directionlite/v1/driving?origin={},{}&destination={},{}&ak={}",
            origin.0, origin.1, dest.0, dest.1, self.api_key
        );

        self.get_json(&url).and_then(|json| {
            let route = &json["result"]["routes"][0];
            match (route["distance"].as_f64(), route["duration"].as_f64()) {
                (Some(meters), Some(seconds)) => {
                    ApiOutcome::Value((meters / 1000.0, seconds / 60.0))
                }
                _ => ApiOutcome::Failed("driving response missing route".to_string()),
            }
        })
    }

    fn transit(&self, origin: (f64, f64), dest: (f64, f64)) -> ApiOutcome<f64> {
        let url = format!(
            "http://api.map.baidu.com/directionlite/v1/transit?origin={},{}&destination={},{}&ak={}",
            origin.0, origin.1, dest.0, dest.1, self.api_key
        );

        self.get_json(&url).and_then(|json| {
            let durations = match json["result"]["routes"].as_array() {
                Some(routes) => routes
                    .iter()
                    .filter_map(|route| route["duration"].as_f64())
                    .collect::<Vec<_>>(),
                None => Vec::new(),
            };
            match durations.iter().cloned().fold(None::<f64>, |best, d| {
                Some(best.map_or(d, |b| b.min(d)))
            }) {
                Some(seconds) => ApiOutcome::Value(seconds / 60.0),
                None => ApiOutcome::Failed("no suitable transit route".to_string()),
            }
        })
    }
}

/// Coordinate cell text, e.g. `纬度 31.2304, 经度 121.4737`.
pub fn format_coordinates(lat: f64, lng: f64) -> String {
    format!("纬度 {}, 经度 {}", lat, lng)
}

/// Parses a coordinate cell back into numbers. Malformed input yields
/// `None`, never a panic.
pub fn parse_coordinates(cell: &str) -> Option<(f64, f64)> {
    let lat = cell
        .split("纬度 ")
        .nth(1)?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()?;
    let lng = cell.split("经度 ").nth(1)?.trim().parse().ok()?;
    Some((lat, lng))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[derive(Debug, Default, PartialEq)]
pub struct EnrichStats {
    pub completed: usize,
    pub skipped: usize,
    pub quota_hit: bool,
}

enum RowOutcome {
    Done,
    Skipped,
    Quota,
}

/// Enriches every row in order: geocode the origin if unset, then fill the
/// driving and transit columns. The row file is rewritten in full after
/// every fifth completed row and once more at the end, so on-disk state is
/// always a consistent snapshot of progress. Quota exhaustion is sticky
/// and leaves all remaining rows untouched.
pub fn enrich_rows<A: RouteApi>(
    api: &A,
    rows: &mut Vec<EnrichmentRow>,
    store_path: &Path,
    pace: Duration,
    mut tui: Option<&mut EnrichTui>,
) -> Result<EnrichStats> {
    anyhow::ensure!(!rows.is_empty(), "input file has no rows");

    let dest = parse_coordinates(&rows[0].dest_coords)
        .context("Destination coordinates in the first row are unparseable")?;

    let mut stats = EnrichStats::default();

    for index in 0..rows.len() {
        let outcome = enrich_row(api, &mut rows[index], dest, pace);

        match outcome {
            RowOutcome::Quota => {
                stats.quota_hit = true;
                eprintln!("API quota exhausted, leaving remaining rows untouched");
                break;
            }
            RowOutcome::Skipped => {
                stats.skipped += 1;
                if let Some(tui) = tui.as_mut() {
                    let _ = tui.update(false, &rows[index].origin);
                }
            }
            RowOutcome::Done => {
                stats.completed += 1;
                if let Some(tui) = tui.as_mut() {
                    let _ = tui.update(true, &rows[index].origin);
                }
                if (index + 1) % CHECKPOINT_EVERY == 0 {
                    storage::save_rows(rows, store_path)?;
                    debug_eprintln!("Checkpointed progress to {}", store_path.display());
                }
            }
        }
    }

    storage::save_rows(rows, store_path)?;

    if let Some(tui) = tui.as_mut() {
        if stats.quota_hit {
            let _ = tui.interrupted(rows.len() - stats.completed - stats.skipped);
        } else {
            let _ = tui.complete();
        }
    }

    Ok(stats)
}

fn enrich_row<A: RouteApi>(
    api: &A,
    row: &mut EnrichmentRow,
    dest: (f64, f64),
    pace: Duration,
) -> RowOutcome {
    if row.origin_coords.trim().is_empty() {
        match api.geocode(&row.origin) {
            ApiOutcome::Value((lat, lng)) => row.origin_coords = format_coordinates(lat, lng),
            ApiOutcome::Failed(m) => {
                debug_eprintln!("Geocoding failed for {}: {}", row.origin, m);
            }
            ApiOutcome::QuotaExceeded => return RowOutcome::Quota,
        }
        pause(pace);
    }

    let origin = match parse_coordinates(&row.origin_coords) {
        Some(coords) => coords,
        None => {
            debug_eprintln!("Cannot parse origin coordinates for {}", row.origin);
            return RowOutcome::Skipped;
        }
    };

    if row.driving_km.is_none() {
        match api.driving(origin, dest) {
            ApiOutcome::Value((km, minutes)) => {
                row.driving_km = Some(round2(km));
                row.driving_min = Some(round1(minutes));
            }
            ApiOutcome::Failed(m) => {
                debug_eprintln!("Driving lookup failed for {}: {}", row.origin, m);
            }
            ApiOutcome::QuotaExceeded => return RowOutcome::Quota,
        }
        pause(pace);
    }

    if row.transit_min.is_none() {
        match api.transit(origin, dest) {
            ApiOutcome::Value(minutes) => row.transit_min = Some(round1(minutes)),
            ApiOutcome::Failed(m) => {
                debug_eprintln!("Transit lookup failed for {}: {}", row.origin, m);
            }
            ApiOutcome::QuotaExceeded => return RowOutcome::Quota,
        }
        pause(pace);
    }

    RowOutcome::Done
}

fn pause(pace: Duration) {
    if !pace.is_zero() {
        thread::sleep(pace);
    }
}

/// Progress display for the enrichment pass, one rewritten progress line
/// plus a per-row status line.
pub struct EnrichTui {
    total_rows: usize,
    done_count: usize,
    skipped_count: usize,
    current_index: usize,
}

impl EnrichTui {
    pub fn new(total_rows: usize) -> Self {
        Self {
            total_rows,
            done_count: 0,
            skipped_count: 0,
            current_index: 0,
        }
    }

    pub fn start(&self) -> io::Result<()> {
        execute!(
            io::stdout(),
            SetForegroundColor(Color::White),
            Print(format!(
                "🗺️  Enriching {} rows with route data...\n",
                self.total_rows
            )),
            ResetColor
        )?;
        self.show_progress()
    }

    pub fn update(&mut self, done: bool, origin: &str) -> io::Result<()> {
        self.current_index += 1;
        if done {
            self.done_count += 1;
        } else {
            self.skipped_count += 1;
        }

        execute!(
            io::stdout(),
            MoveToPreviousLine(1),
            Clear(ClearType::CurrentLine),
        )?;
        self.show_progress()?;

        if done {
            execute!(
                io::stdout(),
                SetForegroundColor(Color::Green),
                Print(format!("✓ Enriched: {}\n", origin)),
                ResetColor
            )?;
        } else {
            execute!(
                io::stdout(),
                SetForegroundColor(Color::Yellow),
                Print(format!("⚠ Skipped: {} (no usable coordinates)\n", origin)),
                ResetColor
            )?;
        }
        Ok(())
    }

    pub fn complete(&self) -> io::Result<()> {
        execute!(
            io::stdout(),
            SetForegroundColor(Color::Green),
            Print(format!(
                "✅ Enrichment completed: {} done, {} skipped\n",
                self.done_count, self.skipped_count
            )),
            ResetColor
        )
    }

    pub fn interrupted(&self, remaining: usize) -> io::Result<()> {
        execute!(
            io::stdout(),
            SetForegroundColor(Color::Yellow),
            Print(format!(
                "⚠ Enrichment stopped by quota: {} done, {} skipped, {} rows left untouched\n",
                self.done_count, self.skipped_count, remaining
            )),
            ResetColor
        )
    }

    fn show_progress(&self) -> io::Result<()> {
        let percentage = if self.total_rows > 0 {
            (self.current_index * 100) / self.total_rows
        } else {
            0
        };
        execute!(
            io::stdout(),
            SetForegroundColor(Color::Blue),
            Print(format!(
                "📍 Progress: {}/{} ({}%) - {} done, {} skipped\n",
                self.current_index,
                self.total_rows,
                percentage,
                self.done_count,
                self.skipped_count
            )),
            ResetColor
        )
    }
}
