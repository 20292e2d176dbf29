use crate::models::{CellValue, EnrichmentRow, Listing, LISTING_COLUMNS};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use rust_xlsxwriter::Workbook;
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

pub const LAST_FILE: &str = "last_file.txt";

const MAX_COLUMN_WIDTH: usize = 50;

/// Output path for one crawl run. The timestamp is captured once at run
/// start and passed in, so every artifact of a run shares one name.
pub fn output_path(data_dir: &Path, run_started: &DateTime<Local>) -> PathBuf {
    data_dir.join(format!(
        "lianjia_zufang_{}.xlsx",
        run_started.format("%Y%m%d_%H%M%S")
    ))
}

/// Writes the workbook, falling back to CSV next to it when the workbook
/// writer fails. Returns the path that was actually written.
pub fn save_listings(listings: &[Listing], xlsx_path: &Path) -> Result<PathBuf> {
    if let Some(dir) = xlsx_path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
        }
    }

    match write_workbook(listings, xlsx_path) {
        Ok(()) => {
            println!(
                "Saved {} listings to {}",
                listings.len(),
                xlsx_path.display()
            );
            Ok(xlsx_path.to_path_buf())
        }
        Err(e) => {
            eprintln!("Workbook write failed ({}), falling back to CSV", e);
            let csv_path = xlsx_path.with_extension("csv");
            write_listings_csv(listings, &csv_path)?;
            println!("Saved {} listings to {}", listings.len(), csv_path.display());
            Ok(csv_path)
        }
    }
}

pub fn write_workbook(listings: &[Listing], path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    let mut widths: Vec<usize> = LISTING_COLUMNS.iter().map(|h| h.chars().count()).collect();

    for (col, header) in LISTING_COLUMNS.iter().enumerate() {
        worksheet.write_string(0, col as u16, *header)?;
    }

    for (row, listing) in listings.iter().enumerate() {
        let r = (row + 1) as u32;
        for (col, cell) in listing.cells().into_iter().enumerate() {
            match cell {
                CellValue::Text(v) => {
                    widths[col] = widths[col].max(v.chars().count());
                    worksheet.write_string(r, col as u16, &v)?;
                }
                CellValue::Number(v) => {
                    widths[col] = widths[col].max(v.to_string().len());
                    worksheet.write_number(r, col as u16, v)?;
                }
                CellValue::Bool(v) => {
                    worksheet.write_boolean(r, col as u16, v)?;
                }
                CellValue::Empty => {}
            }
        }
    }

    for (col, width) in widths.iter().enumerate() {
        worksheet.set_column_width(col as u16, (width + 2).min(MAX_COLUMN_WIDTH) as f64)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("Failed to save workbook: {}", path.display()))?;
    Ok(())
}

pub fn write_listings_csv(listings: &[Listing], path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);

    writer.write_record(LISTING_COLUMNS)?;
    for listing in listings {
        writer.write_record(&listing.csv_record())?;
    }
    writer.flush()?;

    Ok(())
}

/// Loads the enrichment row file. A missing file is an error here, unlike
/// the crawl store, because the enricher cannot invent its input.
pub fn load_rows(path: &Path) -> Result<Vec<EnrichmentRow>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open input file: {}", path.display()))?;
    let mut reader = csv::Reader::from_reader(file);

    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let row: EnrichmentRow =
            result.with_context(|| format!("Malformed row in {}", path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Full overwrite: the file on disk is always a complete snapshot of every
/// row, enriched or not.
pub fn save_rows(rows: &[EnrichmentRow], path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);

    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}

pub fn record_last_file(last_file: &Path, produced: &Path) -> Result<()> {
    fs::write(last_file, produced.display().to_string())
        .with_context(|| format!("Failed to write {}", last_file.display()))
}

pub fn read_last_file(last_file: &Path) -> Result<PathBuf> {
    let raw = fs::read_to_string(last_file).with_context(|| {
        format!(
            "Failed to read {} (run a crawl first)",
            last_file.display()
        )
    })?;
    let trimmed = raw.trim();
    anyhow::ensure!(!trimmed.is_empty(), "{} is empty", last_file.display());
    Ok(PathBuf::from(trimmed))
}
