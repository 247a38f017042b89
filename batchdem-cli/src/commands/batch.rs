use anyhow::{Context, Result};
use batchdem::{Coordinate, ElevationReader, RasterSource};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;

use super::format_value;

/// Written for rows whose lookup failed.
const ERROR_VALUE: &str = "error";

pub fn run<R: RasterSource>(
    reader: &ElevationReader<R>,
    input: PathBuf,
    output: Option<PathBuf>,
    x_col: &str,
    y_col: &str,
    threads: usize,
) -> Result<()> {
    let file = File::open(&input).context("Failed to open input file")?;
    let mut csv_reader = csv::Reader::from_reader(BufReader::new(file));

    // Find column indices
    let headers = csv_reader.headers()?.clone();
    let x_idx = headers
        .iter()
        .position(|h| h == x_col)
        .with_context(|| format!("Column '{}' not found in CSV", x_col))?;
    let y_idx = headers
        .iter()
        .position(|h| h == y_col)
        .with_context(|| format!("Column '{}' not found in CSV", y_col))?;

    let records: Vec<_> = csv_reader.records().collect::<Result<_, _>>()?;
    let coords = records
        .iter()
        .enumerate()
        .map(|(row, record)| {
            let x = parse_field(record.get(x_idx), x_col, row)?;
            let y = parse_field(record.get(y_idx), y_col, row)?;
            Ok(Coordinate::new(x, y))
        })
        .collect::<Result<Vec<_>>>()?;

    let pb = ProgressBar::new(coords.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let values = evaluate_parallel(reader, &coords, threads, &pb);
    pb.finish_with_message("done");

    // Prepare output
    let output_path = output.unwrap_or_else(|| default_output_path(&input));
    let output_file = File::create(&output_path).context("Failed to create output file")?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(output_file));

    let mut new_headers: Vec<&str> = headers.iter().collect();
    new_headers.push("elevation");
    writer.write_record(&new_headers)?;

    for (record, value) in records.iter().zip(&values) {
        let mut new_record: Vec<&str> = record.iter().collect();
        new_record.push(value);
        writer.write_record(&new_record)?;
    }
    writer.flush()?;

    let failed = values.iter().filter(|v| *v == ERROR_VALUE).count();
    if failed > 0 {
        eprintln!("{} of {} rows failed, see log for details", failed, values.len());
    }
    println!("Output written to: {}", output_path.display());
    Ok(())
}

/// Evaluate `coords` on `threads` scoped workers sharing one reader.
///
/// Results keep the input order. Failed lookups are logged and reported
/// as [`ERROR_VALUE`].
fn evaluate_parallel<R: RasterSource>(
    reader: &ElevationReader<R>,
    coords: &[Coordinate],
    threads: usize,
    pb: &ProgressBar,
) -> Vec<String> {
    if coords.is_empty() {
        return Vec::new();
    }
    let threads = threads.max(1);
    let chunk_size = (coords.len() + threads - 1) / threads;

    thread::scope(|s| {
        let workers: Vec<_> = coords
            .chunks(chunk_size)
            .enumerate()
            .map(|(chunk, slice)| {
                s.spawn(move || {
                    slice
                        .iter()
                        .enumerate()
                        .map(|(i, &c)| {
                            let value = match reader.get_value_at(c) {
                                Ok(value) => format_value(value),
                                Err(e) => {
                                    let row = chunk * chunk_size + i;
                                    tracing::warn!(row, x = c.x, y = c.y, error = %e, "lookup failed");
                                    ERROR_VALUE.to_string()
                                }
                            };
                            pb.inc(1);
                            value
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        workers
            .into_iter()
            .flat_map(|worker| match worker.join() {
                Ok(values) => values,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}

fn parse_field(field: Option<&str>, column: &str, row: usize) -> Result<f64> {
    let field = field.with_context(|| format!("Missing '{}' on row {}", column, row + 1))?;
    field
        .trim()
        .parse()
        .with_context(|| format!("Invalid '{}' value '{}' on row {}", column, field, row + 1))
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}_elevation.csv", stem))
}
