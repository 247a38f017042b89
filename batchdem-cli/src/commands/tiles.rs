use anyhow::Result;
use batchdem::{ElevationReader, RasterSource, TileEntry};

pub fn run<R: RasterSource>(reader: &ElevationReader<R>) -> Result<()> {
    let mut entries: Vec<&TileEntry> = reader.registry().entries().collect();
    entries.sort_by(|a, b| a.identifier.cmp(&b.identifier));

    println!("{:<32} {:>44} {:>7}", "TILE", "BOUNDS", "CACHED");
    println!("{}", "-".repeat(85));

    let mut cached_count = 0;
    let mut total_size: u64 = 0;

    for entry in &entries {
        let path = reader.store().path_for(&entry.identifier);
        let cached = match std::fs::metadata(&path) {
            Ok(metadata) => {
                cached_count += 1;
                total_size += metadata.len();
                "yes"
            }
            Err(_) => "no",
        };

        let e = entry.envelope;
        let bounds = format!(
            "{:.4}, {:.4} to {:.4}, {:.4}",
            e.min_x, e.min_y, e.max_x, e.max_y
        );
        println!("{:<32} {:>44} {:>7}", entry.identifier, bounds, cached);
    }

    // Summary
    println!();
    println!("Summary:");
    println!("  Total tiles: {}", entries.len());
    println!("  Cached: {}", cached_count);
    println!("  Cached size: {}", format_size(total_size));
    println!("  Cache directory: {}", reader.store().dir().display());

    Ok(())
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
