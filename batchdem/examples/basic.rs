//! Basic example demonstrating batchdem library usage.
//!
//! Run with: cargo run --example basic -- <base-url-or-dir> [cache-dir]

use batchdem::{Coordinate, DemError, ElevationReader};
use std::env;
use std::path::PathBuf;

fn main() -> Result<(), DemError> {
    let base = env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: cargo run --example basic -- <base-url-or-dir> [cache-dir]");
        std::process::exit(1);
    });
    let cache_dir = env::args().nth(2).map(PathBuf::from);

    let reader = ElevationReader::open(&base, cache_dir.as_deref())?;
    println!("Tile set has {} tiles", reader.registry().len());

    // Query some famous peaks (x = longitude, y = latitude)
    let locations = [
        ("Mount Fuji, Japan", 138.7274, 35.3606),
        ("Mount Everest, Nepal", 86.9250, 27.9881),
        ("Denali, Alaska", -151.0074, 63.0695),
    ];

    println!("{:-<50}", "");
    for (name, x, y) in &locations {
        match reader.get_value_at(Coordinate::new(*x, *y)) {
            Ok(value) if value.is_nan() => println!("{}: no data", name),
            Ok(value) => println!("{}: {:.1}m", name, value),
            Err(e) => println!("{}: error - {}", name, e),
        }
    }

    let stats = reader.stats();
    println!("\nReader statistics:");
    println!("  Lookups: {}", stats.lookups);
    println!("  Tiles fetched: {}", stats.tiles_fetched);
    println!("  Tiles opened: {}", stats.handles_opened);
    println!("  Bytes written: {}", stats.bytes_written);

    reader.close();
    Ok(())
}
