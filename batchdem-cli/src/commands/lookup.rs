use anyhow::Result;
use batchdem::{Coordinate, ElevationReader, RasterSource};

pub fn run<R: RasterSource>(reader: &ElevationReader<R>, x: f64, y: f64) -> Result<()> {
    match reader.registry().lookup(Coordinate::new(x, y)) {
        Some(identifier) => {
            let cached = if reader.store().is_cached(identifier) {
                " (cached)"
            } else {
                ""
            };
            println!("{}{}", identifier, cached);
        }
        None => println!("none"),
    }
    Ok(())
}
