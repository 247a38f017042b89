use anyhow::{Context, Result};
use batchdem::{Coordinate, ElevationReader, RasterSource};
use serde::Serialize;

use super::format_value;

#[derive(Serialize)]
struct ValueResponse {
    x: f64,
    y: f64,
    elevation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tile: Option<String>,
}

pub fn run<R: RasterSource>(reader: &ElevationReader<R>, x: f64, y: f64, json: bool) -> Result<()> {
    let c = Coordinate::new(x, y);
    let value = reader
        .get_value_at(c)
        .with_context(|| format!("Failed to get elevation at ({}, {})", x, y))?;

    if json {
        let response = ValueResponse {
            x,
            y,
            elevation: (!value.is_nan()).then_some(value),
            tile: reader.registry().lookup(c).map(String::from),
        };
        println!("{}", serde_json::to_string(&response)?);
    } else {
        println!("{}", format_value(value));
    }

    Ok(())
}
