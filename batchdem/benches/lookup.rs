use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use batchdem::fetch::MANIFEST_NAME;
use batchdem::{BoundingBox, Coordinate, ElevationReader, TileEntry, TileRegistry};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::TempDir;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

const SAMPLES: u32 = 512;

/// One entry per whole degree between 60S and 60N.
fn global_registry() -> TileRegistry {
    let mut entries = Vec::new();
    for lat in -60..60 {
        for lon in -180..180 {
            let (x, y) = (lon as f64, lat as f64);
            entries.push(TileEntry {
                envelope: BoundingBox::new(x, y, x + 1.0, y + 1.0),
                identifier: format!("{}_{}.tif.bz2", lat, lon),
            });
        }
    }
    TileRegistry::from_entries(entries)
}

/// Mirror with one bzip2 GeoTIFF over [138, 139] x [35, 36].
fn create_mirror(dir: &Path) {
    let data: Vec<f32> = (0..SAMPLES * SAMPLES)
        .map(|i| ((i / SAMPLES + i % SAMPLES) % 4000) as f32)
        .collect();

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut cursor).unwrap();
        let mut image = encoder
            .new_image::<colortype::Gray32Float>(SAMPLES, SAMPLES)
            .unwrap();
        let pixel = 1.0 / SAMPLES as f64;
        image
            .encoder()
            .write_tag(Tag::from_u16_exhaustive(33550), &[pixel, pixel, 0.0][..])
            .unwrap();
        image
            .encoder()
            .write_tag(
                Tag::from_u16_exhaustive(33922),
                &[0.0, 0.0, 0.0, 138.0, 36.0, 0.0][..],
            )
            .unwrap();
        image.write_data(&data).unwrap();
    }

    let mut tile = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::fast());
    tile.write_all(cursor.get_ref()).unwrap();
    fs::write(dir.join("N35E138.tif.bz2"), tile.finish().unwrap()).unwrap();

    let mut manifest = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    manifest
        .write_all(b"N35E138.tif.bz2,138,35,139,36\n")
        .unwrap();
    fs::write(dir.join(MANIFEST_NAME), manifest.finish().unwrap()).unwrap();
}

fn bench_registry_lookup(c: &mut Criterion) {
    let registry = global_registry();

    c.bench_function("registry_lookup_43200_tiles", |b| {
        b.iter(|| black_box(registry.lookup(black_box(Coordinate::new(138.7274, 35.3606)))));
    });

    c.bench_function("registry_lookup_miss", |b| {
        b.iter(|| black_box(registry.lookup(black_box(Coordinate::new(10.0, 75.0)))));
    });
}

fn bench_cached_value(c: &mut Criterion) {
    let mirror = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    create_mirror(mirror.path());
    let reader =
        ElevationReader::open(mirror.path().to_str().unwrap(), Some(cache.path())).unwrap();

    // Fetch and open the tile
    reader.get_value_at(Coordinate::new(138.5, 35.5)).unwrap();

    c.bench_function("value_at_cached", |b| {
        b.iter(|| {
            black_box(
                reader
                    .get_value_at(black_box(Coordinate::new(138.7274, 35.3606)))
                    .unwrap(),
            )
        });
    });

    let coords: Vec<Coordinate> = (0..1000)
        .map(|i| {
            let frac = i as f64 / 1000.0;
            Coordinate::new(138.0 + frac * 0.99, 35.0 + frac * 0.99)
        })
        .collect();

    c.bench_function("values_at_1000_same_tile", |b| {
        b.iter(|| black_box(reader.get_values_at(black_box(&coords)).unwrap()));
    });
}

criterion_group!(benches, bench_registry_lookup, bench_cached_value);
criterion_main!(benches);
