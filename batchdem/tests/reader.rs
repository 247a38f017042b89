//! Integration tests driving a whole reader against a local mirror.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use batchdem::fetch::MANIFEST_NAME;
use batchdem::{
    Coordinate, DemError, DirectorySource, ElevationReader, HgtSource, ReaderBuilder,
    TileCacheStore, TileSource,
};
use tempfile::TempDir;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

const TILE: &str = "N00E134.tif.bz2";
const WIDE_TILE: &str = "wide.tif.bz2";

/// Tile source over a directory that counts tile requests and can cut
/// tile streams short.
struct CountingSource {
    inner: DirectorySource,
    tile_opens: Arc<AtomicUsize>,
    fail_tiles: Arc<AtomicBool>,
}

impl TileSource for CountingSource {
    fn open(&self, name: &str) -> batchdem::Result<Box<dyn Read + Send>> {
        let stream = self.inner.open(name)?;
        if name == MANIFEST_NAME {
            return Ok(stream);
        }

        self.tile_opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_tiles.load(Ordering::SeqCst) {
            return Ok(Box::new(BrokenStream {
                inner: stream,
                remaining: 16,
            }));
        }
        Ok(stream)
    }

    fn describe(&self) -> String {
        format!("counting {}", self.inner.describe())
    }
}

/// Yields `remaining` bytes, then fails like a dropped connection.
struct BrokenStream {
    inner: Box<dyn Read + Send>,
    remaining: usize,
}

impl Read for BrokenStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ));
        }
        let len = buf.len().min(self.remaining);
        let n = self.inner.read(&mut buf[..len])?;
        self.remaining -= n;
        Ok(n)
    }
}

struct Fixture {
    mirror: TempDir,
    cache: TempDir,
    tile_opens: Arc<AtomicUsize>,
    fail_tiles: Arc<AtomicBool>,
}

impl Fixture {
    /// Mirror with a 4x4 tile over [134, 135] x [0, 1] and a tile whose
    /// manifest box is twice as wide as its data.
    fn new() -> Self {
        let mirror = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();

        write_gzip(
            &mirror.path().join(MANIFEST_NAME),
            format!(
                "# identifier,min_x,min_y,max_x,max_y\n\
                 {},134.0,0.0,135.0,1.0\n\
                 {},140.0,0.0,142.0,1.0,extra\n\
                 broken,1,2\n",
                TILE, WIDE_TILE
            )
            .as_bytes(),
        );
        write_bzip2(
            &mirror.path().join(TILE),
            &geotiff_bytes(134.0, 1.0, 0.25, 4, 4, &gradient()),
        );
        write_bzip2(
            &mirror.path().join(WIDE_TILE),
            &geotiff_bytes(140.0, 1.0, 0.25, 4, 4, &gradient()),
        );

        Self {
            mirror,
            cache,
            tile_opens: Arc::new(AtomicUsize::new(0)),
            fail_tiles: Arc::new(AtomicBool::new(false)),
        }
    }

    fn builder(&self) -> ReaderBuilder {
        let source = CountingSource {
            inner: DirectorySource::new(self.mirror.path()).unwrap(),
            tile_opens: Arc::clone(&self.tile_opens),
            fail_tiles: Arc::clone(&self.fail_tiles),
        };
        ReaderBuilder::new(self.mirror.path().to_str().unwrap())
            .cache_dir(self.cache.path())
            .source(source)
    }

    fn reader(&self) -> ElevationReader {
        self.builder().build().unwrap()
    }

    fn tile_opens(&self) -> usize {
        self.tile_opens.load(Ordering::SeqCst)
    }
}

/// Row-major samples `100 + 10 * row + col`.
fn gradient() -> Vec<f32> {
    (0..4)
        .flat_map(|row| (0..4).map(move |col| (100 + 10 * row + col) as f32))
        .collect()
}

fn geotiff_bytes(
    min_x: f64,
    max_y: f64,
    pixel: f64,
    width: u32,
    height: u32,
    data: &[f32],
) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut cursor).unwrap();
        let mut image = encoder
            .new_image::<colortype::Gray32Float>(width, height)
            .unwrap();
        image
            .encoder()
            .write_tag(Tag::from_u16_exhaustive(33550), &[pixel, pixel, 0.0][..])
            .unwrap();
        image
            .encoder()
            .write_tag(
                Tag::from_u16_exhaustive(33922),
                &[0.0, 0.0, 0.0, min_x, max_y, 0.0][..],
            )
            .unwrap();
        image.write_data(data).unwrap();
    }
    cursor.into_inner()
}

fn write_bzip2(path: &Path, data: &[u8]) {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(data).unwrap();
    fs::write(path, encoder.finish().unwrap()).unwrap();
}

fn write_gzip(path: &Path, data: &[u8]) {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    fs::write(path, encoder.finish().unwrap()).unwrap();
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}

#[test]
fn test_manifest_skips_comments_and_malformed_lines() {
    let fixture = Fixture::new();
    let reader = fixture.reader();

    assert_eq!(reader.registry().len(), 2);
    let ids: HashSet<_> = reader
        .registry()
        .entries()
        .map(|e| e.identifier.as_str())
        .collect();
    assert_eq!(ids, HashSet::from([TILE, WIDE_TILE]));
}

#[test]
fn test_uncovered_coordinate_does_no_io() {
    let fixture = Fixture::new();
    let reader = fixture.reader();

    assert!(reader
        .get_value_at(Coordinate::new(133.9, 0.5))
        .unwrap()
        .is_nan());
    assert_eq!(fixture.tile_opens(), 0);
    assert!(reader.store().cached_tiles().is_empty());
    assert_eq!(reader.stats().misses, 1);
}

#[test]
fn test_lookup_fetches_decompresses_and_evaluates() {
    let fixture = Fixture::new();
    let reader = fixture.reader();

    // Pixel centre of row 0, col 0
    assert_close(reader.get_value_at(Coordinate::new(134.125, 0.875)).unwrap(), 100.0);
    // Centre of the tile, between rows 1-2 and cols 1-2
    assert_close(reader.get_value_at(Coordinate::new(134.5, 0.5)).unwrap(), 116.5);

    assert!(fixture.cache.path().join("N00E134.tif").is_file());
    assert_eq!(reader.store().cached_tiles(), vec!["N00E134.tif"]);
}

#[test]
fn test_repeated_lookups_fetch_once() {
    let fixture = Fixture::new();
    let reader = fixture.reader();
    let c = Coordinate::new(134.3, 0.6);

    let first = reader.get_value_at(c).unwrap();
    let second = reader.get_value_at(c).unwrap();
    assert_eq!(first, second);

    assert_eq!(fixture.tile_opens(), 1);
    let stats = reader.stats();
    assert_eq!(stats.lookups, 2);
    assert_eq!(stats.tiles_fetched, 1);
    assert_eq!(stats.handles_opened, 1);
    assert_eq!(stats.handle_hits, 1);
    assert!(stats.bytes_written > 0);
}

#[test]
fn test_concurrent_lookups_fetch_and_open_once() {
    let fixture = Fixture::new();
    let reader = fixture.reader();
    let threads = 16;
    let barrier = Barrier::new(threads);

    let values: Vec<f64> = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    reader.get_value_at(Coordinate::new(134.5, 0.5)).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for value in values {
        assert_close(value, 116.5);
    }
    assert_eq!(fixture.tile_opens(), 1);
    let stats = reader.stats();
    assert_eq!(stats.tiles_fetched, 1);
    assert_eq!(stats.handles_opened, 1);
}

#[test]
fn test_interrupted_fetch_leaves_no_file_and_retries() {
    let fixture = Fixture::new();
    let reader = fixture.reader();
    let c = Coordinate::new(134.125, 0.875);

    fixture.fail_tiles.store(true, Ordering::SeqCst);
    let err = reader.get_value_at(c).unwrap_err();
    assert!(matches!(err, DemError::Network { .. }), "{}", err);
    assert!(err.is_retryable());

    let final_path = fixture.cache.path().join("N00E134.tif");
    assert!(!final_path.exists());
    let leftovers: Vec<_> = fs::read_dir(fixture.cache.path())
        .unwrap()
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".download"))
        .collect();
    assert!(leftovers.is_empty());
    assert_eq!(reader.stats().tiles_fetched, 0);

    fixture.fail_tiles.store(false, Ordering::SeqCst);
    assert_close(reader.get_value_at(c).unwrap(), 100.0);
    assert!(final_path.exists());
    assert_eq!(fixture.tile_opens(), 2);
    assert_eq!(reader.stats().tiles_fetched, 1);
}

#[test]
fn test_missing_remote_tile_is_network_error() {
    let fixture = Fixture::new();
    fs::remove_file(fixture.mirror.path().join(TILE)).unwrap();
    let reader = fixture.reader();

    let result = reader.get_value_at(Coordinate::new(134.5, 0.5));
    assert!(matches!(result, Err(DemError::Network { .. })));
    assert!(reader.store().cached_tiles().is_empty());
}

#[test]
fn test_point_outside_tile_data() {
    let fixture = Fixture::new();
    let reader = fixture.reader();

    // Inside the manifest box of the wide tile, past the end of its data
    let result = reader.get_value_at(Coordinate::new(141.5, 0.5));
    assert!(matches!(result, Err(DemError::PointOutsideData { .. })));

    // The same tile still answers inside its data
    assert_close(reader.get_value_at(Coordinate::new(140.125, 0.875)).unwrap(), 100.0);
}

#[test]
fn test_close_is_idempotent_and_reopens_lazily() {
    let fixture = Fixture::new();
    let reader = fixture.reader();
    let c = Coordinate::new(134.5, 0.5);

    let before = reader.get_value_at(c).unwrap();
    reader.close();
    reader.close();

    let after = reader.get_value_at(c).unwrap();
    assert_eq!(before, after);

    let stats = reader.stats();
    assert_eq!(stats.handles_opened, 2);
    assert_eq!(stats.tiles_fetched, 1);
}

#[test]
fn test_existing_cache_is_reused_across_readers() {
    let fixture = Fixture::new();
    let c = Coordinate::new(134.5, 0.5);

    let first = fixture.reader();
    first.get_value_at(c).unwrap();
    first.close();

    let second = fixture.reader();
    second.get_value_at(c).unwrap();
    assert_eq!(second.stats().tiles_fetched, 0);
    assert_eq!(fixture.tile_opens(), 1);
}

#[test]
fn test_get_values_at_keeps_order() {
    let fixture = Fixture::new();
    let reader = fixture.reader();

    let values = reader
        .get_values_at(&[
            Coordinate::new(134.125, 0.875),
            Coordinate::new(0.0, 0.0),
            Coordinate::new(134.875, 0.125),
        ])
        .unwrap();
    assert_close(values[0], 100.0);
    assert!(values[1].is_nan());
    assert_close(values[2], 133.0);
}

#[test]
fn test_hgt_tiles_with_gzip() {
    const SAMPLES: usize = 1201;
    let mirror = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();

    let mut data = vec![0u8; SAMPLES * SAMPLES * 2];
    let centre = (600 * SAMPLES + 600) * 2;
    data[centre..centre + 2].copy_from_slice(&500i16.to_be_bytes());

    write_gzip(&mirror.path().join("N35E138.hgt.gz"), &data);
    write_gzip(
        &mirror.path().join(MANIFEST_NAME),
        b"N35E138.hgt.gz,138,35,139,36\n",
    );

    let reader = ReaderBuilder::new(mirror.path().to_str().unwrap())
        .cache_dir(cache.path())
        .build_with(HgtSource)
        .unwrap();

    assert_eq!(reader.get_value_at(Coordinate::new(138.5, 35.5)).unwrap(), 500.0);
    assert!(reader.get_value_at(Coordinate::new(10.0, 10.0)).unwrap().is_nan());
    assert!(TileCacheStore::new(cache.path())
        .unwrap()
        .is_cached("N35E138.hgt.gz"));
}
