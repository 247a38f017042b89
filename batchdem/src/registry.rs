//! Spatial index from coordinates to tile identifiers.
//!
//! The registry is built once from the tile manifest and is read-only
//! afterwards, so queries need no synchronization.
//!
//! # Manifest Format
//!
//! One tile per line, comma separated:
//!
//! ```text
//! # identifier,min_x,min_y,max_x,max_y
//! N00E134.tif.bz2,134.0,0.0,135.0,1.0
//! ```
//!
//! - Lines starting with `#` are comments.
//! - Fields after the fifth are ignored.
//! - Lines with fewer than five fields, or with unparsable or non-finite
//!   bounds (`NaN`, `inf`), are skipped.

use std::io::BufRead;

use rstar::{RTree, RTreeObject, AABB};

use crate::error::{DemError, Result};
use crate::geometry::{BoundingBox, Coordinate};

/// Amount every manifest box is grown by on each side, so that points
/// lying exactly on a tile edge still match despite float rounding.
pub const TOLERANCE: f64 = 0.000001;

/// A single indexed tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileEntry {
    /// Bounding box, already expanded by [`TOLERANCE`].
    pub envelope: BoundingBox,
    /// Tile identifier (remote file name).
    pub identifier: String,
}

impl RTreeObject for TileEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.envelope.min_x, self.envelope.min_y],
            [self.envelope.max_x, self.envelope.max_y],
        )
    }
}

/// Immutable R-tree over all manifest entries.
///
/// # Overlapping tiles
///
/// Adjacent tiles share an edge and therefore overlap after the tolerance
/// expansion. When several boxes contain a point, [`TileRegistry::lookup`]
/// returns the first one met in the tree's traversal order. That order is
/// not the manifest order and callers must not rely on which of the
/// overlapping tiles is chosen.
pub struct TileRegistry {
    tree: RTree<TileEntry>,
}

impl TileRegistry {
    /// Parse a manifest and bulk-load the index.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::ManifestFormat`] if no line yields a usable
    /// entry, and [`DemError::Io`] if the stream cannot be read.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut entries = Vec::new();
        let mut skipped = 0usize;

        for line in reader.lines() {
            let line = line?;
            if line.starts_with('#') {
                continue;
            }
            match parse_line(&line) {
                Some(entry) => entries.push(entry),
                None => skipped += 1,
            }
        }

        if entries.is_empty() {
            return Err(DemError::ManifestFormat {
                reason: format!("no usable entries ({} lines skipped)", skipped),
            });
        }

        tracing::debug!(entries = entries.len(), skipped, "parsed tile manifest");
        Ok(Self::from_entries(entries))
    }

    /// Build the index from entries whose envelopes are already expanded.
    pub fn from_entries(entries: Vec<TileEntry>) -> Self {
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Find the identifier of a tile covering `c`.
    ///
    /// Returns `None` when no tile covers the coordinate. Among
    /// overlapping tiles the first match wins (see the type docs).
    pub fn lookup(&self, c: Coordinate) -> Option<&str> {
        let point = AABB::from_point([c.x, c.y]);
        self.tree
            .locate_in_envelope_intersecting(&point)
            .find(|entry| entry.envelope.contains(c))
            .map(|entry| entry.identifier.as_str())
    }

    /// Number of indexed tiles.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Iterate over all entries in unspecified order.
    pub fn entries(&self) -> impl Iterator<Item = &TileEntry> {
        self.tree.iter()
    }
}

/// Parse one non-comment manifest line.
fn parse_line(line: &str) -> Option<TileEntry> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() < 5 || parts[0].is_empty() {
        return None;
    }

    let min_x: f64 = parts[1].parse().ok()?;
    let min_y: f64 = parts[2].parse().ok()?;
    let max_x: f64 = parts[3].parse().ok()?;
    let max_y: f64 = parts[4].parse().ok()?;
    if ![min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite()) {
        return None;
    }

    Some(TileEntry {
        envelope: BoundingBox::new(min_x, min_y, max_x, max_y).expand(TOLERANCE),
        identifier: parts[0].to_string(),
    })
}
