//! Coordinates and axis-aligned bounding boxes.
//!
//! Coordinates are passed through to the raster source unchanged. The
//! shipped raster sources interpret `x` as longitude and `y` as latitude.

/// A point in the tile set's coordinate space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    /// Create a new coordinate.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle with inclusive bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    ///
    /// # Arguments
    ///
    /// * `min_x` - Western boundary
    /// * `min_y` - Southern boundary
    /// * `max_x` - Eastern boundary
    /// * `max_y` - Northern boundary
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Grow the box by `tolerance` on every side.
    pub fn expand(&self, tolerance: f64) -> Self {
        Self {
            min_x: self.min_x - tolerance,
            min_y: self.min_y - tolerance,
            max_x: self.max_x + tolerance,
            max_y: self.max_y + tolerance,
        }
    }

    /// Check whether the coordinate lies inside the box, edges included.
    pub fn contains(&self, c: Coordinate) -> bool {
        c.x >= self.min_x && c.x <= self.max_x && c.y >= self.min_y && c.y <= self.max_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_edges() {
        let bbox = BoundingBox::new(10.0, 20.0, 11.0, 21.0);
        assert!(bbox.contains(Coordinate::new(10.5, 20.5)));
        assert!(bbox.contains(Coordinate::new(10.0, 20.0)));
        assert!(bbox.contains(Coordinate::new(11.0, 21.0)));
        assert!(!bbox.contains(Coordinate::new(9.9, 20.5)));
        assert!(!bbox.contains(Coordinate::new(10.5, 21.1)));
    }

    #[test]
    fn test_expand_is_symmetric() {
        let bbox = BoundingBox::new(10.0, 20.0, 11.0, 21.0).expand(0.5);
        assert_eq!(bbox, BoundingBox::new(9.5, 19.5, 11.5, 21.5));
        assert_eq!(bbox.width(), 2.0);
        assert_eq!(bbox.height(), 2.0);
    }
}
