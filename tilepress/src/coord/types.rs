//! Coordinate type definitions

use std::fmt;
use std::str::FromStr;

/// Edge length of a rendered tile, in pixels.
pub const TILE_SIZE: u32 = 256;

/// Deepest zoom level a pyramid may request.
pub const MAX_ZOOM: u8 = 21;

/// Tile coordinates in the pyramid.
///
/// Field order matters: the derived `Ord` sorts by zoom, then x, then y,
/// which is the order tiles are written into the download archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    /// Zoom level
    pub zoom: u8,
    /// Column (west to east)
    pub x: u32,
    /// Row (north to south)
    pub y: u32,
}

impl TileCoord {
    /// Creates a tile coordinate.
    pub fn new(x: u32, y: u32, zoom: u8) -> Self {
        Self { zoom, x, y }
    }

    /// Returns the identifier used in progress notifications (`"x,y,zoom"`).
    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.zoom)
    }
}

impl FromStr for TileCoord {
    type Err = CoordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 3 {
            return Err(CoordError::InvalidTileId(s.to_string()));
        }
        let parse = |v: &str| v.trim().parse::<u32>();
        match (parse(parts[0]), parse(parts[1]), parts[2].trim().parse::<u8>()) {
            (Ok(x), Ok(y), Ok(zoom)) => Ok(Self::new(x, y, zoom)),
            _ => Err(CoordError::InvalidTileId(s.to_string())),
        }
    }
}

/// A point in world units (zoom-0 pixel space, 256 units across).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldPoint {
    pub x: f64,
    pub y: f64,
}

impl WorldPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for WorldPoint {
    /// Formats as `"x, y"` with six decimals, the form embedded in the
    /// archive index document.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.x, self.y)
    }
}

impl FromStr for WorldPoint {
    type Err = CoordError;

    /// Parses a comma separated pair such as `"12.5,40.25"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 2 {
            return Err(CoordError::InvalidPoint(s.to_string()));
        }
        let x = parts[0]
            .trim()
            .parse::<f64>()
            .map_err(|_| CoordError::InvalidPoint(s.to_string()))?;
        let y = parts[1]
            .trim()
            .parse::<f64>()
            .map_err(|_| CoordError::InvalidPoint(s.to_string()))?;
        if !x.is_finite() || !y.is_finite() {
            return Err(CoordError::InvalidPoint(s.to_string()));
        }
        Ok(Self { x, y })
    }
}

/// Placement of an overlay image in world units.
///
/// Only three corners are stored. The quad is assumed to be a parallelogram,
/// so the bottom-left corner is always derived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corners {
    pub top_left: WorldPoint,
    pub top_right: WorldPoint,
    pub bottom_right: WorldPoint,
}

impl Corners {
    pub fn new(top_left: WorldPoint, top_right: WorldPoint, bottom_right: WorldPoint) -> Self {
        Self {
            top_left,
            top_right,
            bottom_right,
        }
    }

    /// `top_left + bottom_right - top_right`.
    pub fn bottom_left(&self) -> WorldPoint {
        WorldPoint {
            x: self.top_left.x + self.bottom_right.x - self.top_right.x,
            y: self.top_left.y + self.bottom_right.y - self.top_right.y,
        }
    }

    /// All four corners, clockwise from top-left.
    pub fn all(&self) -> [WorldPoint; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left(),
        ]
    }

    /// Axis-aligned bounds as `(min, max)`.
    pub fn bounds(&self) -> (WorldPoint, WorldPoint) {
        let pts = self.all();
        let mut min = pts[0];
        let mut max = pts[0];
        for p in &pts[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        (min, max)
    }
}

/// Errors that can occur while parsing or validating coordinates.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoordError {
    /// Point is not two comma separated finite numbers
    #[error("point needs to be two numbers, comma-separated: '{0}'")]
    InvalidPoint(String),
    /// Tile identifier is not `x,y,zoom`
    #[error("invalid tile identifier: '{0}'")]
    InvalidTileId(String),
    /// Zoom range is inverted or exceeds the maximum
    #[error("invalid zoom range {min}..={max} (maximum zoom is {MAX_ZOOM})")]
    InvalidZoomRange { min: u8, max: u8 },
}
