//! Tile rendering.
//!
//! A [`TileRenderer`] turns one tile of the pyramid into encoded pixel bytes.
//! Rendering is pure and synchronous; callers run it on the blocking pool
//! (`tokio::task::spawn_blocking`) so CPU work never stalls the runtime.
//!
//! ```text
//!   world point ──► Affine (world → source pixel) ──► bilinear sample ──► PNG
//! ```

mod affine;

pub use affine::Affine;

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

use crate::coord::{TileCoord, WorldPoint, TILE_SIZE};

/// Errors from tile rendering.
///
/// Rendering failures are never retried by the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Source image has no pixels
    #[error("source image is empty")]
    EmptySource,

    /// PNG encoding failed
    #[error("failed to encode tile {tile}: {message}")]
    Encode { tile: TileCoord, message: String },

    /// Renderer-specific failure
    #[error("render failed for tile {tile}: {message}")]
    Failed { tile: TileCoord, message: String },
}

/// Renders a single tile from a placed source image.
pub trait TileRenderer: Send + Sync + 'static {
    /// Renders `tile` and returns the encoded image bytes.
    ///
    /// # Arguments
    ///
    /// * `tile` - Pyramid coordinates of the tile
    /// * `transform` - World to source-pixel transform of the overlay
    /// * `source` - Decoded source image
    fn render(
        &self,
        tile: TileCoord,
        transform: &Affine,
        source: &RgbaImage,
    ) -> Result<Vec<u8>, RenderError>;
}

/// Reference renderer: bilinear sampling through the overlay transform.
///
/// Pixels outside the source image are transparent. Output is PNG.
#[derive(Debug, Clone)]
pub struct AffineRenderer {
    tile_size: u32,
}

impl AffineRenderer {
    pub fn new(tile_size: u32) -> Self {
        Self {
            tile_size: tile_size.max(1),
        }
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn sample(source: &RgbaImage, p: WorldPoint) -> Rgba<u8> {
        let (w, h) = source.dimensions();
        if p.x < 0.0 || p.y < 0.0 || p.x >= w as f64 || p.y >= h as f64 {
            return Rgba([0, 0, 0, 0]);
        }
        // Sample at pixel centres, clamped to the last row/column.
        let sx = (p.x - 0.5).clamp(0.0, (w - 1) as f64) as f32;
        let sy = (p.y - 0.5).clamp(0.0, (h - 1) as f64) as f32;
        image::imageops::interpolate_bilinear(source, sx, sy)
            .unwrap_or_else(|| *source.get_pixel(p.x as u32, p.y as u32))
    }
}

impl Default for AffineRenderer {
    fn default() -> Self {
        Self::new(TILE_SIZE)
    }
}

impl TileRenderer for AffineRenderer {
    fn render(
        &self,
        tile: TileCoord,
        transform: &Affine,
        source: &RgbaImage,
    ) -> Result<Vec<u8>, RenderError> {
        if source.width() == 0 || source.height() == 0 {
            return Err(RenderError::EmptySource);
        }

        let size = self.tile_size;
        let zoom_scale = 2.0_f64.powi(tile.zoom as i32);
        let units_per_pixel = TILE_SIZE as f64 / size as f64;
        let origin_x = tile.x as f64 * TILE_SIZE as f64;
        let origin_y = tile.y as f64 * TILE_SIZE as f64;

        let out = RgbaImage::from_fn(size, size, |i, j| {
            let world = WorldPoint::new(
                (origin_x + (i as f64 + 0.5) * units_per_pixel) / zoom_scale,
                (origin_y + (j as f64 + 0.5) * units_per_pixel) / zoom_scale,
            );
            Self::sample(source, transform.apply(world))
        });

        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(out)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| RenderError::Encode {
                tile,
                message: e.to_string(),
            })?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::Corners;

    fn red_source() -> RgbaImage {
        RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255]))
    }

    fn covering_corners() -> Corners {
        Corners::new(
            WorldPoint::new(0.0, 0.0),
            WorldPoint::new(256.0, 0.0),
            WorldPoint::new(256.0, 256.0),
        )
    }

    #[test]
    fn test_render_produces_png_of_tile_size() {
        let renderer = AffineRenderer::new(16);
        let source = red_source();
        let t = Affine::from_corners(&covering_corners(), 8, 8).unwrap();

        let bytes = renderer.render(TileCoord::new(0, 0, 0), &t, &source).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();

        assert_eq!(decoded.dimensions(), (16, 16));
        assert_eq!(*decoded.get_pixel(8, 8), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_render_outside_source_is_transparent() {
        let renderer = AffineRenderer::new(4);
        let source = red_source();
        let corners = Corners::new(
            WorldPoint::new(0.0, 0.0),
            WorldPoint::new(1.0, 0.0),
            WorldPoint::new(1.0, 1.0),
        );
        let t = Affine::from_corners(&corners, 8, 8).unwrap();

        // Tile (1,1) at zoom 1 covers world 128..256, far from the overlay.
        let bytes = renderer.render(TileCoord::new(1, 1, 1), &t, &source).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();

        assert!(decoded.pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn test_render_rejects_empty_source() {
        let renderer = AffineRenderer::default();
        let result = renderer.render(
            TileCoord::new(0, 0, 0),
            &Affine::IDENTITY,
            &RgbaImage::new(0, 0),
        );
        assert!(matches!(result, Err(RenderError::EmptySource)));
    }
}
