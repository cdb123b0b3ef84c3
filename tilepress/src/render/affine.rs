//! 3x3 affine matrices for world to source-pixel mapping.

use crate::coord::{Corners, WorldPoint};

/// Row-major 3x3 affine transform.
///
/// The last row is always `[0, 0, 1]` for matrices built through this API.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine(pub [[f64; 3]; 3]);

impl Affine {
    pub const IDENTITY: Affine = Affine([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);

    pub fn scale(sx: f64, sy: f64) -> Self {
        Affine([[sx, 0.0, 0.0], [0.0, sy, 0.0], [0.0, 0.0, 1.0]])
    }

    pub fn translate(tx: f64, ty: f64) -> Self {
        Affine([[1.0, 0.0, tx], [0.0, 1.0, ty], [0.0, 0.0, 1.0]])
    }

    /// Matrix product `self * rhs` (apply `rhs` first).
    pub fn mul(&self, rhs: &Affine) -> Affine {
        let a = &self.0;
        let b = &rhs.0;
        let mut out = [[0.0; 3]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| a[i][k] * b[k][j]).sum();
            }
        }
        Affine(out)
    }

    /// Returns the inverse, or `None` if the matrix is singular.
    pub fn inverse(&self) -> Option<Affine> {
        let m = &self.0;
        let det = m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0]);
        if det.abs() < f64::EPSILON || !det.is_finite() {
            return None;
        }
        let inv_det = 1.0 / det;

        let mut out = [[0.0; 3]; 3];
        out[0][0] = (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det;
        out[0][1] = (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det;
        out[0][2] = (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det;
        out[1][0] = (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det;
        out[1][1] = (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det;
        out[1][2] = (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det;
        out[2][0] = (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det;
        out[2][1] = (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det;
        out[2][2] = (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det;
        Some(Affine(out))
    }

    /// Applies the transform to a point.
    pub fn apply(&self, p: WorldPoint) -> WorldPoint {
        let m = &self.0;
        WorldPoint {
            x: m[0][0] * p.x + m[0][1] * p.y + m[0][2],
            y: m[1][0] * p.x + m[1][1] * p.y + m[1][2],
        }
    }

    /// Builds the world to source-pixel transform for an overlay.
    ///
    /// The unit square is first mapped onto the placed parallelogram:
    /// `(u, v) -> top_left + u * (top_right - top_left) + v * (bottom_right - top_right)`.
    /// Inverting that and scaling by the image size yields pixel coordinates.
    /// Returns `None` when the corners are collinear or the image is empty.
    pub fn from_corners(corners: &Corners, width: u32, height: u32) -> Option<Affine> {
        if width == 0 || height == 0 {
            return None;
        }
        let tl = corners.top_left;
        let tr = corners.top_right;
        let br = corners.bottom_right;
        let placement = Affine([
            [tr.x - tl.x, br.x - tr.x, tl.x],
            [tr.y - tl.y, br.y - tr.y, tl.y],
            [0.0, 0.0, 1.0],
        ]);
        let to_unit = placement.inverse()?;
        Some(Affine::scale(width as f64, height as f64).mul(&to_unit))
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: WorldPoint, b: WorldPoint) -> bool {
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
    }

    #[test]
    fn test_inverse_of_identity() {
        assert_eq!(Affine::IDENTITY.inverse(), Some(Affine::IDENTITY));
    }

    #[test]
    fn test_inverse_roundtrip() {
        let m = Affine::translate(3.0, -2.0).mul(&Affine::scale(2.0, 4.0));
        let inv = m.inverse().unwrap();
        let p = WorldPoint::new(7.5, 1.25);
        assert!(close(inv.apply(m.apply(p)), p));
    }

    #[test]
    fn test_singular_matrix_has_no_inverse() {
        assert!(Affine::scale(0.0, 1.0).inverse().is_none());
    }

    #[test]
    fn test_from_corners_maps_corners_to_image_corners() {
        let corners = Corners::new(
            WorldPoint::new(10.0, 20.0),
            WorldPoint::new(14.0, 20.0),
            WorldPoint::new(14.0, 22.0),
        );
        let t = Affine::from_corners(&corners, 400, 200).unwrap();
        assert!(close(t.apply(corners.top_left), WorldPoint::new(0.0, 0.0)));
        assert!(close(t.apply(corners.top_right), WorldPoint::new(400.0, 0.0)));
        assert!(close(
            t.apply(corners.bottom_right),
            WorldPoint::new(400.0, 200.0)
        ));
        assert!(close(t.apply(corners.bottom_left()), WorldPoint::new(0.0, 200.0)));
    }

    #[test]
    fn test_from_corners_rejects_collinear() {
        let corners = Corners::new(
            WorldPoint::new(0.0, 0.0),
            WorldPoint::new(1.0, 1.0),
            WorldPoint::new(2.0, 2.0),
        );
        assert!(Affine::from_corners(&corners, 10, 10).is_none());
    }
}
