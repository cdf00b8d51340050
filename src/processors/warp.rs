//! Perspective resampling of a scan into a template's pixel grid.

use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use nalgebra::Matrix3;

/// Background intensity used where the warped scan does not cover the
/// template grid (blank paper).
const BACKGROUND: Luma<u8> = Luma([255u8]);

/// Resamples `scan` into a raster of `(width, height)` (the template's
/// dimensions) through the scan→template homography `h`.
///
/// Returns `None` when the transform cannot be expressed as an invertible
/// projection; callers treat that as a rejected alignment.
pub fn warp_to_template(scan: &GrayImage, h: &Matrix3<f64>, width: u32, height: u32) -> Option<GrayImage> {
    let matrix = [
        h[(0, 0)] as f32,
        h[(0, 1)] as f32,
        h[(0, 2)] as f32,
        h[(1, 0)] as f32,
        h[(1, 1)] as f32,
        h[(1, 2)] as f32,
        h[(2, 0)] as f32,
        h[(2, 1)] as f32,
        h[(2, 2)] as f32,
    ];
    if matrix.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let projection = Projection::from_matrix(matrix)?;
    let mut aligned = GrayImage::new(width, height);
    warp_into(scan, &projection, Interpolation::Bilinear, BACKGROUND, &mut aligned);
    Some(aligned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_warp_preserves_pixels() {
        let sheet = crate::test_utils::synthetic_sheet(120, 80);
        let aligned = warp_to_template(&sheet, &Matrix3::identity(), 120, 80).unwrap();
        assert_eq!(aligned.dimensions(), (120, 80));
        assert_eq!(aligned.get_pixel(20, 20), sheet.get_pixel(20, 20));
        assert_eq!(aligned.get_pixel(77, 41), sheet.get_pixel(77, 41));
    }

    #[test]
    fn translation_warp_shifts_content() {
        let sheet = crate::test_utils::synthetic_sheet(120, 120);
        // Scan→template shift of (+10, +6).
        let h = Matrix3::new(1.0, 0.0, 10.0, 0.0, 1.0, 6.0, 0.0, 0.0, 1.0);
        let aligned = warp_to_template(&sheet, &h, 120, 120).unwrap();
        assert_eq!(aligned.get_pixel(30, 30), sheet.get_pixel(20, 24));
    }

    #[test]
    fn singular_transform_is_rejected() {
        let sheet = crate::test_utils::synthetic_sheet(60, 60);
        let h = Matrix3::zeros();
        assert!(warp_to_template(&sheet, &h, 60, 60).is_none());
    }

    #[test]
    fn output_takes_template_dimensions() {
        let sheet = crate::test_utils::synthetic_sheet(100, 100);
        let aligned = warp_to_template(&sheet, &Matrix3::identity(), 64, 48).unwrap();
        assert_eq!(aligned.dimensions(), (64, 48));
    }
}
