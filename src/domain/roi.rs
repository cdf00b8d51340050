//! Regions of interest in template coordinate space.

use serde::{Deserialize, Serialize};

/// A rectangular area in template coordinates expected to contain one
/// answer.
///
/// Defined once per template layout and reused for every scan aligned to
/// that template. Coordinates are template-space: regions are extracted
/// from the already-aligned raster, never from the raw scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionOfInterest {
    /// The question label this region answers (e.g. "Q1").
    pub label: String,
    /// Left edge, template pixels.
    pub x: u32,
    /// Top edge, template pixels.
    pub y: u32,
    /// Region width, template pixels.
    pub width: u32,
    /// Region height, template pixels.
    pub height: u32,
}

impl RegionOfInterest {
    /// Creates a region of interest.
    pub fn new(label: impl Into<String>, x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            x,
            y,
            width,
            height,
        }
    }

    /// Returns the region clamped to the given raster dimensions.
    ///
    /// Regions near the template edge can overhang the raster by a pixel
    /// or two after integer rounding; clamping keeps extraction in bounds.
    pub fn clamped(&self, image_width: u32, image_height: u32) -> Self {
        let x = self.x.min(image_width.saturating_sub(1));
        let y = self.y.min(image_height.saturating_sub(1));
        Self {
            label: self.label.clone(),
            x,
            y,
            width: self.width.min(image_width - x),
            height: self.height.min(image_height - y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamped_keeps_in_bounds_regions_unchanged() {
        let roi = RegionOfInterest::new("Q1", 10, 20, 30, 40);
        assert_eq!(roi.clamped(100, 100), roi);
    }

    #[test]
    fn clamped_shrinks_overhanging_regions() {
        let roi = RegionOfInterest::new("Q7", 90, 95, 30, 40);
        let clamped = roi.clamped(100, 100);
        assert_eq!(clamped.x, 90);
        assert_eq!(clamped.width, 10);
        assert_eq!(clamped.height, 5);
    }

    #[test]
    fn serde_round_trip() {
        let roi = RegionOfInterest::new("Q2", 1452, 1101, 48, 96);
        let json = serde_json::to_string(&roi).unwrap();
        let back: RegionOfInterest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, roi);
    }
}
