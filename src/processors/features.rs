//! Scale/rotation-invariant feature detection and descriptor matching.
//!
//! Implements the feature half of registration: FAST-9 corner detection
//! over a small image pyramid, intensity-centroid orientation, rotated
//! 256-bit binary descriptors, and brute-force Hamming matching with a
//! mutual cross-check. The retained correspondence set is the
//! best-distance prefix of the accepted matches; its size doubles as the
//! alignment confidence score downstream.

use std::cmp::Ordering;
use std::collections::HashSet;

use image::GrayImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::constants::{DEFAULT_GOOD_MATCH_FRACTION, DEFAULT_MAX_KEYPOINTS};

/// Configuration for feature detection and matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureMatcherConfig {
    /// Cap on keypoints kept per image across all pyramid levels.
    #[serde(default = "FeatureMatcherConfig::default_max_keypoints")]
    pub max_keypoints: usize,

    /// FAST intensity threshold.
    #[serde(default = "FeatureMatcherConfig::default_fast_threshold")]
    pub fast_threshold: u8,

    /// Number of pyramid levels searched for scale invariance.
    #[serde(default = "FeatureMatcherConfig::default_pyramid_levels")]
    pub pyramid_levels: u8,

    /// Downscale factor between consecutive pyramid levels.
    #[serde(default = "FeatureMatcherConfig::default_scale_factor")]
    pub scale_factor: f32,

    /// Fraction of accepted matches retained for geometric fitting.
    #[serde(default = "FeatureMatcherConfig::default_good_match_fraction")]
    pub good_match_fraction: f32,
}

impl FeatureMatcherConfig {
    fn default_max_keypoints() -> usize {
        DEFAULT_MAX_KEYPOINTS
    }

    fn default_fast_threshold() -> u8 {
        20
    }

    fn default_pyramid_levels() -> u8 {
        4
    }

    fn default_scale_factor() -> f32 {
        1.2
    }

    fn default_good_match_fraction() -> f32 {
        DEFAULT_GOOD_MATCH_FRACTION
    }

    /// Sets the keypoint cap.
    pub fn with_max_keypoints(mut self, max_keypoints: usize) -> Self {
        self.max_keypoints = max_keypoints;
        self
    }

    /// Sets the number of pyramid levels.
    pub fn with_pyramid_levels(mut self, levels: u8) -> Self {
        self.pyramid_levels = levels;
        self
    }

    /// Sets the retained good-match fraction.
    pub fn with_good_match_fraction(mut self, fraction: f32) -> Self {
        self.good_match_fraction = fraction;
        self
    }
}

impl Default for FeatureMatcherConfig {
    fn default() -> Self {
        Self {
            max_keypoints: Self::default_max_keypoints(),
            fast_threshold: Self::default_fast_threshold(),
            pyramid_levels: Self::default_pyramid_levels(),
            scale_factor: Self::default_scale_factor(),
            good_match_fraction: Self::default_good_match_fraction(),
        }
    }
}

/// One detected keypoint with its binary descriptor, in base-image
/// coordinates.
#[derive(Debug, Clone)]
pub struct Feature {
    /// X-coordinate in the base image.
    pub x: f32,
    /// Y-coordinate in the base image.
    pub y: f32,
    /// Corner response used for ranking.
    pub response: f32,
    /// 256-bit binary descriptor.
    pub descriptor: [u8; 32],
}

/// One accepted correspondence between a template keypoint and a scan
/// keypoint.
#[derive(Debug, Clone, Copy)]
pub struct Correspondence {
    /// Keypoint location in the template image.
    pub template: [f64; 2],
    /// Keypoint location in the scan image.
    pub scan: [f64; 2],
    /// Hamming distance between the two descriptors.
    pub distance: u32,
}

/// The retained good matches for one (template, scan) pair, sorted
/// ascending by descriptor distance.
#[derive(Debug, Clone, Default)]
pub struct CorrespondenceSet {
    /// The retained correspondences.
    pub matches: Vec<Correspondence>,
}

impl CorrespondenceSet {
    /// Number of retained good matches; this is the alignment confidence.
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// Returns true when no good matches were retained.
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Scan-side points, in match order.
    pub fn scan_points(&self) -> Vec<[f64; 2]> {
        self.matches.iter().map(|m| m.scan).collect()
    }

    /// Template-side points, in match order.
    pub fn template_points(&self) -> Vec<[f64; 2]> {
        self.matches.iter().map(|m| m.template).collect()
    }
}

/// Detects keypoints in a template/scan pair and returns the retained
/// correspondence set.
#[derive(Debug, Clone, Default)]
pub struct FeatureMatcher {
    config: FeatureMatcherConfig,
}

impl FeatureMatcher {
    /// Creates a matcher with the given configuration.
    pub fn new(config: FeatureMatcherConfig) -> Self {
        Self { config }
    }

    /// Detects keypoints independently in both images, matches their
    /// descriptors with a mutual cross-check, and returns the
    /// best-distance prefix of the accepted matches.
    ///
    /// Returns an empty set when either image yields no usable keypoints
    /// or no match survives the cross-check. Callers treat that as total
    /// alignment failure for the pair, not as a retryable error.
    pub fn detect_and_match(&self, template: &GrayImage, scan: &GrayImage) -> CorrespondenceSet {
        let template_features = self.detect(template);
        let scan_features = self.detect(scan);
        if template_features.is_empty() || scan_features.is_empty() {
            return CorrespondenceSet::default();
        }

        let mut matches = cross_checked_matches(&template_features, &scan_features);

        // Ascending by distance; ties broken by template index order so
        // the retained prefix is reproducible.
        matches.sort_by(|a, b| a.2.cmp(&b.2).then(a.0.cmp(&b.0)));

        let retained = (matches.len() as f32 * self.config.good_match_fraction) as usize;
        matches.truncate(retained);

        CorrespondenceSet {
            matches: matches
                .into_iter()
                .map(|(ti, si, distance)| Correspondence {
                    template: [
                        template_features[ti].x as f64,
                        template_features[ti].y as f64,
                    ],
                    scan: [scan_features[si].x as f64, scan_features[si].y as f64],
                    distance,
                })
                .collect(),
        }
    }

    /// Detects up to `max_keypoints` oriented, described keypoints across
    /// the image pyramid.
    pub fn detect(&self, image: &GrayImage) -> Vec<Feature> {
        let mut features = Vec::new();
        let mut current = image.clone();
        let mut scale = 1.0f32;

        for _ in 0..self.config.pyramid_levels.max(1) {
            features.extend(self.detect_single_scale(&current, scale));

            let next_w = (current.width() as f32 / self.config.scale_factor) as u32;
            let next_h = (current.height() as f32 / self.config.scale_factor) as u32;
            if next_w < 32 || next_h < 32 {
                break;
            }
            scale *= self.config.scale_factor;
            current = image::imageops::resize(
                &current,
                next_w,
                next_h,
                image::imageops::FilterType::Gaussian,
            );
        }

        // Rank across scales and keep the strongest responses. The sort is
        // tie-broken by position so ranking stays deterministic.
        features.sort_by(|a, b| {
            b.response
                .partial_cmp(&a.response)
                .unwrap_or(Ordering::Equal)
                .then_with(|| (a.y, a.x).partial_cmp(&(b.y, b.x)).unwrap_or(Ordering::Equal))
        });
        features.truncate(self.config.max_keypoints);
        features
    }

    fn detect_single_scale(&self, image: &GrayImage, scale: f32) -> Vec<Feature> {
        let corners = self.detect_fast_corners(image);
        let corners = non_maximum_suppression(corners, self.config.max_keypoints);

        corners
            .par_iter()
            .map(|corner| {
                let angle = intensity_centroid_angle(image, corner.x, corner.y);
                let descriptor = rotated_brief_descriptor(image, corner.x, corner.y, angle);
                Feature {
                    x: corner.x as f32 * scale,
                    y: corner.y as f32 * scale,
                    response: corner.response,
                    descriptor,
                }
            })
            .collect()
    }

    fn detect_fast_corners(&self, image: &GrayImage) -> Vec<Corner> {
        let (width, height) = image.dimensions();
        if width < 7 || height < 7 {
            return Vec::new();
        }
        let threshold = self.config.fast_threshold;

        (3..height - 3)
            .into_par_iter()
            .flat_map_iter(|y| {
                (3..width - 3).filter_map(move |x| {
                    let center = image.get_pixel(x, y)[0];
                    if !fast_pre_check(image, x, y, center, threshold) {
                        return None;
                    }
                    if !is_fast_corner(image, x, y, center, threshold) {
                        return None;
                    }
                    Some(Corner {
                        x,
                        y,
                        response: corner_response(image, x, y),
                    })
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct Corner {
    x: u32,
    y: u32,
    response: f32,
}

/// Offsets of the 16-pixel Bresenham circle of radius 3 used by FAST.
const FAST_RING: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Cheap cardinal-point rejection before the full segment test.
fn fast_pre_check(image: &GrayImage, x: u32, y: u32, center: u8, threshold: u8) -> bool {
    let bright = center.saturating_add(threshold);
    let dark = center.saturating_sub(threshold);

    let cardinals = [
        image.get_pixel(x, y - 3)[0],
        image.get_pixel(x + 3, y)[0],
        image.get_pixel(x, y + 3)[0],
        image.get_pixel(x - 3, y)[0],
    ];

    let brighter = cardinals.iter().filter(|&&p| p > bright).count();
    let darker = cardinals.iter().filter(|&&p| p < dark).count();
    brighter >= 3 || darker >= 3
}

/// Full FAST-9 segment test: 9 contiguous ring pixels all brighter or all
/// darker than the center by the threshold.
fn is_fast_corner(image: &GrayImage, x: u32, y: u32, center: u8, threshold: u8) -> bool {
    let bright = center.saturating_add(threshold);
    let dark = center.saturating_sub(threshold);

    let mut run_bright = 0u32;
    let mut run_dark = 0u32;
    let mut max_bright = 0u32;
    let mut max_dark = 0u32;

    // The ring is walked twice to handle runs that wrap around.
    for i in 0..FAST_RING.len() * 2 {
        let (dx, dy) = FAST_RING[i % FAST_RING.len()];
        let px = (x as i32 + dx) as u32;
        let py = (y as i32 + dy) as u32;
        let value = image.get_pixel(px, py)[0];

        if value > bright {
            run_bright += 1;
            run_dark = 0;
            max_bright = max_bright.max(run_bright);
        } else if value < dark {
            run_dark += 1;
            run_bright = 0;
            max_dark = max_dark.max(run_dark);
        } else {
            run_bright = 0;
            run_dark = 0;
        }
    }

    max_bright >= 9 || max_dark >= 9
}

/// Local intensity variance, used to rank corner strength.
fn corner_response(image: &GrayImage, x: u32, y: u32) -> f32 {
    let mut sum = 0.0f32;
    let mut sum_sq = 0.0f32;
    let mut count = 0u32;

    for dy in -2i32..=2 {
        for dx in -2i32..=2 {
            let px = x as i32 + dx;
            let py = y as i32 + dy;
            if px >= 0 && py >= 0 && (px as u32) < image.width() && (py as u32) < image.height() {
                let v = image.get_pixel(px as u32, py as u32)[0] as f32;
                sum += v;
                sum_sq += v * v;
                count += 1;
            }
        }
    }

    let mean = sum / count as f32;
    ((sum_sq / count as f32) - mean * mean).max(0.0).sqrt()
}

/// Grid-based non-maximum suppression: strongest corner wins a 5 px cell,
/// neighbors of an occupied cell are suppressed.
fn non_maximum_suppression(mut corners: Vec<Corner>, cap: usize) -> Vec<Corner> {
    if corners.is_empty() {
        return corners;
    }

    corners.sort_by(|a, b| {
        b.response
            .partial_cmp(&a.response)
            .unwrap_or(Ordering::Equal)
            .then_with(|| (a.y, a.x).cmp(&(b.y, b.x)))
    });

    const CELL: f32 = 5.0;
    let mut occupied: HashSet<(i32, i32)> = HashSet::new();
    let mut kept = Vec::new();

    'corners: for corner in corners {
        let gx = (corner.x as f32 / CELL) as i32;
        let gy = (corner.y as f32 / CELL) as i32;
        for dy in -1..=1 {
            for dx in -1..=1 {
                if occupied.contains(&(gx + dx, gy + dy)) {
                    continue 'corners;
                }
            }
        }
        occupied.insert((gx, gy));
        kept.push(corner);
        if kept.len() >= cap {
            break;
        }
    }

    kept
}

/// Orientation by intensity centroid over a radius-15 disc.
fn intensity_centroid_angle(image: &GrayImage, x: u32, y: u32) -> f32 {
    const RADIUS: i32 = 15;
    let mut m01 = 0.0f32;
    let mut m10 = 0.0f32;

    for dy in -RADIUS..=RADIUS {
        for dx in -RADIUS..=RADIUS {
            if dx * dx + dy * dy > RADIUS * RADIUS {
                continue;
            }
            let px = x as i32 + dx;
            let py = y as i32 + dy;
            if px >= 0 && py >= 0 && (px as u32) < image.width() && (py as u32) < image.height() {
                let v = image.get_pixel(px as u32, py as u32)[0] as f32;
                m01 += v * dy as f32;
                m10 += v * dx as f32;
            }
        }
    }

    m01.atan2(m10)
}

/// Builds the 256-bit descriptor by running the binary test pattern,
/// rotated to the keypoint orientation, and packing the results.
fn rotated_brief_descriptor(image: &GrayImage, x: u32, y: u32, angle: f32) -> [u8; 32] {
    let mut descriptor = [0u8; 32];
    let (sin_a, cos_a) = angle.sin_cos();
    let cx = x as i32;
    let cy = y as i32;
    let max_x = image.width() as i32 - 1;
    let max_y = image.height() as i32 - 1;

    let sample = |dx: i8, dy: i8| -> u8 {
        let rx = (dx as f32 * cos_a - dy as f32 * sin_a) as i32;
        let ry = (dx as f32 * sin_a + dy as f32 * cos_a) as i32;
        let px = (cx + rx).clamp(0, max_x) as u32;
        let py = (cy + ry).clamp(0, max_y) as u32;
        image.get_pixel(px, py)[0]
    };

    for (byte_idx, tests) in BRIEF_PATTERN.chunks(8).enumerate() {
        let mut byte = 0u8;
        for (bit, &(ax, ay, bx, by)) in tests.iter().enumerate() {
            if sample(ax, ay) < sample(bx, by) {
                byte |= 1 << bit;
            }
        }
        descriptor[byte_idx] = byte;
    }

    descriptor
}

/// Hamming distance between two 256-bit descriptors.
pub fn hamming_distance(a: &[u8; 32], b: &[u8; 32]) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// One-to-one matching with a mutual cross-check: a pair `(i, j)` is
/// accepted only when `j` is template-keypoint `i`'s best scan match and
/// `i` is scan-keypoint `j`'s best template match. No ratio test.
fn cross_checked_matches(
    template_features: &[Feature],
    scan_features: &[Feature],
) -> Vec<(usize, usize, u32)> {
    let best_scan_for_template: Vec<(usize, u32)> = template_features
        .par_iter()
        .map(|feature| nearest(&feature.descriptor, scan_features))
        .collect();

    let best_template_for_scan: Vec<(usize, u32)> = scan_features
        .par_iter()
        .map(|feature| nearest(&feature.descriptor, template_features))
        .collect();

    best_scan_for_template
        .iter()
        .enumerate()
        .filter_map(|(ti, &(si, distance))| {
            (best_template_for_scan[si].0 == ti).then_some((ti, si, distance))
        })
        .collect()
}

/// Index and distance of the nearest descriptor; first minimum wins so the
/// result is order-stable for equal distances.
fn nearest(descriptor: &[u8; 32], candidates: &[Feature]) -> (usize, u32) {
    let mut best_idx = 0usize;
    let mut best_distance = u32::MAX;
    for (idx, candidate) in candidates.iter().enumerate() {
        let distance = hamming_distance(descriptor, &candidate.descriptor);
        if distance < best_distance {
            best_distance = distance;
            best_idx = idx;
        }
    }
    (best_idx, best_distance)
}

/// The 256 binary intensity tests of the descriptor, as
/// (x1, y1, x2, y2) offsets from the keypoint. Standard learned ORB
/// pattern.
const BRIEF_PATTERN: [(i8, i8, i8, i8); 256] = [
    (8, -3, 9, 5), (-11, 9, -8, 2), (3, -12, -13, 2), (-3, -7, -4, 5),
    (1, -11, 12, -2), (1, -1, 11, -1), (4, -2, -5, -8), (2, -13, -8, 9),
    (-11, 1, 6, 2), (11, 11, 12, -1), (6, -12, -9, -8), (12, 5, 3, -6),
    (1, 1, -4, -1), (7, -4, -6, 7), (-3, 2, 9, -8), (-4, -8, 3, 3),
    (-5, 3, 0, -4), (2, -11, -13, 0), (10, 5, 5, 2), (0, 9, 10, -3),
    (5, -8, -10, 1), (8, 3, -8, -5), (2, -6, -9, -4), (-12, 2, 0, -10),
    (5, -10, -7, -2), (-7, 9, -1, 0), (0, -1, -3, 3), (-12, 5, -2, -1),
    (-1, 1, -5, -11), (-1, 2, -3, 0), (-5, -6, 7, -1), (4, 7, 0, -8),
    (-9, 9, 3, -13), (7, -3, 13, -7), (10, -4, -5, 3), (6, 1, -13, -13),
    (-12, -11, 7, 0), (0, -1, -8, -6), (-10, -5, -6, 7), (10, 2, -6, -12),
    (-11, 8, 4, -2), (9, 0, -11, -4), (0, 11, 6, -11), (4, 1, -10, -3),
    (-6, 12, 1, 12), (-4, -8, 8, -7), (-3, 0, 8, 3), (3, 3, -3, -1),
    (-6, -11, -2, 12), (0, -3, -6, -3), (-6, 3, -12, -8), (6, 3, -2, -10),
    (-3, -10, -1, 0), (11, 2, 11, 3), (1, -8, -10, 8), (2, -2, -7, 8),
    (0, -13, 13, 0), (6, -9, -1, -1), (7, 5, 6, 3), (-13, 7, -7, -7),
    (-5, -13, 5, -11), (6, 7, -2, 12), (-6, -11, 8, 6), (-2, -2, -5, 9),
    (5, 4, 7, -6), (0, 11, -4, -5), (10, 1, 2, -8), (-3, -10, -10, -10),
    (1, 9, 6, -5), (-7, -11, 11, 3), (11, -2, -4, 3), (7, -1, 5, 12),
    (-5, 5, -2, -5), (8, -11, -1, -13), (-13, 2, -11, -8), (-2, 9, 5, 0),
    (2, -5, 2, 0), (3, -13, -12, 9), (6, -3, 5, 4), (10, 10, 1, -9),
    (-13, -8, -4, 10), (2, -2, -3, 8), (-13, -11, -8, -3), (2, -4, -7, -3),
    (12, 0, -2, 13), (-11, 7, -10, -1), (-5, -10, 0, -11), (6, 7, 12, -3),
    (-1, -1, 8, -6), (-6, 3, -1, -3), (-2, -11, -11, -3), (12, -2, 3, -10),
    (-11, -1, -2, -8), (3, -1, 7, 3), (2, -2, -12, 12), (6, -4, 12, -2),
    (-3, 11, 2, -12), (-1, 3, 2, 3), (1, 3, -11, -3), (2, -8, -7, -5),
    (0, -5, -11, -6), (-12, 8, -2, 9), (3, -7, 9, -8), (-10, -6, -1, -11),
    (11, -6, -3, -13), (3, 0, 0, -8), (-5, -2, -1, -13), (-8, -5, -10, -13),
    (7, -13, 0, -3), (1, -4, -1, -13), (6, -5, -7, 8), (8, 7, -5, -13),
    (2, 0, -8, -6), (-8, -3, -13, -6), (-6, 5, 0, 6), (-8, 8, -9, 1),
    (10, 1, -9, 4), (-4, -8, -5, 7), (7, 7, 10, -8), (-7, -3, -1, 1),
    (10, -1, 3, 1), (5, 6, -10, -8), (-6, -13, 5, -8), (4, -3, -4, -13),
    (-3, 4, -2, -13), (10, -11, 9, 11), (-9, 0, 12, 2), (-4, -2, 13, -6),
    (2, -10, -6, 1), (11, -13, 4, -13), (1, -1, 1, 9), (1, -5, -13, -5),
    (7, 4, 12, -7), (0, -2, -8, 3), (7, 2, 2, -8), (-2, 7, -12, -4),
    (1, 11, 6, -2), (-1, -1, -4, 10), (0, 8, 0, -13), (3, 12, 5, -13),
    (-9, -1, 9, -13), (12, 4, -6, -4), (-13, 13, 1, -4), (0, -2, -7, -9),
    (10, -8, -13, 3), (2, -13, 6, 8), (10, -6, -7, 0), (-11, 7, -1, -7),
    (12, 0, 5, -4), (-7, -8, 4, -12), (-13, 5, -5, -2), (0, 5, 4, 4),
    (-2, -11, -1, 8), (9, 3, -1, -12), (0, 6, -10, 12), (1, -8, -7, -10),
    (-6, 4, -6, 3), (5, 1, -3, -9), (-6, 6, -6, 3), (7, -8, 1, -7),
    (3, 8, -9, -5), (2, -4, 5, 7), (11, 4, 6, -3), (-8, -1, 11, -1),
    (-3, -6, -10, -8), (2, 7, 3, -12), (-4, -10, 12, -3), (1, -2, -4, 6),
    (3, 11, -11, 0), (-6, 2, 3, -8), (6, 12, 0, -13), (3, 2, -2, -5),
    (-4, 1, -6, 5), (-12, 0, -13, 9), (-6, 2, 7, -8), (-2, -4, -6, 5),
    (0, 0, 0, -13), (9, -13, -2, 0), (3, -13, 5, -12), (10, 11, -13, -13),
    (-2, 3, -12, 3), (11, 7, -7, 0), (12, 2, 1, -13), (12, -11, 12, -8),
    (-7, -2, -4, -7), (7, 5, -1, -13), (-5, -8, -9, 10), (6, 0, -3, -13),
    (12, 4, -13, 1), (-7, 8, 8, -3), (10, -4, 0, -13), (2, 1, -7, 0),
    (-5, 4, 2, -8), (12, 8, 4, -13), (8, 7, -10, 0), (-3, 6, -2, 4),
    (-5, -1, -8, -12), (4, -1, -2, -10), (6, -4, -13, 9), (-7, 8, -6, -12),
    (-10, 2, -13, 10), (-1, -7, 0, 2), (-5, 6, -5, -12), (6, -13, 7, -3),
    (-13, 2, -1, 8), (2, 8, -13, 0), (-6, -9, 1, -4), (-9, 13, 0, -13),
    (-2, -3, 8, 0), (4, 0, -11, 12), (0, 3, -10, 10), (-6, -9, -3, -2),
    (9, -4, -6, 2), (5, 0, -13, -10), (-3, -8, -13, 3), (-12, -1, -4, -2),
    (7, -9, -4, 3), (-8, -4, 1, 11), (11, 6, 2, -12), (6, 6, -8, 12),
    (-3, -8, 2, -10), (2, 5, -8, 8), (-9, 8, -6, -8), (-4, 0, -11, -7),
    (7, 6, -3, 8), (-5, 7, -12, 5), (2, -8, -5, 1), (0, 4, -5, -3),
    (9, -9, -6, -12), (0, -13, 0, -13), (-7, -11, -3, -13), (6, -12, -7, 10),
    (6, -8, -13, 7), (8, 7, -11, -1), (-11, -5, -6, 9), (6, 4, 2, -13),
    (-1, -6, 3, -9), (1, -4, 4, -3), (-6, 8, -12, 0), (-11, 3, -6, 2),
    (7, -10, 11, -6), (5, 0, 12, -13), (4, -8, 1, -1), (-13, 12, -6, 3),
    (1, 4, -9, -2), (-8, -12, -8, 7), (-9, 5, 0, -5), (9, 7, 5, 3),
    (-12, -2, 8, -8), (3, 7, 12, -8), (-13, 3, -1, -1), (-10, -4, -10, 12),
    (5, -2, 0, 13), (-7, 1, -12, 8), (2, 9, -5, -11), (11, -13, 0, 2),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::synthetic_sheet;

    #[test]
    fn blank_image_yields_no_features() {
        let matcher = FeatureMatcher::default();
        let blank = GrayImage::from_pixel(200, 200, image::Luma([255u8]));
        assert!(matcher.detect(&blank).is_empty());
    }

    #[test]
    fn tiny_image_yields_no_features() {
        let matcher = FeatureMatcher::default();
        let tiny = GrayImage::new(5, 5);
        assert!(matcher.detect(&tiny).is_empty());
    }

    #[test]
    fn blank_pair_yields_empty_correspondence_set() {
        let matcher = FeatureMatcher::default();
        let blank = GrayImage::from_pixel(100, 100, image::Luma([255u8]));
        let sheet = synthetic_sheet(100, 100);
        assert!(matcher.detect_and_match(&blank, &sheet).is_empty());
        assert!(matcher.detect_and_match(&sheet, &blank).is_empty());
    }

    #[test]
    fn textured_sheet_yields_features_up_to_cap() {
        let config = FeatureMatcherConfig::default().with_max_keypoints(50);
        let matcher = FeatureMatcher::new(config);
        let sheet = synthetic_sheet(400, 400);
        let features = matcher.detect(&sheet);
        assert!(!features.is_empty());
        assert!(features.len() <= 50);
    }

    #[test]
    fn identical_images_match_with_zero_distance_prefix() {
        let matcher = FeatureMatcher::default();
        let sheet = synthetic_sheet(400, 400);
        let set = matcher.detect_and_match(&sheet, &sheet);

        assert!(!set.is_empty(), "identical sheets must produce matches");
        // Matches are sorted ascending; on identical images the best
        // distances are zero.
        assert_eq!(set.matches[0].distance, 0);
        for window in set.matches.windows(2) {
            assert!(window[0].distance <= window[1].distance);
        }
    }

    #[test]
    fn retained_prefix_respects_good_match_fraction() {
        let sheet = synthetic_sheet(400, 400);

        let full = FeatureMatcher::new(
            FeatureMatcherConfig::default().with_good_match_fraction(1.0),
        )
        .detect_and_match(&sheet, &sheet);
        let tenth = FeatureMatcher::default().detect_and_match(&sheet, &sheet);

        assert_eq!(tenth.len(), (full.len() as f32 * 0.1) as usize);
    }

    #[test]
    fn matching_is_deterministic() {
        let matcher = FeatureMatcher::default();
        let sheet = synthetic_sheet(320, 320);
        let first = matcher.detect_and_match(&sheet, &sheet);
        let second = matcher.detect_and_match(&sheet, &sheet);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.matches.iter().zip(second.matches.iter()) {
            assert_eq!(a.template, b.template);
            assert_eq!(a.scan, b.scan);
            assert_eq!(a.distance, b.distance);
        }
    }

    #[test]
    fn hamming_distance_counts_differing_bits() {
        let a = [0u8; 32];
        let mut b = [0u8; 32];
        b[0] = 0b1010_1010;
        b[31] = 0b0000_0001;
        assert_eq!(hamming_distance(&a, &b), 5);
        assert_eq!(hamming_distance(&a, &a), 0);
    }
}
