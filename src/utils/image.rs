//! Utility functions for image loading and conversion.
//!
//! Registration operates on single-channel intensity rasters, so every
//! load path converts to [`GrayImage`] up front.

use std::path::Path;

use image::{DynamicImage, GrayImage};

use crate::core::{GradeError, GradeResult};

/// Converts a DynamicImage to a GrayImage (8-bit grayscale).
pub fn dynamic_to_gray(img: DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Loads an image from a file path as an 8-bit grayscale raster.
///
/// # Errors
///
/// Returns [`GradeError::ImageLoad`] if the file cannot be opened or
/// decoded. Callers in the registration path recover this as a rejected
/// alignment rather than propagating it.
pub fn load_gray(path: &Path) -> GradeResult<GrayImage> {
    let img = image::open(path).map_err(GradeError::ImageLoad)?;
    Ok(dynamic_to_gray(img))
}

/// Decodes an in-memory encoded image (PNG, JPEG, ...) as grayscale.
pub fn load_gray_from_memory(data: &[u8]) -> GradeResult<GrayImage> {
    let img = image::load_from_memory(data).map_err(GradeError::ImageLoad)?;
    Ok(dynamic_to_gray(img))
}

/// Saves a grayscale raster to the given path, inferring the format from
/// the extension.
pub fn save_gray(img: &GrayImage, path: &Path) -> GradeResult<()> {
    img.save(path).map_err(GradeError::ImageEncode)
}
