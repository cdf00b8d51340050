//! Template and scan input types.

use std::path::Path;

use image::GrayImage;

use crate::core::{GradeError, GradeResult};
use crate::utils::load_gray;

/// A reference raster representing one question-paper layout.
///
/// Immutable once created. Many templates may exist per grading session;
/// the selector picks one per scan, never mutating any of them.
#[derive(Debug, Clone)]
pub struct Template {
    /// Stable identifier, usually derived from the upload filename.
    pub id: String,
    /// The template raster as a single-channel intensity image.
    pub image: GrayImage,
}

impl Template {
    /// Creates a template from an already-decoded raster.
    pub fn new(id: impl Into<String>, image: GrayImage) -> Self {
        Self {
            id: id.into(),
            image,
        }
    }

    /// Loads a template from a file, deriving the id from the file stem.
    pub fn from_path(path: &Path) -> GradeResult<Self> {
        let image = load_gray(path)?;
        Ok(Self {
            id: id_from_path(path)?,
            image,
        })
    }
}

/// A raster image of one filled answer sheet.
///
/// One scan belongs to exactly one student submission; the id is derived
/// from the upload filename.
#[derive(Debug, Clone)]
pub struct Scan {
    /// Stable identifier, usually derived from the upload filename.
    pub id: String,
    /// The scan raster as a single-channel intensity image.
    pub image: GrayImage,
}

impl Scan {
    /// Creates a scan from an already-decoded raster.
    pub fn new(id: impl Into<String>, image: GrayImage) -> Self {
        Self {
            id: id.into(),
            image,
        }
    }

    /// Loads a scan from a file, deriving the id from the file stem.
    pub fn from_path(path: &Path) -> GradeResult<Self> {
        let image = load_gray(path)?;
        Ok(Self {
            id: id_from_path(path)?,
            image,
        })
    }
}

fn id_from_path(path: &Path) -> GradeResult<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_owned)
        .ok_or_else(|| {
            GradeError::invalid_input(format!("cannot derive an id from {}", path.display()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_derive_from_file_stems() {
        assert_eq!(
            id_from_path(Path::new("/uploads/scan_042.png")).unwrap(),
            "scan_042"
        );
    }
}
