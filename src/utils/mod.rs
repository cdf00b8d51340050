//! Utility functions for images.

pub mod image;

pub use image::{dynamic_to_gray, load_gray, load_gray_from_memory, save_gray};
