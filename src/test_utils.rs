//! Synthetic raster helpers shared by unit tests.

use image::{GrayImage, Luma};

/// Draws a deterministic sheet of diamonds with varying intensities and
/// sizes. Diamond vertices are reliable FAST corners (their cardinal
/// neighborhoods pass the pre-check at any of the four orientations), and
/// the varying shades keep descriptors distinct so cross-checked matching
/// stays unambiguous.
pub(crate) fn synthetic_sheet(width: u32, height: u32) -> GrayImage {
    let mut img = GrayImage::from_pixel(width, height, Luma([235u8]));
    let step = 40u32;
    let mut cell = 0u32;
    let mut cy = step / 2;
    while cy + step / 2 < height {
        let mut cx = step / 2;
        while cx + step / 2 < width {
            let radius = 8 + (cell % 5) as i32;
            let shade = (20 + (cell * 23) % 120) as u8;
            stamp_diamond(&mut img, cx as i32, cy as i32, radius, shade);
            cell += 1;
            cx += step;
        }
        cy += step;
    }
    img
}

/// Returns a copy of `sheet` with its content shifted by `(dx, dy)`,
/// exposed area filled with the background shade. Used to exercise
/// registration with a known ground-truth translation.
pub(crate) fn translated_sheet(sheet: &GrayImage, dx: i32, dy: i32) -> GrayImage {
    let (width, height) = sheet.dimensions();
    let mut out = GrayImage::from_pixel(width, height, Luma([235u8]));
    for y in 0..height {
        for x in 0..width {
            let sx = x as i32 - dx;
            let sy = y as i32 - dy;
            if sx >= 0 && sy >= 0 && (sx as u32) < width && (sy as u32) < height {
                out.put_pixel(x, y, *sheet.get_pixel(sx as u32, sy as u32));
            }
        }
    }
    out
}

fn stamp_diamond(img: &mut GrayImage, cx: i32, cy: i32, radius: i32, shade: u8) {
    let (width, height) = img.dimensions();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx.abs() + dy.abs() <= radius {
                let px = cx + dx;
                let py = cy + dy;
                if px >= 0 && py >= 0 && (px as u32) < width && (py as u32) < height {
                    img.put_pixel(px as u32, py as u32, Luma([shade]));
                }
            }
        }
    }
}
