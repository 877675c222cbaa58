//! Grayscale image helpers: margin crops, box annotation, resizing and PNG I/O.

use crate::types::BoundingBox;
use image::{imageops, GrayImage};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("crop region ({x}, {y}) {width}x{height} starts outside the {frame_width}x{frame_height} frame")]
    OutOfBounds {
        x: i64,
        y: i64,
        width: i64,
        height: i64,
        frame_width: u32,
        frame_height: u32,
    },
    #[error("buffer of {actual} bytes does not hold a {width}x{height} image")]
    BufferSize { width: u32, height: u32, actual: usize },
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Integer pixel rectangle lying inside the frame it was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    /// Grow `face` by `margin` pixels on every side.
    ///
    /// A region running past the right or bottom edge is cut at the edge.
    /// One starting left of or above the frame, or left empty after the cut, fails.
    pub fn with_margin(
        face: &BoundingBox,
        margin: u32,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<Self, ImagingError> {
        let margin = i64::from(margin);
        let x = face.x.round() as i64 - margin;
        let y = face.y.round() as i64 - margin;
        let width = face.width.round() as i64 + 2 * margin;
        let height = face.height.round() as i64 + 2 * margin;

        let clamped_width = width.min(i64::from(frame_width) - x);
        let clamped_height = height.min(i64::from(frame_height) - y);

        if x < 0 || y < 0 || clamped_width <= 0 || clamped_height <= 0 {
            return Err(ImagingError::OutOfBounds {
                x,
                y,
                width,
                height,
                frame_width,
                frame_height,
            });
        }

        Ok(Self {
            x: x as u32,
            y: y as u32,
            width: clamped_width as u32,
            height: clamped_height as u32,
        })
    }
}

/// Copy `region` out of a row-major grayscale frame.
pub fn crop(
    gray: &[u8],
    frame_width: u32,
    frame_height: u32,
    region: &CropRegion,
) -> Result<Vec<u8>, ImagingError> {
    let frame = gray_image(gray, frame_width, frame_height)?;
    let cropped = imageops::crop_imm(&frame, region.x, region.y, region.width, region.height).to_image();
    Ok(cropped.into_raw())
}

fn gray_image(data: &[u8], width: u32, height: u32) -> Result<GrayImage, ImagingError> {
    GrayImage::from_raw(width, height, data.to_vec()).ok_or(ImagingError::BufferSize {
        width,
        height,
        actual: data.len(),
    })
}

const OUTLINE_THICKNESS: u32 = 2;

/// Draw a rectangle outline in place. Lines falling outside the frame are clipped.
#[allow(clippy::too_many_arguments)]
pub fn draw_rectangle(
    gray: &mut [u8],
    width: u32,
    height: u32,
    x: i64,
    y: i64,
    rect_width: i64,
    rect_height: i64,
    value: u8,
) {
    let (w, h) = (i64::from(width), i64::from(height));
    let mut put = |px: i64, py: i64| {
        if px >= 0 && px < w && py >= 0 && py < h {
            gray[(py * w + px) as usize] = value;
        }
    };

    for t in 0..i64::from(OUTLINE_THICKNESS) {
        for px in x..x + rect_width {
            put(px, y + t);
            put(px, y + rect_height - 1 - t);
        }
        for py in y..y + rect_height {
            put(x + t, py);
            put(x + rect_width - 1 - t, py);
        }
    }
}

/// Bilinear resize of a grayscale buffer.
pub fn resize_bilinear(
    src: &[u8],
    width: usize,
    height: usize,
    new_width: usize,
    new_height: usize,
) -> Vec<u8> {
    let mut out = vec![0u8; new_width * new_height];
    if width == 0 || height == 0 || new_width == 0 || new_height == 0 {
        return out;
    }

    let sx = width as f32 / new_width as f32;
    let sy = height as f32 / new_height as f32;

    for y in 0..new_height {
        let src_y = (y as f32 + 0.5) * sy - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..new_width {
            let src_x = (x as f32 + 0.5) * sx - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let top = src[y0 * width + x0] as f32 * (1.0 - fx) + src[y0 * width + x1] as f32 * fx;
            let bottom = src[y1 * width + x0] as f32 * (1.0 - fx) + src[y1 * width + x1] as f32 * fx;
            let val = top * (1.0 - fy) + bottom * fy;

            out[y * new_width + x] = val.round().clamp(0.0, 255.0) as u8;
        }
    }

    out
}

/// Write a grayscale buffer as PNG. The parent directory must exist.
pub fn save_gray_png(path: &Path, data: &[u8], width: u32, height: u32) -> Result<(), ImagingError> {
    gray_image(data, width, height)?.save(path)?;
    Ok(())
}

/// Load any supported image file and convert it to 8-bit grayscale.
pub fn load_gray(path: &Path) -> Result<(Vec<u8>, u32, u32), ImagingError> {
    let img = image::open(path)?.to_luma8();
    let (width, height) = img.dimensions();
    Ok((img.into_raw(), width, height))
}
