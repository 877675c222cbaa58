//! Frame type and pixel format conversion to 8-bit grayscale.

/// A captured grayscale camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    /// Wrap an already-grayscale buffer, computing `is_dark`.
    pub fn from_gray(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Self {
        let is_dark = is_dark_frame(&data, DARK_FRAME_THRESHOLD);
        Self { data, width, height, sequence, is_dark }
    }

    /// Average pixel brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }
}

/// Fraction of near-black pixels above which a frame counts as dark.
pub const DARK_FRAME_THRESHOLD: f32 = 0.95;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid {format} length: expected {expected}, got {actual}")]
    InvalidLength {
        format: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("MJPEG frame is {actual_w}x{actual_h}, expected {width}x{height}")]
    SizeMismatch {
        width: u32,
        height: u32,
        actual_w: u32,
        actual_h: u32,
    },
    #[error("MJPEG decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

/// Packed YUYV 4:2:2 (`[Y0, U, Y1, V]` per pixel pair) → Y channel.
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength { format: "YUYV", expected, actual: yuyv.len() });
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

/// 8-bit GREY: copy the first `width * height` bytes.
pub fn grey_to_grayscale(grey: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height) as usize;
    if grey.len() < expected {
        return Err(FrameError::InvalidLength { format: "GREY", expected, actual: grey.len() });
    }
    Ok(grey[..expected].to_vec())
}

/// 16-bit little-endian gray → 8-bit by keeping the high byte.
pub fn y16_to_grayscale(y16: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    let expected = pixels * 2;
    if y16.len() < expected {
        return Err(FrameError::InvalidLength { format: "Y16", expected, actual: y16.len() });
    }
    Ok(y16[..expected]
        .chunks_exact(2)
        .map(|px| (u16::from_le_bytes([px[0], px[1]]) >> 8) as u8)
        .collect())
}

/// Motion-JPEG frame → luma. The decoded size must match the negotiated size.
pub fn mjpeg_to_grayscale(jpeg: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let img = image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)?.to_luma8();
    if img.dimensions() != (width, height) {
        return Err(FrameError::SizeMismatch {
            width,
            height,
            actual_w: img.width(),
            actual_h: img.height(),
        });
    }
    Ok(img.into_raw())
}

/// True if more than `threshold_pct` of pixels are near black (< 32).
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark = gray.iter().filter(|&&p| p < 32).count();
    (dark as f32 / gray.len() as f32) > threshold_pct
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_to_grayscale() {
        // 2x1 image: [Y0=100, U=128, Y1=200, V=128]
        assert_eq!(yuyv_to_grayscale(&[100, 128, 200, 128], 2, 1).unwrap(), vec![100, 200]);
    }

    #[test]
    fn test_yuyv_ignores_trailing_bytes() {
        let yuyv: Vec<u8> = (0..20).collect();
        assert_eq!(yuyv_to_grayscale(&yuyv, 4, 2).unwrap(), vec![0, 2, 4, 6, 8, 10, 12, 14]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let err = yuyv_to_grayscale(&[100, 128], 2, 1).unwrap_err();
        assert!(matches!(err, FrameError::InvalidLength { expected: 4, actual: 2, .. }));
    }

    #[test]
    fn test_grey_copy() {
        assert_eq!(grey_to_grayscale(&[1, 2, 3, 4, 5], 2, 2).unwrap(), vec![1, 2, 3, 4]);
        assert!(grey_to_grayscale(&[1, 2, 3], 2, 2).is_err());
    }

    #[test]
    fn test_y16_keeps_high_byte() {
        // 0x1234 -> 0x12, 0xFF00 -> 0xFF
        assert_eq!(y16_to_grayscale(&[0x34, 0x12, 0x00, 0xFF], 2, 1).unwrap(), vec![0x12, 0xFF]);
    }

    #[test]
    fn test_mjpeg_decode() {
        let img = image::GrayImage::from_pixel(8, 4, image::Luma([200u8]));
        let mut jpeg = Vec::new();
        image::DynamicImage::ImageLuma8(img)
            .write_to(&mut std::io::Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .unwrap();

        let gray = mjpeg_to_grayscale(&jpeg, 8, 4).unwrap();
        assert_eq!(gray.len(), 32);
        assert!(gray.iter().all(|&p| p.abs_diff(200) <= 2));

        assert!(matches!(mjpeg_to_grayscale(&jpeg, 16, 4), Err(FrameError::SizeMismatch { .. })));
    }

    #[test]
    fn test_mjpeg_garbage() {
        assert!(matches!(mjpeg_to_grayscale(b"not a jpeg", 2, 2), Err(FrameError::Decode(_))));
    }

    #[test]
    fn test_dark_frame() {
        assert!(is_dark_frame(&[0u8; 1000], DARK_FRAME_THRESHOLD));
        assert!(!is_dark_frame(&[128u8; 1000], DARK_FRAME_THRESHOLD));
        assert!(is_dark_frame(&[], DARK_FRAME_THRESHOLD));
    }

    #[test]
    fn test_dark_frame_borderline() {
        let mut mostly_dark = vec![10u8; 960];
        mostly_dark.extend(vec![128u8; 40]);
        assert!(is_dark_frame(&mostly_dark, DARK_FRAME_THRESHOLD));

        let mut bright_enough = vec![10u8; 940];
        bright_enough.extend(vec![128u8; 60]);
        assert!(!is_dark_frame(&bright_enough, DARK_FRAME_THRESHOLD));
    }

    #[test]
    fn test_from_gray_flags_dark() {
        let frame = Frame::from_gray(vec![0u8; 16], 4, 4, 7);
        assert!(frame.is_dark);
        assert_eq!(frame.avg_brightness(), 0.0);
        assert_eq!(frame.sequence, 7);
    }
}
