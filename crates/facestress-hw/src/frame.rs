//! Pixel-format conversion to RGB and dark-frame detection.

use image::RgbImage;

/// Convert packed YUYV (4:2:2) to RGB using BT.601 studio-range coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }
    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected,
        actual: yuyv.len(),
    })
}

fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clip = |x: i32| x.clamp(0, 255) as u8;
    [
        clip((298 * c + 409 * e + 128) >> 8),
        clip((298 * c - 100 * d - 208 * e + 128) >> 8),
        clip((298 * c + 516 * d + 128) >> 8),
    ]
}

/// Downscale 16-bit little-endian grayscale to 8-bit.
pub fn y16_to_grayscale(buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: buf.len(),
        });
    }
    Ok(buf[..expected]
        .chunks_exact(2)
        .map(|px| (u16::from_le_bytes([px[0], px[1]]) >> 8) as u8)
        .collect())
}

/// Replicate 8-bit grayscale into three channels.
pub fn grayscale_to_rgb(gray: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height) as usize;
    if gray.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: gray.len(),
        });
    }
    let rgb = gray[..expected].iter().flat_map(|&g| [g, g, g]).collect();
    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected,
        actual: gray.len(),
    })
}

/// Luma of an RGB frame (BT.601 weights).
pub fn luma(frame: &RgbImage) -> Vec<u8> {
    frame
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
        })
        .collect()
}

/// Returns true if more than `threshold_pct` of pixels fall in the darkest bucket (0–31).
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_to_rgb_white_and_black() {
        // 2x1: Y0=235 (white), Y1=16 (black), neutral chroma
        let yuyv = vec![235, 128, 16, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(rgb.get_pixel(1, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_yuyv_to_rgb_red_dominant() {
        // High V pushes red up and green down.
        let yuyv = vec![82, 90, 82, 240];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        let [r, g, b] = rgb.get_pixel(0, 0).0;
        assert!(r > 200, "r={r}");
        assert!(g < 60 && b < 60, "g={g} b={b}");
    }

    #[test]
    fn test_yuyv_to_rgb_ignores_trailing_padding() {
        let mut yuyv = vec![128u8; 4 * 2 * 2];
        yuyv.extend([0u8; 7]);
        let rgb = yuyv_to_rgb(&yuyv, 4, 2).unwrap();
        assert_eq!(rgb.dimensions(), (4, 2));
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(yuyv_to_rgb(&[100, 128], 2, 1).is_err());
    }

    #[test]
    fn test_y16_downscale() {
        // 0x1234 -> 0x12, 0xff00 -> 0xff
        let buf = vec![0x34, 0x12, 0x00, 0xff];
        assert_eq!(y16_to_grayscale(&buf, 2, 1).unwrap(), vec![0x12, 0xff]);
    }

    #[test]
    fn test_grayscale_to_rgb() {
        let rgb = grayscale_to_rgb(&[10, 200], 2, 1).unwrap();
        assert_eq!(rgb.get_pixel(1, 0).0, [200, 200, 200]);
        assert!(grayscale_to_rgb(&[10], 2, 1).is_err());
    }

    #[test]
    fn test_luma_of_gray_is_identity_ish() {
        let rgb = grayscale_to_rgb(&[0, 128, 255], 3, 1).unwrap();
        let y = luma(&rgb);
        assert_eq!(y[0], 0);
        assert!((y[1] as i32 - 128).abs() <= 1);
        assert!(y[2] >= 254);
    }

    #[test]
    fn test_dark_frame_all_black() {
        assert!(is_dark_frame(&[0u8; 1000], 0.95));
    }

    #[test]
    fn test_dark_frame_normal() {
        assert!(!is_dark_frame(&[128u8; 1000], 0.95));
    }

    #[test]
    fn test_dark_frame_empty() {
        assert!(is_dark_frame(&[], 0.95));
    }

    #[test]
    fn test_dark_frame_borderline() {
        let mut mostly_dark = vec![10u8; 960];
        mostly_dark.extend(vec![128u8; 40]);
        assert!(is_dark_frame(&mostly_dark, 0.95));

        let mut lit = vec![10u8; 940];
        lit.extend(vec![128u8; 60]);
        assert!(!is_dark_frame(&lit, 0.95));
    }
}
