//! QR code rasterization for the verification link.

use image::{GrayImage, Luma};
use qrcode::{Color, EcLevel, QrCode};

use crate::error::RenderError;

/// Modules of white border around the symbol.
const QUIET_ZONE: u32 = 4;

/// Encodes `payload` into a grayscale bitmap, `module_px` pixels per module.
pub fn encode(payload: &str, module_px: u32) -> Result<GrayImage, RenderError> {
    if payload.is_empty() {
        return Err(RenderError::QrEncoding("empty payload".to_string()));
    }
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::M)
        .map_err(|e| RenderError::QrEncoding(e.to_string()))?;

    let width = code.width() as u32;
    let side = (width + 2 * QUIET_ZONE) * module_px;
    let mut img = GrayImage::from_pixel(side, side, Luma([255]));

    for (index, color) in code.to_colors().into_iter().enumerate() {
        if color != Color::Dark {
            continue;
        }
        let index = index as u32;
        let x0 = (index % width + QUIET_ZONE) * module_px;
        let y0 = (index / width + QUIET_ZONE) * module_px;
        for dy in 0..module_px {
            for dx in 0..module_px {
                img.put_pixel(x0 + dx, y0 + dy, Luma([0]));
            }
        }
    }

    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_produces_square_bitmap_with_quiet_zone() {
        let img = encode("https://certs.example.com/verify/abc123", 4).unwrap();
        assert_eq!(img.width(), img.height());
        assert_eq!(img.width() % 4, 0);
        // Corner sits inside the quiet zone.
        assert_eq!(img.get_pixel(0, 0), &Luma([255]));
        // Top-left finder pattern starts right after the quiet zone.
        assert_eq!(img.get_pixel(QUIET_ZONE * 4, QUIET_ZONE * 4), &Luma([0]));
    }

    #[test]
    fn test_empty_payload_is_rejected() {
        assert!(matches!(encode("", 4), Err(RenderError::QrEncoding(_))));
    }

    #[test]
    fn test_oversized_payload_is_rejected() {
        let payload = "x".repeat(5000);
        assert!(matches!(encode(&payload, 1), Err(RenderError::QrEncoding(_))));
    }
}
