//! base64 <-> image conversion at the REST boundary.
//!
//! Inputs may carry a `data:image/...;base64,` prefix (the client sends one for
//! uploads); outputs never do.

use std::io::Cursor;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, ImageFormat};

use crate::core::error::Result;

/// JPEG quality for progress previews
const PREVIEW_QUALITY: u8 = 80;

fn strip_data_url(s: &str) -> &str {
    match s.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or(s, |(_, body)| body),
        None => s,
    }
}

fn decode_bytes(b64: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(strip_data_url(b64).trim())?)
}

/// Decode a base64 PNG/JPEG (format sniffed from the bytes).
pub fn decode_image(b64: &str) -> Result<DynamicImage> {
    let bytes = decode_bytes(b64)?;
    Ok(image::load_from_memory(&bytes)?)
}

/// Decode a mask. Colour input uses its red channel, grey input is taken as is.
pub fn decode_mask(b64: &str) -> Result<GrayImage> {
    let img = decode_image(b64)?;
    Ok(match img {
        DynamicImage::ImageLuma8(gray) => gray,
        DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => {
            img.to_luma8()
        }
        other => {
            let rgba = other.to_rgba8();
            GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| image::Luma([rgba.get_pixel(x, y)[0]]))
        }
    })
}

/// Encode as base64 PNG, no data-url prefix.
pub fn encode_png(img: &DynamicImage) -> Result<String> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(STANDARD.encode(bytes))
}

/// Encode a preview as base64 JPEG. Alpha is dropped.
pub fn encode_preview(img: &DynamicImage) -> Result<String> {
    let rgb = img.to_rgb8();
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, PREVIEW_QUALITY);
    encoder.encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::BridgeError;
    use image::{Rgba, RgbaImage};

    fn checker(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 10, 20, 255])
            } else {
                Rgba([0, 200, 100, 128])
            }
        }))
    }

    #[test]
    fn test_png_preserves_pixels() {
        let img = checker(7, 5);
        let b64 = encode_png(&img).unwrap();
        let back = decode_image(&b64).unwrap();
        assert_eq!(back.to_rgba8(), img.to_rgba8());
    }

    #[test]
    fn test_data_url_prefix_is_stripped() {
        let img = checker(3, 3);
        let b64 = format!("data:image/png;base64,{}", encode_png(&img).unwrap());
        assert_eq!(decode_image(&b64).unwrap().to_rgba8(), img.to_rgba8());
    }

    #[test]
    fn test_mask_uses_red_channel() {
        let img = checker(4, 4);
        let mask = decode_mask(&encode_png(&img).unwrap()).unwrap();
        assert_eq!(mask.get_pixel(0, 0)[0], 255);
        assert_eq!(mask.get_pixel(1, 0)[0], 0);
    }

    #[test]
    fn test_preview_is_jpeg() {
        let b64 = encode_preview(&checker(16, 16)).unwrap();
        let bytes = STANDARD.decode(b64).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_garbage_is_codec_error() {
        assert!(matches!(decode_image("!!!not base64"), Err(BridgeError::Codec(_))));
        let not_an_image = STANDARD.encode(b"hello");
        assert!(matches!(decode_image(&not_an_image), Err(BridgeError::Codec(_))));
    }
}
