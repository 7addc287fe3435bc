//! Decoding of submitted still frames.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::DynamicImage;

use crate::error::{DetectError, DetectResult};

/// Strip an optional `data:image/...;base64,` prefix.
///
/// Everything after the first comma is the payload; strings without a
/// comma are returned unchanged.
pub fn strip_data_url(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((_, data)) => data,
        None => payload,
    }
}

/// Decode a base64 image (optionally wrapped in a data URL).
pub fn decode_base64_image(payload: &str) -> DetectResult<DynamicImage> {
    let data = strip_data_url(payload.trim());
    if data.is_empty() {
        return Err(DetectError::invalid_image("Empty image payload"));
    }

    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| DetectError::invalid_image(format!("Invalid base64: {}", e)))?;

    decode_image_bytes(&bytes)
}

/// Decode encoded image bytes (JPEG, PNG, ...).
pub fn decode_image_bytes(bytes: &[u8]) -> DetectResult<DynamicImage> {
    image::load_from_memory(bytes)
        .map_err(|e| DetectError::invalid_image(format!("Undecodable image: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageBuffer, ImageOutputFormat, Rgb};
    use std::io::Cursor;

    fn png_base64() -> String {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(4, 3, Rgb([10, 20, 30]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        STANDARD.encode(bytes)
    }

    #[test]
    fn test_strip_data_url() {
        assert_eq!(strip_data_url("data:image/jpeg;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_url("AAAA"), "AAAA");
    }

    #[test]
    fn test_decode_plain_and_data_url() {
        let b64 = png_base64();
        let img = decode_base64_image(&b64).unwrap();
        assert_eq!(img.dimensions(), (4, 3));

        let url = format!("data:image/png;base64,{}", b64);
        assert!(decode_base64_image(&url).is_ok());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_base64_image("!!not base64!!"),
            Err(DetectError::InvalidImage(_))
        ));
        assert!(matches!(
            decode_base64_image(&STANDARD.encode(b"definitely not an image")),
            Err(DetectError::InvalidImage(_))
        ));
        assert!(matches!(decode_base64_image(""), Err(DetectError::InvalidImage(_))));
        assert!(decode_base64_image("data:image/png;base64,").is_err());
    }
}
