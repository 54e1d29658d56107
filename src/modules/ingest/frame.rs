use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use image::ImageFormat;

use super::models::ImageFrame;
use crate::shared::errors::IngestError;

/// Decode a base64 snapshot and make sure the bytes are a JPEG or PNG.
/// Accepts an optional `data:image/...;base64,` prefix.
pub fn decode_image(encoded: &str, received_at: DateTime<Utc>) -> Result<ImageFrame, IngestError> {
    let encoded = match encoded.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| IngestError::ImageDecodeFailed(e.to_string()))?;
    if bytes.is_empty() {
        return Err(IngestError::ImageDecodeFailed("empty image".to_string()));
    }

    let format = image::guess_format(&bytes)
        .map_err(|e| IngestError::ImageDecodeFailed(e.to_string()))?;
    if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png) {
        return Err(IngestError::ImageDecodeFailed(format!(
            "unsupported image format {:?}",
            format
        )));
    }

    Ok(ImageFrame {
        bytes: Bytes::from(bytes),
        format,
        received_at,
    })
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn decodes_jpeg_snapshot() {
        let frame = decode_image(&jpeg_b64(), Utc::now()).unwrap();
        assert_eq!(frame.format, ImageFormat::Jpeg);
        assert_eq!(frame.bytes.as_ref(), JPEG_HEADER);
    }

    #[test]
    fn accepts_data_url_and_line_breaks() {
        let encoded = png_b64();
        let (head, tail) = encoded.split_at(4);
        let wrapped = format!("data:image/png;base64,{}\n{}", head, tail);

        let frame = decode_image(&wrapped, Utc::now()).unwrap();
        assert_eq!(frame.mime_type(), "image/png");
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = decode_image("***not base64***", Utc::now()).unwrap_err();
        assert!(matches!(err, IngestError::ImageDecodeFailed(_)));
    }

    #[test]
    fn rejects_bytes_that_are_not_an_image() {
        let encoded = STANDARD.encode(b"plain text, not a picture");
        let err = decode_image(&encoded, Utc::now()).unwrap_err();
        assert!(matches!(err, IngestError::ImageDecodeFailed(_)));
    }

    #[test]
    fn rejects_formats_other_than_jpeg_and_png() {
        let bmp = STANDARD.encode(b"BM\x36\x00\x00\x00\x00\x00");
        let pnm = STANDARD.encode(b"P1\n1 1\n0\n");
        for encoded in [bmp, pnm] {
            let err = decode_image(&encoded, Utc::now()).unwrap_err();
            assert!(matches!(err, IngestError::ImageDecodeFailed(_)));
        }
    }

    #[test]
    fn rejects_empty_image() {
        assert!(decode_image("", Utc::now()).is_err());
    }
}
