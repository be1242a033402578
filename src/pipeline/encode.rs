//! Image encoding: page image file → base64 `ImageData` for the VLM request.
//!
//! VLM APIs (OpenAI, Anthropic, Gemini) accept images as base64 data embedded
//! in the JSON request body. The file bytes are sent as-is: the renderer
//! already wrote a lossless PNG, and re-encoding would only cost time.
//! `detail: "high"` asks GPT-4-class models for the full tile budget; without
//! it small print and marginal notes are lost.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::ImageFormat;
use std::path::Path;
use tracing::debug;

/// MIME type for a page image, from its extension (PNG when unknown).
pub fn mime_type(path: &Path) -> &'static str {
    match ImageFormat::from_path(path) {
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        _ => "image/png",
    }
}

/// Wrap raw image bytes as `ImageData`.
pub fn encode_bytes(bytes: &[u8], mime: &str) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, mime).with_detail("high")
}

/// Read a page image from disk and encode it for the VLM.
pub async fn encode_file(path: &Path) -> Result<ImageData, std::io::Error> {
    let bytes = tokio::fs::read(path).await?;
    Ok(encode_bytes(&bytes, mime_type(path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_type(Path::new("a.png")), "image/png");
        assert_eq!(mime_type(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(mime_type(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(mime_type(Path::new("a")), "image/png");
    }

    #[tokio::test]
    async fn encode_small_png_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page_p0001.png");
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        img.save_with_format(&path, ImageFormat::Png).unwrap();

        let data = encode_file(&path).await.expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(decoded, std::fs::read(&path).unwrap());
    }

    #[tokio::test]
    async fn encode_missing_file_fails() {
        assert!(encode_file(Path::new("/nope/missing.png")).await.is_err());
    }
}
