//! Image encoding: `DynamicImage` → PNG bytes → base64 `ImageData`.
//!
//! Pages are kept as PNG from rasterisation onwards. PNG is lossless, and
//! JPEG ringing around small digits turns "8" into "3" often enough to
//! corrupt amounts.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rendered page as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} page → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

/// Wrap PNG bytes for a vision-model request.
///
/// `detail: "high"` keeps the full tile budget on providers that honour it;
/// fee lines and footnotes are lost at low detail.
pub fn to_image_data(png: &[u8]) -> ImageData {
    ImageData::new(STANDARD.encode(png), "image/png").with_detail("high")
}
