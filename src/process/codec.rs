//! Image decoding and PNG encoding.
//!
//! Uploads may arrive in any format the `image` crate can read; they are
//! always decoded to 8-bit grayscale. Derived layers are always written as
//! PNG, which is lossless and keeps the alpha channel.

use std::io::Cursor;
use std::path::Path;

use bytes::Bytes;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, GrayImage, ImageEncoder, ImageFormat, ImageReader, RgbaImage};

use crate::error::PipelineError;

use super::artifact::ArtifactRole;

/// MIME type of every derived layer.
pub const PNG_CONTENT_TYPE: &str = "image/png";

/// MIME type used when nothing better is known.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Decode arbitrary image bytes into a grayscale buffer.
///
/// # Errors
///
/// Returns [`PipelineError::Decode`] if the input is empty, the format is not
/// recognized, the data is corrupt, or the decoded image has no pixels.
pub fn decode_grayscale(source: &[u8]) -> Result<GrayImage, PipelineError> {
    if source.is_empty() {
        return Err(PipelineError::Decode {
            message: "empty input".to_string(),
        });
    }

    let reader = ImageReader::new(Cursor::new(source))
        .with_guessed_format()
        .map_err(|e| PipelineError::Decode {
            message: e.to_string(),
        })?;

    if reader.format().is_none() {
        return Err(PipelineError::Decode {
            message: "unrecognized image format".to_string(),
        });
    }

    let img = reader.decode().map_err(|e| PipelineError::Decode {
        message: e.to_string(),
    })?;

    let gray = img.to_luma8();
    if gray.width() == 0 || gray.height() == 0 {
        return Err(PipelineError::Decode {
            message: format!("image has no pixels ({}x{})", gray.width(), gray.height()),
        });
    }

    Ok(gray)
}

/// Encode an RGBA canvas as PNG.
pub fn encode_png(canvas: &RgbaImage, role: ArtifactRole) -> Result<Bytes, PipelineError> {
    let mut output = Vec::new();
    PngEncoder::new(&mut output)
        .write_image(
            canvas.as_raw(),
            canvas.width(),
            canvas.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| PipelineError::Encode {
            role,
            message: e.to_string(),
        })?;

    Ok(Bytes::from(output))
}

/// Guess a MIME type from the leading bytes of an image.
pub fn sniff_content_type(data: &[u8]) -> Option<&'static str> {
    image::guess_format(data).ok().map(|f| f.to_mime_type())
}

/// Guess a MIME type from a filename extension.
pub fn content_type_for_filename(filename: &str) -> Option<&'static str> {
    ImageFormat::from_path(Path::new(filename))
        .ok()
        .map(|f| f.to_mime_type())
}

/// Check for the PNG signature.
pub fn is_png(data: &[u8]) -> bool {
    data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
}
