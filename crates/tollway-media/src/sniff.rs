//! Image format and dimension detection over partially read bodies
//!
//! How many bytes a header parse needs depends on the format and on what
//! precedes the frame header (EXIF, comments, ICC profiles), so the buffer
//! grows through fixed tiers and decoding is retried at each one.

use std::io::Cursor;

use image::codecs::webp::WebPDecoder;
use image::error::ImageFormatHint;
use image::{ImageDecoder, ImageError, ImageFormat, ImageReader};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::MediaError;

/// Bytes inspected when the content type must be detected
pub const DETECT_BYTES: usize = 512;
/// Buffer sizes at which a header decode is attempted
pub const SNIFF_TIERS: [usize; 3] = [8 * 1024, 24 * 1024, 64 * 1024];

/// Format and pixel size of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    /// Bytes consumed from the body to get here
    pub buffered: usize,
}

impl ImageInfo {
    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

/// MIME type detected from the first bytes of a body
///
/// # Errors
///
/// Returns [`MediaError::InvalidContentType`] when the bytes are not a known image format
pub fn detect_image_mime(head: &[u8]) -> Result<&'static str, MediaError> {
    let mime = image::guess_format(head)
        .map_err(|_| MediaError::InvalidContentType("unrecognised image data".to_owned()))?
        .to_mime_type();

    if mime.starts_with("image/") {
        Ok(mime)
    } else {
        Err(MediaError::InvalidContentType(mime.to_owned()))
    }
}

/// Whether a content type header names an image
pub fn is_image_content_type(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|value| value.trim_start().to_ascii_lowercase().starts_with("image/"))
}

/// Determine the format and dimensions of the image in `reader`
///
/// When `content_type` is missing or not `image/*`, the first 512 bytes
/// must look like an image. Bytes read for detection are reused by the
/// decode tiers.
///
/// # Errors
///
/// Returns an error when the body is not an image, cannot be read, or no
/// tier yields a header decode; in the last case the final tier's error.
pub async fn sniff_image<R>(content_type: Option<&str>, mut reader: R) -> Result<ImageInfo, MediaError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::with_capacity(SNIFF_TIERS[0]);
    let mut eof = false;

    if !is_image_content_type(content_type) {
        eof = fill_to(&mut reader, &mut buffer, DETECT_BYTES).await?;
        detect_image_mime(&buffer)?;
    }

    let mut last_error = None;

    for tier in SNIFF_TIERS {
        if !eof {
            eof = fill_to(&mut reader, &mut buffer, tier).await?;
        }

        match decode_header(&buffer) {
            Ok((format, width, height)) => {
                tracing::debug!(tier, buffered = buffer.len(), ?format, width, height, "image header decoded");
                return Ok(ImageInfo {
                    format,
                    width,
                    height,
                    buffered: buffer.len(),
                });
            }
            Err(e) => {
                tracing::debug!(tier, buffered = buffer.len(), error = %e, "image header decode failed");
                last_error = Some(e);
            }
        }

        if eof {
            break;
        }
    }

    Err(last_error.map_or_else(
        || MediaError::InvalidContentType("empty image body".to_owned()),
        MediaError::Decode,
    ))
}

/// Read until `buffer` holds `target` bytes; returns whether the body ended first
async fn fill_to<R>(reader: &mut R, buffer: &mut Vec<u8>, target: usize) -> Result<bool, MediaError>
where
    R: AsyncRead + Unpin,
{
    let Some(missing) = target.checked_sub(buffer.len()).filter(|n| *n > 0) else {
        return Ok(false);
    };

    let limit = u64::try_from(missing).unwrap_or(u64::MAX);
    let read = (&mut *reader).take(limit).read_to_end(buffer).await?;
    Ok(read < missing)
}

/// Raster decoders first, then the WebP container
fn decode_header(data: &[u8]) -> Result<(ImageFormat, u32, u32), ImageError> {
    let raster_error = match raster_header(data) {
        Ok(found) => return Ok(found),
        Err(e) => e,
    };

    WebPDecoder::new(Cursor::new(data))
        .map(|decoder| {
            let (width, height) = decoder.dimensions();
            (ImageFormat::WebP, width, height)
        })
        .map_err(|_| raster_error)
}

fn raster_header(data: &[u8]) -> Result<(ImageFormat, u32, u32), ImageError> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(ImageError::IoError)?;
    let format = reader.format();
    let (width, height) = reader.into_dimensions()?;

    format
        .map(|format| (format, width, height))
        .ok_or_else(|| ImageError::Unsupported(ImageFormatHint::Unknown.into()))
}
