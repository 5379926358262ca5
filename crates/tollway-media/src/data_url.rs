//! Inline base64 image payloads

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::MediaError;
use crate::sniff::{ImageInfo, sniff_image};

/// Split a data URL into its declared MIME type and payload
///
/// Everything up to the first `,` is header, with or without the `data:`
/// scheme. Plain base64 never contains a comma and comes back unchanged.
fn split_data_url(data: &str) -> (Option<&str>, &str) {
    let Some((header, payload)) = data.split_once(',') else {
        return (None, data);
    };

    let header = header.strip_prefix("data:").unwrap_or(header);
    let mime = header.split(';').next().filter(|mime| !mime.is_empty());
    (mime, payload)
}

/// Decode a base64 image and read its format and dimensions
///
/// # Errors
///
/// Returns an error when the payload is not base64 or not a readable image
pub async fn decode_base64_image(data: &str) -> Result<ImageInfo, MediaError> {
    let (mime, payload) = split_data_url(data);
    let bytes = STANDARD.decode(payload.trim())?;

    sniff_image(mime, bytes.as_slice()).await
}

/// Decode a base64 file, returning its MIME type and image header
///
/// The MIME type comes from the data URL header when present, otherwise
/// from the detected image format.
///
/// # Errors
///
/// Returns an error when the payload is not base64 or not a readable image
pub async fn decode_base64_file(data: &str) -> Result<(String, ImageInfo), MediaError> {
    let (mime, payload) = split_data_url(data);
    let bytes = STANDARD.decode(payload.trim())?;

    let info = sniff_image(mime, bytes.as_slice()).await?;
    let mime = mime.map_or_else(|| info.mime_type().to_owned(), str::to_owned);

    Ok((mime, info))
}
