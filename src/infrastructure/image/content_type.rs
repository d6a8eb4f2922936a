//! Content type detection for fetched photos.

use std::io::Cursor;

/// Maps a URL's file extension to an image content type.
#[must_use]
pub fn content_type_from_url(url: &str) -> Option<&'static str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = file.rsplit_once('.')?;

    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// Detects the content type from the payload's magic bytes.
#[must_use]
pub fn sniff_content_type(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type())
}

/// Picks the best content type for a payload.
///
/// A server-reported `image/*` type wins, then magic bytes, then the URL's
/// extension.
#[must_use]
pub fn resolve_content_type(header: Option<&str>, bytes: &[u8], url: &str) -> Option<String> {
    let header = header
        .map(|h| h.split(';').next().unwrap_or(h).trim().to_ascii_lowercase())
        .filter(|h| h.starts_with("image/"));

    header.or_else(|| {
        sniff_content_type(bytes)
            .or_else(|| content_type_from_url(url))
            .map(String::from)
    })
}

/// Reads pixel dimensions from the image header without decoding pixels.
#[must_use]
pub fn probe_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}
