//! Content sniffing for uploaded image streams
//!
//! The sniffed byte pattern is authoritative over whatever filename or
//! extension the client declared. Only JPEG, PNG, GIF and WebP are accepted.

use lazy_static::lazy_static;
use log::warn;
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Number of leading bytes inspected when sniffing content.
pub const SNIFF_LEN: usize = 512;

lazy_static! {
    /// Extensions recognized as stored images, keyed to their MIME type.
    static ref IMAGE_EXTENSIONS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("jpg", "image/jpeg");
        m.insert("jpeg", "image/jpeg");
        m.insert("png", "image/png");
        m.insert("gif", "image/gif");
        m.insert("webp", "image/webp");
        m
    };
}

/// An accepted image content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageKind {
    /// Canonical extension for stored files of this kind.
    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
            ImageKind::Gif => "gif",
            ImageKind::Webp => "webp",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
            ImageKind::Gif => "image/gif",
            ImageKind::Webp => "image/webp",
        }
    }

    /// Classifies a header buffer by magic number.
    pub fn sniff(header: &[u8]) -> Option<ImageKind> {
        if header.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(ImageKind::Jpeg);
        }
        if header.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(ImageKind::Png);
        }
        if header.starts_with(b"GIF87a") || header.starts_with(b"GIF89a") {
            return Some(ImageKind::Gif);
        }
        if header.len() >= 12 && header.starts_with(b"RIFF") && &header[8..12] == b"WEBP" {
            return Some(ImageKind::Webp);
        }
        None
    }
}

/// Sniffs the first [`SNIFF_LEN`] bytes of `stream` and rewinds it to the
/// start, so the same stream can afterwards be copied to storage in full.
///
/// Returns `None` for unrecognized content and for any read or rewind
/// failure; the declared filename is never consulted.
pub fn classify<R: Read + Seek + ?Sized>(stream: &mut R) -> Option<ImageKind> {
    let mut header = Vec::with_capacity(SNIFF_LEN);
    if let Err(e) = (&mut *stream).take(SNIFF_LEN as u64).read_to_end(&mut header) {
        warn!("failed to read stream header for sniffing: {}", e);
        return None;
    }
    if let Err(e) = stream.seek(SeekFrom::Start(0)) {
        warn!("failed to rewind stream after sniffing: {}", e);
        return None;
    }
    ImageKind::sniff(&header)
}

/// True when the filename carries one of the recognized image extensions
/// (case-insensitive). Listing, counting and deletion use this to decide
/// which directory entries are images.
pub fn is_image_filename(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains_key(e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// MIME type for a recognized image filename, if any.
pub fn mime_for_filename(filename: &str) -> Option<&'static str> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .and_then(|e| IMAGE_EXTENSIONS.get(e.to_lowercase().as_str()).copied())
}
