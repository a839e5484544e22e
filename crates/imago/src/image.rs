//! # Image Payload
//!
//! Images are kept as opaque, reference-counted byte buffers together with the
//! number of bytes they are accounted for in the memory cache.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Image container formats recognized from their leading signature bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    WebP,
    Bmp,
    Tiff,
    Ico,
}

impl ImageFormat {
    /// Detect the format from the first bytes of a payload
    pub fn sniff(data: &[u8]) -> Option<Self> {
        const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

        if data.starts_with(PNG) {
            Some(ImageFormat::Png)
        } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            Some(ImageFormat::WebP)
        } else if data.starts_with(b"BM") {
            Some(ImageFormat::Bmp)
        } else if data.starts_with(b"II*\0") || data.starts_with(b"MM\0*") {
            Some(ImageFormat::Tiff)
        } else if data.starts_with(&[0x00, 0x00, 0x01, 0x00]) {
            Some(ImageFormat::Ico)
        } else {
            None
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Tiff => "image/tiff",
            ImageFormat::Ico => "image/x-icon",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Gif => "gif",
            ImageFormat::WebP => "webp",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Tiff => "tiff",
            ImageFormat::Ico => "ico",
        }
    }
}

/// A downloaded image
///
/// Cloning is cheap: the payload is shared, not copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    data: Bytes,
    format: Option<ImageFormat>,
    content_type: Option<String>,
    byte_size: u64,
}

impl Image {
    /// Wrap a payload; its byte size defaults to the payload length
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            format: ImageFormat::sniff(&data),
            byte_size: data.len() as u64,
            content_type: None,
            data,
        }
    }

    /// Override the number of bytes this image is accounted for in the cache,
    /// e.g. the size of its decoded bitmap rather than its encoded payload
    pub fn with_byte_size(mut self, byte_size: u64) -> Self {
        self.byte_size = byte_size;
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_content_type_option(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }

    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    /// The server supplied content type, or the one implied by the detected format
    pub fn content_type(&self) -> Option<&str> {
        self.content_type
            .as_deref()
            .or_else(|| self.format.map(|f| f.mime_type()))
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }
}
