//! # Response Decoding
//!
//! Turns a finished transport response into an [`Image`], or rejects it with a
//! [`DecodeError`]. Rejected payloads never reach the cache.

use std::collections::HashSet;
use std::ops::RangeInclusive;

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap};

use crate::error::DecodeError;
use crate::image::{Image, ImageFormat};
use crate::transport::ResponseInfo;

/// Content types accepted by [`ImageResponseDecoder`] by default
pub const DEFAULT_ACCEPTABLE_CONTENT_TYPES: &[&str] = &[
    "image/tiff",
    "image/jpeg",
    "image/gif",
    "image/png",
    "image/ico",
    "image/x-icon",
    "image/bmp",
    "image/x-bmp",
    "image/x-xbitmap",
    "image/x-win-bitmap",
    "image/webp",
];

/// Validates and interprets downloaded payloads
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, response: &ResponseInfo, body: Bytes) -> Result<Image, DecodeError>;
}

/// Extract the media type of a response, without parameters and lowercased
pub fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
}

/// Default decoder: checks the status code, the content type and the image signature
#[derive(Debug, Clone)]
pub struct ImageResponseDecoder {
    acceptable_status_codes: RangeInclusive<u16>,
    acceptable_content_types: HashSet<String>,
}

impl Default for ImageResponseDecoder {
    fn default() -> Self {
        Self {
            acceptable_status_codes: 200..=299,
            acceptable_content_types: DEFAULT_ACCEPTABLE_CONTENT_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ImageResponseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_acceptable_status_codes(mut self, codes: RangeInclusive<u16>) -> Self {
        self.acceptable_status_codes = codes;
        self
    }

    /// Also accept the given content type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.acceptable_content_types
            .insert(content_type.into().to_ascii_lowercase());
        self
    }
}

impl ImageDecoder for ImageResponseDecoder {
    fn decode(&self, response: &ResponseInfo, body: Bytes) -> Result<Image, DecodeError> {
        if !self
            .acceptable_status_codes
            .contains(&response.status.as_u16())
        {
            return Err(DecodeError::UnacceptableStatus(response.status));
        }

        // A missing content type is tolerated; the signature check below still applies
        let content_type = content_type(&response.headers);
        if let Some(ct) = &content_type {
            if !self.acceptable_content_types.contains(ct) {
                return Err(DecodeError::UnacceptableContentType(ct.clone()));
            }
        }

        if body.is_empty() {
            return Err(DecodeError::EmptyPayload);
        }

        if ImageFormat::sniff(&body).is_none() {
            return Err(DecodeError::UnrecognizedFormat);
        }

        Ok(Image::new(body).with_content_type_option(content_type))
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use reqwest::header::HeaderValue;
    use url::Url;

    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3];

    fn response(status: u16, content_type: Option<&str>) -> ResponseInfo {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_str(ct).unwrap());
        }
        ResponseInfo {
            url: Url::parse("https://example.com/a.png").unwrap(),
            status: StatusCode::from_u16(status).unwrap(),
            headers,
        }
    }

    #[test]
    fn test_decode_accepts_png() {
        let decoder = ImageResponseDecoder::default();
        let image = decoder
            .decode(
                &response(200, Some("image/PNG; charset=binary")),
                Bytes::from_static(PNG),
            )
            .unwrap();

        assert_eq!(image.format(), Some(ImageFormat::Png));
        assert_eq!(image.content_type(), Some("image/png"));
        assert_eq!(image.byte_size(), PNG.len() as u64);
    }

    #[test]
    fn test_decode_rejects_bad_status() {
        let decoder = ImageResponseDecoder::default();
        let err = decoder
            .decode(&response(404, Some("image/png")), Bytes::from_static(PNG))
            .unwrap_err();
        assert_eq!(err, DecodeError::UnacceptableStatus(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_decode_rejects_unacceptable_content_type() {
        let decoder = ImageResponseDecoder::default();
        let err = decoder
            .decode(&response(200, Some("text/html")), Bytes::from_static(PNG))
            .unwrap_err();
        assert_eq!(err, DecodeError::UnacceptableContentType("text/html".into()));

        let decoder = decoder.with_content_type("application/octet-stream");
        assert!(
            decoder
                .decode(
                    &response(200, Some("application/octet-stream")),
                    Bytes::from_static(PNG)
                )
                .is_ok()
        );
    }

    #[test]
    fn test_decode_rejects_empty_and_unknown_payloads() {
        let decoder = ImageResponseDecoder::default();
        assert_eq!(
            decoder.decode(&response(200, None), Bytes::new()),
            Err(DecodeError::EmptyPayload)
        );
        assert_eq!(
            decoder.decode(&response(200, None), Bytes::from_static(b"not an image")),
            Err(DecodeError::UnrecognizedFormat)
        );
    }
}
