//! Image inspection for podcast and episode artwork.

use std::io::Cursor;
use std::time::Duration;

use anyhow::{Context, Result};
use image::ImageReader;
use reqwest::header::CONTENT_TYPE;

/// What a media server needs to know about an image besides its URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub mime_type: String,
}

/// Resolves an image URL to its pixel dimensions and content type.
pub trait ImageProbe: Send + Sync {
    fn inspect(&self, url: &str) -> Result<ImageInfo>;
}

/// Downloads the image and reads its header with the [`image`] crate.
pub struct HttpImageProbe {
    client: reqwest::blocking::Client,
}

impl HttpImageProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self { client })
    }
}

impl ImageProbe for HttpImageProbe {
    fn inspect(&self, url: &str) -> Result<ImageInfo> {
        let resp = self
            .client
            .get(url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .with_context(|| format!("requesting {url}"))?;

        let header_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| v.starts_with("image/"));

        let body = resp.bytes().with_context(|| format!("reading {url}"))?;
        let reader = ImageReader::new(Cursor::new(body.as_ref()))
            .with_guessed_format()
            .context("sniffing image format")?;
        let format = reader.format();
        let (width, height) = reader
            .into_dimensions()
            .with_context(|| format!("decoding {url}"))?;

        let mime_type = header_type
            .or_else(|| format.map(|f| f.to_mime_type().to_string()))
            .unwrap_or_else(|| mime_from_extension(url).to_string());

        Ok(ImageInfo {
            width,
            height,
            mime_type,
        })
    }
}

/// Best guess at an image's MIME type from its URL alone.
pub fn mime_from_extension(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
