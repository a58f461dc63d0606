use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use imagesize::{ImageError, ImageSize};
use thiserror::Error;
use tracing::info;

use crate::application::repos::{AssetsRepo, RepoError, UploadImageParams};
use crate::domain::entities::ImageAsset;

pub const DEFAULT_FILENAME: &str = "image.jpg";
pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No image data provided")]
    Empty,
    #[error("image data is not valid base64")]
    Decode(#[source] base64::DecodeError),
    #[error("uploaded file is not a recognised image: {0}")]
    NotAnImage(&'static str),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub asset: ImageAsset,
    pub display_url: String,
    pub width: usize,
    pub height: usize,
}

#[derive(Clone)]
pub struct UploadService {
    assets: Arc<dyn AssetsRepo>,
}

impl UploadService {
    pub fn new(assets: Arc<dyn AssetsRepo>) -> Self {
        Self { assets }
    }

    /// Upload a base64 payload, optionally wrapped in a `data:` URL.
    pub async fn upload_base64(
        &self,
        image_data: Option<&str>,
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<UploadedImage, UploadError> {
        let payload = image_data.map(strip_data_url).unwrap_or("");
        if payload.trim().is_empty() {
            return Err(UploadError::Empty);
        }
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(UploadError::Decode)?;
        self.upload_bytes(Bytes::from(bytes), filename, content_type)
            .await
    }

    pub async fn upload_bytes(
        &self,
        bytes: Bytes,
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<UploadedImage, UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        let size = probe_image(&bytes)?;

        let params = UploadImageParams {
            filename: non_blank(filename).unwrap_or(DEFAULT_FILENAME).to_string(),
            content_type: non_blank(content_type)
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string(),
            bytes,
        };

        let asset = self.assets.upload_image(params).await?;
        let display_url = self.assets.display_url(&asset);
        info!(
            asset_id = %asset.id,
            width = size.width,
            height = size.height,
            "image uploaded"
        );

        Ok(UploadedImage {
            asset,
            display_url,
            width: size.width,
            height: size.height,
        })
    }
}

fn probe_image(bytes: &[u8]) -> Result<ImageSize, UploadError> {
    match imagesize::blob_size(bytes) {
        Ok(size) => Ok(size),
        Err(ImageError::NotSupported) => Err(UploadError::NotAnImage("unsupported format")),
        Err(ImageError::CorruptedImage) => Err(UploadError::NotAnImage("corrupted image")),
        Err(ImageError::IoError(_)) => Err(UploadError::NotAnImage("truncated image")),
    }
}

/// Drop a leading `data:image/<kind>;base64,` prefix when present.
fn strip_data_url(value: &str) -> &str {
    let Some(rest) = value.strip_prefix("data:image/") else {
        return value;
    };
    match rest.split_once(";base64,") {
        Some((kind, payload))
            if !kind.is_empty() && kind.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') =>
        {
            payload
        }
        _ => value,
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_rejects_non_images() {
        assert!(matches!(
            probe_image(b"definitely not an image"),
            Err(UploadError::NotAnImage(_))
        ));
    }

    #[test]
    fn data_url_prefix_is_stripped() {
        assert_eq!(strip_data_url("data:image/png;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_url("AAAA"), "AAAA");
        assert_eq!(
            strip_data_url("data:image/svg+xml;base64,AAAA"),
            "data:image/svg+xml;base64,AAAA"
        );
    }
}
