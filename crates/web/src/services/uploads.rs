//! Store photo uploads.
//!
//! Photos are decoded, resized to [`PHOTO_WIDTH`] pixels wide and written to
//! the uploads directory under a random name. Decoding and encoding run on
//! the blocking thread pool.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use thiserror::Error;
use uuid::Uuid;

/// Width every stored photo is resized to.
pub const PHOTO_WIDTH: u32 = 800;

/// Errors from handling an uploaded photo.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The part's content type is not `image/*`.
    #[error("That filetype isn't allowed!")]
    FileType,

    /// The bytes are not a decodable image.
    #[error("could not process image: {0}")]
    Decode(#[from] image::ImageError),

    /// Writing the file failed.
    #[error("could not store image: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking task panicked or was cancelled.
    #[error("image task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl UploadError {
    /// Whether the client sent something unusable (as opposed to a server fault).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::FileType | Self::Decode(_))
    }
}

/// File extension for an uploaded part, from its MIME subtype.
///
/// `image/jpeg` becomes `jpeg`. Parameters such as `; charset=` are ignored.
///
/// # Errors
///
/// Returns `UploadError::FileType` unless the type is `image/<subtype>`.
pub fn extension_for(content_type: &str) -> Result<String, UploadError> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let subtype = essence
        .strip_prefix("image/")
        .filter(|s| !s.is_empty())
        .ok_or(UploadError::FileType)?;

    if !subtype
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return Err(UploadError::FileType);
    }

    Ok(subtype.to_owned())
}

/// Writes resized photos into the uploads directory.
#[derive(Debug, Clone)]
pub struct PhotoUploader {
    dir: PathBuf,
}

impl PhotoUploader {
    /// Create an uploader writing into `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory photos are written to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resize and store one photo, returning its new filename.
    ///
    /// # Errors
    ///
    /// Returns `UploadError::FileType` for non-image content types,
    /// `UploadError::Decode` for undecodable bytes and `UploadError::Io` if
    /// the file cannot be written.
    pub async fn save(&self, content_type: &str, bytes: Vec<u8>) -> Result<String, UploadError> {
        let extension = extension_for(content_type)?;
        let filename = format!("{}.{extension}", Uuid::new_v4());

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(&filename);

        tokio::task::spawn_blocking(move || resize_and_write(&bytes, &path)).await??;

        tracing::info!(filename = %filename, "photo stored");
        Ok(filename)
    }

    /// Remove a photo written by [`save`](Self::save) whose store was never saved.
    ///
    /// Failures are logged, not returned.
    pub async fn discard(&self, filename: &str) {
        let path = self.dir.join(filename);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!(error = %e, filename = %filename, "failed to discard photo");
        } else {
            tracing::info!(filename = %filename, "photo discarded");
        }
    }
}

fn resize_and_write(bytes: &[u8], path: &Path) -> Result<(), UploadError> {
    let format = image::guess_format(bytes)?;
    let photo = image::load_from_memory_with_format(bytes, format)?;

    // Height is unbounded so only the width constrains the aspect-preserving resize.
    let resized = photo.resize(PHOTO_WIDTH, u32::MAX, FilterType::Triangle);
    resized.save_with_format(path, format)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, RgbImage};

    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbImage::new(width, height)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_extension_for_image_types() {
        assert_eq!(extension_for("image/jpeg").unwrap(), "jpeg");
        assert_eq!(extension_for("image/PNG").unwrap(), "png");
        assert_eq!(extension_for("image/webp; q=1").unwrap(), "webp");
    }

    #[test]
    fn test_extension_rejects_non_images() {
        for content_type in ["text/plain", "application/pdf", "image/", "", "image/../x"] {
            assert!(
                matches!(extension_for(content_type), Err(UploadError::FileType)),
                "{content_type} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_save_resizes_to_width() {
        let dir = std::env::temp_dir().join(format!("storedir-uploads-{}", Uuid::new_v4()));
        let uploader = PhotoUploader::new(&dir);

        let filename = uploader.save("image/png", png(1600, 400)).await.unwrap();
        assert!(filename.ends_with(".png"));

        let stored = image::open(dir.join(&filename)).unwrap();
        assert_eq!(stored.width(), PHOTO_WIDTH);
        assert_eq!(stored.height(), 200);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_discard_removes_saved_photo() {
        let dir = std::env::temp_dir().join(format!("storedir-uploads-{}", Uuid::new_v4()));
        let uploader = PhotoUploader::new(&dir);

        let filename = uploader.save("image/png", png(10, 10)).await.unwrap();
        assert!(dir.join(&filename).exists());

        uploader.discard(&filename).await;
        assert!(!dir.join(&filename).exists());

        // A second discard only logs.
        uploader.discard(&filename).await;

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_save_rejects_garbage() {
        let dir = std::env::temp_dir().join(format!("storedir-uploads-{}", Uuid::new_v4()));
        let uploader = PhotoUploader::new(&dir);

        let result = uploader.save("image/png", b"not an image".to_vec()).await;
        assert!(matches!(result, Err(UploadError::Decode(_))));
        assert!(result.unwrap_err().is_client_error());

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
