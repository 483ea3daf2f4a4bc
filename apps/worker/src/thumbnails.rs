//! Thumbnail generation from the shared job queue.

use std::io::Cursor;
use std::sync::Arc;

use image::ImageReader;
use image::imageops::FilterType;
use lodge_application::{AttachmentRepository, StorageProvider, ThumbnailJob, ThumbnailQueue};
use lodge_core::{AppError, AppResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Longest edge of a generated thumbnail.
const THUMBNAIL_MAX_EDGE: u32 = 512;

/// JPEG quality for thumbnails.
const THUMBNAIL_JPEG_QUALITY: u8 = 80;

/// Consumes thumbnail jobs: decode, resize, JPEG-encode, store, record.
#[derive(Clone)]
pub struct ThumbnailWorker {
    queue: Arc<dyn ThumbnailQueue>,
    attachments: Arc<dyn AttachmentRepository>,
    storage: Arc<dyn StorageProvider>,
}

impl ThumbnailWorker {
    /// Creates a worker.
    #[must_use]
    pub fn new(
        queue: Arc<dyn ThumbnailQueue>,
        attachments: Arc<dyn AttachmentRepository>,
        storage: Arc<dyn StorageProvider>,
    ) -> Self {
        Self {
            queue,
            attachments,
            storage,
        }
    }

    /// Runs until cancelled. Queue transport errors propagate so the
    /// supervisor can restart with backoff; per-job failures only log.
    pub async fn run(&self, shutdown: CancellationToken) -> AppResult<()> {
        loop {
            let job = tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                job = self.queue.pop() => job?,
            };

            let Some(job) = job else { continue };

            match self.process(&job).await {
                Ok(thumbnail_key) => {
                    info!(attachment_id = %job.attachment_id, %thumbnail_key, "thumbnail stored");
                }
                Err(error) => {
                    warn!(attachment_id = %job.attachment_id, %error, "thumbnail job failed");
                }
            }
        }
    }

    async fn process(&self, job: &ThumbnailJob) -> AppResult<String> {
        // The attachment may have been purged between enqueue and pop.
        if self.attachments.get(job.attachment_id).await?.is_none() {
            debug!(attachment_id = %job.attachment_id, "attachment gone; skipping");
            return Err(AppError::NotFound("attachment no longer exists".to_owned()));
        }

        let original = self.storage.get(&job.storage_key).await?;
        let thumbnail = render_thumbnail(&original)?;

        let thumbnail_key = format!("thumb/{}.jpg", job.storage_key);
        self.storage.put(&thumbnail_key, &thumbnail).await?;
        self.attachments
            .set_thumbnail_key(job.attachment_id, &thumbnail_key)
            .await?;

        Ok(thumbnail_key)
    }
}

/// Decodes an image, shrinks it to fit the thumbnail box, and encodes it
/// as JPEG. Images already inside the box are re-encoded as-is.
fn render_thumbnail(bytes: &[u8]) -> AppResult<Vec<u8>> {
    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|error| AppError::Validation(format!("unreadable image: {error}")))?
        .decode()
        .map_err(|error| AppError::Validation(format!("failed to decode image: {error}")))?;

    let resized = if image.width() > THUMBNAIL_MAX_EDGE || image.height() > THUMBNAIL_MAX_EDGE {
        image.resize(THUMBNAIL_MAX_EDGE, THUMBNAIL_MAX_EDGE, FilterType::Lanczos3)
    } else {
        image
    };

    let mut output = Cursor::new(Vec::new());
    let encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut output, THUMBNAIL_JPEG_QUALITY);
    resized
        .into_rgb8()
        .write_with_encoder(encoder)
        .map_err(|error| AppError::Internal(format!("failed to encode thumbnail: {error}")))?;

    Ok(output.into_inner())
}

#[cfg(test)]
mod tests {
    use image::{ImageBuffer, Rgb};

    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let buffer = ImageBuffer::from_pixel(width, height, Rgb::<u8>([200, 60, 60]));
        let mut out = Cursor::new(Vec::new());
        let written = image::DynamicImage::ImageRgb8(buffer)
            .write_to(&mut out, image::ImageFormat::Png);
        assert!(written.is_ok());
        out.into_inner()
    }

    #[test]
    fn large_images_are_shrunk_to_the_box() -> AppResult<()> {
        let thumbnail = render_thumbnail(&png_bytes(2048, 1024))?;
        let decoded = image::load_from_memory(&thumbnail)
            .map_err(|error| AppError::Internal(error.to_string()))?;
        assert!(decoded.width() <= THUMBNAIL_MAX_EDGE);
        assert!(decoded.height() <= THUMBNAIL_MAX_EDGE);
        Ok(())
    }

    #[test]
    fn small_images_keep_their_dimensions() -> AppResult<()> {
        let thumbnail = render_thumbnail(&png_bytes(100, 80))?;
        let decoded = image::load_from_memory(&thumbnail)
            .map_err(|error| AppError::Internal(error.to_string()))?;
        assert_eq!((decoded.width(), decoded.height()), (100, 80));
        Ok(())
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(render_thumbnail(b"not an image").is_err());
    }
}
