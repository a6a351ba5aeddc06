//! Local image store for post attachments.
//!
//! Images are downloaded into a flat directory as `{id}_{unix}_{n}.jpg`,
//! shrunk to fit [`MAX_DIMENSION`] when larger, and removed by
//! [`ImagePreparer::cleanup`] once they are old enough.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use popwatch_core::{alt_text, packaging_alt_text, ImagePreparer, ItemRecord, PreparedImage};
use reqwest::Client;

use crate::client::BROWSER_USER_AGENT;
use crate::error::ScraperError;

/// Longest edge, in pixels, of a stored image.
pub const MAX_DIMENSION: u32 = 1200;

const JPEG_QUALITY: u8 = 95;

pub struct ImageStore {
    client: Client,
    dir: PathBuf,
}

impl ImageStore {
    /// Creates the store, creating `dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Io`] if the directory cannot be created, or
    /// [`ScraperError::Http`] if the HTTP client cannot be built.
    pub fn new(dir: impl Into<PathBuf>, timeout_secs: u64) -> Result<Self, ScraperError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| ScraperError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(BROWSER_USER_AGENT)
            .build()?;

        tracing::info!(dir = %dir.display(), "image store initialized");
        Ok(Self { client, dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ScraperError> {
        tracing::debug!(url, "downloading image");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// Downloads `url` and writes the processed image to `path`.
    async fn store(&self, url: &str, path: &Path) -> Result<(), ScraperError> {
        let bytes = self.download(url).await?;
        let context = url.to_string();
        let processed = tokio::task::spawn_blocking(move || shrink_to_fit(bytes, &context))
            .await
            .map_err(|e| ScraperError::Io {
                path: path.display().to_string(),
                source: std::io::Error::other(e),
            })??;

        tokio::fs::write(path, processed)
            .await
            .map_err(|e| ScraperError::Io {
                path: path.display().to_string(),
                source: e,
            })
    }
}

/// Validates `bytes` as an image and shrinks it to fit within
/// [`MAX_DIMENSION`] on both edges, keeping the aspect ratio.
///
/// Images that already fit are returned untouched. Shrunk images are
/// re-encoded as JPEG, except transparent PNGs which stay PNG.
pub(crate) fn shrink_to_fit(bytes: Vec<u8>, context: &str) -> Result<Vec<u8>, ScraperError> {
    let image_err = |source| ScraperError::Image {
        context: context.to_string(),
        source,
    };

    let format = image::guess_format(&bytes).map_err(image_err)?;
    let img = image::load_from_memory_with_format(&bytes, format).map_err(image_err)?;

    if img.width() <= MAX_DIMENSION && img.height() <= MAX_DIMENSION {
        return Ok(bytes);
    }

    let keep_png = format == ImageFormat::Png && img.color().has_alpha();
    let resized = img.thumbnail(MAX_DIMENSION, MAX_DIMENSION);
    tracing::debug!(
        from_width = img.width(),
        from_height = img.height(),
        width = resized.width(),
        height = resized.height(),
        "resized image"
    );

    let mut out = Cursor::new(Vec::new());
    if keep_png {
        resized
            .write_to(&mut out, ImageFormat::Png)
            .map_err(image_err)?;
    } else {
        DynamicImage::ImageRgb8(flatten_onto_white(&resized))
            .write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))
            .map_err(image_err)?;
    }
    Ok(out.into_inner())
}

/// Composites transparent pixels over white so JPEG output has no black
/// fringes.
fn flatten_onto_white(img: &DynamicImage) -> image::RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    image::RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = u16::from(a);
        let blend = |c: u8| -> u8 {
            let v = (u16::from(c) * alpha + 255 * (255 - alpha)) / 255;
            u8::try_from(v).unwrap_or(u8::MAX)
        };
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

#[async_trait]
impl ImagePreparer for ImageStore {
    async fn prepare(&self, item: &ItemRecord) -> Vec<PreparedImage> {
        let urls: Vec<&str> = std::iter::once(item.image_url.as_str())
            .chain(item.image_url_alt.as_deref())
            .filter(|u| !u.trim().is_empty())
            .collect();

        if urls.is_empty() {
            tracing::warn!(item_id = %item.id, "item has no image URLs");
            return Vec::new();
        }

        let timestamp = unix_now();
        let mut prepared = Vec::with_capacity(urls.len());

        for (i, url) in urls.into_iter().enumerate() {
            let path = self.dir.join(format!("{}_{timestamp}_{i}.jpg", item.id));
            match self.store(url, &path).await {
                Ok(()) => {
                    let alt = if prepared.is_empty() {
                        self.alt_text(item)
                    } else {
                        packaging_alt_text(item)
                    };
                    prepared.push(PreparedImage {
                        path,
                        alt_text: alt,
                    });
                }
                Err(e) => {
                    tracing::warn!(item_id = %item.id, url, error = %e, "failed to prepare image");
                }
            }
        }

        tracing::info!(item_id = %item.id, count = prepared.len(), "prepared images");
        prepared
    }

    fn alt_text(&self, item: &ItemRecord) -> String {
        alt_text(item)
    }

    async fn cleanup(&self, max_age: Duration) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(dir = %self.dir.display(), error = %e, "failed to read image directory");
                return 0;
            }
        };

        let mut deleted = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "failed to list image directory");
                    break;
                }
            };

            let path = entry.path();
            let expired = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta
                    .modified()
                    .ok()
                    .and_then(|m| m.elapsed().ok())
                    .is_some_and(|age| age >= max_age),
                Ok(_) => false,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to stat image");
                    false
                }
            };

            if expired {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => deleted += 1,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "failed to delete image");
                    }
                }
            }
        }

        tracing::info!(deleted, "cleaned up old images");
        deleted
    }
}
