use async_trait::async_trait;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::{Component, Path, PathBuf};

use crate::error::{JournalError, Result};

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "webp", "bmp"];

/// Blob storage for trade screenshots.
#[async_trait]
pub trait ScreenshotStore: Send + Sync {
    /// Store an image for `user_id` and return the url to save on the trade.
    async fn upload(&self, user_id: &str, file_name: &str, bytes: &[u8]) -> Result<String>;

    /// Release the blob behind a url previously returned by `upload` for `user_id`.
    async fn remove(&self, user_id: &str, url: &str) -> Result<()>;

    /// Whether `url` points at a blob stored under `user_id`.
    fn owns(&self, user_id: &str, url: &str) -> bool {
        screenshot_key(url).is_some_and(|key| {
            key.split('/').next() == Some(user_id)
                && key.split('/').all(|segment| !matches!(segment, "" | "." | ".."))
        })
    }
}

/// Storage key of a screenshot url: everything after `/public/`.
pub fn screenshot_key(url: &str) -> Option<&str> {
    url.split_once("/public/")
        .map(|(_, key)| key)
        .filter(|key| !key.is_empty())
}

/// Stores screenshots on the local filesystem as `<root>/<user_id>/<millis>_<rand>.<ext>`.
pub struct FsScreenshotStore {
    root: PathBuf,
    base_url: String,
}

impl FsScreenshotStore {
    pub fn new(root: PathBuf, base_url: impl Into<String>) -> Self {
        Self {
            root,
            base_url: base_url.into(),
        }
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/public/{}", self.base_url, key)
    }

    /// Resolve a stored url back to a path under the root.
    pub fn path_for_url(&self, url: &str) -> Result<PathBuf> {
        let key = screenshot_key(url).ok_or_else(|| JournalError::Storage(format!("Not a screenshot url: {}", url)))?;

        let relative = Path::new(key);
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(JournalError::Storage(format!("Refusing screenshot key outside store: {}", key)));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ScreenshotStore for FsScreenshotStore {
    async fn upload(&self, user_id: &str, file_name: &str, bytes: &[u8]) -> Result<String> {
        let ext = image_extension(file_name)
            .ok_or_else(|| JournalError::Validation(format!("Not an image file: {}", file_name)))?;
        if user_id.is_empty() || !user_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(JournalError::Validation(format!("Invalid user id for storage: {}", user_id)));
        }
        if bytes.is_empty() {
            return Err(JournalError::Validation("Screenshot is empty".to_string()));
        }

        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(10)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        let key = format!("{}/{}_{}.{}", user_id, Utc::now().timestamp_millis(), suffix, ext);

        let path = self.root.join(&key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        log::debug!("Stored screenshot {} ({} bytes)", key, bytes.len());

        Ok(self.public_url(&key))
    }

    async fn remove(&self, user_id: &str, url: &str) -> Result<()> {
        if !self.owns(user_id, url) {
            return Err(JournalError::Storage(format!(
                "Screenshot {} does not belong to user {}",
                url, user_id
            )));
        }
        let path = self.path_for_url(url)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            // Already gone is fine
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn image_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?.to_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}
