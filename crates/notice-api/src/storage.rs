use anyhow::{Result, bail};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

/// Accepted image types and the extension stored with them.
const IMAGE_TYPES: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

/// Filesystem-backed store for post images.
///
/// Keys look like `posts/{uuid}-{sha256 prefix}.{ext}` and map to
/// `{dir}/posts/...`. Nothing outside that layout is ever opened.
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(dir.join("posts")).await?;
        info!("Image storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    /// A fresh key for `data`, or `None` when the mime type is not accepted.
    pub fn key_for(data: &[u8], mime_type: &str) -> Option<String> {
        let ext = extension_for(mime_type)?;
        let digest = hex::encode(Sha256::digest(data));
        Some(format!("posts/{}-{}.{}", Uuid::new_v4(), &digest[..16], ext))
    }

    fn file_path(&self, key: &str) -> Result<PathBuf> {
        let Some(name) = key.strip_prefix("posts/") else {
            bail!("Image key outside posts/: {}", key);
        };
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
        if !valid {
            bail!("Malformed image key: {}", key);
        }
        Ok(self.dir.join("posts").join(name))
    }

    pub async fn upload_file(&self, data: &[u8], mime_type: &str, key: &str) -> Result<()> {
        if extension_for(mime_type).is_none() {
            bail!("Unsupported image type: {}", mime_type);
        }
        let path = self.file_path(key)?;
        let mut file = fs::File::create(&path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        info!("Stored image {} ({} bytes)", key, data.len());
        Ok(())
    }

    pub async fn read_file(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.file_path(key)?;
        Ok(fs::read(&path).await?)
    }

    pub async fn delete_file(&self, key: &str) -> Result<()> {
        let path = self.file_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted image {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Image {} already gone", key);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

pub fn extension_for(mime_type: &str) -> Option<&'static str> {
    IMAGE_TYPES
        .iter()
        .find(|(mime, _)| mime.eq_ignore_ascii_case(mime_type.trim()))
        .map(|(_, ext)| *ext)
}

/// Content type to serve a stored key with.
pub fn mime_for_key(key: &str) -> &'static str {
    let ext = key.rsplit('.').next().unwrap_or_default();
    IMAGE_TYPES
        .iter()
        .find(|(_, e)| *e == ext)
        .map(|(mime, _)| *mime)
        .unwrap_or("application/octet-stream")
}
