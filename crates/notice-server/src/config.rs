use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

/// 5 MB
const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub image_dir: PathBuf,
    pub max_image_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = var("NOTICE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!(
                "NOTICE_JWT_SECRET is unset or still a placeholder; \
                 it must match the identity provider's signing secret"
            );
        }

        let port = match var("NOTICE_PORT") {
            Some(raw) => raw.parse().with_context(|| format!("invalid NOTICE_PORT '{}'", raw))?,
            None => 3000,
        };
        let max_image_bytes = match var("NOTICE_MAX_IMAGE_BYTES") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid NOTICE_MAX_IMAGE_BYTES '{}'", raw))?,
            None => DEFAULT_MAX_IMAGE_BYTES,
        };

        Ok(Self {
            jwt_secret,
            db_path: var("NOTICE_DB_PATH").unwrap_or_else(|| "noticeboard.db".into()).into(),
            host: var("NOTICE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            image_dir: var("NOTICE_IMAGE_DIR").unwrap_or_else(|| "./images".into()).into(),
            max_image_bytes,
        })
    }
}
