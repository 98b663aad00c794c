//! HS256 signing secret, persisted so issued tokens survive restarts

use crate::config::OAuthConfig;
use log::{info, warn};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Random bytes in a generated secret
const SECRET_BYTES: usize = 64;

#[derive(Debug, Error)]
pub enum SigningKeyError {
    #[error("Failed to read signing secret from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write signing secret to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Signing secret in {0} is empty")]
    Empty(PathBuf),
}

/// Resolve the signing secret: configured value, else the secret file, else a
/// freshly generated secret written to the secret file.
pub fn load_signing_secret(config: &OAuthConfig) -> Result<String, SigningKeyError> {
    if let Some(secret) = config.jwt_secret.as_ref().filter(|s| !s.is_empty()) {
        info!("Using signing secret from configuration");
        return Ok(secret.clone());
    }

    match config.secret_file_path() {
        Some(path) => load_or_create(&path),
        None => {
            warn!("No home directory for the signing secret file; tokens will not survive a restart");
            Ok(super::random_token(SECRET_BYTES))
        }
    }
}

fn load_or_create(path: &Path) -> Result<String, SigningKeyError> {
    if path.exists() {
        let secret = fs::read_to_string(path).map_err(|source| SigningKeyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let secret = secret.trim().to_string();
        if secret.is_empty() {
            return Err(SigningKeyError::Empty(path.to_path_buf()));
        }
        info!("Loaded signing secret from {}", path.display());
        return Ok(secret);
    }

    let secret = super::random_token(SECRET_BYTES);
    write_owner_only(path, &secret).map_err(|source| SigningKeyError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Generated new signing secret at {}", path.display());
    Ok(secret)
}

fn write_owner_only(path: &Path, secret: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(secret.as_bytes())?;
    file.sync_all()
}
