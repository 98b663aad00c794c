//! The single identity allowed to use this server

use crate::config::CreatorConfig;
use log::warn;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

#[derive(Debug, Deserialize)]
struct CreatorFile {
    user_id: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedCreator {
    modified: SystemTime,
    user_id: Option<String>,
}

#[derive(Debug, Clone)]
enum Source {
    Fixed(Option<String>),
    /// Written by the setup tool; re-read whenever its mtime changes
    File {
        path: PathBuf,
        cache: Arc<RwLock<Option<CachedCreator>>>,
    },
}

/// Read-only view of the configured creator
#[derive(Debug, Clone)]
pub struct CreatorIdentity {
    enforce: bool,
    source: Source,
}

impl CreatorIdentity {
    pub fn from_config(config: &CreatorConfig) -> Self {
        let source = match (&config.user_id, &config.config_file) {
            (Some(user_id), _) => Source::Fixed(Some(user_id.clone())),
            (None, Some(path)) => Source::File {
                path: path.clone(),
                cache: Arc::new(RwLock::new(None)),
            },
            (None, None) => Source::Fixed(None),
        };
        Self {
            enforce: config.enforce,
            source,
        }
    }

    /// Whether only the creator may use the server
    pub fn is_enforced(&self) -> bool {
        self.enforce
    }

    /// The creator's user id, if one is configured
    pub async fn current(&self) -> Option<String> {
        match &self.source {
            Source::Fixed(user_id) => user_id.clone(),
            Source::File { path, cache } => Self::read_file(path, cache).await,
        }
    }

    /// Whether `subject_id` may proceed. With enforcement on and no creator
    /// configured, nobody may.
    pub async fn permits(&self, subject_id: &str) -> bool {
        if !self.enforce {
            return true;
        }
        match self.current().await {
            Some(creator) => creator == subject_id,
            None => {
                warn!("Creator-only access is enforced but no creator is configured");
                false
            }
        }
    }

    async fn read_file(
        path: &Path,
        cache: &RwLock<Option<CachedCreator>>,
    ) -> Option<String> {
        let modified = match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(err) => {
                warn!("Cannot read creator file {}: {}", path.display(), err);
                return None;
            }
        };

        if let Ok(guard) = cache.read() {
            if let Some(cached) = guard.as_ref().filter(|c| c.modified == modified) {
                return cached.user_id.clone();
            }
        }

        let user_id = match tokio::fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice::<CreatorFile>(&bytes) {
                Ok(file) => file.user_id.filter(|id| !id.is_empty()),
                Err(err) => {
                    warn!("Creator file {} is not valid JSON: {}", path.display(), err);
                    None
                }
            },
            Err(err) => {
                warn!("Cannot read creator file {}: {}", path.display(), err);
                None
            }
        };

        if let Ok(mut guard) = cache.write() {
            *guard = Some(CachedCreator {
                modified,
                user_id: user_id.clone(),
            });
        }
        user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    fn config(user_id: Option<&str>, file: Option<PathBuf>) -> CreatorConfig {
        CreatorConfig {
            enforce: true,
            user_id: user_id.map(str::to_string),
            config_file: file,
        }
    }

    #[tokio::test]
    async fn test_fixed_creator() {
        let creator = CreatorIdentity::from_config(&config(Some("creator-id"), None));
        assert_eq!(creator.current().await.as_deref(), Some("creator-id"));
        assert!(creator.permits("creator-id").await);
        assert!(!creator.permits("guest-id").await);
    }

    #[tokio::test]
    async fn test_no_creator_fails_closed() {
        let creator = CreatorIdentity::from_config(&config(None, None));
        assert!(!creator.permits("anyone").await);
    }

    #[tokio::test]
    async fn test_enforcement_off() {
        let creator = CreatorIdentity::from_config(&CreatorConfig {
            enforce: false,
            user_id: None,
            config_file: None,
        });
        assert!(!creator.is_enforced());
        assert!(creator.permits("anyone").await);
    }

    #[tokio::test]
    async fn test_file_creator_is_reloaded_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"user_id": "first-id", "email": "a@example.com"}"#).unwrap();

        let creator = CreatorIdentity::from_config(&config(None, Some(path.clone())));
        assert_eq!(creator.current().await.as_deref(), Some("first-id"));

        // Make sure the modification time moves forward
        tokio::time::sleep(Duration::from_millis(1100)).await;
        fs::write(&path, r#"{"user_id": "second-id"}"#).unwrap();

        assert_eq!(creator.current().await.as_deref(), Some("second-id"));
        assert!(creator.permits("second-id").await);
        assert!(!creator.permits("first-id").await);
    }

    #[tokio::test]
    async fn test_missing_or_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let creator = CreatorIdentity::from_config(&config(None, Some(path.clone())));
        assert!(creator.current().await.is_none());

        fs::write(&path, "not json").unwrap();
        assert!(creator.current().await.is_none());
        assert!(!creator.permits("creator-id").await);
    }
}
