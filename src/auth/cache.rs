// Token cache persistence
// Reads and writes the credential blob at a fixed path

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::AuthError;
use crate::identity::SerializableTokenCache;

/// Durable store for the identity library's cache blob
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the blob. A missing file is a first run and yields an empty cache.
    pub fn load(&self) -> Result<SerializableTokenCache, AuthError> {
        let mut cache = SerializableTokenCache::new();

        let blob = match std::fs::read_to_string(&self.path) {
            Ok(blob) => blob,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("No token cache at {}", self.path.display());
                return Ok(cache);
            }
            Err(source) => {
                return Err(AuthError::CacheIo {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        cache.deserialize(&blob)?;
        tracing::debug!(
            "Loaded token cache from {} ({} account(s))",
            self.path.display(),
            cache.accounts().len()
        );
        Ok(cache)
    }

    /// Write the blob back, but only if the library reports a change since load
    pub fn save(&self, cache: &SerializableTokenCache) -> Result<(), AuthError> {
        if !cache.has_state_changed() {
            tracing::debug!("Token cache unchanged, skipping write");
            return Ok(());
        }

        let blob = cache.serialize()?;
        let io_err = |source| AuthError::CacheIo {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(&self.path, blob).map_err(io_err)?;

        // Refresh material is a credential; keep it private to the user
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(io_err)?;
        }

        tracing::info!("Token cache saved to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Account, TokenResponse};
    use tempfile::TempDir;

    fn account() -> Account {
        Account {
            home_account_id: "oid.tid".to_string(),
            environment: "login.microsoftonline.com".to_string(),
            realm: "tid".to_string(),
            username: "adele@contoso.com".to_string(),
            local_account_id: "oid".to_string(),
        }
    }

    fn populated() -> SerializableTokenCache {
        let mut cache = SerializableTokenCache::new();
        cache.add(
            "abc",
            &account(),
            &["Mail.Read"],
            &TokenResponse {
                access_token: Some("at".to_string()),
                refresh_token: Some("rt".to_string()),
                ..Default::default()
            },
            0,
        );
        cache
    }

    #[test]
    fn test_missing_file_is_empty_cache() {
        let dir = TempDir::new().unwrap();
        let store = TokenCache::new(dir.path().join("token_cache.json"));
        let cache = store.load().unwrap();
        assert!(cache.accounts().is_empty());
        assert!(!cache.has_state_changed());
    }

    #[test]
    fn test_save_then_load_keeps_account() {
        let dir = TempDir::new().unwrap();
        let store = TokenCache::new(dir.path().join("nested").join("token_cache.json"));
        store.save(&populated()).unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.accounts(), vec![account()]);
    }

    #[test]
    fn test_unchanged_cache_is_not_written() {
        let dir = TempDir::new().unwrap();
        let store = TokenCache::new(dir.path().join("token_cache.json"));
        store.save(&SerializableTokenCache::new()).unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token_cache.json");
        std::fs::write(&path, "{{{ garbage").unwrap();
        let err = TokenCache::new(&path).load().unwrap_err();
        assert!(matches!(err, AuthError::CacheFormat(_)));
    }

    #[test]
    fn test_unreadable_path_is_cache_io_error() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be read as a file
        let err = TokenCache::new(dir.path()).load().unwrap_err();
        assert!(matches!(err, AuthError::CacheIo { .. }));
    }

    #[test]
    fn test_write_failure_is_cache_io_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();
        let store = TokenCache::new(blocker.join("token_cache.json"));
        let err = store.save(&populated()).unwrap_err();
        assert!(matches!(err, AuthError::CacheIo { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = TokenCache::new(dir.path().join("token_cache.json"));
        store.save(&populated()).unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
