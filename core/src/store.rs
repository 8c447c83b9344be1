/// Local key-value flags (access token, dark mode) persisted in sled DB
/// Values are stored JSON-encoded under fixed keys.
use crate::error::{BazaarError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

const ACCESS_TOKEN_KEY: &str = "@access-token";
const DARK_MODE_KEY: &str = "isDark";

pub struct LocalStore {
    db: sled::Db,
}

impl LocalStore {
    /// Open (or create) the store under `data_dir`
    pub fn open(data_dir: &Path) -> Result<Self> {
        let db = sled::open(data_dir.join("local.db"))
            .map_err(|e| BazaarError::Storage(format!("Failed to open local DB: {}", e)))?;
        Ok(Self { db })
    }

    /// Throwaway store for tests and one-shot tools
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| BazaarError::Storage(format!("Failed to open temporary DB: {}", e)))?;
        Ok(Self { db })
    }

    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.db.get(key.as_bytes())? {
            Some(val) => Ok(Some(serde_json::from_slice(&val)?)),
            None => Ok(None),
        }
    }

    fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let val = serde_json::to_vec(value)?;
        self.db.insert(key.as_bytes(), val)?;
        self.db.flush()?;
        Ok(())
    }

    pub fn access_token(&self) -> Result<Option<String>> {
        self.get(ACCESS_TOKEN_KEY)
    }

    pub fn set_access_token(&self, token: &str) -> Result<()> {
        self.set(ACCESS_TOKEN_KEY, &token)
    }

    /// Returns whether a token was present
    pub fn clear_access_token(&self) -> Result<bool> {
        let removed = self.db.remove(ACCESS_TOKEN_KEY.as_bytes())?;
        self.db.flush()?;
        Ok(removed.is_some())
    }

    pub fn is_dark(&self) -> Result<bool> {
        Ok(self.get::<bool>(DARK_MODE_KEY)?.unwrap_or(false))
    }

    pub fn set_dark(&self, dark: bool) -> Result<()> {
        self.set(DARK_MODE_KEY, &dark)
    }
}

impl Clone for LocalStore {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LocalStore::open(dir.path()).unwrap();
            assert_eq!(store.access_token().unwrap(), None);
            store.set_access_token("tok-123").unwrap();
        }
        let store = LocalStore::open(dir.path()).unwrap();
        assert_eq!(store.access_token().unwrap().as_deref(), Some("tok-123"));
        assert!(store.clear_access_token().unwrap());
        assert!(!store.clear_access_token().unwrap());
        assert_eq!(store.access_token().unwrap(), None);
    }

    #[test]
    fn test_token_is_json_encoded() {
        let store = LocalStore::temporary().unwrap();
        store.set_access_token("abc").unwrap();
        let raw = store.db.get(ACCESS_TOKEN_KEY).unwrap().unwrap();
        assert_eq!(&raw[..], br#""abc""#);
    }

    #[test]
    fn test_dark_mode_defaults_to_light() {
        let store = LocalStore::temporary().unwrap();
        assert!(!store.is_dark().unwrap());
        store.set_dark(true).unwrap();
        assert!(store.is_dark().unwrap());
    }
}
