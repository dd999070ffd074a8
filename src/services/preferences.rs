//! String-keyed preference flags that survive restarts.

use anyhow::{Context, Result, anyhow};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const DARK_MODE_KEY: &str = "darkMode";

/// Preference store backed by a JSON object file
#[derive(Debug, Clone)]
pub struct Preferences {
    path: PathBuf,
}

impl Preferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location in the user's config directory
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(Self::default_path()?))
    }

    pub fn default_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not find config directory"))?;
        Ok(config_dir.join("dbchat").join("preferences.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load().await?.remove(key))
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.load().await?;
        values.insert(key.to_string(), value.to_string());
        self.store(&values).await
    }

    pub async fn dark_mode(&self) -> Result<bool> {
        Ok(self.get(DARK_MODE_KEY).await?.as_deref() == Some("true"))
    }

    pub async fn set_dark_mode(&self, enabled: bool) -> Result<()> {
        self.set(DARK_MODE_KEY, if enabled { "true" } else { "false" })
            .await
    }

    async fn load(&self) -> Result<BTreeMap<String, String>> {
        match async_fs::read_to_string(&self.path).await {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Corrupt preferences file {}", self.path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read preferences {}", self.path.display())),
        }
    }

    async fn store(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            async_fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(values)?;
        async_fs::write(&self.path, contents)
            .await
            .with_context(|| format!("Failed to write preferences {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dark_mode_round_trips_through_file() {
        smol::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let prefs = Preferences::new(dir.path().join("nested").join("preferences.json"));

            // Missing file reads as light mode
            assert!(!prefs.dark_mode().await.unwrap());

            prefs.set_dark_mode(true).await.unwrap();
            let reopened = Preferences::new(prefs.path());
            assert!(reopened.dark_mode().await.unwrap());
            assert_eq!(reopened.get("darkMode").await.unwrap().as_deref(), Some("true"));

            reopened.set_dark_mode(false).await.unwrap();
            assert!(!prefs.dark_mode().await.unwrap());
        });
    }

    #[test]
    fn test_other_keys_are_preserved() {
        smol::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let prefs = Preferences::new(dir.path().join("preferences.json"));

            prefs.set("lastConnection", "shop").await.unwrap();
            prefs.set_dark_mode(true).await.unwrap();

            assert_eq!(prefs.get("lastConnection").await.unwrap().as_deref(), Some("shop"));
        });
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        smol::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("preferences.json");
            std::fs::write(&path, "not json").unwrap();

            let err = Preferences::new(&path).dark_mode().await.unwrap_err();
            assert!(err.to_string().contains("Corrupt preferences file"));
        });
    }
}
