// # File Settings Store
//
// JSON-file implementation of SettingsStore.
//
// ## Purpose
//
// Lets settings be edited out-of-band (by an operator, a deploy tool, or
// another process) and picked up by any watcher polling the file.
//
// ## Read Semantics
//
// - Every lookup re-reads the file; nothing is cached between calls
// - Missing file: the id is "not found" (`Ok(None)`)
// - Malformed JSON or duplicate ids: lookup failure (`Err`), which the
//   watcher logs and retries while keeping its last good snapshot
//
// ## Write Semantics
//
// - Atomic writes: new content goes to a `.tmp` file, then is renamed over
//   the target, so readers never observe a half-written document
// - Backup: the previous file is copied to `.backup` before each write
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "settings": [
//     { "id": "app", "log_level": "info", "workers": 4 }
//   ]
// }
// ```

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;
use crate::traits::{SettingsStore, WatchableSettings};

/// Settings file format version
/// Used for future migration if format changes
const SETTINGS_FILE_VERSION: &str = "1.0";

/// Settings file format, as read
#[derive(Debug, Deserialize)]
struct SettingsFileFormat<S> {
    version: String,
    settings: Vec<S>,
}

/// Settings file format, as written
#[derive(Debug, Serialize)]
struct SettingsFileRef<'a, S> {
    version: &'a str,
    settings: &'a [S],
}

/// File-backed settings store
///
/// # Example
///
/// ```rust,no_run
/// use setwatch_core::store::FileSettingsStore;
/// use setwatch_core::traits::{JsonSettings, SettingsStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileSettingsStore::new("/etc/myapp/settings.json");
///
///     // Atomically replace the file content
///     store.save(&[JsonSettings::new("app").with("workers", 4)]).await?;
///
///     let settings: Option<JsonSettings> = store.find("app").await?;
///     assert!(settings.is_some());
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileSettingsStore<S> {
    path: PathBuf,
    _settings: PhantomData<fn() -> S>,
}

impl<S> FileSettingsStore<S> {
    /// Create a store reading from `path`
    ///
    /// The file does not need to exist yet.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            _settings: PhantomData,
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to backup file
    fn backup_path(&self) -> PathBuf {
        let mut backup = self.path.clone();
        backup.set_extension("backup");
        backup
    }
}

impl<S: DeserializeOwned> FileSettingsStore<S> {
    /// Load every settings object from the file
    ///
    /// A missing file loads as an empty list. Any other read error fails.
    pub async fn load_all(&self) -> Result<Vec<S>, Error> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("Settings file does not exist: {}", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(Error::store(format!(
                    "Failed to read settings file {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let file: SettingsFileFormat<S> = serde_json::from_str(&content).map_err(|e| {
            Error::store(format!(
                "Failed to parse settings file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        if file.version != SETTINGS_FILE_VERSION {
            tracing::warn!(
                "Settings file version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                SETTINGS_FILE_VERSION,
                file.version
            );
        }

        Ok(file.settings)
    }
}

impl<S: Serialize> FileSettingsStore<S> {
    /// Replace the file content atomically
    pub async fn save(&self, settings: &[S]) -> Result<(), Error> {
        let file = SettingsFileRef {
            version: SETTINGS_FILE_VERSION,
            settings,
        };

        let json = serde_json::to_string_pretty(&file)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::store(format!(
                        "Failed to create settings directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        // Write to temporary file first
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await?;
            file.flush().await?;
        }

        // Create backup of current file (if it exists)
        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, self.backup_path()).await {
                tracing::warn!("Failed to create settings backup: {}", e);
            }
        }

        // Atomic rename (temp -> actual)
        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Settings written to file: {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl<S> SettingsStore<S> for FileSettingsStore<S>
where
    S: WatchableSettings + DeserializeOwned,
{
    async fn find(&self, settings_id: &str) -> Result<Option<S>, Error> {
        let mut matches = self
            .load_all()
            .await?
            .into_iter()
            .filter(|settings| settings.id() == settings_id);

        let found = matches.next();
        if matches.next().is_some() {
            return Err(Error::duplicate_id(settings_id));
        }

        Ok(found)
    }

    fn store_name(&self) -> &'static str {
        "file"
    }
}
