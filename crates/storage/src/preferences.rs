use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use anyhow::{Context, Result};
use flow_core::PreferenceStore;
use tracing::debug;

pub const PREFERENCES_FILE: &str = "preferences.json";

/// Boolean flags kept as a JSON object in `<data_dir>/preferences.json`.
pub struct FilePreferences {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FilePreferences {
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir).with_context(|| {
            format!("failed to create data directory '{}'", data_dir.display())
        })?;
        Ok(Self {
            path: data_dir.join(PREFERENCES_FILE),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, bool>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read preferences '{}'", self.path.display())
                })
            }
        };
        serde_json::from_str(&raw)
            .with_context(|| format!("malformed preferences file '{}'", self.path.display()))
    }

    fn write_all(&self, flags: &BTreeMap<String, bool>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(flags).context("failed to encode preferences")?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, bytes)
            .with_context(|| format!("failed to write '{}'", staging.display()))?;
        fs::rename(&staging, &self.path)
            .with_context(|| format!("failed to replace '{}'", self.path.display()))
    }

    /// Removes a flag; returns whether it was set.
    pub fn clear_flag(&self, key: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut flags = self.read_all()?;
        let removed = flags.remove(key).is_some();
        if removed {
            self.write_all(&flags)?;
        }
        Ok(removed)
    }
}

impl PreferenceStore for FilePreferences {
    fn load_flag(&self, key: &str) -> Result<Option<bool>> {
        Ok(self.read_all()?.get(key).copied())
    }

    fn store_flag(&self, key: &str, value: bool) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut flags = self.read_all()?;
        flags.insert(key.to_string(), value);
        self.write_all(&flags)?;
        debug!(key, value, path = %self.path.display(), "stored preference flag");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_core::TUTORIAL_FLAG_KEY;

    #[test]
    fn missing_file_reads_as_unset() {
        let dir = tempfile::tempdir().expect("tempdir");
        let prefs = FilePreferences::open(dir.path()).expect("open");
        assert_eq!(prefs.load_flag(TUTORIAL_FLAG_KEY).expect("load"), None);
    }

    #[test]
    fn stored_flag_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("profile").join("master_fees");
        FilePreferences::open(&nested)
            .expect("open")
            .store_flag(TUTORIAL_FLAG_KEY, true)
            .expect("store");

        let reopened = FilePreferences::open(&nested).expect("reopen");
        assert_eq!(reopened.load_flag(TUTORIAL_FLAG_KEY).expect("load"), Some(true));
        let raw = fs::read_to_string(reopened.path()).expect("raw");
        assert!(raw.contains("\"has_seen_tutorial\": true"), "{raw}");
    }

    #[test]
    fn clear_flag_removes_only_that_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let prefs = FilePreferences::open(dir.path()).expect("open");
        prefs.store_flag(TUTORIAL_FLAG_KEY, true).expect("store");
        prefs.store_flag("compact_receipts", false).expect("store");

        assert!(prefs.clear_flag(TUTORIAL_FLAG_KEY).expect("clear"));
        assert!(!prefs.clear_flag(TUTORIAL_FLAG_KEY).expect("clear again"));
        assert_eq!(prefs.load_flag("compact_receipts").expect("load"), Some(false));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let prefs = FilePreferences::open(dir.path()).expect("open");
        fs::write(prefs.path(), "{not json").expect("write");
        let err = prefs.load_flag(TUTORIAL_FLAG_KEY).expect_err("malformed");
        assert!(err.to_string().contains("malformed preferences file"));
    }
}
