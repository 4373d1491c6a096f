use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use vibecheck_engine::{read_optional, AtomicFileWriter};
use vibecheck_logging::{host_error, host_info, host_warn};

const PREFERENCES_FILENAME: &str = "preferences.ron";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub auto_update: bool,
    /// RFC 3339 timestamp of the last update check that reached the feed.
    pub last_update_check_utc: Option<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            auto_update: true,
            last_update_check_utc: None,
        }
    }
}

/// Loads preferences from `dir`, falling back to defaults when absent or unreadable.
pub fn load_preferences(dir: &Path) -> Preferences {
    let path = dir.join(PREFERENCES_FILENAME);
    let content = match read_optional(&path) {
        Ok(Some(text)) => text,
        Ok(None) => return Preferences::default(),
        Err(err) => {
            host_warn!("Failed to read preferences from {:?}: {}", path, err);
            return Preferences::default();
        }
    };

    match ron::from_str(&content) {
        Ok(preferences) => {
            host_info!("Loaded preferences from {:?}", path);
            preferences
        }
        Err(err) => {
            host_warn!("Failed to parse preferences from {:?}: {}", path, err);
            Preferences::default()
        }
    }
}

pub fn save_preferences(dir: &Path, preferences: &Preferences) {
    let pretty = ron::ser::PrettyConfig::new();
    let content = match ron::ser::to_string_pretty(preferences, pretty) {
        Ok(text) => text,
        Err(err) => {
            host_error!("Failed to serialize preferences: {}", err);
            return;
        }
    };

    let writer = AtomicFileWriter::new(dir.to_path_buf());
    if let Err(err) = writer.write(PREFERENCES_FILENAME, &content) {
        host_error!("Failed to write preferences to {:?}: {}", dir, err);
    }
}

/// In-memory preferences plus the directory they are saved to.
///
/// Mutators only touch memory; callers decide when to save. Background saves
/// are ordered by generation so an older snapshot never overwrites a newer one.
#[derive(Debug, Clone)]
pub struct PreferencesStore {
    dir: Option<PathBuf>,
    current: Preferences,
    generation: u64,
    written: Arc<Mutex<u64>>,
}

impl PreferencesStore {
    pub fn open(dir: Option<PathBuf>) -> Self {
        let current = dir.as_deref().map(load_preferences).unwrap_or_default();
        Self::with(dir, current)
    }

    pub fn in_memory(current: Preferences) -> Self {
        Self::with(None, current)
    }

    fn with(dir: Option<PathBuf>, current: Preferences) -> Self {
        Self {
            dir,
            current,
            generation: 0,
            written: Arc::new(Mutex::new(0)),
        }
    }

    pub fn get(&self) -> &Preferences {
        &self.current
    }

    /// Returns whether the value changed.
    pub fn set_auto_update(&mut self, enabled: bool) -> bool {
        if self.current.auto_update == enabled {
            return false;
        }
        self.current.auto_update = enabled;
        self.generation += 1;
        true
    }

    pub fn record_check(&mut self, at: DateTime<Utc>) {
        self.current.last_update_check_utc = Some(at.to_rfc3339_opts(SecondsFormat::Secs, true));
        self.generation += 1;
    }

    /// Writes the current snapshot on the calling thread.
    pub fn save(&self) {
        if let Some(dir) = &self.dir {
            save_preferences(dir, &self.current);
        }
    }

    /// Writes the current snapshot on tokio's blocking pool. `None` when there is no directory.
    pub fn save_in_background(&self) -> Option<JoinHandle<()>> {
        let dir = self.dir.clone()?;
        let snapshot = self.current.clone();
        let generation = self.generation;
        let written = self.written.clone();
        Some(tokio::task::spawn_blocking(move || {
            let Ok(mut last) = written.lock() else {
                host_error!("Preferences writer lock poisoned; skipping save");
                return;
            };
            if *last > generation {
                return;
            }
            save_preferences(&dir, &snapshot);
            *last = generation;
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::Preferences;

    #[test]
    fn missing_fields_take_defaults() {
        let preferences: Preferences = ron::from_str("(last_update_check_utc: None)").unwrap();
        assert!(preferences.auto_update);
    }
}
