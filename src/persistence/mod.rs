//! Durable storage: a JSON file per concern under the app data directory,
//! and the single-slot store for "what is currently on screen".

use std::{
    fs,
    path::PathBuf,
    sync::Mutex,
};

use log::{
    debug,
    warn,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::core::{
    CompanionError,
    StoredSelection,
};

const APP_NAME: &str = "ankiglance";
const SELECTION_FILE: &str = "selection.json";

pub fn get_app_data_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        let app_dir = data_dir.join(APP_NAME);
        let _ = fs::create_dir_all(&app_dir);
        app_dir
    } else {
        PathBuf::from(".")
    }
}

pub fn get_data_file_path(filename: &str) -> PathBuf {
    get_app_data_dir().join(filename)
}

pub fn save_json<T: Serialize>(data: &T, filename: &str) -> Result<(), CompanionError> {
    let file_path = get_data_file_path(filename);
    let json = serde_json::to_string_pretty(data)?;
    fs::write(&file_path, json)?;
    debug!("data saved to {}", file_path.display());
    Ok(())
}

pub fn load_json<T: for<'de> Deserialize<'de> + Default>(
    filename: &str,
) -> Result<T, CompanionError> {
    let file_path = get_data_file_path(filename);
    if !file_path.exists() {
        return Ok(T::default());
    }
    let json = fs::read_to_string(&file_path)?;
    let data: T = serde_json::from_str(&json)?;
    Ok(data)
}

pub fn load_json_or_default<T: for<'de> Deserialize<'de> + Default>(filename: &str) -> T {
    match load_json::<T>(filename) {
        Ok(data) => data,
        Err(err) => {
            warn!("failed to load {filename}: {err}; using defaults");
            T::default()
        }
    }
}

/// Single-slot, last-write-wins record of the current selection. Reads of
/// malformed state yield `None`; the next successful selection overwrites it.
pub trait StateStore {
    fn get(&self) -> Option<StoredSelection>;
    fn put(&self, selection: &StoredSelection);
}

/// File-backed store, durable across process restarts.
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new() -> Self {
        JsonStateStore { path: get_data_file_path(SELECTION_FILE) }
    }

    pub fn with_path(path: PathBuf) -> Self {
        JsonStateStore { path }
    }
}

impl Default for JsonStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for JsonStateStore {
    fn get(&self) -> Option<StoredSelection> {
        let json = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&json) {
            Ok(selection) => Some(selection),
            Err(err) => {
                // Unparsable state is "no selection", not an error.
                debug!("ignoring malformed stored selection: {err}");
                None
            }
        }
    }

    fn put(&self, selection: &StoredSelection) {
        let json = match serde_json::to_string_pretty(selection) {
            Ok(json) => json,
            Err(err) => {
                warn!("failed to encode selection: {err}");
                return;
            }
        };
        if let Err(err) = fs::write(&self.path, json) {
            warn!("failed to persist selection: {err}");
        }
    }
}

/// In-memory store for tests and embedding contexts that bring their own
/// persistence.
#[derive(Default)]
pub struct MemoryStateStore {
    slot: Mutex<Option<StoredSelection>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self) -> Option<StoredSelection> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }

    fn put(&self, selection: &StoredSelection) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(selection.clone());
        }
    }
}
