// src/config.rs

use std::fs;
use std::path::{Path, PathBuf};

use gio::prelude::*;
use log::debug;

use crate::error::{Error, Result};

pub const SCHEMA_ID: &str = "org.freedesktop.PackageKit.gpk";

/// Offer driver packages when new hardware shows up.
pub const PROMPT_HARDWARE: &str = "prompt-hardware";
/// Include debug and development sources in the source list.
pub const REPO_SHOW_DETAILS: &str = "repo-show-details";

const KEY_FILE_GROUP: &str = "gpk";

pub fn default_bool(key: &str) -> Option<bool> {
    match key {
        PROMPT_HARDWARE => Some(true),
        REPO_SHOW_DETAILS => Some(false),
        _ => None,
    }
}

fn unknown_key(key: &str) -> Error {
    Error::Config(format!("unknown key '{}'", key))
}

/// String-keyed persistent settings.
pub trait ConfigStore {
    fn get_bool(&self, key: &str) -> Result<bool>;
    fn set_bool(&mut self, key: &str, value: bool) -> Result<()>;
}

/// GSettings storage, used when the schema is installed.
pub struct GSettingsStore {
    settings: gio::Settings,
    schema: gio::SettingsSchema,
}

impl GSettingsStore {
    pub fn new(schema_id: &str) -> Option<Self> {
        let schema = gio::SettingsSchemaSource::default()?.lookup(schema_id, true)?;
        let settings = gio::Settings::new(schema_id);
        Some(Self { settings, schema })
    }

    fn check_key(&self, key: &str) -> Result<()> {
        if self.schema.has_key(key) {
            Ok(())
        } else {
            Err(unknown_key(key))
        }
    }
}

impl ConfigStore for GSettingsStore {
    fn get_bool(&self, key: &str) -> Result<bool> {
        self.check_key(key)?;
        Ok(self.settings.boolean(key))
    }

    fn set_bool(&mut self, key: &str, value: bool) -> Result<()> {
        self.check_key(key)?;
        debug!("setting {} to {}", key, value);
        self.settings
            .set_boolean(key, value)
            .map_err(|err| Error::Config(err.to_string()))?;
        gio::Settings::sync();
        Ok(())
    }
}

/// Key file storage under the user config directory.
pub struct KeyFileStore {
    path: PathBuf,
    keyfile: glib::KeyFile,
}

impl KeyFileStore {
    pub fn open(path: &Path) -> Result<Self> {
        let keyfile = glib::KeyFile::new();
        if path.exists() {
            keyfile.load_from_file(path, glib::KeyFileFlags::KEEP_COMMENTS)?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            keyfile,
        })
    }

    pub fn default_path() -> PathBuf {
        glib::user_config_dir().join("gpk-tools").join("settings.ini")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for KeyFileStore {
    fn get_bool(&self, key: &str) -> Result<bool> {
        let default = default_bool(key).ok_or_else(|| unknown_key(key))?;
        // A missing or unreadable value answers the default.
        Ok(self.keyfile.boolean(KEY_FILE_GROUP, key).unwrap_or(default))
    }

    fn set_bool(&mut self, key: &str, value: bool) -> Result<()> {
        if default_bool(key).is_none() {
            return Err(unknown_key(key));
        }
        debug!("setting {} to {} in {}", key, value, self.path.display());
        self.keyfile.set_boolean(KEY_FILE_GROUP, key, value);
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        self.keyfile.save_to_file(&self.path)?;
        Ok(())
    }
}

/// GSettings when the schema is installed, otherwise the user key file.
pub fn open_default() -> Result<Box<dyn ConfigStore>> {
    if let Some(store) = GSettingsStore::new(SCHEMA_ID) {
        return Ok(Box::new(store));
    }
    let path = KeyFileStore::default_path();
    debug!("schema {} not installed, using {}", SCHEMA_ID, path.display());
    Ok(Box::new(KeyFileStore::open(&path)?))
}
