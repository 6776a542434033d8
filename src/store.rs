//! Small persisted key-value store backed by a dotenv file.
//!
//! Holds the bot token and the comma-separated recipient list. Reads go
//! through `dotenvy` so quoting and comments follow the usual `.env` rules;
//! writes replace only the target key's line and leave everything else as is.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Errors from the persisted store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("store I/O error on {path}: {source}")]
    Io {
        /// Backing file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The backing file is not valid dotenv syntax.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Backing file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// The value cannot be stored on a single line.
    #[error("value for {0} contains a line break")]
    MultilineValue(String),
}

/// Minimal string key-value persistence.
pub trait KeyValueStore: Send {
    /// Fetch a value. Absent keys yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backing storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert or overwrite a value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the value cannot be persisted.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-process store, used for dry runs where nothing should touch disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    vars: BTreeMap<String, String>,
}

impl MemoryStore {
    /// Build a store from existing pairs.
    pub fn from_map(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.vars.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.vars.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// [`KeyValueStore`] persisted in a `.env` file.
#[derive(Debug, Clone)]
pub struct EnvFileStore {
    path: PathBuf,
}

impl EnvFileStore {
    /// Point the store at a dotenv file. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl KeyValueStore for EnvFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "store file absent");
            return Ok(None);
        }

        let iter = dotenvy::from_path_iter(&self.path).map_err(|e| StoreError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        let mut found = None;
        for item in iter {
            let (k, v) = item.map_err(|e| StoreError::Parse {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
            if k == key {
                found = Some(v);
            }
        }
        Ok(found)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        if value.contains('\n') || value.contains('\r') {
            return Err(StoreError::MultilineValue(key.to_owned()));
        }

        let existing = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(self.io_error(e)),
        };

        let rendered = upsert_line(&existing, key, value);
        write_private(&self.path, &rendered).map_err(|e| self.io_error(e))?;
        debug!(path = %self.path.display(), key, "store value written");
        Ok(())
    }
}

/// Replace the first `KEY=` line (also `export KEY=`) or append one.
///
/// Later duplicates of the key are dropped so the file stays unambiguous.
fn upsert_line(contents: &str, key: &str, value: &str) -> String {
    let entry = format!("{key}={value}");
    let mut out: Vec<String> = Vec::new();
    let mut replaced = false;

    for line in contents.lines() {
        if line_defines(line, key) {
            if !replaced {
                out.push(entry.clone());
                replaced = true;
            }
            continue;
        }
        out.push(line.to_owned());
    }
    if !replaced {
        out.push(entry);
    }

    let mut rendered = out.join("\n");
    rendered.push('\n');
    rendered
}

fn line_defines(line: &str, key: &str) -> bool {
    let trimmed = line.trim_start();
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    trimmed
        .strip_prefix(key)
        .is_some_and(|rest| rest.trim_start().starts_with('='))
}

/// Write via a sibling temp file and rename, with owner-only permissions.
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
    }

    fs::rename(&tmp, path)
}
