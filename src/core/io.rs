use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Destination for flushed batches of output entries.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Appends `batch` to the persisted collection. An error here is fatal to the run.
    async fn append(&self, batch: Vec<Value>) -> Result<()>;

    /// Human-readable location, used in progress lines.
    fn describe(&self) -> String;
}

/// Output collection stored as one pretty-printed JSON array.
///
/// Every append rewrites the whole file through a temporary sibling that is
/// synced and then renamed over the target, so readers only ever see the old
/// array or the new one.
#[derive(Debug, Clone)]
pub struct JsonArrayFile {
    path: PathBuf,
}

impl JsonArrayFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Strict read used for reporting. Missing file is an empty collection,
    /// anything that is not a JSON array is an error.
    pub fn load(&self) -> Result<Vec<Value>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("{} is not a JSON array", self.path.display()))
    }

    /// Lenient read used before a flush. Unreadable or corrupt content is
    /// replaced by an empty collection.
    fn read_existing(path: &Path) -> Vec<Value> {
        if !path.exists() {
            return Vec::new();
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("{} could not be read ({}). Replacing it.", path.display(), e);
                return Vec::new();
            }
        };

        if content.trim().is_empty() {
            log::warn!("{} is empty. Starting a new collection.", path.display());
            return Vec::new();
        }

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Array(entries)) => entries,
            Ok(_) => {
                log::warn!("{} is not a JSON array. Replacing it.", path.display());
                Vec::new()
            }
            Err(e) => {
                log::warn!("{} is not valid JSON ({}). Replacing it.", path.display(), e);
                Vec::new()
            }
        }
    }

    fn write_atomic(path: &Path, entries: &[Value]) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        // Dropping `tmp` on any early return removes the temporary file.
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, entries)?;
            writer.flush()?;
        }
        // The temp file is created owner-only; the renamed file must not inherit that.
        if let Some(permissions) = Self::target_permissions(path) {
            tmp.as_file().set_permissions(permissions)?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn target_permissions(path: &Path) -> Option<fs::Permissions> {
        if let Ok(metadata) = fs::metadata(path) {
            return Some(metadata.permissions());
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            Some(fs::Permissions::from_mode(0o644))
        }
        #[cfg(not(unix))]
        {
            None
        }
    }

    fn append_blocking(path: &Path, batch: Vec<Value>) -> Result<()> {
        let mut entries = Self::read_existing(path);
        entries.extend(batch);
        Self::write_atomic(path, &entries)
            .with_context(|| format!("Failed to write output file {}", path.display()))
    }
}

#[async_trait]
impl RecordSink for JsonArrayFile {
    async fn append(&self, batch: Vec<Value>) -> Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::append_blocking(&path, batch))
            .await
            .context("Output writer task failed")?
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Writes `content` verbatim, creating parent directories as needed.
pub fn write_text(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
