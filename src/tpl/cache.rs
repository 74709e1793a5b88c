use crate::error::{Error, Result};
use dashmap::DashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Storage for compiled templates, keyed by template class name.
///
/// A reader must never observe a partially written entry.
pub trait Cache: Send + Sync {
    /// The compiled form stored under `key`, if any.
    fn load(&self, key: &str) -> Result<Option<String>>;

    /// Store a freshly compiled template. Repeating a key is harmless.
    fn cache(&self, key: &str, compiled: &str) -> Result<()>;
}

/// Never stores anything; every template is compiled in-process.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl Cache for NoopCache {
    fn load(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn cache(&self, key: &str, _compiled: &str) -> Result<()> {
        warn!(class_name = key, "Template cache disabled, compiling at runtime");
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Cache for MemoryCache {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    fn cache(&self, key: &str, compiled: &str) -> Result<()> {
        self.entries.insert(key.to_string(), compiled.to_string());
        Ok(())
    }
}

/// Compiled templates as `<base_dir>/<key>.json` files.
///
/// Files are written next to their final location and renamed into place.
pub struct FilesystemCache {
    base_dir: PathBuf,
    file_mode: Option<u32>,
}

impl FilesystemCache {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            file_mode: None,
        }
    }

    /// Permissions for cache files (unix only). Defaults to `0o644`.
    pub fn with_file_mode(mut self, mode: u32) -> Self {
        self.file_mode = Some(mode);
        self
    }

    pub fn file_name(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", key))
    }

    fn build_directory(&self, file_name: &Path) -> Result<PathBuf> {
        let dir = file_name.parent().unwrap_or(&self.base_dir).to_path_buf();
        if !dir.is_dir() {
            info!(dir = %dir.display(), "Creating template cache directory");
            fs::create_dir_all(&dir).map_err(|e| {
                Error::Runtime(format!(
                    "Failed to create cache directory \"{}\": {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        Ok(dir)
    }

    fn write_file(&self, file_name: &Path, compiled: &str) -> Result<()> {
        let dir = self.build_directory(file_name)?;
        debug!(file = %file_name.display(), "Caching compiled template");

        let write_failed = |e: std::io::Error| {
            Error::Runtime(format!(
                "Failed to write cache file \"{}\": {}",
                file_name.display(),
                e
            ))
        };

        let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(write_failed)?;
        temp.write_all(compiled.as_bytes()).map_err(write_failed)?;
        temp.flush().map_err(write_failed)?;

        if let Err(e) = temp.persist(file_name) {
            error!(
                temp = %e.file.path().display(),
                file = %file_name.display(),
                "Unable to rename temp cache file"
            );
            return Err(write_failed(e.error));
        }

        self.set_mode(file_name).map_err(write_failed)
    }

    #[cfg(unix)]
    fn set_mode(&self, file_name: &Path) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let mode = self.file_mode.unwrap_or(0o644);
        fs::set_permissions(file_name, fs::Permissions::from_mode(mode))
    }

    #[cfg(not(unix))]
    fn set_mode(&self, _file_name: &Path) -> std::io::Result<()> {
        Ok(())
    }
}

impl Cache for FilesystemCache {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let file_name = self.file_name(key);
        if !file_name.is_file() {
            return Ok(None);
        }
        fs::read_to_string(&file_name).map(Some).map_err(|e| {
            Error::Runtime(format!(
                "Failed to read cache file \"{}\": {}",
                file_name.display(),
                e
            ))
        })
    }

    fn cache(&self, key: &str, compiled: &str) -> Result<()> {
        let file_name = self.file_name(key);
        debug!(file = %file_name.display(), "Writing to template cache");
        self.write_file(&file_name, compiled)
    }
}
