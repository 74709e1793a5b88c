use crate::error::{Error, Result};
use dashmap::DashMap;
use indexmap::IndexMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::UNIX_EPOCH;

/// A template source that knows its own cache key.
pub trait Source: Send + Sync {
    /// Fingerprint used in the compiled template's cache key.
    fn key(&self) -> Result<String>;
    fn source(&self) -> Result<String>;
}

/// What a loader hands back: template text, or a source with its own key.
#[derive(Clone)]
pub enum Loaded {
    Text(String),
    Source(Arc<dyn Source>),
}

impl From<String> for Loaded {
    fn from(text: String) -> Self {
        Loaded::Text(text)
    }
}

/// Resolves template names to template source.
pub trait Loader: Send + Sync {
    /// Fails with `Error::UnknownTemplate` when `name` does not exist.
    fn load(&self, name: &str) -> Result<Loaded>;

    /// Loaders that accept templates at runtime.
    fn as_mutable(&self) -> Option<&dyn MutableLoader> {
        None
    }

    /// Whether partial names can be looked up here. Only the string loader,
    /// which treats every name as template text, says no.
    fn serves_partials(&self) -> bool {
        true
    }
}

pub trait MutableLoader {
    /// Replace every template.
    fn set_templates(&self, templates: IndexMap<String, String>);
    fn set_template(&self, name: &str, template: &str);
}

/// Treats the template name as the template itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringLoader;

impl Loader for StringLoader {
    fn load(&self, name: &str) -> Result<Loaded> {
        Ok(Loaded::Text(name.to_string()))
    }

    fn serves_partials(&self) -> bool {
        false
    }
}

/// In-memory templates, keyed by name.
#[derive(Default)]
pub struct ArrayLoader {
    templates: DashMap<String, String>,
}

impl ArrayLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_templates<I, K, V>(templates: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let loader = Self::new();
        for (name, template) in templates {
            loader.templates.insert(name.into(), template.into());
        }
        loader
    }

    /// Build from the pairs produced by `template_assets!`.
    pub fn from_assets(assets: Vec<(&'static str, &'static str)>) -> Self {
        Self::with_templates(assets)
    }
}

impl Loader for ArrayLoader {
    fn load(&self, name: &str) -> Result<Loaded> {
        self.templates
            .get(name)
            .map(|t| Loaded::Text(t.value().clone()))
            .ok_or_else(|| Error::UnknownTemplate(name.to_string()))
    }

    fn as_mutable(&self) -> Option<&dyn MutableLoader> {
        Some(self)
    }
}

impl MutableLoader for ArrayLoader {
    fn set_templates(&self, templates: IndexMap<String, String>) {
        self.templates.clear();
        for (name, template) in templates {
            self.templates.insert(name, template);
        }
    }

    fn set_template(&self, name: &str, template: &str) {
        self.templates.insert(name.to_string(), template.to_string());
    }
}

/// Loads `<base_dir>/<name><extension>` files, remembering each one read.
pub struct FilesystemLoader {
    base_dir: PathBuf,
    extension: String,
    templates: DashMap<String, Loaded>,
}

impl FilesystemLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        if !base_dir.is_dir() {
            return Err(Error::Runtime(format!(
                "FilesystemLoader baseDir must be a directory: {}",
                base_dir.display()
            )));
        }

        Ok(Self {
            base_dir: base_dir.canonicalize()?,
            extension: ".mustache".to_string(),
            templates: DashMap::new(),
        })
    }

    /// File extension appended to template names; empty disables it.
    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = match extension.trim_start_matches('.') {
            "" => String::new(),
            ext => format!(".{}", ext),
        };
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn file_name(&self, name: &str) -> PathBuf {
        let mut file_name = format!("{}/{}", self.base_dir.display(), name);
        if !file_name.ends_with(&self.extension) {
            file_name.push_str(&self.extension);
        }
        PathBuf::from(file_name)
    }

    fn load_file(&self, name: &str) -> Result<Loaded> {
        let file_name = self.file_name(name);
        if !file_name.exists() {
            return Err(Error::UnknownTemplate(name.to_string()));
        }
        read_source(&file_name).map(Loaded::Text)
    }
}

impl Loader for FilesystemLoader {
    fn load(&self, name: &str) -> Result<Loaded> {
        if let Some(loaded) = self.templates.get(name) {
            return Ok(loaded.value().clone());
        }
        let loaded = self.load_file(name)?;
        self.templates.insert(name.to_string(), loaded.clone());
        Ok(loaded)
    }
}

/// Like [`FilesystemLoader`], but hands out [`FilesystemSource`]s whose keys
/// come from file metadata, so unchanged files never need re-reading to find
/// their compiled form.
pub struct ProductionFilesystemLoader {
    files: FilesystemLoader,
    stat_props: Vec<String>,
}

const STAT_PROPS: &[&str] = &[
    "size", "mtime", "atime", "ctime", "mode", "ino", "dev", "nlink", "uid", "gid",
];

impl ProductionFilesystemLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            files: FilesystemLoader::new(base_dir)?,
            stat_props: vec!["size".to_string(), "mtime".to_string()],
        })
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.files = self.files.with_extension(extension);
        self
    }

    /// File metadata included in source keys; empty keys on the file name alone.
    pub fn with_stat_props(mut self, props: &[&str]) -> Result<Self> {
        if let Some(unknown) = props.iter().find(|p| !STAT_PROPS.contains(*p)) {
            return Err(Error::InvalidArgument(format!(
                "Unknown stat property: {}",
                unknown
            )));
        }
        self.stat_props = props.iter().map(|p| p.to_string()).collect();
        Ok(self)
    }
}

impl Loader for ProductionFilesystemLoader {
    fn load(&self, name: &str) -> Result<Loaded> {
        if let Some(loaded) = self.files.templates.get(name) {
            return Ok(loaded.value().clone());
        }

        let file_name = self.files.file_name(name);
        if !file_name.exists() {
            return Err(Error::UnknownTemplate(name.to_string()));
        }
        let loaded = Loaded::Source(Arc::new(FilesystemSource::new(
            file_name,
            self.stat_props.clone(),
        )));
        self.files.templates.insert(name.to_string(), loaded.clone());
        Ok(loaded)
    }
}

/// A template file keyed by its name and selected metadata.
pub struct FilesystemSource {
    file_name: PathBuf,
    stat_props: Vec<String>,
    stat: OnceLock<IndexMap<String, serde_json::Value>>,
}

impl FilesystemSource {
    pub fn new(file_name: impl Into<PathBuf>, stat_props: Vec<String>) -> Self {
        Self {
            file_name: file_name.into(),
            stat_props,
            stat: OnceLock::new(),
        }
    }

    fn stat(&self) -> Result<&IndexMap<String, serde_json::Value>> {
        if let Some(stat) = self.stat.get() {
            return Ok(stat);
        }

        let metadata = fs::metadata(&self.file_name).map_err(|e| {
            Error::Runtime(format!(
                "Failed to read source file \"{}\": {}",
                self.file_name.display(),
                e
            ))
        })?;
        let mut stat = IndexMap::new();
        for prop in &self.stat_props {
            stat.insert(prop.clone(), stat_prop(&metadata, prop));
        }
        Ok(self.stat.get_or_init(|| stat))
    }
}

impl Source for FilesystemSource {
    fn key(&self) -> Result<String> {
        let mut chunks = IndexMap::new();
        chunks.insert(
            "fileName".to_string(),
            serde_json::Value::from(self.file_name.display().to_string()),
        );
        if !self.stat_props.is_empty() {
            for (prop, value) in self.stat()? {
                chunks.insert(prop.clone(), value.clone());
            }
        }
        Ok(serde_json::to_string(&chunks)?)
    }

    fn source(&self) -> Result<String> {
        read_source(&self.file_name)
    }
}

fn stat_prop(metadata: &fs::Metadata, prop: &str) -> serde_json::Value {
    let seconds = |time: std::io::Result<std::time::SystemTime>| {
        time.ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
    };

    match prop {
        "size" => metadata.len().into(),
        "mtime" => seconds(metadata.modified()).into(),
        "atime" => seconds(metadata.accessed()).into(),
        #[cfg(unix)]
        other => {
            use std::os::unix::fs::MetadataExt;
            match other {
                "ctime" => metadata.ctime().into(),
                "mode" => metadata.mode().into(),
                "ino" => metadata.ino().into(),
                "dev" => metadata.dev().into(),
                "nlink" => metadata.nlink().into(),
                "uid" => metadata.uid().into(),
                "gid" => metadata.gid().into(),
                _ => serde_json::Value::Null,
            }
        }
        #[cfg(not(unix))]
        _ => serde_json::Value::Null,
    }
}

fn read_source(file_name: &Path) -> Result<String> {
    fs::read_to_string(file_name).map_err(|e| {
        Error::Runtime(format!(
            "Failed to read source file \"{}\": {}",
            file_name.display(),
            e
        ))
    })
}

/// Tries each loader in turn.
#[derive(Default)]
pub struct CascadingLoader {
    loaders: Vec<Arc<dyn Loader>>,
}

impl CascadingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_loader(&mut self, loader: impl Loader + 'static) {
        self.loaders.push(Arc::new(loader));
    }

    pub fn with_loader(mut self, loader: impl Loader + 'static) -> Self {
        self.add_loader(loader);
        self
    }
}

impl Loader for CascadingLoader {
    fn load(&self, name: &str) -> Result<Loaded> {
        for loader in &self.loaders {
            match loader.load(name) {
                Err(Error::UnknownTemplate(_)) => continue,
                other => return other,
            }
        }
        Err(Error::UnknownTemplate(name.to_string()))
    }
}

/// Several templates in one blob, each introduced by an `@@ name` line:
///
/// ```text
/// @@ hello
/// Hello, {{ name }}!
///
/// @@ goodbye
/// Goodbye, {{ name }}.
/// ```
#[derive(Debug, Default)]
pub struct InlineLoader {
    templates: IndexMap<String, String>,
}

impl InlineLoader {
    pub fn new(data: &str) -> Self {
        let mut templates = IndexMap::new();
        let mut current: Option<(String, String)> = None;

        for line in data.split_inclusive('\n') {
            if let Some(name) = template_marker(line) {
                if let Some((name, body)) = current.take() {
                    templates.insert(name, body.trim().to_string());
                }
                current = Some((name.to_string(), String::new()));
            } else if let Some((_, body)) = current.as_mut() {
                body.push_str(line);
            }
        }
        if let Some((name, body)) = current {
            templates.insert(name, body.trim().to_string());
        }

        Self { templates }
    }

    /// Read the blob from `file_name`, starting `offset` bytes in.
    pub fn from_file(file_name: impl AsRef<Path>, offset: usize) -> Result<Self> {
        let file_name = file_name.as_ref();
        if !file_name.is_file() {
            return Err(Error::InvalidArgument(
                "InlineLoader expects a valid filename.".to_string(),
            ));
        }
        let data = read_source(file_name)?;
        let data = data.get(offset..).ok_or_else(|| {
            Error::InvalidArgument("InlineLoader expects a valid file offset.".to_string())
        })?;
        Ok(Self::new(data))
    }
}

/// `@@ name` where the name is word characters and dots.
fn template_marker(line: &str) -> Option<&str> {
    let name = line.trim_end_matches(['\n', '\r']).strip_prefix("@@ ")?;
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.');
    valid.then_some(name)
}

impl Loader for InlineLoader {
    fn load(&self, name: &str) -> Result<Loaded> {
        self.templates
            .get(name)
            .map(|t| Loaded::Text(t.clone()))
            .ok_or_else(|| Error::UnknownTemplate(name.to_string()))
    }
}
