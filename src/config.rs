//! Configuration handling for pdfbaker.
//! Loads the main, document and page configuration files (JSON or YAML),
//! validates them against their schemas and exposes typed views of the keys
//! pdfbaker understands. All other keys are passed through untouched and end up
//! in the template context.

use log::{debug, trace};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::constants::{
    DEFAULT_DIRECTORIES, DEFAULT_DOCUMENT_CONFIG_FILE, PAGE_CONFIG_EXTENSION, STRUCTURAL_KEYS,
};
use crate::error::{Error, Result};
use crate::merge::{merge, Mapping};
use crate::schema;

/// Position of a configuration unit in the merge chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Main,
    Document,
    Variant,
    Page,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitKind::Main => "main",
            UnitKind::Document => "document",
            UnitKind::Variant => "variant",
            UnitKind::Page => "page",
        };
        write!(f, "{name}")
    }
}

/// One mapping-shaped configuration source at one merge level.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigUnit {
    pub kind: UnitKind,
    /// Human readable origin (file path, or `document[variant]`)
    pub source: String,
    pub values: Mapping,
}

impl ConfigUnit {
    /// Builds a unit from an untyped value, validating it against its schema.
    ///
    /// An empty document (`null`) is an empty unit.
    pub fn from_value<S: Into<String>>(kind: UnitKind, source: S, value: Value) -> Result<Self> {
        let source = source.into();
        let value = match value {
            Value::Null => Value::Object(Mapping::new()),
            Value::Object(_) => value,
            other => {
                return Err(Error::ConfigError(format!(
                    "{kind} configuration '{source}' must be a mapping, got {}",
                    crate::merge::type_name(&other)
                )))
            }
        };
        schema::validate(kind, &source, &value)?;
        let values = match value {
            Value::Object(values) => values,
            _ => Mapping::new(),
        };
        Ok(Self { kind, source, values })
    }

    /// Reads and validates a configuration file.
    pub fn load<P: AsRef<Path>>(kind: UnitKind, path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = load_config(path)?;
        let value = parse_config(&content).map_err(|e| {
            Error::ConfigError(format!("cannot parse '{}': {}", path.display(), e))
        })?;
        Self::from_value(kind, path.display().to_string(), value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// The unit's values without the given keys.
    pub fn without(&self, keys: &[&str]) -> Mapping {
        self.values
            .iter()
            .filter(|(key, _)| !keys.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Reads a configuration file and returns its content.
pub fn load_config<P: AsRef<Path>>(config_path: P) -> Result<String> {
    let config_path = config_path.as_ref();
    if !config_path.is_file() {
        return Err(Error::ConfigError(format!(
            "Invalid configuration path: {}",
            config_path.display()
        )));
    }
    debug!("Loading configuration from {}", config_path.display());
    Ok(fs::read_to_string(config_path)?)
}

/// Parses configuration content, trying JSON first and YAML second.
pub fn parse_config(content: &str) -> Result<Value> {
    match serde_json::from_str(content) {
        Ok(value) => Ok(value),
        Err(_) => Ok(serde_yaml::from_str(content)?),
    }
}

/// File or directory reference in a configuration file.
///
/// Written either as a plain string or as `{path: ..., name: ...}`. The name
/// defaults to the file stem.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawPathSpec")]
pub struct PathSpec {
    pub path: PathBuf,
    pub name: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPathSpec {
    Path(String),
    Spec { path: String, name: Option<String> },
}

impl From<RawPathSpec> for PathSpec {
    fn from(raw: RawPathSpec) -> Self {
        match raw {
            RawPathSpec::Path(path) => PathSpec::new(path),
            RawPathSpec::Spec { path, name } => {
                let mut spec = PathSpec::new(path);
                if let Some(name) = name {
                    spec.name = name;
                }
                spec
            }
        }
    }
}

impl PathSpec {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, name }
    }

    /// Resolves a relative path against `base`; absolute paths are kept.
    pub fn resolve_relative_to(&self, base: &Path) -> PathSpec {
        Self {
            path: resolve_path(&self.path, base),
            name: self.name.clone(),
        }
    }

    /// True for references made of a single path component (`cover`, `cover.yaml`).
    pub fn is_bare(&self) -> bool {
        self.path.components().count() == 1
            && matches!(self.path.components().next(), Some(Component::Normal(_)))
    }
}

const DEFAULT_IMAGE_TYPE: &str = "default";

/// Image reference in a page: a file name, or `{name: ..., type: ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawImageSpec")]
pub struct ImageSpec {
    pub name: String,
    pub kind: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawImageSpec {
    Name(String),
    Spec {
        name: String,
        #[serde(rename = "type")]
        kind: Option<String>,
    },
}

impl From<RawImageSpec> for ImageSpec {
    fn from(raw: RawImageSpec) -> Self {
        let (name, kind) = match raw {
            RawImageSpec::Name(name) => (name, None),
            RawImageSpec::Spec { name, kind } => (name, kind),
        };
        Self { name, kind: kind.unwrap_or_else(|| DEFAULT_IMAGE_TYPE.to_string()) }
    }
}

/// Reads a sequence of path references from a mapping key.
pub fn path_specs(values: &Mapping, key: &str) -> Result<Option<Vec<PathSpec>>> {
    match values.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| Error::ConfigError(format!("invalid '{key}': {e}"))),
    }
}

/// Joins `path` to `base` unless it is absolute, normalizing `.` and `..`.
pub fn resolve_path(path: &Path, base: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// SVG to PDF conversion backend selected by `svg2pdf_backend`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
pub enum ConverterKind {
    #[default]
    #[serde(rename = "cairosvg")]
    CairoSvg,
    #[serde(rename = "inkscape")]
    Inkscape,
    #[serde(rename = "rsvg-convert")]
    RsvgConvert,
}

impl fmt::Display for ConverterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConverterKind::CairoSvg => "cairosvg",
            ConverterKind::Inkscape => "inkscape",
            ConverterKind::RsvgConvert => "rsvg-convert",
        };
        write!(f, "{name}")
    }
}

/// Post-processing passes applied to rendered page markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentRenderer {
    RenderHighlight,
}

/// Filters made available to page templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateFilter {
    Wordwrap,
}

fn default_renderers() -> Vec<ContentRenderer> {
    vec![ContentRenderer::RenderHighlight]
}

fn default_filters() -> Vec<TemplateFilter> {
    vec![TemplateFilter::Wordwrap]
}

fn default_true() -> bool {
    true
}

/// Typed view of the settings that may appear at any merge level.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub svg2pdf_backend: ConverterKind,
    #[serde(default)]
    pub compress_pdf: bool,
    #[serde(default)]
    pub keep_build: bool,
    #[serde(default)]
    pub fail_if_exists: bool,
    #[serde(default = "default_true")]
    pub continue_on_error: bool,
    #[serde(default = "default_renderers")]
    pub template_renderers: Vec<ContentRenderer>,
    #[serde(default = "default_filters")]
    pub template_filters: Vec<TemplateFilter>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            svg2pdf_backend: ConverterKind::default(),
            compress_pdf: false,
            keep_build: false,
            fail_if_exists: false,
            continue_on_error: true,
            template_renderers: default_renderers(),
            template_filters: default_filters(),
        }
    }
}

impl Settings {
    pub fn from_mapping(values: &Mapping) -> Result<Self> {
        serde_json::from_value(Value::Object(values.clone()))
            .map_err(|e| Error::ConfigError(format!("invalid settings: {e}")))
    }
}

/// Resolved (absolute) directory layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directories {
    pub root: PathBuf,
    pub build: PathBuf,
    pub dist: PathBuf,
    pub documents: PathBuf,
    pub pages: PathBuf,
    pub templates: PathBuf,
    pub images: PathBuf,
}

fn directory_entry(raw: &Mapping, key: &str) -> Option<PathBuf> {
    raw.get(key).and_then(Value::as_str).map(PathBuf::from)
}

fn raw_directories(values: &Mapping) -> Mapping {
    values
        .get("directories")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

impl Directories {
    /// Resolves the main configuration's directories relative to `root`.
    pub fn for_main(values: &Mapping, root: &Path) -> Self {
        let raw = raw_directories(values);
        let get = |key: &str| {
            let default = DEFAULT_DIRECTORIES
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, default)| PathBuf::from(default))
                .unwrap_or_default();
            resolve_path(&directory_entry(&raw, key).unwrap_or(default), root)
        };
        Self {
            root: root.to_path_buf(),
            build: get("build"),
            dist: get("dist"),
            documents: get("documents"),
            pages: get("pages"),
            templates: get("templates"),
            images: get("images"),
        }
    }

    /// Derives a document's directories.
    ///
    /// `pages`, `templates` and `images` are relative to the document directory,
    /// using the main configuration's relative names unless the document
    /// overrides them. Build and dist get a per-document subdirectory.
    pub fn for_document(
        main_values: &Mapping,
        main: &Directories,
        document_values: &Mapping,
        document_root: &Path,
        document_name: &str,
    ) -> Self {
        let raw = merge([&raw_directories(main_values), &raw_directories(document_values)]);
        let own = raw_directories(document_values);
        let content_dir = |key: &str| {
            let default = DEFAULT_DIRECTORIES
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, default)| PathBuf::from(default))
                .unwrap_or_default();
            resolve_path(&directory_entry(&raw, key).unwrap_or(default), document_root)
        };
        let output_dir = |key: &str, inherited: &Path| match directory_entry(&own, key) {
            Some(path) => resolve_path(&path, document_root),
            None => inherited.join(document_name),
        };
        Self {
            root: document_root.to_path_buf(),
            build: output_dir("build", &main.build),
            dist: output_dir("dist", &main.dist),
            documents: main.documents.clone(),
            pages: content_dir("pages"),
            templates: content_dir("templates"),
            images: content_dir("images"),
        }
    }

    /// The directories as a context mapping of absolute path strings.
    pub fn to_mapping(&self) -> Mapping {
        [
            ("root", &self.root),
            ("build", &self.build),
            ("dist", &self.dist),
            ("documents", &self.documents),
            ("pages", &self.pages),
            ("templates", &self.templates),
            ("images", &self.images),
        ]
        .into_iter()
        .map(|(key, path)| (key.to_string(), Value::String(path.display().to_string())))
        .collect()
    }
}

/// The main configuration file.
#[derive(Debug, Clone)]
pub struct MainConfig {
    pub path: PathBuf,
    pub unit: ConfigUnit,
    pub documents: Vec<PathSpec>,
    pub directories: Directories,
    pub settings: Settings,
}

impl MainConfig {
    /// Loads the main configuration file.
    ///
    /// # Errors
    /// * `Error::SchemaError` if the `documents` key is missing or a known key has the wrong type
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            resolve_path(path, &std::env::current_dir()?)
        };
        let unit = ConfigUnit::load(UnitKind::Main, &path)?;
        Self::from_unit(path, unit)
    }

    /// Builds the main configuration from an already loaded unit.
    pub fn from_unit(path: PathBuf, unit: ConfigUnit) -> Result<Self> {
        let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let directories = Directories::for_main(&unit.values, &root);
        let documents = path_specs(&unit.values, "documents")?
            .unwrap_or_default()
            .into_iter()
            .map(|doc| doc.resolve_relative_to(&directories.documents))
            .collect();
        let settings = Settings::from_mapping(&unit.values)?;
        trace!("Main configuration: {:?}", unit.values);
        Ok(Self { path, unit, documents, directories, settings })
    }

    /// Names of all configured documents, in configuration order.
    pub fn document_names(&self) -> Vec<String> {
        self.documents.iter().map(|doc| doc.name.clone()).collect()
    }

    /// Settings inherited by every document.
    pub fn document_settings(&self) -> Mapping {
        self.unit.without(&["documents"])
    }
}

/// A variant declared inside a document configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantConfig {
    pub name: String,
    pub pages: Option<Vec<PathSpec>>,
    /// The variant's mapping, exposed to expressions as `variant`
    pub unit: ConfigUnit,
}

impl VariantConfig {
    /// Content overrides merged into the document context.
    pub fn overrides(&self) -> Mapping {
        self.unit.without(&["name", "pages"])
    }
}

/// A document configuration, merged with the main settings.
#[derive(Debug, Clone)]
pub struct DocumentConfig {
    pub name: String,
    pub config_path: PathBuf,
    pub directories: Directories,
    /// Main settings merged with the document's own keys, without structural keys
    pub context: Mapping,
    pub pages: Option<Vec<PathSpec>>,
    pub variants: Vec<VariantConfig>,
    pub custom_bake: Option<String>,
}

impl DocumentConfig {
    /// Loads a document referenced from the main configuration.
    ///
    /// A directory reference means `<dir>/config.yaml`.
    pub fn load(spec: &PathSpec, main: &MainConfig) -> Result<Self> {
        let config_path = if spec.path.is_dir() {
            spec.path.join(DEFAULT_DOCUMENT_CONFIG_FILE)
        } else {
            spec.path.clone()
        };
        let unit = ConfigUnit::load(UnitKind::Document, &config_path)?;
        Self::from_unit(&spec.name, config_path, unit, main)
    }

    pub fn from_unit(
        name: &str,
        config_path: PathBuf,
        unit: ConfigUnit,
        main: &MainConfig,
    ) -> Result<Self> {
        let root = config_path.parent().map(Path::to_path_buf).unwrap_or_default();
        let directories = Directories::for_document(
            &main.unit.values,
            &main.directories,
            &unit.values,
            &root,
            name,
        );

        let mut variants = Vec::new();
        if let Some(Value::Array(raw_variants)) = unit.get("variants") {
            for (index, raw) in raw_variants.iter().enumerate() {
                let source = format!("{name}[variant #{}]", index + 1);
                let variant_unit = ConfigUnit::from_value(UnitKind::Variant, source, raw.clone())?;
                let variant_name = variant_unit
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if variants.iter().any(|v: &VariantConfig| v.name == variant_name) {
                    return Err(Error::ConfigError(format!(
                        "document '{name}' declares variant '{variant_name}' twice"
                    )));
                }
                let pages = path_specs(&variant_unit.values, "pages")?;
                variants.push(VariantConfig { name: variant_name, pages, unit: variant_unit });
            }
        }

        let pages = path_specs(&unit.values, "pages")?;
        let custom_bake = unit.get("custom_bake").and_then(Value::as_str).map(str::to_string);

        let mut context = merge([&main.document_settings(), &unit.without(&STRUCTURAL_KEYS)]);
        context.insert("directories".to_string(), Value::Object(directories.to_mapping()));

        Ok(Self {
            name: name.to_string(),
            config_path,
            directories,
            context,
            pages,
            variants,
            custom_bake,
        })
    }

    /// Resolves a page reference to its configuration file.
    ///
    /// Bare names live in the pages directory; other paths are relative to
    /// the document directory. `.yaml` is added when there is no extension.
    pub fn page_path(&self, spec: &PathSpec) -> PathBuf {
        let mut path = spec.path.clone();
        if path.extension().is_none() {
            path.set_extension(PAGE_CONFIG_EXTENSION);
        }
        if spec.is_bare() {
            resolve_path(&path, &self.directories.pages)
        } else {
            resolve_path(&path, &self.directories.root)
        }
    }
}

/// A page configuration file.
#[derive(Debug, Clone)]
pub struct PageConfig {
    pub name: String,
    pub path: PathBuf,
    pub unit: ConfigUnit,
}

impl PageConfig {
    pub fn load<P: AsRef<Path>>(name: &str, path: P) -> Result<Self> {
        let path = path.as_ref();
        let unit = ConfigUnit::load(UnitKind::Page, path)?;
        Ok(Self { name: name.to_string(), path: path.to_path_buf(), unit })
    }

    /// Directory of the page configuration file.
    pub fn dir(&self) -> PathBuf {
        self.path.parent().map(Path::to_path_buf).unwrap_or_default()
    }
}

/// Resolves a template reference.
///
/// A bare file name lives in the templates directory; anything else is
/// relative to `base` (the page configuration's directory).
pub fn template_path(template: &str, templates_dir: &Path, base: &Path) -> PathBuf {
    let spec = PathSpec::new(template);
    if spec.is_bare() {
        resolve_path(&spec.path, templates_dir)
    } else {
        resolve_path(&spec.path, base)
    }
}
