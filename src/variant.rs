//! Expansion of a document into its build targets.
//!
//! A document without variants is a single target. A document with variants
//! becomes one target per variant, each merged between the document and its
//! pages and exposed to expressions as `variant`.

use indexmap::{IndexMap, IndexSet};
use log::{debug, trace};
use serde_json::Value;

use crate::config::{DocumentConfig, Directories, PageConfig, PathSpec, Settings, VariantConfig};
use crate::context::ContextResolver;
use crate::error::{Error, Result};
use crate::merge::{merge, Mapping};

/// One (document, variant) pair ready to be built.
#[derive(Debug, Clone)]
pub struct BuildTarget {
    pub document: String,
    pub variant: Option<String>,
    /// Merged context before expression evaluation; page units merge on top of it
    pub raw_context: Mapping,
    /// `raw_context` with expressions evaluated
    pub context: Mapping,
    pub pages: Vec<PageConfig>,
    pub filename: String,
    pub settings: Settings,
    pub directories: Directories,
}

impl BuildTarget {
    /// `document` or `document[variant]`, for logs and reports.
    pub fn label(&self) -> String {
        match &self.variant {
            Some(variant) => format!("{}[{}]", self.document, variant),
            None => self.document.clone(),
        }
    }
}

/// Expands a document into build targets and checks them for collisions.
///
/// Every page configuration is loaded and validated on the way, so that
/// configuration problems surface before anything is written.
///
/// # Errors
/// * `Error::ConfigError` if pages or the filename are missing
/// * `Error::FilenameCollisionError` if two targets share a filename
pub fn expand(document: &DocumentConfig, resolver: &ContextResolver) -> Result<Vec<BuildTarget>> {
    let mut targets = Vec::new();

    if document.variants.is_empty() {
        let pages = document.pages.as_ref().ok_or_else(|| {
            Error::ConfigError(format!("document '{}' does not declare any pages", document.name))
        })?;
        targets.push(build_target(document, None, document.context.clone(), pages, resolver)?);
    } else {
        if document.pages.is_some() {
            debug!(
                "Document '{}' has variants, ignoring its own pages",
                document.name
            );
        }
        for variant in &document.variants {
            targets.push(variant_target(document, variant, resolver)?);
        }
    }

    check_collisions(&document.name, &targets)?;
    Ok(targets)
}

fn variant_target(
    document: &DocumentConfig,
    variant: &VariantConfig,
    resolver: &ContextResolver,
) -> Result<BuildTarget> {
    let pages = variant.pages.as_ref().ok_or_else(|| {
        Error::ConfigError(format!(
            "variant '{}' of document '{}' does not declare any pages",
            variant.name, document.name
        ))
    })?;
    let mut context = merge([&document.context, &variant.overrides()]);
    context.insert("variant".to_string(), Value::Object(variant.unit.values.clone()));
    build_target(document, Some(variant.name.clone()), context, pages, resolver)
}

fn build_target(
    document: &DocumentConfig,
    variant: Option<String>,
    raw_context: Mapping,
    pages: &[PathSpec],
    resolver: &ContextResolver,
) -> Result<BuildTarget> {
    if pages.is_empty() {
        return Err(Error::ConfigError(format!(
            "document '{}' has an empty page list",
            document.name
        )));
    }
    if !raw_context.contains_key("filename") {
        return Err(Error::ConfigError(format!(
            "document '{}' has no filename",
            document.name
        )));
    }

    // Only the filename and settings are taken from this pass. Keys defined on
    // pages are not merged yet, so undefined references are reported per page.
    let resolution = resolver.resolve(&raw_context)?;
    let filename = match resolution.context.get("filename") {
        Some(Value::String(filename)) if !filename.trim().is_empty() => filename.clone(),
        _ => {
            return Err(Error::ConfigError(format!(
                "filename of document '{}' must be a non-empty string",
                document.name
            )))
        }
    };
    let settings = Settings::from_mapping(&resolution.context)?;

    let pages = pages
        .iter()
        .map(|spec| PageConfig::load(&spec.name, document.page_path(spec)))
        .collect::<Result<Vec<_>>>()?;

    let target = BuildTarget {
        document: document.name.clone(),
        variant,
        raw_context,
        context: resolution.context,
        pages,
        filename,
        settings,
        directories: document.directories.clone(),
    };
    trace!("Build target {}: filename '{}'", target.label(), target.filename);
    Ok(target)
}

fn check_collisions(document: &str, targets: &[BuildTarget]) -> Result<()> {
    let mut by_filename: IndexMap<&str, IndexSet<String>> = IndexMap::new();
    for target in targets {
        by_filename
            .entry(target.filename.as_str())
            .or_default()
            .insert(target.variant.clone().unwrap_or_else(|| target.document.clone()));
    }
    match by_filename.into_iter().find(|(_, owners)| owners.len() > 1) {
        Some((filename, owners)) => Err(Error::FilenameCollisionError {
            document: document.to_string(),
            filename: filename.to_string(),
            variants: owners.into_iter().collect(),
        }),
        None => Ok(()),
    }
}
