//! Rendering of single pages.
//!
//! Each page context is the target's merged context with the page unit on top,
//! resolved with the page's number. The page template is rendered to SVG in the
//! build directory and converted into a one-page PDF next to it.

use indexmap::IndexSet;
use log::{debug, info};
use rayon::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

use crate::backend::Converter;
use crate::config::{template_path, PageConfig};
use crate::constants::{ARTIFACT_EXTENSION, MARKUP_EXTENSION};
use crate::context::ContextResolver;
use crate::error::{Error, Result, TemplateWarning};
use crate::merge::merge;
use crate::renderer::{MiniJinjaRenderer, TemplateRenderer};
use crate::variant::BuildTarget;

/// A built page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageArtifact {
    pub name: String,
    /// 1-based position in the target's page list
    pub number: usize,
    /// Rendered SVG
    pub markup: PathBuf,
    /// Converted one-page PDF
    pub path: PathBuf,
    pub warnings: Vec<TemplateWarning>,
}

/// Builds the pages of one target.
pub struct PageBuilder<'a> {
    target: &'a BuildTarget,
    converter: &'a dyn Converter,
    renderer: MiniJinjaRenderer,
    dry_run: bool,
}

impl<'a> PageBuilder<'a> {
    pub fn new(target: &'a BuildTarget, converter: &'a dyn Converter) -> Self {
        Self {
            target,
            converter,
            renderer: MiniJinjaRenderer::with_settings(&target.settings),
            dry_run: false,
        }
    }

    /// Renders without writing files or running the converter.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Builds every page of the target, in declared order.
    ///
    /// With `jobs > 1` pages are built on a pool of that many threads; the
    /// result keeps the declared order either way.
    pub fn build_all(&self, jobs: usize) -> Result<Vec<PageArtifact>> {
        if jobs <= 1 || self.target.pages.len() <= 1 {
            return self
                .target
                .pages
                .iter()
                .enumerate()
                .map(|(index, page)| self.build(page, index + 1))
                .collect();
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .map_err(|e| Error::ConfigError(format!("cannot start {jobs} workers: {e}")))?;
        pool.install(|| {
            self.target
                .pages
                .par_iter()
                .enumerate()
                .map(|(index, page)| self.build(page, index + 1))
                .collect()
        })
    }

    /// Builds one page.
    ///
    /// # Arguments
    /// * `page` - Page configuration
    /// * `number` - 1-based page number
    ///
    /// # Errors
    /// * `Error::ImageNotFound` if the page refers to a missing image
    /// * `Error::MinijinjaError` if the template cannot be rendered
    /// * `Error::ConversionError` if the converter fails
    pub fn build(&self, page: &PageConfig, number: usize) -> Result<PageArtifact> {
        let context = merge([&self.target.raw_context, &page.unit.values]);
        let resolver = ContextResolver::new(&self.renderer);
        let resolution =
            resolver.resolve_page(&context, number, &self.target.directories.images)?;

        let template = resolution
            .context
            .get("template")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::ConfigError(format!("page '{}' has no template", page.name))
            })?;
        let template = template_path(template, &self.target.directories.templates, &page.dir());
        if !template.is_file() {
            return Err(Error::ConfigError(format!(
                "template '{}' of page '{}' not found",
                template.display(),
                page.name
            )));
        }

        debug!("Rendering page {} ({}) of {}", number, page.name, self.target.label());
        let rendered = self.renderer.render_file(&template, &Value::Object(resolution.context))?;

        let mut warnings: IndexSet<TemplateWarning> = resolution.warnings.into_iter().collect();
        warnings.extend(rendered.warnings);

        let stem = format!("{}_{}_{:03}", self.target.filename, page.name, number);
        let markup = self.target.directories.build.join(format!("{stem}.{MARKUP_EXTENSION}"));
        let path = self.target.directories.build.join(format!("{stem}.{ARTIFACT_EXTENSION}"));

        if self.dry_run {
            info!("Would convert {} to {}", markup.display(), path.display());
        } else {
            fs::create_dir_all(&self.target.directories.build)?;
            fs::write(&markup, rendered.output)?;
            debug!("Converting {} with {}", markup.display(), self.converter.name());
            self.converter.convert(&markup, &path)?;
        }

        Ok(PageArtifact {
            name: page.name.clone(),
            number,
            markup,
            path,
            warnings: warnings.into_iter().collect(),
        })
    }
}
