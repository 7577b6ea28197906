//! Orchestration of a bake run.
//!
//! A run first validates every selected document: configuration files are
//! loaded and checked, variants expanded, filenames resolved and processors
//! chosen. Only then is the build area touched. Documents are processed one
//! after another; a failure is confined to its document unless the run is
//! configured to stop at the first one.

use log::{error, info, warn};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::backend::Backends;
use crate::config::{DocumentConfig, MainConfig, PathSpec, Settings};
use crate::context::ContextResolver;
use crate::document::{DocumentAssembler, FinalArtifact};
use crate::error::{Error, Result, Warning};
use crate::hooks::{DocumentHandle, HookRegistry, Pipeline, ProcessingHook, Processor};
use crate::logger::section;
use crate::page::PageBuilder;
use crate::renderer::MiniJinjaRenderer;
use crate::variant::{expand, BuildTarget};
use crate::workspace::{check_build_dir, Workspace};

/// Run-wide switches, usually from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BakerOptions {
    /// Keep the build directory (also settable in the main configuration)
    pub keep_build: bool,
    /// Render everything but write nothing
    pub dry_run: bool,
    /// Never overwrite an existing document
    pub fail_if_exists: bool,
    /// Stop at the first failed document
    pub fail_fast: bool,
    /// Number of pages built in parallel
    pub jobs: usize,
}

impl Default for BakerOptions {
    fn default() -> Self {
        Self { keep_build: false, dry_run: false, fail_if_exists: false, fail_fast: false, jobs: 1 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentStatus {
    Completed,
    CompletedWithWarnings,
    Failed(String),
    Skipped,
}

/// Result of processing one document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentOutcome {
    pub name: String,
    pub status: DocumentStatus,
    pub artifacts: Vec<FinalArtifact>,
}

impl DocumentOutcome {
    fn finished(name: &str, artifacts: Vec<FinalArtifact>) -> Self {
        let status = if artifacts.iter().any(|artifact| !artifact.warnings.is_empty()) {
            DocumentStatus::CompletedWithWarnings
        } else {
            DocumentStatus::Completed
        };
        Self { name: name.to_string(), status, artifacts }
    }

    pub fn warnings(&self) -> Vec<&Warning> {
        let mut warnings: Vec<&Warning> = Vec::new();
        for warning in self.artifacts.iter().flat_map(|artifact| artifact.warnings.iter()) {
            if !warnings.contains(&warning) {
                warnings.push(warning);
            }
        }
        warnings
    }
}

/// What a run did, document by document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BakeReport {
    pub outcomes: Vec<DocumentOutcome>,
    pub dry_run: bool,
}

impl BakeReport {
    pub fn artifacts(&self) -> impl Iterator<Item = &FinalArtifact> {
        self.outcomes.iter().flat_map(|outcome| outcome.artifacts.iter())
    }

    pub fn with_status<F: Fn(&DocumentStatus) -> bool>(&self, filter: F) -> Vec<&DocumentOutcome> {
        self.outcomes.iter().filter(|outcome| filter(&outcome.status)).collect()
    }

    /// True when every document was built.
    pub fn success(&self) -> bool {
        self.outcomes.iter().all(|outcome| {
            matches!(
                outcome.status,
                DocumentStatus::Completed | DocumentStatus::CompletedWithWarnings
            )
        })
    }

    /// Logs the closing summary of a run.
    pub fn log_summary(&self) {
        info!("{}", section("Summary"));
        let created = self.artifacts().count();
        let verb = if self.dry_run { "Would have created" } else { "Created" };
        info!("{} {} PDF{}", verb, created, if created == 1 { "" } else { "s" });
        for artifact in self.artifacts() {
            info!("  {}", artifact.path.display());
        }

        let with_warnings = self.with_status(|s| *s == DocumentStatus::CompletedWithWarnings);
        if !with_warnings.is_empty() {
            warn!("{} document(s) completed with warnings:", with_warnings.len());
            for outcome in with_warnings {
                for warning in outcome.warnings() {
                    warn!("  {}: {}", outcome.name, warning);
                }
            }
        }

        let failed = self.with_status(|s| matches!(s, DocumentStatus::Failed(_)));
        if !failed.is_empty() {
            error!("Failed to process {} document(s):", failed.len());
            for outcome in failed {
                if let DocumentStatus::Failed(reason) = &outcome.status {
                    error!("  {}: {}", outcome.name, reason);
                }
            }
        }

        let skipped = self.with_status(|s| *s == DocumentStatus::Skipped);
        if !skipped.is_empty() {
            let names: Vec<&str> = skipped.iter().map(|outcome| outcome.name.as_str()).collect();
            warn!("Skipped {} document(s): {}", skipped.len(), names.join(", "));
        }
    }
}

/// A document that passed validation.
struct PlannedDocument {
    config: DocumentConfig,
    processor: Processor,
    targets: Vec<BuildTarget>,
}

/// Expands a document with the filters configured for it.
fn expand_document(document: &DocumentConfig) -> Result<Vec<BuildTarget>> {
    let settings = Settings::from_mapping(&document.context)?;
    let renderer = MiniJinjaRenderer::with_settings(&settings);
    expand(document, &ContextResolver::new(&renderer))
}

struct DefaultPipeline<'a> {
    backends: &'a Backends,
    options: &'a BakerOptions,
    /// Documents already moved to their destination, kept when a later target fails
    delivered: Mutex<Vec<FinalArtifact>>,
}

impl<'a> DefaultPipeline<'a> {
    fn new(backends: &'a Backends, options: &'a BakerOptions) -> Self {
        Self { backends, options, delivered: Mutex::new(Vec::new()) }
    }

    /// Hands out what was delivered since the last call.
    fn take_delivered(&self) -> Vec<FinalArtifact> {
        let mut delivered = self.delivered.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *delivered)
    }

    fn build_targets(&self, targets: &[BuildTarget]) -> Result<Vec<FinalArtifact>> {
        let assembler = DocumentAssembler::new(self.backends.combiner(), self.backends.compressor())
            .dry_run(self.options.dry_run)
            .fail_if_exists(self.options.fail_if_exists);
        for target in targets {
            assembler.check_destination(target)?;
        }
        targets
            .iter()
            .map(|target| {
                info!("Building {} ({} pages)", target.label(), target.pages.len());
                let converter = self.backends.converter(target.settings.svg2pdf_backend)?;
                let pages = PageBuilder::new(target, converter)
                    .dry_run(self.options.dry_run)
                    .build_all(self.options.jobs)?;
                let artifact = assembler.assemble(target, &pages)?;
                self.delivered
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(artifact.clone());
                Ok(artifact)
            })
            .collect()
    }
}

impl Pipeline for DefaultPipeline<'_> {
    fn run(&self, document: &DocumentConfig) -> Result<Vec<FinalArtifact>> {
        let targets = expand_document(document)?;
        self.build_targets(&targets)
    }
}

/// Builds the documents of one main configuration.
pub struct Baker {
    main: MainConfig,
    options: BakerOptions,
    backends: Backends,
    hooks: HookRegistry,
}

impl Baker {
    /// Loads the main configuration.
    ///
    /// # Errors
    /// * `Error::ConfigError` or `Error::SchemaError` if the file is missing or invalid
    pub fn new<P: AsRef<Path>>(config_file: P, options: BakerOptions) -> Result<Self> {
        let main = MainConfig::load(config_file)?;
        Ok(Self::from_main(main, options))
    }

    pub fn from_main(main: MainConfig, options: BakerOptions) -> Self {
        Self { main, options, backends: Backends::system(), hooks: HookRegistry::new() }
    }

    /// Replaces the conversion, combination and compression backends.
    pub fn with_backends(mut self, backends: Backends) -> Self {
        self.backends = backends;
        self
    }

    /// Makes a hook available to documents through `custom_bake: <name>`.
    pub fn register_hook<S: Into<String>>(&mut self, name: S, hook: Arc<dyn ProcessingHook>) {
        self.hooks.register(name, hook);
    }

    pub fn main_config(&self) -> &MainConfig {
        &self.main
    }

    /// Bakes the named documents, or all of them when `names` is empty.
    ///
    /// # Returns
    /// * `Result<BakeReport>` - Outcome of every selected document
    ///
    /// # Errors
    /// * `Error::DocumentNotFoundError` if a name is not in the configuration
    /// * any configuration error met while validating; nothing has been written then
    /// * `Error::IoError` if the build area cannot be prepared or removed
    pub fn bake(&self, names: &[String]) -> Result<BakeReport> {
        let specs = self.select_documents(names)?;

        let planned = specs
            .iter()
            .map(|spec| self.plan(spec))
            .collect::<Result<Vec<_>>>()?;

        let workspace = self.workspace(&planned)?;
        workspace.prepare()?;

        let pipeline = DefaultPipeline::new(&self.backends, &self.options);
        let continue_on_error = self.main.settings.continue_on_error && !self.options.fail_fast;
        let mut report = BakeReport { outcomes: Vec::new(), dry_run: self.options.dry_run };
        let mut stopped = false;

        for plan in planned {
            let name = plan.config.name.clone();
            if stopped {
                report.outcomes.push(DocumentOutcome {
                    name,
                    status: DocumentStatus::Skipped,
                    artifacts: Vec::new(),
                });
                continue;
            }

            info!("{}", section(&name));
            pipeline.take_delivered();
            let result = match &plan.processor {
                Processor::Default => pipeline.build_targets(&plan.targets),
                Processor::Custom(hook) => {
                    info!("Processing '{}' with {}", name, hook.name());
                    let mut handle = DocumentHandle::new(plan.config, &pipeline);
                    hook.process(&mut handle)
                }
            };

            match result {
                Ok(artifacts) => {
                    let outcome = DocumentOutcome::finished(&name, artifacts);
                    for warning in outcome.warnings() {
                        warn!("{}", warning);
                    }
                    report.outcomes.push(outcome);
                }
                Err(err) => {
                    error!("Failed to process document '{}': {}", name, err);
                    report.outcomes.push(DocumentOutcome {
                        name,
                        status: DocumentStatus::Failed(err.to_string()),
                        artifacts: pipeline.take_delivered(),
                    });
                    if !continue_on_error {
                        stopped = true;
                    }
                }
            }
        }

        workspace.teardown()?;
        report.log_summary();
        Ok(report)
    }

    fn select_documents(&self, names: &[String]) -> Result<Vec<&PathSpec>> {
        if names.is_empty() {
            return Ok(self.main.documents.iter().collect());
        }

        let mut selected: Vec<&PathSpec> = Vec::new();
        let mut missing: Vec<String> = Vec::new();
        for name in names {
            match self.main.documents.iter().find(|spec| &spec.name == name) {
                Some(spec) => {
                    if !selected.contains(&spec) {
                        selected.push(spec);
                    }
                }
                None => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(Error::DocumentNotFoundError {
                names: missing,
                available: self.main.document_names(),
            });
        }
        Ok(selected)
    }

    fn plan(&self, spec: &PathSpec) -> Result<PlannedDocument> {
        let config = DocumentConfig::load(spec, &self.main)?;
        check_build_dir(
            &config.directories.build,
            &self.main.directories.root,
            &config.directories.dist,
        )?;
        let processor = Processor::select(&config, &self.hooks)?;
        let targets = expand_document(&config)?;
        for target in &targets {
            self.backends.converter(target.settings.svg2pdf_backend)?;
        }
        Ok(PlannedDocument { config, processor, targets })
    }

    fn workspace(&self, planned: &[PlannedDocument]) -> Result<Workspace> {
        let directories = &self.main.directories;
        let keep_build = self.options.keep_build || self.main.settings.keep_build;
        let mut workspace = Workspace::new(
            &directories.root,
            &directories.build,
            &directories.dist,
            keep_build,
            self.options.dry_run,
        )?;
        for plan in planned {
            workspace.add_build_dir(&plan.config.directories.build)?;
        }
        Ok(workspace)
    }
}
