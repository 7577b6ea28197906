//! Assembly of page artifacts into the final document.

use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::{Combiner, Compressor};
use crate::constants::ARTIFACT_EXTENSION;
use crate::error::{Error, Result, Warning};
use crate::page::PageArtifact;
use crate::variant::BuildTarget;

/// A finished (or, in a dry run, would-be) document.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalArtifact {
    pub document: String,
    pub variant: Option<String>,
    pub path: PathBuf,
    pub pages: usize,
    pub compressed: bool,
    pub warnings: Vec<Warning>,
}

/// Combines, compresses and delivers the pages of one target.
pub struct DocumentAssembler<'a> {
    combiner: &'a dyn Combiner,
    compressor: &'a dyn Compressor,
    dry_run: bool,
    fail_if_exists: bool,
}

impl<'a> DocumentAssembler<'a> {
    pub fn new(combiner: &'a dyn Combiner, compressor: &'a dyn Compressor) -> Self {
        Self { combiner, compressor, dry_run: false, fail_if_exists: false }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Refuses to overwrite destinations even if the target does not ask for it.
    pub fn fail_if_exists(mut self, fail_if_exists: bool) -> Self {
        self.fail_if_exists = fail_if_exists;
        self
    }

    /// Where the target's document ends up.
    pub fn destination(target: &BuildTarget) -> PathBuf {
        target
            .directories
            .dist
            .join(format!("{}.{}", target.filename, ARTIFACT_EXTENSION))
    }

    /// Fails if the destination exists and overwriting is not allowed.
    pub fn check_destination(&self, target: &BuildTarget) -> Result<PathBuf> {
        let destination = Self::destination(target);
        if (self.fail_if_exists || target.settings.fail_if_exists) && destination.exists() {
            return Err(Error::DestinationExistsError { path: destination });
        }
        Ok(destination)
    }

    /// Combines the page artifacts in page order and writes the destination.
    ///
    /// # Errors
    /// * `Error::DestinationExistsError` if `fail_if_exists` applies, before anything is written
    /// * `Error::CombineError` if pages are missing or cannot be combined
    pub fn assemble(&self, target: &BuildTarget, pages: &[PageArtifact]) -> Result<FinalArtifact> {
        let destination = self.check_destination(target)?;

        let mut ordered: Vec<&PageArtifact> = pages.iter().collect();
        ordered.sort_by_key(|page| page.number);
        for (index, page) in ordered.iter().enumerate() {
            if page.number != index + 1 {
                return Err(Error::CombineError(format!(
                    "page {} of {} is missing",
                    index + 1,
                    target.label()
                )));
            }
        }

        let mut warnings: Vec<Warning> = Vec::new();
        for warning in ordered.iter().flat_map(|page| page.warnings.iter()) {
            let warning = Warning::from(warning.clone());
            if !warnings.contains(&warning) {
                warnings.push(warning);
            }
        }

        let compress = target.settings.compress_pdf;
        if self.dry_run {
            info!("Would have created {}", destination.display());
            return Ok(FinalArtifact {
                document: target.document.clone(),
                variant: target.variant.clone(),
                path: destination,
                pages: ordered.len(),
                compressed: compress,
                warnings,
            });
        }

        let build = &target.directories.build;
        fs::create_dir_all(build)?;
        let combined = build.join(format!("{}.{}", target.filename, ARTIFACT_EXTENSION));
        let inputs: Vec<PathBuf> = ordered.iter().map(|page| page.path.clone()).collect();
        self.combiner.combine(&inputs, &combined)?;

        let mut compressed = false;
        let mut source = combined.clone();
        if compress {
            let output = build.join(format!("{}_compressed.{}", target.filename, ARTIFACT_EXTENSION));
            match self.compressor.compress(&combined, &output) {
                Ok(()) => {
                    compressed = true;
                    source = output;
                }
                Err(err) => {
                    warn!("Compression failed, using uncompressed version: {}", err);
                    warnings.push(Warning::CompressionFailed {
                        filename: target.filename.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        move_file(&source, &destination)?;
        info!("Created {}", destination.display());

        Ok(FinalArtifact {
            document: target.document.clone(),
            variant: target.variant.clone(),
            path: destination,
            pages: ordered.len(),
            compressed,
            warnings,
        })
    }
}

/// Renames `from` to `to`, copying when they live on different filesystems.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)?;
    Ok(())
}
