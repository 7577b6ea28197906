//! Build and distribution directory lifecycle.

use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// The directories a run writes to.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    dist: PathBuf,
    builds: Vec<PathBuf>,
    keep_build: bool,
    dry_run: bool,
}

impl Workspace {
    /// # Errors
    /// * `Error::ConfigError` if the build directory is unsafe to wipe
    pub fn new(root: &Path, build: &Path, dist: &Path, keep_build: bool, dry_run: bool) -> Result<Self> {
        check_build_dir(build, root, dist)?;
        Ok(Self {
            root: root.to_path_buf(),
            dist: dist.to_path_buf(),
            builds: vec![build.to_path_buf()],
            keep_build,
            dry_run,
        })
    }

    /// Adds a document build directory living outside the main one.
    pub fn add_build_dir(&mut self, build: &Path) -> Result<()> {
        check_build_dir(build, &self.root, &self.dist)?;
        if !self.builds.iter().any(|existing| build.starts_with(existing)) {
            self.builds.push(build.to_path_buf());
        }
        Ok(())
    }

    pub fn keep_build(&self) -> bool {
        self.keep_build
    }

    /// Wipes (unless `keep_build`) and creates the build directories, and
    /// creates the dist directory. Does nothing in a dry run.
    pub fn prepare(&self) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        for build in &self.builds {
            if build.exists() && !self.keep_build {
                debug!("Cleaning build directory {}", build.display());
                fs::remove_dir_all(build)?;
            }
            fs::create_dir_all(build)?;
        }
        fs::create_dir_all(&self.dist)?;
        Ok(())
    }

    /// Removes the build directories unless `keep_build`.
    pub fn teardown(&self) -> Result<()> {
        if self.dry_run || self.keep_build {
            return Ok(());
        }
        for build in &self.builds {
            if build.exists() {
                debug!("Removing build directory {}", build.display());
                fs::remove_dir_all(build)?;
            }
        }
        Ok(())
    }
}

/// Refuses build directories whose removal would destroy the project or the
/// finished documents.
pub fn check_build_dir(build: &Path, root: &Path, dist: &Path) -> Result<()> {
    if root.starts_with(build) {
        return Err(Error::ConfigError(format!(
            "build directory '{}' contains the project directory",
            build.display()
        )));
    }
    if dist.starts_with(build) {
        return Err(Error::ConfigError(format!(
            "build directory '{}' contains the dist directory '{}'",
            build.display(),
            dist.display()
        )));
    }
    Ok(())
}
