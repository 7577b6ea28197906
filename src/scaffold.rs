//! Creation of a new project from an existing SVG.
//!
//! The SVG becomes the template of a single page document, with a main
//! configuration listing that document:
//!
//! ```text
//! <project>/
//!   main.yaml
//!   <name>/
//!     config.yaml
//!     pages/main.yaml
//!     templates/main.svg.j2
//! ```

use cruet::Inflector;
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::prompt::Prompter;

pub const MAIN_CONFIG_FILE: &str = "main.yaml";
const PAGE_NAME: &str = "main";
const TEMPLATE_FILE: &str = "main.svg.j2";

/// Options for [`create_from`].
#[derive(Debug, Clone, Default)]
pub struct ScaffoldOptions {
    /// Document name, derived from the SVG file name when not given
    pub name: Option<String>,
    /// Write into an existing directory without asking
    pub force: bool,
}

/// Files written by [`create_from`].
#[derive(Debug, Clone, PartialEq)]
pub struct Scaffold {
    pub document: String,
    pub main_config: PathBuf,
    pub files: Vec<PathBuf>,
}

/// Document name for an SVG file: its stem in kebab case.
pub fn document_name(svg: &Path) -> Result<String> {
    let stem = svg
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = stem.to_kebab_case();
    if name.is_empty() {
        return Err(Error::ScaffoldError(format!(
            "cannot derive a document name from '{}'",
            svg.display()
        )));
    }
    Ok(name)
}

/// Ensures the project directory can be written to.
///
/// # Errors
/// * `Error::DestinationExistsError` if the directory has content and the user declines
pub fn get_project_dir<P: AsRef<Path>>(
    project_dir: P,
    force: bool,
    prompt: &dyn Prompter,
) -> Result<PathBuf> {
    let project_dir = project_dir.as_ref();
    let has_content = project_dir.is_dir() && fs::read_dir(project_dir)?.next().is_some();
    if project_dir.exists() && !project_dir.is_dir() {
        return Err(Error::DestinationExistsError { path: project_dir.to_path_buf() });
    }
    if has_content && !force {
        let question = format!("'{}' is not empty. Write into it anyway?", project_dir.display());
        if !prompt.confirm(&question, false)? {
            return Err(Error::DestinationExistsError { path: project_dir.to_path_buf() });
        }
    }
    Ok(project_dir.to_path_buf())
}

/// Scaffolds a project around an SVG.
///
/// # Arguments
/// * `svg` - The SVG to use as page template
/// * `project_dir` - Directory of the new project
/// * `options` - Document name and overwrite behaviour
/// * `prompt` - Asked before writing into a non-empty directory
///
/// # Returns
/// * `Result<Scaffold>` - The document name and the files written
pub fn create_from(
    svg: &Path,
    project_dir: &Path,
    options: &ScaffoldOptions,
    prompt: &dyn Prompter,
) -> Result<Scaffold> {
    if !svg.is_file() {
        return Err(Error::ScaffoldError(format!("'{}' is not a file", svg.display())));
    }
    let markup = fs::read_to_string(svg)?;
    if !markup.contains("<svg") {
        return Err(Error::ScaffoldError(format!("'{}' is not an SVG file", svg.display())));
    }

    let name = match &options.name {
        Some(name) => name.to_kebab_case(),
        None => document_name(svg)?,
    };
    let project_dir = get_project_dir(project_dir, options.force, prompt)?;
    let document_dir = project_dir.join(&name);

    let files = vec![
        (project_dir.join(MAIN_CONFIG_FILE), format!("documents:\n  - {name}\n")),
        (
            document_dir.join("config.yaml"),
            format!("filename: {name}\npages:\n  - {PAGE_NAME}\n"),
        ),
        (
            document_dir.join("pages").join(format!("{PAGE_NAME}.yaml")),
            format!("template: {TEMPLATE_FILE}\n"),
        ),
        (document_dir.join("templates").join(TEMPLATE_FILE), markup),
    ];

    let mut written = Vec::with_capacity(files.len());
    for (path, content) in files {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!("Writing {}", path.display());
        fs::write(&path, content)?;
        written.push(path);
    }

    info!("Created project for '{}' in {}", name, project_dir.display());
    Ok(Scaffold {
        document: name,
        main_config: project_dir.join(MAIN_CONFIG_FILE),
        files: written,
    })
}
