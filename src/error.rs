//! Error handling for pdfbaker.
//! Defines the error taxonomy, the non-fatal warnings collected during a run,
//! and the result alias used throughout the crate.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Custom error types for pdfbaker operations.
///
/// Configuration problems (`ConfigError`, `SchemaError`, `DocumentNotFoundError`,
/// `FilenameCollisionError`) are raised while validating and abort the whole run.
/// The remaining variants are raised while building and are isolated to the
/// document that produced them.
#[derive(Error, Debug)]
pub enum Error {
    /// Represents errors that occur during file system operations
    #[error("IO error: {0}.")]
    IoError(#[from] io::Error),

    /// Represents errors that occur while parsing YAML configuration
    #[error("YAML error: {0}.")]
    YamlError(#[from] serde_yaml::Error),

    /// Represents errors that occur while (de)serializing JSON values
    #[error("JSON error: {0}.")]
    JsonError(#[from] serde_json::Error),

    /// Represents errors that occur during template processing
    #[error("Template error: {0}.")]
    MinijinjaError(#[from] minijinja::Error),

    /// Malformed configuration, missing required key or type mismatch
    #[error("Configuration error: {0}.")]
    ConfigError(String),

    /// A configuration unit does not match the schema for its kind
    #[error("Invalid {kind} configuration '{source_name}': {message}.")]
    SchemaError {
        kind: String,
        source_name: String,
        message: String,
    },

    /// One or more documents requested on the command line do not exist
    #[error("Document{} not found in configuration: {}.", plural(.names.len()), quoted(.names))]
    DocumentNotFoundError { names: Vec<String>, available: Vec<String> },

    /// Two build targets of the same document resolve to the same output name
    #[error("Document '{document}': variants {} resolve to the same filename '{filename}'.", quoted(.variants))]
    FilenameCollisionError {
        document: String,
        filename: String,
        variants: Vec<String>,
    },

    /// The conversion backend failed for one page
    #[error("Failed to convert '{}' using {backend}: {reason}.", .input.display())]
    ConversionError {
        backend: String,
        input: PathBuf,
        reason: String,
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// Page artifacts could not be combined into one document
    #[error("Failed to combine PDFs: {0}.")]
    CombineError(String),

    /// The compression backend failed (normally downgraded to a warning)
    #[error("Failed to compress PDF: {0}.")]
    CompressionError(String),

    /// `fail_if_exists` is set and the destination is already there
    #[error("Destination '{}' already exists.", .path.display())]
    DestinationExistsError { path: PathBuf },

    /// An image referenced by a page is missing from the images directory
    #[error("Image not found: '{}'.", .path.display())]
    ImageNotFound { path: PathBuf },

    /// Represents errors that occur during hook execution
    #[error("Hook execution error: {0}.")]
    HookError(String),

    /// Represents errors in the project scaffolding
    #[error("Scaffold error: {0}.")]
    ScaffoldError(String),
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

fn quoted(names: &[String]) -> String {
    names.iter().map(|name| format!("\"{name}\"")).collect::<Vec<_>>().join(", ")
}

/// Convenience type alias for Results with pdfbaker's Error as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// A reference to an undefined variable in a template or configuration expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateWarning {
    /// Dotted name of the undefined variable, e.g. `style.highlight_color`
    pub variable: String,
    /// Where the expression came from (template file or configuration key)
    pub origin: String,
}

impl fmt::Display for TemplateWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "undefined variable '{}' in {}", self.variable, self.origin)
    }
}

/// Non-fatal diagnostics collected while baking.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Warning {
    UndefinedVariable(TemplateWarning),
    CompressionFailed { filename: String, reason: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::UndefinedVariable(warning) => write!(f, "{warning}"),
            Warning::CompressionFailed { filename, reason } => {
                write!(f, "compression of '{filename}' failed, kept uncompressed: {reason}")
            }
        }
    }
}

impl From<TemplateWarning> for Warning {
    fn from(warning: TemplateWarning) -> Self {
        Warning::UndefinedVariable(warning)
    }
}

/// Process exit code for an error that ends the run.
pub fn exit_code(err: &Error) -> i32 {
    match err {
        Error::DocumentNotFoundError { .. } => 2,
        _ => 1,
    }
}

/// Default error handler that prints the error and exits the program.
///
/// # Arguments
/// * `err` - The Error to handle
///
/// # Behavior
/// Logs the error and exits with status code 2 for unknown documents, 1 otherwise
pub fn default_error_handler(err: Error) {
    if let Error::DocumentNotFoundError { available, .. } = &err {
        log::info!("Documents in configuration: {}", quoted(available));
    }
    log::error!("{}", err);
    std::process::exit(exit_code(&err));
}
