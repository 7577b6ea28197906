//! pdfbaker creates PDF documents from YAML-configured SVG templates.
//! A main configuration lists documents; documents list pages and optional
//! variants; every page renders a template into SVG, which is converted to PDF
//! and combined with its siblings into the final document.

/// Orchestration of a run and its report
pub mod baker;

/// SVG to PDF conversion, PDF combination and compression backends
pub mod backend;

/// Command-line interface module for the pdfbaker application
pub mod cli;

/// Configuration loading and typed views of the recognized keys
/// Supports JSON and YAML formats
pub mod config;

/// Default names and limits
pub mod constants;

/// Expression evaluation, `page_number` injection and image embedding
pub mod context;

/// Combination of pages into the final document
pub mod document;

/// Error types and handling for the pdfbaker application
pub mod error;

/// Custom document processing
/// Handles registered hooks and executable `bake` scripts
pub mod hooks;

/// Log setup
pub mod logger;

/// Deep merge of configuration mappings
pub mod merge;

/// Page rendering and conversion
pub mod page;

/// User input and interaction handling
pub mod prompt;

/// Template rendering with MiniJinja
pub mod renderer;

/// Project creation from an existing SVG
pub mod scaffold;

/// JSON schemas of the configuration files
pub mod schema;

/// Document to build target expansion
pub mod variant;

/// Build and dist directory lifecycle
pub mod workspace;
