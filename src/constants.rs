//! Common constants used throughout pdfbaker.

/// Default directory layout, relative to the main configuration file.
pub const DEFAULT_DIRECTORIES: [(&str, &str); 6] = [
    ("build", "build"),
    ("dist", "dist"),
    ("documents", "."),
    ("pages", "pages"),
    ("templates", "templates"),
    ("images", "images"),
];

/// Configuration file looked up when a document is referenced by directory
pub const DEFAULT_DOCUMENT_CONFIG_FILE: &str = "config.yaml";

/// Extension added to page references that have none
pub const PAGE_CONFIG_EXTENSION: &str = "yaml";

/// Executable picked up as a processing hook when `custom_bake` is not set
pub const DEFAULT_HOOK_FILE: &str = "bake";

/// Extension of the final and per-page artifacts
pub const ARTIFACT_EXTENSION: &str = "pdf";

/// Extension of the rendered intermediate markup
pub const MARKUP_EXTENSION: &str = "svg";

/// Upper bound on expression evaluation passes over one context
pub const MAX_RESOLVE_ITERATIONS: usize = 10;

/// Default line width of the `wordwrap` filter
pub const DEFAULT_WORDWRAP_WIDTH: usize = 60;

/// Keys managed by pdfbaker itself that never reach a page context as-is
pub const STRUCTURAL_KEYS: [&str; 4] = ["documents", "variants", "pages", "custom_bake"];
