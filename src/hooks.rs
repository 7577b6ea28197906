//! Custom processing of documents.
//!
//! A document can replace the default pipeline with its own logic, either a
//! hook registered on the [`Baker`](crate::baker::Baker) or an executable
//! script. Both receive a [`DocumentHandle`] and may hand control back to the
//! default pipeline through [`DocumentHandle::continue_default`].

use indexmap::IndexMap;
use log::{debug, info};
use serde_json::{json, Value};
use std::fmt;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::thread;

use crate::config::{resolve_path, DocumentConfig, PathSpec};
use crate::constants::DEFAULT_HOOK_FILE;
use crate::document::FinalArtifact;
use crate::error::{Error, Result};
use crate::merge::{deep_merge, Mapping};

/// The default build of a document: expand, build pages, assemble.
pub trait Pipeline: Sync {
    fn run(&self, document: &DocumentConfig) -> Result<Vec<FinalArtifact>>;
}

/// Custom document processing.
pub trait ProcessingHook: Send + Sync {
    /// Short description for logs.
    fn name(&self) -> &str;

    fn process(&self, handle: &mut DocumentHandle<'_>) -> Result<Vec<FinalArtifact>>;
}

/// What a hook gets to see and change of a document.
pub struct DocumentHandle<'a> {
    document: DocumentConfig,
    pipeline: &'a dyn Pipeline,
}

impl<'a> DocumentHandle<'a> {
    pub fn new(document: DocumentConfig, pipeline: &'a dyn Pipeline) -> Self {
        Self { document, pipeline }
    }

    pub fn name(&self) -> &str {
        &self.document.name
    }

    /// Directory containing the document configuration.
    pub fn directory(&self) -> &Path {
        &self.document.directories.root
    }

    /// The document context (main settings merged with the document's keys).
    pub fn context(&self) -> &Mapping {
        &self.document.context
    }

    /// Changes made here are seen by [`continue_default`](Self::continue_default).
    pub fn context_mut(&mut self) -> &mut Mapping {
        &mut self.document.context
    }

    /// Names of the pages that get built: the document's own pages, or those of
    /// its variants when it has any.
    pub fn page_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let declared: Vec<&Vec<PathSpec>> = if self.document.variants.is_empty() {
            self.document.pages.iter().collect()
        } else {
            self.document.variants.iter().filter_map(|v| v.pages.as_ref()).collect()
        };
        for pages in declared {
            for page in pages {
                if !names.contains(&page.name) {
                    names.push(page.name.clone());
                }
            }
        }
        names
    }

    /// Runs the default pipeline with the current state of the document.
    pub fn continue_default(&self) -> Result<Vec<FinalArtifact>> {
        self.pipeline.run(&self.document)
    }
}

/// How a document is processed, decided while resolving its configuration.
#[derive(Clone)]
pub enum Processor {
    Default,
    Custom(Arc<dyn ProcessingHook>),
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Processor::Default => write!(f, "Default"),
            Processor::Custom(hook) => write!(f, "Custom({})", hook.name()),
        }
    }
}

impl Processor {
    /// Picks the processor for a document.
    ///
    /// `custom_bake` names a registered hook or a script relative to the
    /// document directory. Without it, an executable `bake` file next to the
    /// document configuration is used if there is one.
    ///
    /// # Errors
    /// * `Error::ConfigError` if `custom_bake` names neither a hook nor an existing file
    pub fn select(document: &DocumentConfig, registry: &HookRegistry) -> Result<Processor> {
        let root = &document.directories.root;
        if let Some(custom) = &document.custom_bake {
            if let Some(hook) = registry.get(custom) {
                debug!("Document '{}' uses registered hook '{}'", document.name, custom);
                return Ok(Processor::Custom(hook));
            }
            let path = resolve_path(Path::new(custom), root);
            if !path.is_file() {
                return Err(Error::ConfigError(format!(
                    "custom_bake '{}' of document '{}' is neither a registered hook nor a file",
                    custom, document.name
                )));
            }
            return Ok(Processor::Custom(Arc::new(ScriptHook::new(path))));
        }

        let default_hook = root.join(DEFAULT_HOOK_FILE);
        if is_executable(&default_hook) {
            debug!("Document '{}' has a bake script", document.name);
            return Ok(Processor::Custom(Arc::new(ScriptHook::new(default_hook))));
        }
        Ok(Processor::Default)
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// In-process hooks that documents can name in `custom_bake`.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: IndexMap<String, Arc<dyn ProcessingHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S: Into<String>>(&mut self, name: S, hook: Arc<dyn ProcessingHook>) {
        self.hooks.insert(name.into(), hook);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProcessingHook>> {
        self.hooks.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.hooks.keys().map(String::as_str).collect()
    }
}

/// An executable that adjusts the document context before the default build.
///
/// The script gets `{"document", "context", "pages"}` as JSON on stdin. If it
/// prints a JSON object, that object is deep-merged into the context.
#[derive(Debug, Clone)]
pub struct ScriptHook {
    path: PathBuf,
    name: String,
}

impl ScriptHook {
    pub fn new(path: PathBuf) -> Self {
        let name = path.display().to_string();
        Self { path, name }
    }
}

impl ProcessingHook for ScriptHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, handle: &mut DocumentHandle<'_>) -> Result<Vec<FinalArtifact>> {
        let input = json!({
            "document": handle.name(),
            "context": handle.context(),
            "pages": handle.page_names(),
        });
        info!("Running {}", self.path.display());
        if let Some(update) = run_hook(&self.path, handle.directory(), &input)? {
            deep_merge(handle.context_mut(), &update);
        }
        handle.continue_default()
    }
}

fn write_input(stdin: Option<ChildStdin>, payload: String) -> Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    match stdin.write_all(payload.as_bytes()) {
        // The script may exit without reading its input
        Err(e) if e.kind() != ErrorKind::BrokenPipe => Err(Error::IoError(e)),
        _ => Ok(()),
    }
}

/// Executes a hook script with `input` on stdin.
///
/// # Arguments
/// * `script_path` - Path to the executable
/// * `working_dir` - Directory the script runs in
/// * `input` - JSON document written to the script's stdin
///
/// # Returns
/// * `Result<Option<Mapping>>` - The JSON object printed by the script, if any.
///   Other output is logged.
///
/// # Errors
/// * `Error::HookError` if the script cannot be started, exits with a failure
///   status or prints JSON that is not an object
pub fn run_hook<P: AsRef<Path>>(
    script_path: P,
    working_dir: &Path,
    input: &Value,
) -> Result<Option<Mapping>> {
    let script_path = script_path.as_ref();
    let mut child = Command::new(script_path)
        .current_dir(working_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| {
            Error::HookError(format!("cannot run '{}': {}", script_path.display(), e))
        })?;

    // Context goes to stdin on its own thread while stdout is drained
    let stdin = child.stdin.take();
    let payload = input.to_string();
    let (written, output) = thread::scope(|scope| {
        let writer = scope.spawn(move || write_input(stdin, payload));
        let output = child.wait_with_output();
        (writer.join(), output)
    });
    let output = output?;
    written.map_err(|_| {
        Error::HookError(format!("writing input of '{}' panicked", script_path.display()))
    })??;
    if !output.status.success() {
        return Err(Error::HookError(format!(
            "'{}' failed with status: {}",
            script_path.display(),
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stdout = stdout.trim();
    if stdout.is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<Value>(stdout) {
        Ok(Value::Object(update)) => Ok(Some(update)),
        Ok(other) => Err(Error::HookError(format!(
            "'{}' printed JSON that is not an object: {}",
            script_path.display(),
            other
        ))),
        Err(_) => {
            for line in stdout.lines() {
                info!("{}", line);
            }
            Ok(None)
        }
    }
}
