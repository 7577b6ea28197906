//! Conversion, combination and compression backends.
//!
//! Every backend is a small trait so the pipeline can be driven with stubs in
//! tests. The production implementations shell out to `cairosvg`, `inkscape`,
//! `rsvg-convert` and Ghostscript, and use lopdf to combine pages.

use log::{debug, info, warn};
use lopdf::{Document, Object, ObjectId};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use crate::config::ConverterKind;
use crate::error::{Error, Result};

/// Converts one page of rendered markup into a page artifact.
pub trait Converter: Send + Sync {
    /// Backend name, used in diagnostics.
    fn name(&self) -> &str;

    fn convert(&self, markup: &Path, output: &Path) -> Result<()>;
}

/// Concatenates page artifacts, in the given order, into one document.
pub trait Combiner: Send + Sync {
    fn combine(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;
}

/// Compresses a finished document.
pub trait Compressor: Send + Sync {
    fn compress(&self, input: &Path, output: &Path) -> Result<()>;
}

/// The set of backends used for one run.
#[derive(Clone)]
pub struct Backends {
    converters: HashMap<ConverterKind, Arc<dyn Converter>>,
    combiner: Arc<dyn Combiner>,
    compressor: Arc<dyn Compressor>,
}

impl Backends {
    /// External tools plus lopdf.
    pub fn system() -> Self {
        let converters = [ConverterKind::CairoSvg, ConverterKind::Inkscape, ConverterKind::RsvgConvert]
            .into_iter()
            .map(|kind| (kind, Arc::new(CommandConverter::new(kind)) as Arc<dyn Converter>))
            .collect();
        Self {
            converters,
            combiner: Arc::new(LopdfCombiner),
            compressor: Arc::new(GhostscriptCompressor::default()),
        }
    }

    /// Uses `converter` whatever `svg2pdf_backend` says.
    pub fn with_converter(mut self, converter: Arc<dyn Converter>) -> Self {
        for slot in self.converters.values_mut() {
            *slot = Arc::clone(&converter);
        }
        self
    }

    /// Replaces the converter for one `svg2pdf_backend` value.
    pub fn with_converter_for(mut self, kind: ConverterKind, converter: Arc<dyn Converter>) -> Self {
        self.converters.insert(kind, converter);
        self
    }

    pub fn with_combiner(mut self, combiner: Arc<dyn Combiner>) -> Self {
        self.combiner = combiner;
        self
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn converter(&self, kind: ConverterKind) -> Result<&dyn Converter> {
        self.converters
            .get(&kind)
            .map(|converter| converter.as_ref())
            .ok_or_else(|| Error::ConfigError(format!("no converter available for '{kind}'")))
    }

    pub fn combiner(&self) -> &dyn Combiner {
        self.combiner.as_ref()
    }

    pub fn compressor(&self) -> &dyn Compressor {
        self.compressor.as_ref()
    }
}

impl Default for Backends {
    fn default() -> Self {
        Backends::system()
    }
}

/// Captured result of an external command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub status: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Timestamps in tool output, normalised when collapsing repeated lines.
const TIMESTAMP_PATTERN: &str = r"\d{2}:\d{2}:\d{2}\.\d{3}";

/// Runs a command to completion and logs its output line by line.
///
/// Stdout goes to info, stderr to warn. With `deduplicate`, consecutive lines
/// that only differ by timestamp are collapsed into a repeat count.
pub fn run_logged(command: &mut Command, deduplicate: bool, suffix: &str) -> std::io::Result<CommandOutput> {
    debug!("Running {:?}", command);
    let output = command.output()?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    let timestamps = if deduplicate { Regex::new(TIMESTAMP_PATTERN).ok() } else { None };
    log_lines(&stdout, timestamps.as_ref(), suffix, |line| info!("{}", line));
    log_lines(&stderr, timestamps.as_ref(), suffix, |line| warn!("{}", line));

    Ok(CommandOutput {
        status: output.status.code(),
        success: output.status.success(),
        stdout,
        stderr,
    })
}

fn log_lines(text: &str, timestamps: Option<&Regex>, suffix: &str, log: impl Fn(&str)) {
    let mut last: Option<String> = None;
    let mut repeated = 0usize;
    for line in text.lines().map(str::trim_end).filter(|line| !line.is_empty()) {
        if let Some(re) = timestamps {
            let normalized = re.replace_all(line, "<TIMESTAMP>").into_owned();
            if last.as_deref() == Some(normalized.as_str()) {
                repeated += 1;
                continue;
            }
            if repeated > 0 {
                log(&format!("(repeated {repeated} times)"));
            }
            repeated = 0;
            last = Some(normalized);
        }
        log(&format!("{line}{suffix}"));
    }
    if repeated > 0 {
        log(&format!("(repeated {repeated} times)"));
    }
}

/// SVG to PDF conversion through an external program.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    kind: ConverterKind,
    program: String,
}

impl CommandConverter {
    pub fn new(kind: ConverterKind) -> Self {
        Self { kind, program: kind.to_string() }
    }

    /// Uses a different executable, e.g. a full path.
    pub fn with_program<S: Into<String>>(mut self, program: S) -> Self {
        self.program = program.into();
        self
    }

    fn arguments(&self, markup: &Path, output: &Path) -> Vec<OsString> {
        match self.kind {
            ConverterKind::CairoSvg => vec![
                markup.into(),
                "-o".into(),
                output.into(),
            ],
            ConverterKind::Inkscape => {
                let mut export = OsString::from("--export-filename=");
                export.push(output);
                vec![export, markup.into()]
            }
            ConverterKind::RsvgConvert => vec![
                "-f".into(),
                "pdf".into(),
                "-o".into(),
                output.into(),
                markup.into(),
            ],
        }
    }
}

impl Converter for CommandConverter {
    fn name(&self) -> &str {
        &self.program
    }

    fn convert(&self, markup: &Path, output: &Path) -> Result<()> {
        let mut command = Command::new(&self.program);
        command.args(self.arguments(markup, output));

        // Inkscape repeats itself a lot for text with newlines
        let deduplicate = self.kind == ConverterKind::Inkscape;
        let suffix = markup
            .file_name()
            .map(|name| format!(" [{}]", name.to_string_lossy()))
            .unwrap_or_default();

        let result = run_logged(&mut command, deduplicate, &suffix).map_err(|e| {
            Error::ConversionError {
                backend: self.program.clone(),
                input: markup.to_path_buf(),
                reason: format!("cannot run {}: {}", self.program, e),
                status: None,
                stdout: String::new(),
                stderr: String::new(),
            }
        })?;

        if !result.success {
            return Err(Error::ConversionError {
                backend: self.program.clone(),
                input: markup.to_path_buf(),
                reason: match result.status {
                    Some(code) => format!("exited with status {code}"),
                    None => "terminated by signal".to_string(),
                },
                status: result.status,
                stdout: result.stdout,
                stderr: result.stderr,
            });
        }
        Ok(())
    }
}

/// Combines PDF files with lopdf, keeping the input order.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfCombiner;

impl Combiner for LopdfCombiner {
    fn combine(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        if inputs.is_empty() {
            return Err(Error::CombineError("no PDF files provided to combine".to_string()));
        }
        let documents = inputs
            .iter()
            .map(|input| {
                Document::load(input).map_err(|e| {
                    Error::CombineError(format!("cannot read '{}': {}", input.display(), e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut combined = combine_documents(documents)?;
        combined
            .save(output)
            .map_err(|e| Error::CombineError(format!("cannot write '{}': {}", output.display(), e)))?;
        Ok(())
    }
}

fn type_name(object: &Object) -> Vec<u8> {
    object
        .type_name()
        .map(|name| AsRef::<[u8]>::as_ref(name).to_vec())
        .unwrap_or_default()
}

fn combine_documents(documents: Vec<Document>) -> Result<Document> {
    let mut max_id = 1;
    let mut pages: Vec<(ObjectId, Object)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for mut document in documents {
        document.renumber_objects_with(max_id);
        max_id = document.max_id + 1;
        for (_, page_id) in document.get_pages() {
            let page = document
                .get_object(page_id)
                .map_err(|e| Error::CombineError(format!("missing page object: {e}")))?
                .to_owned();
            pages.push((page_id, page));
        }
        objects.extend(document.objects);
    }

    let mut combined = Document::with_version("1.5");
    let mut catalog: Option<(ObjectId, Object)> = None;
    let mut page_tree: Option<(ObjectId, Object)> = None;

    for (object_id, object) in objects {
        match type_name(&object).as_slice() {
            b"Catalog" => {
                if catalog.is_none() {
                    catalog = Some((object_id, object));
                }
            }
            b"Pages" => {
                if let Ok(dictionary) = object.as_dict() {
                    let mut dictionary = dictionary.clone();
                    if let Some((_, Object::Dictionary(existing))) = &page_tree {
                        dictionary.extend(existing);
                    }
                    let id = page_tree.as_ref().map(|(id, _)| *id).unwrap_or(object_id);
                    page_tree = Some((id, Object::Dictionary(dictionary)));
                }
            }
            b"Page" | b"Outlines" | b"Outline" => {}
            _ => {
                combined.objects.insert(object_id, object);
            }
        }
    }

    let (tree_id, tree) =
        page_tree.ok_or_else(|| Error::CombineError("no page tree found".to_string()))?;
    let (catalog_id, catalog) =
        catalog.ok_or_else(|| Error::CombineError("no catalog found".to_string()))?;

    for (page_id, page) in &pages {
        if let Ok(dictionary) = page.as_dict() {
            let mut dictionary = dictionary.clone();
            dictionary.set("Parent", tree_id);
            combined.objects.insert(*page_id, Object::Dictionary(dictionary));
        }
    }

    if let Ok(dictionary) = tree.as_dict() {
        let mut dictionary = dictionary.clone();
        dictionary.set("Count", pages.len() as i64);
        dictionary.set(
            "Kids",
            pages.iter().map(|(id, _)| Object::Reference(*id)).collect::<Vec<_>>(),
        );
        combined.objects.insert(tree_id, Object::Dictionary(dictionary));
    }

    if let Ok(dictionary) = catalog.as_dict() {
        let mut dictionary = dictionary.clone();
        dictionary.set("Pages", tree_id);
        dictionary.remove(b"Outlines");
        combined.objects.insert(catalog_id, Object::Dictionary(dictionary));
    }

    combined.trailer.set("Root", catalog_id);
    combined.max_id = combined.objects.len() as u32;
    combined.renumber_objects();
    combined.compress();
    Ok(combined)
}

/// PDF compression with Ghostscript.
#[derive(Debug, Clone)]
pub struct GhostscriptCompressor {
    program: String,
    dpi: u32,
}

impl Default for GhostscriptCompressor {
    fn default() -> Self {
        Self { program: "gs".to_string(), dpi: 300 }
    }
}

impl GhostscriptCompressor {
    pub fn new<S: Into<String>>(program: S, dpi: u32) -> Self {
        Self { program: program.into(), dpi }
    }
}

impl Compressor for GhostscriptCompressor {
    fn compress(&self, input: &Path, output: &Path) -> Result<()> {
        let mut output_arg = OsString::from("-sOutputFile=");
        output_arg.push(output);

        let mut command = Command::new(&self.program);
        command
            .arg("-sDEVICE=pdfwrite")
            .arg("-dCompatibilityLevel=1.7")
            .arg("-dPDFSETTINGS=/printer")
            .arg(format!("-r{}", self.dpi))
            .arg("-dNOPAUSE")
            .arg("-dQUIET")
            .arg("-dBATCH")
            .arg(output_arg)
            .arg(input);

        let result = run_logged(&mut command, false, "")
            .map_err(|e| Error::CompressionError(format!("cannot run {}: {}", self.program, e)))?;
        if !result.success {
            return Err(Error::CompressionError(format!(
                "{} exited with status {}",
                self.program,
                result.status.map_or_else(|| "unknown".to_string(), |code| code.to_string())
            )));
        }
        Ok(())
    }
}
