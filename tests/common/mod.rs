#![allow(dead_code)]

use lopdf::{dictionary, Document, Object, Stream};
use pdfbaker::backend::{Backends, Compressor, Converter};
use pdfbaker::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Writes a one-page PDF whose content stream is the markup, as a comment.
#[derive(Default)]
pub struct StubConverter {
    pub calls: Mutex<Vec<PathBuf>>,
}

impl Converter for StubConverter {
    fn name(&self) -> &str {
        "stub"
    }

    fn convert(&self, markup: &Path, output: &Path) -> Result<()> {
        self.calls.lock().unwrap().push(markup.to_path_buf());
        let text = fs::read_to_string(markup)?.replace('\n', " ");
        one_page_pdf(output, &text);
        Ok(())
    }
}

pub struct FailingConverter;

impl Converter for FailingConverter {
    fn name(&self) -> &str {
        "failing"
    }

    fn convert(&self, markup: &Path, _output: &Path) -> Result<()> {
        Err(Error::ConversionError {
            backend: "failing".to_string(),
            input: markup.to_path_buf(),
            reason: "exited with status 1".to_string(),
            status: Some(1),
            stdout: String::new(),
            stderr: "boom".to_string(),
        })
    }
}

pub struct CopyCompressor;

impl Compressor for CopyCompressor {
    fn compress(&self, input: &Path, output: &Path) -> Result<()> {
        fs::copy(input, output)?;
        Ok(())
    }
}

pub struct FailingCompressor;

impl Compressor for FailingCompressor {
    fn compress(&self, _input: &Path, _output: &Path) -> Result<()> {
        Err(Error::CompressionError("gs exited with status 1".to_string()))
    }
}

pub fn one_page_pdf(path: &Path, text: &str) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(dictionary! {}, format!("% {text}").into_bytes()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

/// Content of every page of a PDF, in order.
pub fn page_texts(path: &Path) -> Vec<String> {
    let doc = Document::load(path).unwrap();
    doc.get_pages()
        .values()
        .map(|id| String::from_utf8_lossy(&doc.get_page_content(*id).unwrap()).into_owned())
        .collect()
}

pub fn stub_backends() -> Backends {
    Backends::system()
        .with_converter(Arc::new(StubConverter::default()))
        .with_compressor(Arc::new(CopyCompressor))
}

/// A project on disk.
pub struct Project {
    pub dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        Self { dir: TempDir::new().unwrap() }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn write(&self, relative: &str, content: &str) -> &Self {
        let path = self.path(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        self
    }

    pub fn main_config(&self) -> PathBuf {
        self.path("main.yaml")
    }
}

/// A two page brochure with a highlight colour and an expression in the filename.
pub fn brochure_project() -> Project {
    let project = Project::new();
    project
        .write(
            "main.yaml",
            "documents: [brochure]\nstyle:\n  highlight_color: \"#ff0000\"\nconference:\n  year: 2025\n",
        )
        .write(
            "brochure/config.yaml",
            "filename: \"brochure-{{ conference.year }}\"\ntitle: Brochure\npages: [cover, back]\n",
        )
        .write(
            "brochure/pages/cover.yaml",
            "template: page.svg.j2\nheading: \"{{ title }} cover\"\n",
        )
        .write("brochure/pages/back.yaml", "template: page.svg.j2\nheading: back\n")
        .write(
            "brochure/templates/page.svg.j2",
            "<svg><text>{{ heading }} p{{ page_number }} <highlight>hi</highlight></text></svg>",
        );
    project
}
