mod common;

use common::{page_texts, stub_backends};
use pdfbaker::baker::{Baker, BakerOptions};
use pdfbaker::error::Error;
use pdfbaker::prompt::FixedAnswer;
use pdfbaker::scaffold::{create_from, document_name, ScaffoldOptions};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg"><text>Poster</text></svg>"#;

#[test]
fn test_document_name() {
    assert_eq!(document_name(Path::new("Summer Poster.svg")).unwrap(), "summer-poster");
    assert_eq!(document_name(Path::new("/x/flyerFront.svg")).unwrap(), "flyer-front");
}

#[test]
fn test_created_project_bakes() {
    let temp = TempDir::new().unwrap();
    let svg = temp.path().join("Summer Poster.svg");
    fs::write(&svg, SVG).unwrap();
    let project = temp.path().join("project");

    let scaffold =
        create_from(&svg, &project, &ScaffoldOptions::default(), &FixedAnswer(false)).unwrap();
    assert_eq!(scaffold.document, "summer-poster");
    assert_eq!(scaffold.files.len(), 4);
    assert_eq!(
        fs::read_to_string(project.join("summer-poster/templates/main.svg.j2")).unwrap(),
        SVG
    );

    let report = Baker::new(&scaffold.main_config, BakerOptions::default())
        .unwrap()
        .with_backends(stub_backends())
        .bake(&[])
        .unwrap();
    assert!(report.success());
    let pages = page_texts(&project.join("dist/summer-poster/summer-poster.pdf"));
    assert_eq!(pages, vec![format!("% {SVG}")]);
}

#[test]
fn test_non_empty_directory_needs_confirmation() {
    let temp = TempDir::new().unwrap();
    let svg = temp.path().join("poster.svg");
    fs::write(&svg, SVG).unwrap();
    let project = temp.path().join("project");
    fs::create_dir_all(&project).unwrap();
    fs::write(project.join("notes.txt"), "keep").unwrap();

    let err = create_from(&svg, &project, &ScaffoldOptions::default(), &FixedAnswer(false))
        .unwrap_err();
    assert!(matches!(err, Error::DestinationExistsError { .. }));
    assert!(!project.join("main.yaml").exists());

    create_from(&svg, &project, &ScaffoldOptions::default(), &FixedAnswer(true)).unwrap();
    assert!(project.join("main.yaml").is_file());
    assert!(project.join("notes.txt").is_file());
}

#[test]
fn test_force_skips_confirmation() {
    let temp = TempDir::new().unwrap();
    let svg = temp.path().join("poster.svg");
    fs::write(&svg, SVG).unwrap();
    let project = temp.path().join("project");
    fs::create_dir_all(&project).unwrap();
    fs::write(project.join("notes.txt"), "keep").unwrap();

    let options = ScaffoldOptions { name: Some("Event Flyer".to_string()), force: true };
    let scaffold = create_from(&svg, &project, &options, &FixedAnswer(false)).unwrap();
    assert_eq!(scaffold.document, "event-flyer");
    assert!(project.join("event-flyer/config.yaml").is_file());
}

#[test]
fn test_rejects_non_svg_input() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("notes.txt");
    fs::write(&input, "hello").unwrap();

    let err = create_from(&input, &temp.path().join("p"), &ScaffoldOptions::default(), &FixedAnswer(true))
        .unwrap_err();
    assert!(matches!(err, Error::ScaffoldError(_)));
}
