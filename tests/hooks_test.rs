mod common;

use common::{brochure_project, page_texts, stub_backends};
use pdfbaker::baker::{Baker, BakerOptions, DocumentStatus};
use pdfbaker::config::{DocumentConfig, MainConfig};
use pdfbaker::document::FinalArtifact;
use pdfbaker::error::{Error, Result};
use pdfbaker::hooks::{DocumentHandle, HookRegistry, ProcessingHook, Processor};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Renames the document title, then runs the default pipeline.
#[derive(Default)]
struct RetitleHook {
    seen_pages: Mutex<Vec<String>>,
}

impl ProcessingHook for RetitleHook {
    fn name(&self) -> &str {
        "retitle"
    }

    fn process(&self, handle: &mut DocumentHandle<'_>) -> Result<Vec<FinalArtifact>> {
        *self.seen_pages.lock().unwrap() = handle.page_names();
        handle
            .context_mut()
            .insert("title".to_string(), Value::String("Custom".to_string()));
        handle.continue_default()
    }
}

/// Does nothing at all.
struct SkipHook;

impl ProcessingHook for SkipHook {
    fn name(&self) -> &str {
        "skip"
    }

    fn process(&self, _handle: &mut DocumentHandle<'_>) -> Result<Vec<FinalArtifact>> {
        Ok(Vec::new())
    }
}

fn with_custom_bake(value: &str) -> common::Project {
    let project = brochure_project();
    project.write(
        "brochure/config.yaml",
        &format!(
            "filename: \"brochure-{{{{ conference.year }}}}\"\ntitle: Brochure\ncustom_bake: {value}\npages: [cover, back]\n"
        ),
    );
    project
}

#[test]
fn registered_hook_can_change_context_and_continue() {
    let project = with_custom_bake("retitle");
    let hook = Arc::new(RetitleHook::default());
    let mut baker = Baker::new(project.main_config(), BakerOptions::default())
        .unwrap()
        .with_backends(stub_backends());
    baker.register_hook("retitle", hook.clone());

    let report = baker.bake(&[]).unwrap();
    assert!(report.success());
    assert_eq!(*hook.seen_pages.lock().unwrap(), vec!["cover", "back"]);
    let pages = page_texts(&project.path("dist/brochure/brochure-2025.pdf"));
    assert!(pages[0].contains("Custom cover p1"));
}

#[test]
fn hook_sees_only_pages_of_variants() {
    let project = brochure_project();
    project.write(
        "brochure/config.yaml",
        r#"filename: "brochure-{{ variant.name }}"
custom_bake: retitle
pages: [unused]
variants:
  - name: de
    pages: [cover]
  - name: en
    pages: [cover, back]
"#,
    );
    let hook = Arc::new(RetitleHook::default());
    let mut baker = Baker::new(project.main_config(), BakerOptions::default())
        .unwrap()
        .with_backends(stub_backends());
    baker.register_hook("retitle", hook.clone());

    let report = baker.bake(&[]).unwrap();
    assert!(report.success());
    assert_eq!(*hook.seen_pages.lock().unwrap(), vec!["cover", "back"]);
    assert_eq!(report.artifacts().count(), 2);
}

#[test]
fn hook_may_skip_the_default_pipeline() {
    let project = with_custom_bake("skip");
    let mut baker = Baker::new(project.main_config(), BakerOptions::default())
        .unwrap()
        .with_backends(stub_backends());
    baker.register_hook("skip", Arc::new(SkipHook));

    let report = baker.bake(&[]).unwrap();
    assert_eq!(report.outcomes[0].status, DocumentStatus::Completed);
    assert_eq!(report.artifacts().count(), 0);
    assert!(!project.path("dist/brochure/brochure-2025.pdf").exists());
}

#[test]
fn unknown_custom_bake_is_a_configuration_error() {
    let project = with_custom_bake("nowhere.sh");
    let err = Baker::new(project.main_config(), BakerOptions::default())
        .unwrap()
        .with_backends(stub_backends())
        .bake(&[])
        .unwrap_err();
    assert!(matches!(err, Error::ConfigError(_)));
}

#[test]
fn documents_without_hooks_use_the_default_processor() {
    let project = brochure_project();
    let main = MainConfig::load(project.main_config()).unwrap();
    let document = DocumentConfig::load(&main.documents[0], &main).unwrap();
    let processor = Processor::select(&document, &HookRegistry::new()).unwrap();
    assert!(matches!(processor, Processor::Default));
}

#[cfg(unix)]
mod scripts {
    use super::*;
    use pdfbaker::hooks::run_hook;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn make_executable(path: &Path) {
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn bake_script_output_is_merged_into_context() {
        let project = brochure_project();
        project.write(
            "brochure/bake",
            "#!/bin/sh\ncat > input.json\necho '{\"title\": \"Scripted\"}'\n",
        );
        make_executable(&project.path("brochure/bake"));

        let report = Baker::new(project.main_config(), BakerOptions::default())
            .unwrap()
            .with_backends(stub_backends())
            .bake(&[])
            .unwrap();
        assert!(report.success());

        let pages = page_texts(&project.path("dist/brochure/brochure-2025.pdf"));
        assert!(pages[0].contains("Scripted cover p1"));

        let input: Value =
            serde_json::from_str(&fs::read_to_string(project.path("brochure/input.json")).unwrap())
                .unwrap();
        assert_eq!(input["document"], json!("brochure"));
        assert_eq!(input["pages"], json!(["cover", "back"]));
        assert_eq!(input["context"]["title"], json!("Brochure"));
    }

    #[test]
    fn non_executable_bake_file_is_ignored() {
        let project = brochure_project();
        project.write("brochure/bake", "not a script\n");

        let main = MainConfig::load(project.main_config()).unwrap();
        let document = DocumentConfig::load(&main.documents[0], &main).unwrap();
        let processor = Processor::select(&document, &HookRegistry::new()).unwrap();
        assert!(matches!(processor, Processor::Default));
    }

    #[test]
    fn failing_script_fails_the_document() {
        let project = with_custom_bake("hooks/fail.sh");
        project.write("brochure/hooks/fail.sh", "#!/bin/sh\nexit 4\n");
        make_executable(&project.path("brochure/hooks/fail.sh"));

        let report = Baker::new(project.main_config(), BakerOptions::default())
            .unwrap()
            .with_backends(stub_backends())
            .bake(&[])
            .unwrap();
        match &report.outcomes[0].status {
            DocumentStatus::Failed(reason) => assert!(reason.contains("Hook execution error")),
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[test]
    fn run_hook_ignores_plain_output() {
        let temp = tempfile::TempDir::new().unwrap();
        let script = temp.path().join("hook.sh");
        fs::write(&script, "#!/bin/sh\necho just talking\n").unwrap();
        make_executable(&script);

        let update = run_hook(&script, temp.path(), &json!({})).unwrap();
        assert!(update.is_none());
    }

    #[test]
    fn run_hook_handles_large_input_and_output() {
        let temp = tempfile::TempDir::new().unwrap();
        let script = temp.path().join("hook.sh");
        fs::write(
            &script,
            "#!/bin/sh\nhead -c 300000 /dev/zero | tr '\\0' x\necho\ncat > input.json\n",
        )
        .unwrap();
        make_executable(&script);

        let text = "y".repeat(300_000);
        let update = run_hook(&script, temp.path(), &json!({"text": text})).unwrap();
        assert!(update.is_none());
        let input: Value =
            serde_json::from_str(&fs::read_to_string(temp.path().join("input.json")).unwrap())
                .unwrap();
        assert_eq!(input["text"].as_str().unwrap().len(), 300_000);
    }

    #[test]
    fn run_hook_rejects_non_object_json() {
        let temp = tempfile::TempDir::new().unwrap();
        let script = temp.path().join("hook.sh");
        fs::write(&script, "#!/bin/sh\necho '[1, 2]'\n").unwrap();
        make_executable(&script);

        let err = run_hook(&script, temp.path(), &json!({})).unwrap_err();
        assert!(matches!(err, Error::HookError(_)));
    }
}
