//! Resolution of merged configuration into a template context.
//!
//! String values may contain template expressions referring to any other key of
//! the same merged mapping. They are evaluated against the fully merged mapping
//! until nothing changes, with a hard cap on the number of passes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use indexmap::IndexSet;
use log::debug;
use regex::Regex;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use crate::config::ImageSpec;
use crate::constants::MAX_RESOLVE_ITERATIONS;
use crate::error::{Error, Result, TemplateWarning};
use crate::merge::Mapping;
use crate::renderer::TemplateRenderer;

/// A resolved context with the undefined references met on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub context: Mapping,
    pub warnings: Vec<TemplateWarning>,
}

/// Evaluates template expressions in configuration values.
pub struct ContextResolver<'a> {
    renderer: &'a dyn TemplateRenderer,
    max_iterations: usize,
}

impl<'a> ContextResolver<'a> {
    pub fn new(renderer: &'a dyn TemplateRenderer) -> Self {
        Self { renderer, max_iterations: MAX_RESOLVE_ITERATIONS }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Substitutes expressions in every string value of `context`.
    ///
    /// # Errors
    /// * `Error::ConfigError` if a value refers to its own key, if no fixed point
    ///   is reached within the iteration cap, or if an expression is malformed
    pub fn resolve(&self, context: &Mapping) -> Result<Resolution> {
        let mut current = context.clone();
        let mut warnings = IndexSet::new();

        for _ in 0..self.max_iterations {
            let namespace = Value::Object(current.clone());
            let mut path = Vec::new();
            let next = self.resolve_mapping(&current, &namespace, &mut path, &mut warnings)?;
            if next == current {
                return Ok(Resolution { context: next, warnings: warnings.into_iter().collect() });
            }
            current = next;
        }

        Err(Error::ConfigError(format!(
            "expressions did not settle after {} passes, possible circular reference",
            self.max_iterations
        )))
    }

    /// Resolves one page context: `page_number` is injected before and after
    /// evaluation so it can be used in expressions but never overridden, then
    /// images are embedded.
    pub fn resolve_page(
        &self,
        context: &Mapping,
        page_number: usize,
        images_dir: &Path,
    ) -> Result<Resolution> {
        let mut context = context.clone();
        inject_page_number(&mut context, page_number);
        let mut resolution = self.resolve(&context)?;
        inject_page_number(&mut resolution.context, page_number);
        resolve_images(&mut resolution.context, images_dir)?;
        Ok(resolution)
    }

    fn resolve_mapping(
        &self,
        mapping: &Mapping,
        namespace: &Value,
        path: &mut Vec<String>,
        warnings: &mut IndexSet<TemplateWarning>,
    ) -> Result<Mapping> {
        let mut resolved = Map::new();
        for (key, value) in mapping {
            path.push(key.clone());
            let value = self.resolve_value(value, namespace, path, warnings)?;
            path.pop();
            resolved.insert(key.clone(), value);
        }
        Ok(resolved)
    }

    fn resolve_value(
        &self,
        value: &Value,
        namespace: &Value,
        path: &mut Vec<String>,
        warnings: &mut IndexSet<TemplateWarning>,
    ) -> Result<Value> {
        match value {
            Value::String(source) => {
                check_self_reference(source, path)?;
                let origin = format!("configuration key '{}'", path.join("."));
                let rendered = self
                    .renderer
                    .render_str(source, namespace, &origin)
                    .map_err(|e| {
                        Error::ConfigError(format!("cannot render '{source}' in {origin}: {e}"))
                    })?;
                warnings.extend(rendered.warnings);
                Ok(Value::String(rendered.output))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_value(item, namespace, path, warnings))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(mapping) => self
                .resolve_mapping(mapping, namespace, path, warnings)
                .map(Value::Object),
            _ => Ok(value.clone()),
        }
    }
}

/// Rejects a value that refers to the key it is stored under, or to one of
/// that key's parents.
fn check_self_reference(source: &str, path: &[String]) -> Result<()> {
    if !source.contains("{{") {
        return Ok(());
    }
    for depth in 1..=path.len() {
        let name = path[..depth].join(".");
        let pattern = format!(r"\{{\{{\s*{}\s*\}}\}}", regex::escape(&name));
        let re = Regex::new(&pattern)
            .map_err(|e| Error::ConfigError(format!("invalid key '{name}': {e}")))?;
        if re.is_match(source) {
            return Err(Error::ConfigError(format!(
                "circular reference: '{}' refers to '{name}' in '{source}'",
                path.join(".")
            )));
        }
    }
    Ok(())
}

/// Sets `page_number`, replacing any value from configuration.
pub fn inject_page_number(context: &mut Mapping, page_number: usize) {
    let value = Value::from(page_number);
    if let Some(existing) = context.get("page_number") {
        if *existing != value {
            debug!("Ignoring configured page_number {} (page is {})", existing, page_number);
        }
    }
    context.insert("page_number".to_string(), value);
}

/// Embeds every image listed under `images` as a base64 data URI.
///
/// Each entry becomes `{name, type, data}`; `type` defaults to `"default"`.
///
/// # Errors
/// * `Error::ImageNotFound` if an image file does not exist
pub fn resolve_images(context: &mut Mapping, images_dir: &Path) -> Result<()> {
    let images: Vec<ImageSpec> = match context.get("images") {
        None | Some(Value::Null) => return Ok(()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| Error::ConfigError(format!("invalid images: {e}")))?,
    };

    let mut resolved = Vec::with_capacity(images.len());
    for image in images {
        let data = encode_image(&image.name, images_dir)?;
        let mut entry = Map::new();
        entry.insert("name".to_string(), Value::String(image.name));
        entry.insert("type".to_string(), Value::String(image.kind));
        entry.insert("data".to_string(), Value::String(data));
        resolved.push(Value::Object(entry));
    }

    context.insert("images".to_string(), Value::Array(resolved));
    Ok(())
}

/// Reads an image and returns it as a `data:` URI.
pub fn encode_image(name: &str, images_dir: &Path) -> Result<String> {
    let path = images_dir.join(name);
    if !path.is_file() {
        return Err(Error::ImageNotFound { path });
    }
    let bytes = fs::read(&path)?;
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let media_type = match extension.as_str() {
        "jpg" => "jpeg",
        "svg" => "svg+xml",
        other => other,
    };
    Ok(format!("data:image/{};base64,{}", media_type, STANDARD.encode(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::MiniJinjaRenderer;
    use serde_json::json;
    use tempfile::TempDir;

    fn mapping(value: Value) -> Mapping {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected a mapping"),
        }
    }

    #[test]
    fn expressions_see_the_whole_context() {
        let renderer = MiniJinjaRenderer::new();
        let resolver = ContextResolver::new(&renderer);
        let context = mapping(json!({
            "filename": "report-{{ conference.year }}-{{ variant.name }}",
            "conference": {"year": 2025, "title": "Summit {{ conference.year }}"},
            "variant": {"name": "de"}
        }));
        let resolution = resolver.resolve(&context).unwrap();
        assert_eq!(resolution.context["filename"], json!("report-2025-de"));
        assert_eq!(resolution.context["conference"]["year"], json!(2025));
        assert!(resolution.warnings.is_empty());
    }

    #[test]
    fn chained_references_reach_a_fixed_point() {
        let renderer = MiniJinjaRenderer::new();
        let resolver = ContextResolver::new(&renderer);
        let context = mapping(json!({"a": "{{ b }}", "b": "{{ c }}", "c": "value"}));
        let resolution = resolver.resolve(&context).unwrap();
        assert_eq!(resolution.context["a"], json!("value"));
    }

    #[test]
    fn mutual_references_do_not_settle() {
        let renderer = MiniJinjaRenderer::new();
        let resolver = ContextResolver::new(&renderer).with_max_iterations(3);
        let context = mapping(json!({"a": "x{{ b }}", "b": "y{{ a }}"}));
        assert!(matches!(resolver.resolve(&context), Err(Error::ConfigError(_))));
    }

    #[test]
    fn self_reference_is_rejected() {
        let renderer = MiniJinjaRenderer::new();
        let resolver = ContextResolver::new(&renderer);
        let context = mapping(json!({"filename": "{{ filename }}.v2"}));
        assert!(matches!(resolver.resolve(&context), Err(Error::ConfigError(_))));
    }

    #[test]
    fn undefined_references_warn_and_continue() {
        let renderer = MiniJinjaRenderer::new();
        let resolver = ContextResolver::new(&renderer);
        let context = mapping(json!({"title": "Hello {{ who }}"}));
        let resolution = resolver.resolve(&context).unwrap();
        assert_eq!(resolution.context["title"], json!("Hello "));
        assert_eq!(resolution.warnings.len(), 1);
        assert_eq!(resolution.warnings[0].variable, "who");
    }

    #[test]
    fn page_number_cannot_be_overridden() {
        let renderer = MiniJinjaRenderer::new();
        let resolver = ContextResolver::new(&renderer);
        let temp = TempDir::new().unwrap();
        let context = mapping(json!({"page_number": 99, "label": "Page {{ page_number }}"}));
        let resolution = resolver.resolve_page(&context, 2, temp.path()).unwrap();
        assert_eq!(resolution.context["page_number"], json!(2));
        assert_eq!(resolution.context["label"], json!("Page 2"));
    }

    #[test]
    fn images_are_embedded() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("logo.png"), b"png-bytes").unwrap();
        let mut context = mapping(json!({"images": ["logo.png", {"name": "logo.png", "type": "icon"}]}));

        resolve_images(&mut context, temp.path()).unwrap();
        let images = context["images"].as_array().unwrap();
        assert_eq!(images[0]["type"], json!("default"));
        assert_eq!(images[1]["type"], json!("icon"));
        assert_eq!(
            images[0]["data"],
            json!(format!("data:image/png;base64,{}", STANDARD.encode(b"png-bytes")))
        );
    }

    #[test]
    fn missing_image_is_an_error() {
        let temp = TempDir::new().unwrap();
        let mut context = mapping(json!({"images": [{"name": "nope.png"}]}));
        let err = resolve_images(&mut context, temp.path()).unwrap_err();
        assert!(matches!(err, Error::ImageNotFound { .. }));
    }
}
