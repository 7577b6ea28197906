//! JSON schemas for the four kinds of configuration unit.
//!
//! Only the keys pdfbaker itself understands are described. Everything else is
//! user content and passes through unchecked.

use serde_json::{json, Value};

use crate::config::UnitKind;
use crate::error::{Error, Result};

fn path_spec() -> Value {
    json!({
        "oneOf": [
            {"type": "string", "minLength": 1},
            {
                "type": "object",
                "required": ["path"],
                "properties": {
                    "path": {"type": "string", "minLength": 1},
                    "name": {"type": "string", "minLength": 1}
                }
            }
        ]
    })
}

fn image_spec() -> Value {
    json!({
        "oneOf": [
            {"type": "string", "minLength": 1},
            {
                "type": "object",
                "required": ["name"],
                "properties": {
                    "name": {"type": "string", "minLength": 1},
                    "type": {"type": ["string", "null"]}
                }
            }
        ]
    })
}

/// Settings that may appear at any level of the merge chain.
fn settings_properties() -> serde_json::Map<String, Value> {
    let properties = json!({
        "directories": {
            "type": "object",
            "additionalProperties": {"type": "string"}
        },
        "svg2pdf_backend": {"enum": ["cairosvg", "inkscape", "rsvg-convert"]},
        "compress_pdf": {"type": "boolean"},
        "fail_if_exists": {"type": "boolean"},
        "template_renderers": {
            "type": "array",
            "items": {"enum": ["render_highlight"]}
        },
        "template_filters": {
            "type": "array",
            "items": {"enum": ["wordwrap"]}
        },
        "style": {"type": "object"},
        "filename": {"type": "string"},
        "images": {"type": "array", "items": image_spec()},
        "page_number": {"type": "integer"}
    });
    match properties {
        Value::Object(map) => map,
        _ => unreachable!("settings schema is an object literal"),
    }
}

fn object_schema(required: &[&str], extra: Value) -> Value {
    let mut properties = settings_properties();
    if let Value::Object(extra) = extra {
        properties.extend(extra);
    }
    json!({
        "type": "object",
        "required": required,
        "properties": properties
    })
}

/// Returns the schema for one kind of configuration unit.
pub fn schema_for(kind: UnitKind) -> Value {
    match kind {
        UnitKind::Main => object_schema(
            &["documents"],
            json!({
                "documents": {"type": "array", "items": path_spec()},
                "keep_build": {"type": "boolean"},
                "continue_on_error": {"type": "boolean"}
            }),
        ),
        UnitKind::Document => object_schema(
            &[],
            json!({
                "pages": {"type": "array", "items": path_spec()},
                "variants": {"type": "array", "items": {"type": "object"}},
                "custom_bake": {"type": "string", "minLength": 1}
            }),
        ),
        UnitKind::Variant => object_schema(
            &["name"],
            json!({
                "name": {"type": "string", "minLength": 1},
                "pages": {"type": "array", "items": path_spec()}
            }),
        ),
        UnitKind::Page => object_schema(
            &["template"],
            json!({
                "template": {"type": "string", "minLength": 1}
            }),
        ),
    }
}

/// Validates a unit against the schema of its kind.
///
/// # Arguments
/// * `kind` - Position of the unit in the merge chain
/// * `source_name` - Human readable origin, used in the error message
/// * `instance` - The raw unit
///
/// # Errors
/// * `Error::SchemaError` describing the first violation found
pub fn validate(kind: UnitKind, source_name: &str, instance: &Value) -> Result<()> {
    let schema = schema_for(kind);
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| Error::ConfigError(format!("invalid {kind} schema: {e}")))?;

    validator.validate(instance).map_err(|e| Error::SchemaError {
        kind: kind.to_string(),
        source_name: source_name.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_requires_documents() {
        let err = validate(UnitKind::Main, "main.yaml", &json!({"title": "x"})).unwrap_err();
        match err {
            Error::SchemaError { kind, message, .. } => {
                assert_eq!(kind, "main");
                assert!(message.contains("documents"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn extra_keys_pass_through() {
        let unit = json!({
            "documents": ["brochure", {"path": "docs/flyer", "name": "flyer"}],
            "conference": {"year": 2025},
            "anything": [1, 2, 3]
        });
        assert!(validate(UnitKind::Main, "main.yaml", &unit).is_ok());
    }

    #[test]
    fn recognized_keys_are_type_checked() {
        let unit = json!({"template": "page.svg.j2", "compress_pdf": "yes"});
        assert!(validate(UnitKind::Page, "page.yaml", &unit).is_err());

        let unit = json!({"documents": [], "svg2pdf_backend": "ghostscript"});
        assert!(validate(UnitKind::Main, "main.yaml", &unit).is_err());
    }

    #[test]
    fn page_requires_template() {
        assert!(validate(UnitKind::Page, "p.yaml", &json!({"title": "no template"})).is_err());
        let unit = json!({"template": "p.svg.j2", "images": ["logo.png", {"name": "a.jpg", "type": "photo"}]});
        assert!(validate(UnitKind::Page, "p.yaml", &unit).is_ok());
    }

    #[test]
    fn variant_requires_name() {
        assert!(validate(UnitKind::Variant, "v", &json!({"pages": ["a"]})).is_err());
        assert!(validate(UnitKind::Variant, "v", &json!({"name": "de", "pages": ["a"]})).is_ok());
    }
}
