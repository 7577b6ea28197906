//! Template renderer and rendering functionality for pdfbaker.
//! Wraps a MiniJinja environment configured with pdfbaker's filters and
//! content renderers, and reports references to undefined variables instead
//! of failing on them.
use indexmap::IndexSet;
use log::trace;
use minijinja::{path_loader, Environment, Template, UndefinedBehavior};
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::config::{ContentRenderer, Settings, TemplateFilter};
use crate::constants::DEFAULT_WORDWRAP_WIDTH;
use crate::error::{Result, TemplateWarning};

/// Names that are never reported as undefined.
const BUILTIN_NAMES: [&str; 10] = [
    "range", "dict", "debug", "namespace", "loop", "self", "super", "varargs", "kwargs", "caller",
];

/// Output of a render together with the undefined references it hit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rendered {
    pub output: String,
    pub warnings: Vec<TemplateWarning>,
}

/// Trait for template rendering engines.
pub trait TemplateRenderer: Sync {
    /// Renders an inline expression, e.g. a configuration value.
    ///
    /// # Arguments
    /// * `source` - Template string to render
    /// * `context` - Context variables for rendering
    /// * `origin` - Where the string came from, used in warnings
    fn render_str(&self, source: &str, context: &Value, origin: &str) -> Result<Rendered>;

    /// Renders a template file and applies the configured content renderers.
    fn render_file(&self, path: &Path, context: &Value) -> Result<Rendered>;
}

/// MiniJinja-based template rendering engine.
pub struct MiniJinjaRenderer {
    /// MiniJinja environment instance
    env: Environment<'static>,
    renderers: Vec<ContentRenderer>,
}

impl MiniJinjaRenderer {
    /// Creates a renderer with the default filters and content renderers.
    pub fn new() -> Self {
        Self::with_settings(&Settings::default())
    }

    /// Creates a renderer with the filters and content renderers from `settings`.
    pub fn with_settings(settings: &Settings) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        for filter in &settings.template_filters {
            match filter {
                TemplateFilter::Wordwrap => env.add_filter("wordwrap", wordwrap_filter),
            }
        }
        Self { env, renderers: settings.template_renderers.clone() }
    }

    fn render_template(
        &self,
        tmpl: &Template<'_, '_>,
        context: &Value,
        origin: &str,
    ) -> Result<Rendered> {
        let warnings = undefined_variables(tmpl, context, origin);
        let output = tmpl.render(context)?;
        Ok(Rendered { output, warnings })
    }
}

impl Default for MiniJinjaRenderer {
    fn default() -> Self {
        MiniJinjaRenderer::new()
    }
}

impl TemplateRenderer for MiniJinjaRenderer {
    fn render_str(&self, source: &str, context: &Value, origin: &str) -> Result<Rendered> {
        if !source.contains("{{") && !source.contains("{%") {
            return Ok(Rendered { output: source.to_string(), warnings: Vec::new() });
        }
        let tmpl = self.env.template_from_str(source)?;
        self.render_template(&tmpl, context, origin)
    }

    /// Renders a template file using MiniJinja.
    ///
    /// Includes and imports are looked up next to the template.
    ///
    /// # Errors
    /// * `Error::IoError` if the template cannot be read
    /// * `Error::MinijinjaError` if the template is malformed or rendering fails
    fn render_file(&self, path: &Path, context: &Value) -> Result<Rendered> {
        let source = fs::read_to_string(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut env = self.env.clone();
        if let Some(parent) = path.parent() {
            env.set_loader(path_loader(parent));
        }
        env.add_template_owned(name.clone(), source)?;
        let tmpl = env.get_template(&name)?;

        let mut rendered = self.render_template(&tmpl, context, &name)?;
        for renderer in &self.renderers {
            rendered.output = match renderer {
                ContentRenderer::RenderHighlight => render_highlight(&rendered.output, context),
            };
        }
        Ok(rendered)
    }
}

/// Collects the variables a template reads that the context does not define.
fn undefined_variables(tmpl: &Template<'_, '_>, context: &Value, origin: &str) -> Vec<TemplateWarning> {
    let mut names: Vec<String> = tmpl.undeclared_variables(true).into_iter().collect();
    names.sort();

    let mut warnings = IndexSet::new();
    for name in names {
        let root = name.split('.').next().unwrap_or_default();
        if BUILTIN_NAMES.contains(&root) || is_defined(context, &name) {
            continue;
        }
        trace!("Undefined variable '{}' in {}", name, origin);
        warnings.insert(TemplateWarning { variable: name, origin: origin.to_string() });
    }
    warnings.into_iter().collect()
}

/// Walks a dotted name through nested mappings.
///
/// Lookups through non-mapping values (list indexing, string methods) count
/// as defined since they cannot be checked statically.
fn is_defined(context: &Value, dotted: &str) -> bool {
    let mut current = context;
    for segment in dotted.split('.') {
        match current {
            Value::Object(map) => match map.get(segment) {
                Some(value) => current = value,
                None => return false,
            },
            Value::Null => return false,
            _ => return true,
        }
    }
    true
}

fn wordwrap_filter(text: minijinja::Value, max_chars: Option<usize>) -> Vec<String> {
    if text.is_undefined() || text.is_none() {
        return Vec::new();
    }
    let text = match text.as_str() {
        Some(text) => text.to_string(),
        None => text.to_string(),
    };
    wordwrap(&text, max_chars.unwrap_or(DEFAULT_WORDWRAP_WIDTH))
}

/// Splits text into lines of at most `max_chars`, breaking at word boundaries.
///
/// Words longer than `max_chars` get a line of their own.
pub fn wordwrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let width = current.chars().count();
        let separator = usize::from(width > 0);
        if width + separator + word.chars().count() <= max_chars {
            if separator == 1 {
                current.push(' ');
            }
            current.push_str(word);
        } else {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

const HIGHLIGHT_OPEN: &str = "<highlight>";
const HIGHLIGHT_CLOSE: &str = "</highlight>";

/// Converts `<highlight>` tags into SVG `<tspan>` elements.
///
/// The fill colour comes from `style.highlight_color`; without it the markup is
/// returned unchanged. Nested tags are converted innermost first.
pub fn render_highlight(markup: &str, context: &Value) -> String {
    let Some(color) = context
        .get("style")
        .and_then(|style| style.get("highlight_color"))
        .and_then(Value::as_str)
    else {
        return markup.to_string();
    };

    let mut rendered = markup.to_string();
    while let Some(close) = rendered.find(HIGHLIGHT_CLOSE) {
        let Some(open) = rendered[..close].rfind(HIGHLIGHT_OPEN) else {
            break;
        };
        let content = &rendered[open + HIGHLIGHT_OPEN.len()..close];
        let replacement = format!(r#"<tspan style="fill:{color}">{content}</tspan>"#);
        rendered.replace_range(open..close + HIGHLIGHT_CLOSE.len(), &replacement);
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn renders_expressions() {
        let renderer = MiniJinjaRenderer::new();
        let context = json!({"conference": {"year": 2025}, "name": "test"});

        let rendered = renderer.render_str("{{ name }}-{{ conference.year }}", &context, "t").unwrap();
        assert_eq!(rendered.output, "test-2025");
        assert!(rendered.warnings.is_empty());
    }

    #[test]
    fn plain_strings_are_untouched() {
        let renderer = MiniJinjaRenderer::new();
        let rendered = renderer.render_str("just text", &json!({}), "t").unwrap();
        assert_eq!(rendered.output, "just text");
    }

    #[test]
    fn undefined_variables_are_reported() {
        let renderer = MiniJinjaRenderer::new();
        let context = json!({"style": {}});
        let rendered = renderer
            .render_str("[{{ missing }}][{{ style.color }}]", &context, "filename")
            .unwrap();
        assert_eq!(rendered.output, "[][]");
        let variables: Vec<_> = rendered.warnings.iter().map(|w| w.variable.as_str()).collect();
        assert_eq!(variables, vec!["missing", "style.color"]);
        assert_eq!(rendered.warnings[0].origin, "filename");
    }

    #[test]
    fn loops_and_conditionals_do_not_warn_on_locals() {
        let renderer = MiniJinjaRenderer::new();
        let context = json!({"items": ["a", "b"], "show": true});
        let rendered = renderer
            .render_str("{% if show %}{% for i in items %}{{ i }}{{ loop.index }}{% endfor %}{% endif %}", &context, "t")
            .unwrap();
        assert_eq!(rendered.output, "a1b2");
        assert!(rendered.warnings.is_empty());
    }

    #[test]
    fn wordwrap_breaks_at_word_boundaries() {
        assert_eq!(wordwrap("the quick brown fox", 10), vec!["the quick", "brown fox"]);
        assert_eq!(wordwrap("", 10), Vec::<String>::new());
        assert_eq!(wordwrap("supercalifragilistic is long", 5), vec!["supercalifragilistic", "is", "long"]);
    }

    #[test]
    fn wordwrap_filter_is_available_in_templates() {
        let renderer = MiniJinjaRenderer::new();
        let rendered = renderer
            .render_str("{% for line in text | wordwrap(9) %}<{{ line }}>{% endfor %}", &json!({"text": "one two three"}), "t")
            .unwrap();
        assert_eq!(rendered.output, "<one two><three>");
    }

    #[test]
    fn highlight_uses_style_color() {
        let context = json!({"style": {"highlight_color": "#ff0000"}});
        assert_eq!(
            render_highlight("a <highlight>b</highlight> c", &context),
            r##"a <tspan style="fill:#ff0000">b</tspan> c"##
        );
        assert_eq!(
            render_highlight("<highlight>x<highlight>y</highlight></highlight>", &context),
            r##"<tspan style="fill:#ff0000">x<tspan style="fill:#ff0000">y</tspan></tspan>"##
        );
        assert_eq!(render_highlight("<highlight>b</highlight>", &json!({})), "<highlight>b</highlight>");
    }

    #[test]
    fn renders_template_files_with_highlight() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("page.svg.j2");
        fs::write(&path, "<text>{{ title }} <highlight>{{ page_number }}</highlight></text>").unwrap();

        let renderer = MiniJinjaRenderer::new();
        let context = json!({"title": "Hello", "page_number": 2, "style": {"highlight_color": "blue"}});
        let rendered = renderer.render_file(&path, &context).unwrap();
        assert_eq!(rendered.output, r#"<text>Hello <tspan style="fill:blue">2</tspan></text>"#);
    }

    #[test]
    fn disabled_renderers_leave_markup_alone() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("page.svg.j2");
        fs::write(&path, "<highlight>x</highlight>").unwrap();

        let settings = Settings { template_renderers: Vec::new(), ..Settings::default() };
        let renderer = MiniJinjaRenderer::with_settings(&settings);
        let context = json!({"style": {"highlight_color": "blue"}});
        assert_eq!(renderer.render_file(&path, &context).unwrap().output, "<highlight>x</highlight>");
    }
}
