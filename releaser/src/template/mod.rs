//! Template engine wrapper around minijinja.
//!
//! Templates use Jinja syntax (`{{ group.name }}`, `{% for e in entities %}`).
//! Undefined values are strict, so referencing a missing field is a render
//! error rather than an empty string. Output is never HTML-escaped: rendered
//! text ends up in files and shell command lines.

mod funcs;

use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde::Serialize;
use tracing::trace;

use crate::core::error::RenderError;

/// Renders ad-hoc templates against a context value.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_keep_trailing_newline(true);
        funcs::register(&mut env);
        Self { env }
    }

    /// Render `source` with `ctx`. `name` only labels diagnostics.
    pub fn render<S: Serialize>(
        &self,
        name: &str,
        source: &str,
        ctx: S,
    ) -> Result<String, RenderError> {
        trace!(template = name, "rendering template");
        self.env
            .render_named_str(name, source, ctx)
            .map_err(|err| RenderError::new(name, &err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_nested_paths_and_loops() {
        let engine = TemplateEngine::new();
        let ctx = json!({
            "group": {"name": "g1", "tags": ["a", "b"]},
            "entities": [{"name": "e1"}, {"name": "e2"}],
        });
        let out = engine
            .render(
                "test",
                "{{ group.name }}:{{ group.tags[1] }}:{% for e in entities %}{{ e.name }}{% if not loop.last %},{% endif %}{% endfor %}",
                &ctx,
            )
            .expect("render");
        assert_eq!(out, "g1:b:e1,e2");
    }

    #[test]
    fn missing_field_is_an_error() {
        let engine = TemplateEngine::new();
        let err = engine
            .render("path", "/out/{{ entity.missing }}.txt", json!({"entity": {}}))
            .expect_err("strict undefined");
        assert_eq!(err.name, "path");
        assert!(err.message.contains("undefined"), "{}", err.message);
    }

    #[test]
    fn defined_test_guards_optional_fields() {
        let engine = TemplateEngine::new();
        let out = engine
            .render(
                "opt",
                "{% if entity.port is defined %}{{ entity.port }}{% else %}80{% endif %}",
                json!({"entity": {}}),
            )
            .expect("render");
        assert_eq!(out, "80");
    }

    #[test]
    fn syntax_error_carries_template_name() {
        let engine = TemplateEngine::new();
        let err = engine
            .render("broken.conf", "{% if %}", json!({}))
            .expect_err("syntax error");
        assert_eq!(err.name, "broken.conf");
        assert!(err.to_string().starts_with("broken.conf: "));
    }

    #[test]
    fn html_names_are_not_escaped() {
        let engine = TemplateEngine::new();
        let out = engine
            .render("index.html", "{{ v }}", json!({"v": "<a & b>"}))
            .expect("render");
        assert_eq!(out, "<a & b>");
    }

    #[test]
    fn trailing_newline_is_kept() {
        let engine = TemplateEngine::new();
        let out = engine
            .render("f", "hello {{ n }}\n", json!({"n": 1}))
            .expect("render");
        assert_eq!(out, "hello 1\n");
    }
}
