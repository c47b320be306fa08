//! Template engine.
//!
//! Resolves `{{scope.path}}` references in strings and, recursively, in
//! arbitrary structured configuration values. Resolution is deterministic
//! and sandboxed: a reference can only read the variable context, never
//! mutate it.
//!
//! Supported scopes: `env` (execution vars over workflow vars), `input`
//! (parent-derived bindings) and `resource` (resource descriptors).
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = TemplateEngine::new();
//! let ctx = VariableContext::new().with_workflow_var("apiUrl", "https://x");
//! let url = engine.resolve_str("{{env.apiUrl}}/users", &ctx)?;
//! assert_eq!(url, "https://x/users");
//! ```

pub mod path;

use self::path::{PathPart, parse_part, split_path, traverse};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use weft_kernel::{Scope, TemplateError, Value, VariableContext};

/// Resolution modes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TemplateOptions {
    /// Fail the whole resolution when any reference fails.
    #[serde(default)]
    pub strict: bool,
    /// In lenient mode, keep the original `{{…}}` text for failed
    /// references instead of substituting an empty string.
    #[serde(default)]
    pub placeholder_on_missing: bool,
}

/// The `{{scope.path}}` resolver.
pub struct TemplateEngine {
    pattern: Regex,
    options: TemplateOptions,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    pub fn new() -> Self {
        Self::with_options(TemplateOptions::default())
    }

    pub fn with_options(options: TemplateOptions) -> Self {
        Self {
            pattern: Regex::new(r"\{\{([^{}]*)\}\}").unwrap(),
            options,
        }
    }

    /// Engine that fails the whole resolution on the first bad reference.
    pub fn strict() -> Self {
        Self::with_options(TemplateOptions {
            strict: true,
            placeholder_on_missing: false,
        })
    }

    pub fn options(&self) -> TemplateOptions {
        self.options
    }

    /// Substitute every reference in `input`.
    ///
    /// Replacement text is never re-scanned, so rendered values containing
    /// braces cannot inject further references.
    pub fn resolve_str(
        &self,
        input: &str,
        ctx: &VariableContext,
    ) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(input.len());
        let mut last = 0;

        for caps in self.pattern.captures_iter(input) {
            let Some(matched) = caps.get(0) else { continue };
            out.push_str(&input[last..matched.start()]);
            last = matched.end();

            match self.resolve_reference(&caps[1], ctx) {
                Ok(value) => out.push_str(&value.render()),
                Err(err) if self.options.strict => return Err(err),
                Err(_) if self.options.placeholder_on_missing => {
                    out.push_str(matched.as_str());
                }
                Err(_) => {} // lenient: empty substitution
            }
        }

        out.push_str(&input[last..]);
        Ok(out)
    }

    /// Recursively resolve a structured value: strings are substituted,
    /// mappings and sequences are walked, other scalars pass through
    /// unchanged.
    pub fn resolve_value(
        &self,
        value: &Value,
        ctx: &VariableContext,
    ) -> Result<Value, TemplateError> {
        match value {
            Value::String(s) => Ok(Value::String(self.resolve_str(s, ctx)?)),
            Value::Map(map) => {
                let mut resolved = HashMap::with_capacity(map.len());
                for (key, entry) in map {
                    resolved.insert(key.clone(), self.resolve_value(entry, ctx)?);
                }
                Ok(Value::Map(resolved))
            }
            Value::List(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    resolved.push(self.resolve_value(item, ctx)?);
                }
                Ok(Value::List(resolved))
            }
            scalar => Ok(scalar.clone()),
        }
    }

    /// Resolve a foreign JSON value through the universal shape.
    pub fn resolve_json(
        &self,
        value: &serde_json::Value,
        ctx: &VariableContext,
    ) -> Result<serde_json::Value, TemplateError> {
        let resolved = self.resolve_value(&Value::from(value.clone()), ctx)?;
        Ok(resolved.to_json())
    }

    /// Resolve one reference body (the text between the braces) to a value.
    pub fn resolve_reference(
        &self,
        body: &str,
        ctx: &VariableContext,
    ) -> Result<Value, TemplateError> {
        let (scope, parts) = parse_reference(body)?;

        // The first part names the scope root; its indices apply before the
        // remaining parts descend.
        let first = &parts[0];
        let key = first.key.as_deref().ok_or_else(|| {
            TemplateError::InvalidPath(format!("reference '{body}' must start with an identifier"))
        })?;
        let root = ctx.lookup(scope, key).ok_or_else(|| {
            TemplateError::VariableNotFound(format!("{}.{}", scope.as_str(), key))
        })?;

        let root = traverse(
            root,
            &[PathPart {
                key: None,
                indices: first.indices.clone(),
            }],
        )?;
        let value = traverse(root, &parts[1..])?;
        Ok(value.clone())
    }

    /// Walk a template string and reject any reference whose scope is
    /// unknown or whose path is empty or malformed. Does not consult the
    /// variable context.
    pub fn validate(&self, input: &str) -> Result<(), TemplateError> {
        for body in self.extract_references(input) {
            parse_reference(&body)?;
        }
        Ok(())
    }

    /// All reference bodies appearing in a template string.
    pub fn extract_references(&self, input: &str) -> Vec<String> {
        self.pattern
            .captures_iter(input)
            .map(|caps| caps[1].to_string())
            .collect()
    }
}

/// Parse `scope.path` into the scope and its path parts.
fn parse_reference(body: &str) -> Result<(Scope, Vec<PathPart>), TemplateError> {
    let body = body.trim();
    let segments = split_path(body);
    if segments.len() < 2 || segments[1..].iter().all(|s| s.is_empty()) {
        return Err(TemplateError::InvalidTemplate(format!(
            "reference '{body}' must have the form scope.path"
        )));
    }

    let scope: Scope = segments[0].parse().map_err(|_| {
        TemplateError::InvalidTemplate(format!("unknown scope '{}'", segments[0]))
    })?;

    let parts = segments[1..]
        .iter()
        .map(|s| parse_part(s))
        .collect::<Result<Vec<_>, _>>()?;

    Ok((scope, parts))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use weft_kernel::value::map_value;

    fn nested_ctx() -> VariableContext {
        VariableContext::new()
            .with_workflow_var("apiUrl", "https://x")
            .with_input_var(
                "response",
                map_value([(
                    "data",
                    map_value([(
                        "users",
                        Value::List(vec![
                            map_value([
                                ("id", Value::Int(1)),
                                ("name", Value::from("Alice")),
                            ]),
                            map_value([
                                ("id", Value::Int(2)),
                                ("email", Value::from("bob@example.com")),
                            ]),
                        ]),
                    )]),
                )]),
            )
    }

    #[test]
    fn env_precedence_execution_over_workflow() {
        let ctx = VariableContext::new()
            .with_workflow_var("apiKey", "wf")
            .with_execution_var("apiKey", "exec");
        let engine = TemplateEngine::new();
        assert_eq!(
            engine.resolve_str("Key: {{env.apiKey}}", &ctx).unwrap(),
            "Key: exec"
        );
    }

    #[test]
    fn nested_and_array_paths() {
        let engine = TemplateEngine::new();
        let ctx = nested_ctx();

        assert_eq!(
            engine
                .resolve_str(
                    "{{env.apiUrl}}/users/{{input.response.data.users[0].id}}",
                    &ctx
                )
                .unwrap(),
            "https://x/users/1"
        );
        assert_eq!(
            engine
                .resolve_str("{{input.response.data.users[1].email}}", &ctx)
                .unwrap(),
            "bob@example.com"
        );
    }

    #[test]
    fn strict_missing_variable_fails() {
        let engine = TemplateEngine::strict();
        let err = engine
            .resolve_str("X={{env.missing}}", &VariableContext::new())
            .unwrap_err();
        assert!(matches!(err, TemplateError::VariableNotFound(_)));
    }

    #[test]
    fn lenient_placeholder_keeps_original_text() {
        let engine = TemplateEngine::with_options(TemplateOptions {
            strict: false,
            placeholder_on_missing: true,
        });
        assert_eq!(
            engine
                .resolve_str("X={{env.missing}}", &VariableContext::new())
                .unwrap(),
            "X={{env.missing}}"
        );
    }

    #[test]
    fn lenient_without_placeholder_substitutes_empty() {
        let engine = TemplateEngine::new();
        assert_eq!(
            engine
                .resolve_str("X={{env.missing}}", &VariableContext::new())
                .unwrap(),
            "X="
        );
    }

    #[test]
    fn whole_string_reference_yields_text_rendering() {
        let engine = TemplateEngine::new();
        let ctx = VariableContext::new().with_workflow_var("count", 3i64);
        assert_eq!(engine.resolve_str("{{env.count}}", &ctx).unwrap(), "3");
    }

    #[test]
    fn structured_value_renders_as_compact_json() {
        let engine = TemplateEngine::new();
        let ctx = VariableContext::new()
            .with_input_var("items", Value::List(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(
            engine.resolve_str("got {{input.items}}", &ctx).unwrap(),
            "got [1,2]"
        );
    }

    #[test]
    fn rendered_braces_are_not_rescanned() {
        let engine = TemplateEngine::new();
        let ctx = VariableContext::new()
            .with_input_var("m", map_value([("k", Value::from("{{env.x}}"))]));
        // The rendered JSON contains a reference-shaped substring; it must
        // survive verbatim.
        assert_eq!(
            engine.resolve_str("{{input.m}}", &ctx).unwrap(),
            r#"{"k":"{{env.x}}"}"#
        );
    }

    #[test]
    fn resolve_value_recurses_and_passes_scalars() {
        let engine = TemplateEngine::new();
        let ctx = VariableContext::new().with_workflow_var("name", "weft");

        let config = map_value([
            ("url", Value::from("https://{{env.name}}.dev")),
            ("retries", Value::Int(3)),
            (
                "headers",
                Value::List(vec![Value::from("x-{{env.name}}"), Value::Bool(true)]),
            ),
        ]);

        let resolved = engine.resolve_value(&config, &ctx).unwrap();
        assert_eq!(
            resolved.get("url").and_then(|v| v.as_str()),
            Some("https://weft.dev")
        );
        assert_eq!(resolved.get("retries").and_then(|v| v.as_i64()), Some(3));
        let headers = resolved.get("headers").and_then(|v| v.as_list()).unwrap();
        assert_eq!(headers[0].as_str(), Some("x-weft"));
        assert_eq!(headers[1].as_bool(), Some(true));
    }

    #[test]
    fn reference_free_value_round_trips_unchanged() {
        let engine = TemplateEngine::strict();
        let value = map_value([
            ("a", Value::List(vec![Value::Int(1), Value::Null])),
            ("b", map_value([("c", Value::Float(2.5))])),
            ("d", Value::from("plain text")),
        ]);
        assert_eq!(
            engine.resolve_value(&value, &VariableContext::new()).unwrap(),
            value
        );
    }

    #[test]
    fn validate_rejects_unknown_scope_and_empty_path() {
        let engine = TemplateEngine::new();
        assert!(engine.validate("{{env.ok}} and {{input.a.b[0]}}").is_ok());
        assert!(matches!(
            engine.validate("{{workflow.x}}"),
            Err(TemplateError::InvalidTemplate(_))
        ));
        assert!(matches!(
            engine.validate("{{env}}"),
            Err(TemplateError::InvalidTemplate(_))
        ));
        assert!(matches!(
            engine.validate("{{env.}}"),
            Err(TemplateError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn whitespace_around_dots_is_tolerated() {
        let engine = TemplateEngine::new();
        let ctx = VariableContext::new().with_workflow_var("k", "v");
        assert_eq!(engine.resolve_str("{{ env . k }}", &ctx).unwrap(), "v");
    }

    #[test]
    fn out_of_bounds_index_is_not_found() {
        let strict = TemplateEngine::strict();
        let ctx = VariableContext::new()
            .with_input_var("items", Value::List(vec![Value::Int(1)]));
        assert!(matches!(
            strict.resolve_str("{{input.items[9]}}", &ctx),
            Err(TemplateError::ArrayOutOfBounds { index: 9, len: 1 })
        ));

        // Lenient: empty substitution.
        let lenient = TemplateEngine::new();
        assert_eq!(lenient.resolve_str("x{{input.items[9]}}y", &ctx).unwrap(), "xy");
    }

    #[test]
    fn resolve_json_bridges_foreign_values() {
        let engine = TemplateEngine::new();
        let ctx = VariableContext::new().with_workflow_var("host", "example.com");
        let json = serde_json::json!({"url": "https://{{env.host}}/api", "port": 443});
        let resolved = engine.resolve_json(&json, &ctx).unwrap();
        assert_eq!(resolved["url"], "https://example.com/api");
        assert_eq!(resolved["port"], 443);
    }
}
