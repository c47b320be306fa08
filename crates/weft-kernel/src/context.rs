//! Variable context.
//!
//! Template references resolve against four named scopes:
//!
//! - `workflow_vars` — variables declared on the workflow itself
//! - `execution_vars` — runtime overrides and published node outputs
//! - `input_vars` — parent node outputs visible to the current node
//! - `resource_vars` — named resource descriptors by alias
//!
//! Lookup of `env.X` returns `execution_vars[X]` if present, otherwise
//! `workflow_vars[X]`. `input.X` and `resource.X` consult only their own
//! scope.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Top-level namespace of a template reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Env,
    Input,
    Resource,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Env => "env",
            Scope::Input => "input",
            Scope::Resource => "resource",
        }
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "env" => Ok(Scope::Env),
            "input" => Ok(Scope::Input),
            "resource" => Ok(Scope::Resource),
            other => Err(format!("unknown scope '{other}'")),
        }
    }
}

/// The multi-scope variable store consumed by template resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableContext {
    #[serde(default)]
    pub workflow_vars: HashMap<String, Value>,
    #[serde(default)]
    pub execution_vars: HashMap<String, Value>,
    #[serde(default)]
    pub input_vars: HashMap<String, Value>,
    #[serde(default)]
    pub resource_vars: HashMap<String, Value>,
}

impl VariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workflow_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.workflow_vars.insert(key.into(), value.into());
        self
    }

    pub fn with_execution_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.execution_vars.insert(key.into(), value.into());
        self
    }

    pub fn with_input_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.input_vars.insert(key.into(), value.into());
        self
    }

    pub fn with_resource_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.resource_vars.insert(key.into(), value.into());
        self
    }

    /// Resolve the root of a reference: scope + first path key.
    ///
    /// `env` consults execution vars before workflow vars; the other scopes
    /// consult only themselves.
    pub fn lookup(&self, scope: Scope, key: &str) -> Option<&Value> {
        match scope {
            Scope::Env => self
                .execution_vars
                .get(key)
                .or_else(|| self.workflow_vars.get(key)),
            Scope::Input => self.input_vars.get(key),
            Scope::Resource => self.resource_vars.get(key),
        }
    }

    /// Derive a per-node context: same workflow/execution/resource scopes,
    /// `input_vars` replaced with the node's parent-derived bindings.
    pub fn child_with_inputs(&self, inputs: HashMap<String, Value>) -> Self {
        Self {
            workflow_vars: self.workflow_vars.clone(),
            execution_vars: self.execution_vars.clone(),
            input_vars: inputs,
            resource_vars: self.resource_vars.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_parsing() {
        assert_eq!("env".parse::<Scope>(), Ok(Scope::Env));
        assert_eq!("input".parse::<Scope>(), Ok(Scope::Input));
        assert_eq!("resource".parse::<Scope>(), Ok(Scope::Resource));
        assert!("workflow".parse::<Scope>().is_err());
    }

    #[test]
    fn env_prefers_execution_vars() {
        let ctx = VariableContext::new()
            .with_workflow_var("apiKey", "wf")
            .with_execution_var("apiKey", "exec");
        assert_eq!(
            ctx.lookup(Scope::Env, "apiKey").and_then(|v| v.as_str()),
            Some("exec")
        );
    }

    #[test]
    fn env_falls_back_to_workflow_vars() {
        let ctx = VariableContext::new().with_workflow_var("region", "eu");
        assert_eq!(
            ctx.lookup(Scope::Env, "region").and_then(|v| v.as_str()),
            Some("eu")
        );
        assert!(ctx.lookup(Scope::Env, "missing").is_none());
    }

    #[test]
    fn input_and_resource_do_not_fall_back() {
        let ctx = VariableContext::new().with_workflow_var("k", "wf");
        assert!(ctx.lookup(Scope::Input, "k").is_none());
        assert!(ctx.lookup(Scope::Resource, "k").is_none());
    }

    #[test]
    fn child_with_inputs_replaces_input_scope() {
        let ctx = VariableContext::new()
            .with_workflow_var("base", 1i64)
            .with_input_var("stale", 2i64);

        let mut inputs = HashMap::new();
        inputs.insert("fresh".to_string(), Value::from(3i64));
        let child = ctx.child_with_inputs(inputs);

        assert!(child.lookup(Scope::Input, "stale").is_none());
        assert_eq!(
            child.lookup(Scope::Input, "fresh").and_then(|v| v.as_i64()),
            Some(3)
        );
        assert_eq!(
            child.lookup(Scope::Env, "base").and_then(|v| v.as_i64()),
            Some(1)
        );
    }
}
