//! Edge-condition evaluation.
//!
//! Conditions are side-effect-free boolean expressions evaluated against the
//! source node's output. The embedded engine is hardened with operation and
//! size limits and has no file or network access by construction. Compiled
//! programs are memoized in an LRU keyed by the expression text.
//!
//! The expression environment exposes two variables:
//!
//! - `output` — the source node's output value
//! - `node` — the source node's id

pub mod cache;

pub use self::cache::{DEFAULT_CACHE_CAPACITY, ExpressionCache};

use rhai::{Dynamic, Engine, Map, Scope};
use std::sync::Arc;
use tracing::debug;
use weft_kernel::{EngineError, EngineResult, Value};

/// Evaluator for edge-gate conditions.
pub struct ConditionEvaluator {
    engine: Engine,
    cache: ExpressionCache,
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Evaluator with a custom compiled-program cache capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut engine = Engine::new();
        engine.set_max_operations(100_000);
        engine.set_max_call_levels(32);
        engine.set_max_array_size(10_000);
        engine.set_max_string_size(1_000_000);
        engine.set_strict_variables(false);

        Self {
            engine,
            cache: ExpressionCache::new(capacity),
        }
    }

    /// Return the cached program for `expr`, compiling and caching on miss.
    pub fn compile_and_cache(&self, expr: &str) -> EngineResult<Arc<rhai::AST>> {
        if let Some(program) = self.cache.get(expr) {
            return Ok(program);
        }
        debug!(expr, "compiling edge condition");
        let program = Arc::new(
            self.engine
                .compile(expr)
                .map_err(|e| EngineError::Expression(e.to_string()))?,
        );
        self.cache.put(expr, program.clone());
        Ok(program)
    }

    /// Evaluate `expr` to a boolean against the given source output.
    pub fn eval_bool(&self, expr: &str, output: &Value, node_id: &str) -> EngineResult<bool> {
        let program = self.compile_and_cache(expr)?;

        let mut scope = Scope::new();
        scope.push("output", value_to_dynamic(output));
        scope.push("node", node_id.to_string());

        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &program)
            .map_err(|e| EngineError::Expression(e.to_string()))?;

        result.clone().try_cast::<bool>().ok_or_else(|| {
            EngineError::Expression(format!(
                "condition '{expr}' evaluated to {} instead of a boolean",
                result.type_name()
            ))
        })
    }

    pub fn cache(&self) -> &ExpressionCache {
        &self.cache
    }
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a workflow value into a script-engine value.
pub fn value_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Int(i) => Dynamic::from(*i),
        Value::Float(f) => Dynamic::from(*f),
        Value::String(s) => Dynamic::from(s.clone()),
        Value::List(items) => {
            let arr: Vec<Dynamic> = items.iter().map(value_to_dynamic).collect();
            Dynamic::from(arr)
        }
        Value::Map(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone().into(), value_to_dynamic(v));
            }
            Dynamic::from(out)
        }
    }
}

/// Convert a script-engine value back into a workflow value.
pub fn dynamic_to_value(value: &Dynamic) -> Value {
    if value.is_unit() {
        Value::Null
    } else if let Some(b) = value.clone().try_cast::<bool>() {
        Value::Bool(b)
    } else if let Some(i) = value.clone().try_cast::<i64>() {
        Value::Int(i)
    } else if let Some(f) = value.clone().try_cast::<f64>() {
        Value::Float(f)
    } else if let Some(s) = value.clone().try_cast::<String>() {
        Value::String(s)
    } else if value.is_array() {
        let arr = value.clone().cast::<rhai::Array>();
        Value::List(arr.iter().map(dynamic_to_value).collect())
    } else if value.is_map() {
        let map = value.clone().cast::<Map>();
        Value::Map(
            map.iter()
                .map(|(k, v)| (k.to_string(), dynamic_to_value(v)))
                .collect(),
        )
    } else {
        Value::String(value.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use weft_kernel::value::map_value;

    #[test]
    fn string_comparison() {
        let eval = ConditionEvaluator::new();
        let output = Value::from("high");
        assert!(eval.eval_bool(r#"output == "high""#, &output, "route").unwrap());
        assert!(!eval.eval_bool(r#"output == "medium""#, &output, "route").unwrap());
    }

    #[test]
    fn numeric_and_map_access() {
        let eval = ConditionEvaluator::new();
        let output = map_value([("score", Value::Int(85))]);
        assert!(eval.eval_bool("output.score > 80", &output, "n").unwrap());
        assert!(!eval.eval_bool("output.score > 90", &output, "n").unwrap());
    }

    #[test]
    fn node_id_is_in_scope() {
        let eval = ConditionEvaluator::new();
        assert!(eval
            .eval_bool(r#"node == "router""#, &Value::Null, "router")
            .unwrap());
    }

    #[test]
    fn non_boolean_result_is_an_error() {
        let eval = ConditionEvaluator::new();
        let err = eval.eval_bool("1 + 1", &Value::Null, "n").unwrap_err();
        assert!(matches!(err, EngineError::Expression(_)));
    }

    #[test]
    fn compile_error_surfaces() {
        let eval = ConditionEvaluator::new();
        let err = eval
            .eval_bool("output ==", &Value::Null, "n")
            .unwrap_err();
        assert!(matches!(err, EngineError::Expression(_)));
    }

    #[test]
    fn programs_are_cached() {
        let eval = ConditionEvaluator::new();
        assert!(eval.cache().is_empty());
        eval.eval_bool("output == 1", &Value::Int(1), "n").unwrap();
        assert_eq!(eval.cache().len(), 1);
        eval.eval_bool("output == 1", &Value::Int(2), "n").unwrap();
        assert_eq!(eval.cache().len(), 1);
    }

    #[test]
    fn dynamic_round_trip() {
        let value = map_value([
            ("s", Value::from("x")),
            ("n", Value::Int(3)),
            ("f", Value::Float(1.5)),
            ("b", Value::Bool(true)),
            ("l", Value::List(vec![Value::Null, Value::Int(1)])),
        ]);
        let dynamic = value_to_dynamic(&value);
        assert_eq!(dynamic_to_value(&dynamic), value);
    }
}
