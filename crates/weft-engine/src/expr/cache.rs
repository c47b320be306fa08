//! Compiled-expression cache.
//!
//! Edge conditions are small and heavily repeated across executions, so the
//! evaluator keeps compiled programs in a bounded LRU keyed by expression
//! text. All operations are internally synchronized; `get` promotes the
//! entry to most-recently-used.

use lru::LruCache;
use parking_lot::Mutex;
use rhai::AST;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default capacity of the expression cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Bounded LRU of compiled programs.
pub struct ExpressionCache {
    inner: Mutex<LruCache<String, Arc<AST>>>,
}

impl ExpressionCache {
    /// Cache holding at most `capacity` programs (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Fetch a program and promote it to most-recently-used.
    pub fn get(&self, expr: &str) -> Option<Arc<AST>> {
        self.inner.lock().get(expr).cloned()
    }

    /// Insert or overwrite a program, evicting the least-recently-used
    /// entry when over capacity.
    pub fn put(&self, expr: impl Into<String>, program: Arc<AST>) {
        self.inner.lock().put(expr.into(), program);
    }

    /// Whether a program is cached, without promoting it.
    pub fn contains(&self, expr: &str) -> bool {
        self.inner.lock().peek(expr).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for ExpressionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
