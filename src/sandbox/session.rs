use rhai::Scope;
use std::collections::HashMap;

pub const DEFAULT_SESSION: &str = "default";

/// Per-session variable scopes, retained across executions so the agent can
/// build on earlier results.
#[derive(Debug, Default)]
pub struct SessionStore {
    scopes: HashMap<String, Scope<'static>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a session's scope out of the store, creating it if absent.
    /// Callers hand the scope back via [`restore`](Self::restore).
    pub fn take(&mut self, session: &str) -> Scope<'static> {
        self.scopes.remove(session).unwrap_or_else(Scope::new)
    }

    pub fn restore(&mut self, session: &str, scope: Scope<'static>) {
        self.scopes.insert(session.to_string(), scope);
    }

    /// Drop a session's scope. Returns whether it existed.
    pub fn reset(&mut self, session: &str) -> bool {
        self.scopes.remove(session).is_some()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_and_restore_keeps_bindings() {
        let mut store = SessionStore::new();

        let mut scope = store.take("a");
        scope.push("x", 1_i64);
        store.restore("a", scope);

        let scope = store.take("a");
        assert!(scope.contains("x"));
        store.restore("a", scope);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_reset() {
        let mut store = SessionStore::new();
        let scope = store.take("a");
        store.restore("a", scope);

        assert!(store.reset("a"));
        assert!(!store.reset("a"));
        assert!(store.is_empty());
    }
}
