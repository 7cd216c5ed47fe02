pub mod policy;
pub mod session;

use rhai::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::config::SandboxConfig;
use session::SessionStore;

pub use session::DEFAULT_SESSION;

const NO_OUTPUT: &str = "<code ran, no output printed to stdout>";

/// Result of one sandboxed execution: the captured print output (or the
/// error rendered as text) and the variables newly bound during the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub output: String,
    pub new_bindings: BTreeMap<String, Value>,
}

/// Restricted script executor with per-session state capture.
///
/// Evaluation failures never surface as errors; they are rendered into the
/// textual output so the agent loop always receives a string.
pub struct Sandbox {
    engine: Engine,
    output: Arc<Mutex<String>>,
    sessions: SessionStore,
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl Sandbox {
    pub fn new(config: &SandboxConfig) -> Self {
        let output = Arc::new(Mutex::new(String::new()));
        let engine = policy::build_engine(config, output.clone());

        Self {
            engine,
            output,
            sessions: SessionStore::new(),
        }
    }

    /// Run a snippet in the named session's scope.
    pub fn execute(&mut self, session: &str, code: &str) -> ExecutionOutcome {
        let mut scope = self.sessions.take(session);

        let before: HashSet<String> = scope
            .iter_raw()
            .map(|(name, _, _)| name.to_string())
            .collect();

        self.clear_output();
        let result = self.engine.run_with_scope(&mut scope, code);
        let captured = self.take_output();

        let output = match result {
            Ok(()) => {
                if captured.is_empty() {
                    NO_OUTPUT.to_string()
                } else {
                    captured
                }
            }
            Err(e) => format!("Error during execution: {}", e),
        };

        let mut new_bindings = BTreeMap::new();
        for (name, _, value) in scope.iter() {
            if !before.contains(name) {
                new_bindings.insert(name.to_string(), dynamic_to_json(&value));
            }
        }

        self.sessions.restore(session, scope);

        ExecutionOutcome {
            output,
            new_bindings,
        }
    }

    /// Drop a session's scope. Returns whether it existed.
    pub fn reset_session(&mut self, session: &str) -> bool {
        self.sessions.reset(session)
    }

    fn clear_output(&self) {
        self.output
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    fn take_output(&self) -> String {
        std::mem::take(
            &mut *self
                .output
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}

fn dynamic_to_json(value: &rhai::Dynamic) -> Value {
    rhai::serde::from_dynamic::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> Sandbox {
        Sandbox::new(&SandboxConfig::default())
    }

    #[test]
    fn test_print_output_is_captured() {
        let mut sb = sandbox();
        let outcome = sb.execute(DEFAULT_SESSION, r#"print("hello");"#);
        assert_eq!(outcome.output, "hello\n");
        assert!(outcome.new_bindings.is_empty());
    }

    #[test]
    fn test_no_output_placeholder() {
        let mut sb = sandbox();
        let outcome = sb.execute(DEFAULT_SESSION, "let x = 1;");
        assert_eq!(outcome.output, "<code ran, no output printed to stdout>");
        assert_eq!(outcome.new_bindings.get("x"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn test_new_bindings_are_exactly_the_new_names() {
        let mut sb = sandbox();
        sb.execute("s1", "let a = 1;");

        let outcome = sb.execute("s1", "let b = 2; let c = \"three\"; a = 10;");
        let names: Vec<&String> = outcome.new_bindings.keys().collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(outcome.new_bindings.get("b"), Some(&serde_json::json!(2)));
        assert_eq!(
            outcome.new_bindings.get("c"),
            Some(&serde_json::json!("three"))
        );
    }

    #[test]
    fn test_session_state_persists_across_executions() {
        let mut sb = sandbox();
        sb.execute("s1", "let total = 40;");

        let outcome = sb.execute("s1", "total += 2; print(total);");
        assert_eq!(outcome.output, "42\n");
    }

    #[test]
    fn test_sessions_are_isolated() {
        let mut sb = sandbox();
        sb.execute("s1", "let secret = 7;");

        let outcome = sb.execute("s2", "print(secret);");
        assert!(outcome.output.starts_with("Error during execution:"));
    }

    #[test]
    fn test_reset_session() {
        let mut sb = sandbox();
        sb.execute("s1", "let x = 1;");
        assert!(sb.reset_session("s1"));

        let outcome = sb.execute("s1", "print(x);");
        assert!(outcome.output.starts_with("Error during execution:"));
    }

    #[test]
    fn test_denied_import_is_a_sandbox_error() {
        let mut sb = sandbox();
        let outcome = sb.execute(DEFAULT_SESSION, r#"import "os" as os;"#);

        assert!(outcome.output.starts_with("Error during execution:"));
        assert!(outcome.output.contains("denied in the sandbox"));
        assert!(!outcome.output.contains("Module not found"));
    }

    #[test]
    fn test_unknown_import_is_not_found() {
        let mut sb = sandbox();
        let outcome = sb.execute(DEFAULT_SESSION, r#"import "math_utils" as m;"#);

        assert!(outcome.output.starts_with("Error during execution:"));
        assert!(!outcome.output.contains("denied in the sandbox"));
    }

    #[test]
    fn test_evaluation_error_becomes_text() {
        let mut sb = sandbox();
        let outcome = sb.execute(DEFAULT_SESSION, "no_such_function();");
        assert!(outcome.output.starts_with("Error during execution:"));
    }

    #[test]
    fn test_operation_budget_is_enforced() {
        let config = SandboxConfig {
            max_operations: 1_000,
            ..SandboxConfig::default()
        };
        let mut sb = Sandbox::new(&config);

        let outcome = sb.execute(DEFAULT_SESSION, "let i = 0; while true { i += 1; }");
        assert!(outcome.output.starts_with("Error during execution:"));
    }

    #[test]
    fn test_eval_is_disabled() {
        let mut sb = sandbox();
        let outcome = sb.execute(DEFAULT_SESSION, r#"eval("1 + 1");"#);
        assert!(outcome.output.starts_with("Error during execution:"));
    }
}
