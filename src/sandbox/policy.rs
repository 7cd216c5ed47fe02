use rhai::packages::{
    BasicArrayPackage, BasicMapPackage, BasicMathPackage, CorePackage, MoreStringPackage, Package,
};
use rhai::{Dynamic, Engine, EvalAltResult, Module, ModuleResolver, Position, Shared};
use std::sync::{Arc, Mutex};

use crate::config::SandboxConfig;

/// Module path prefixes that scripts may never import.
///
/// This is name-based restriction only, not an isolation boundary: nothing
/// here limits memory, CPU time beyond the operation budget, or filesystem
/// access gained through host-registered functions.
pub const DENIED_MODULE_PREFIXES: &[&str] = &[
    "os", "sys", "process", "subprocess", "socket", "net", "fs", "io", "env", "ffi", "shell",
    "cmd", "thread",
];

pub fn is_denied_module(path: &str) -> bool {
    DENIED_MODULE_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

/// Import guard: rejects denylisted module paths with a sandbox error,
/// everything else with a plain not-found error. The engine's default
/// resolver never runs.
#[derive(Debug, Clone, Default)]
pub struct DenyListResolver;

impl ModuleResolver for DenyListResolver {
    fn resolve(
        &self,
        _engine: &Engine,
        _source: Option<&str>,
        path: &str,
        pos: Position,
    ) -> Result<Shared<Module>, Box<EvalAltResult>> {
        if is_denied_module(path) {
            let message = format!("import of module '{}' is denied in the sandbox", path);
            return Err(EvalAltResult::ErrorInModule(
                path.to_string(),
                EvalAltResult::ErrorRuntime(Dynamic::from(message), pos).into(),
                pos,
            )
            .into());
        }

        Err(EvalAltResult::ErrorModuleNotFound(path.to_string(), pos).into())
    }
}

/// Build the restricted engine: a raw engine with a curated package set,
/// the deny-list import guard, resource ceilings, and print/debug routed
/// into the capture buffer.
pub fn build_engine(config: &SandboxConfig, output: Arc<Mutex<String>>) -> Engine {
    let mut engine = Engine::new_raw();

    // Allow-listed namespace: arithmetic, logic, strings, arrays, maps, math.
    // No time, no blobs, no eval.
    engine.register_global_module(CorePackage::new().as_shared_module());
    engine.register_global_module(MoreStringPackage::new().as_shared_module());
    engine.register_global_module(BasicMathPackage::new().as_shared_module());
    engine.register_global_module(BasicArrayPackage::new().as_shared_module());
    engine.register_global_module(BasicMapPackage::new().as_shared_module());

    engine.disable_symbol("eval");
    engine.set_module_resolver(DenyListResolver);

    engine.set_max_operations(config.max_operations);
    engine.set_max_call_levels(config.max_call_levels);
    engine.set_max_string_size(config.max_string_size);
    engine.set_max_array_size(config.max_array_size);
    engine.set_max_map_size(config.max_map_size);

    let print_buffer = output.clone();
    engine.on_print(move |text| {
        let mut buf = print_buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        buf.push_str(text);
        buf.push('\n');
    });

    let debug_buffer = output;
    engine.on_debug(move |text, _source, _pos| {
        let mut buf = debug_buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        buf.push_str(text);
        buf.push('\n');
    });

    engine
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denied_prefixes() {
        assert!(is_denied_module("os"));
        assert!(is_denied_module("os/path"));
        assert!(is_denied_module("sys"));
        assert!(is_denied_module("net/http"));
        assert!(is_denied_module("subprocess"));
    }

    #[test]
    fn test_allowed_paths() {
        assert!(!is_denied_module("math"));
        assert!(!is_denied_module("my_module"));
        assert!(!is_denied_module(""));
    }
}
