//! Rhai script engine construction
//!
//! Every live plugin gets its own [`rhai::Engine`] built by [`build_engine`],
//! so registered functions and module resolvers never leak between plugins.

use super::error::{RhaiError, RhaiResult};
use rhai::{AST, Dynamic, Engine, Map, Scope};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

// ============================================================================
// Engine configuration
// ============================================================================

/// Engine limits
///
/// The runtime imposes no time budget on plugin code; these limits only stop
/// runaway recursion and unbounded allocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptLimits {
    /// Maximum call stack depth
    pub max_call_stack_depth: usize,
    /// Maximum number of operations, 0 for unlimited
    pub max_operations: u64,
    /// Maximum array size, 0 for unlimited
    pub max_array_size: usize,
    /// Maximum string size, 0 for unlimited
    pub max_string_size: usize,
    /// Whether to allow loops
    pub allow_loops: bool,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_call_stack_depth: 64,
            max_operations: 0,
            max_array_size: 0,
            max_string_size: 0,
            allow_loops: true,
        }
    }
}

/// Script engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptEngineConfig {
    pub limits: ScriptLimits,
    /// Reject scripts that reference undefined variables at compile time
    pub strict_variables: bool,
    /// Log every `debug` call at info level
    pub debug_mode: bool,
}

// ============================================================================
// Engine
// ============================================================================

/// Create an engine for the plugin labelled `label`.
///
/// `print` and `debug` statements as well as the `log`/`warn`/`error`
/// functions are routed to `tracing`, tagged with the plugin label.
pub fn build_engine(config: &ScriptEngineConfig, label: &str) -> Engine {
    let mut engine = Engine::new();
    apply_limits(&mut engine, &config.limits);
    engine.set_strict_variables(config.strict_variables);
    register_builtin_functions(&mut engine, label, config.debug_mode);
    engine
}

fn apply_limits(engine: &mut Engine, limits: &ScriptLimits) {
    engine.set_max_call_levels(limits.max_call_stack_depth);
    engine.set_max_operations(limits.max_operations);
    engine.set_max_array_size(limits.max_array_size);
    engine.set_max_string_size(limits.max_string_size);
    engine.set_allow_looping(limits.allow_loops);
}

fn register_builtin_functions(engine: &mut Engine, label: &str, debug_mode: bool) {
    let plugin = label.to_string();
    engine.on_print(move |msg| info!(plugin = %plugin, "{}", msg));

    let plugin = label.to_string();
    engine.on_debug(move |msg, _source, pos| {
        if debug_mode {
            info!(plugin = %plugin, "[{}] {}", pos, msg);
        } else {
            debug!(plugin = %plugin, "[{}] {}", pos, msg);
        }
    });

    let plugin = label.to_string();
    engine.register_fn("log", move |msg: &str| info!(plugin = %plugin, "{}", msg));

    let plugin = label.to_string();
    engine.register_fn("warn", move |msg: &str| warn!(plugin = %plugin, "{}", msg));

    let plugin = label.to_string();
    engine.register_fn("error", move |msg: &str| error!(plugin = %plugin, "{}", msg));

    engine.register_fn("to_json", |value: Dynamic| -> String {
        serde_json::to_string(&dynamic_to_json(&value)).unwrap_or_else(|_| "null".to_string())
    });

    engine.register_fn("from_json", |json: &str| -> Dynamic {
        serde_json::from_str::<serde_json::Value>(json)
            .map(|v| json_to_dynamic(&v))
            .unwrap_or(Dynamic::UNIT)
    });

    engine.register_fn("now_ms", || -> i64 { chrono::Utc::now().timestamp_millis() });
}

// ============================================================================
// Compilation
// ============================================================================

/// A compiled plugin script
#[derive(Debug, Clone)]
pub struct CompiledScript {
    /// Entry file
    pub path: PathBuf,
    /// Compiled AST
    pub ast: AST,
    /// Source text the AST was compiled from
    pub source: String,
    /// Compilation timestamp (unix seconds)
    pub compiled_at: i64,
}

/// Read and compile `path` with `engine`.
///
/// Imports are resolved during compilation through the engine's module
/// resolver, so a missing module fails here rather than when the plugin runs.
pub fn compile_file(engine: &Engine, path: &Path) -> RhaiResult<CompiledScript> {
    let source = std::fs::read_to_string(path)?;
    let mut ast = engine
        .compile_into_self_contained(&Scope::new(), &source)
        .map_err(|e| RhaiError::CompileError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    ast.set_source(path.to_string_lossy().as_ref());

    Ok(CompiledScript {
        path: path.to_path_buf(),
        ast,
        source,
        compiled_at: chrono::Utc::now().timestamp(),
    })
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert JSON Value to Rhai Dynamic
pub fn json_to_dynamic(value: &serde_json::Value) -> Dynamic {
    match value {
        serde_json::Value::Null => Dynamic::UNIT,
        serde_json::Value::Bool(b) => Dynamic::from(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Dynamic::from(i)
            } else if let Some(f) = n.as_f64() {
                Dynamic::from(f)
            } else {
                Dynamic::UNIT
            }
        }
        serde_json::Value::String(s) => Dynamic::from(s.clone()),
        serde_json::Value::Array(arr) => {
            let vec: Vec<Dynamic> = arr.iter().map(json_to_dynamic).collect();
            Dynamic::from(vec)
        }
        serde_json::Value::Object(obj) => {
            let mut map = Map::new();
            for (k, v) in obj {
                map.insert(k.clone().into(), json_to_dynamic(v));
            }
            Dynamic::from(map)
        }
    }
}

/// Convert Rhai Dynamic to JSON Value
pub fn dynamic_to_json(value: &Dynamic) -> serde_json::Value {
    if value.is_unit() {
        serde_json::Value::Null
    } else if let Ok(b) = value.as_bool() {
        serde_json::Value::Bool(b)
    } else if let Ok(i) = value.as_int() {
        serde_json::json!(i)
    } else if let Ok(f) = value.as_float() {
        serde_json::json!(f)
    } else if value.is_string() {
        serde_json::Value::String(value.to_string())
    } else if value.is_array() {
        let arr = value.clone().cast::<rhai::Array>();
        serde_json::Value::Array(arr.iter().map(dynamic_to_json).collect())
    } else if value.is_map() {
        let map = value.clone().cast::<Map>();
        let mut json_obj = serde_json::Map::new();
        for (k, v) in map.iter() {
            json_obj.insert(k.to_string(), dynamic_to_json(v));
        }
        serde_json::Value::Object(json_obj)
    } else {
        serde_json::Value::String(value.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_functions_are_available() {
        let engine = build_engine(&ScriptEngineConfig::default(), "test");

        let json: String = engine.eval(r#"to_json(#{ name: "x", n: 1 })"#).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, serde_json::json!({ "name": "x", "n": 1 }));

        let n: i64 = engine.eval(r#"from_json("[1, 2, 3]").len()"#).unwrap();
        assert_eq!(n, 3);

        engine.run(r#"log("hello"); print("p"); debug("d");"#).unwrap();
    }

    #[test]
    fn test_call_depth_limit() {
        let config = ScriptEngineConfig {
            limits: ScriptLimits {
                max_call_stack_depth: 8,
                ..Default::default()
            },
            ..Default::default()
        };
        let engine = build_engine(&config, "deep");
        let result = engine.run("fn f(n) { f(n + 1) } f(0);");
        assert!(result.is_err());
    }

    #[test]
    fn test_loops_can_be_disabled() {
        let config = ScriptEngineConfig {
            limits: ScriptLimits {
                allow_loops: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let engine = build_engine(&config, "loops");
        assert!(engine.compile("loop { break; }").is_err());
    }

    #[test]
    fn test_compile_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.rhai");
        let bad = dir.path().join("bad.rhai");
        std::fs::write(&good, "let x = 1;").unwrap();
        std::fs::write(&bad, "let x = ;").unwrap();

        let engine = build_engine(&ScriptEngineConfig::default(), "compile");
        let compiled = compile_file(&engine, &good).unwrap();
        assert_eq!(compiled.source, "let x = 1;");
        assert_eq!(compiled.path, good);

        match compile_file(&engine, &bad) {
            Err(RhaiError::CompileError { path, .. }) => assert_eq!(path, bad),
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({
            "name": "test",
            "values": [1, 2, 3],
            "nested": { "flag": true }
        });

        let back = dynamic_to_json(&json_to_dynamic(&json));
        assert_eq!(json, back);
    }
}
