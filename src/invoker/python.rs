use std::path::Path;

use crate::{
    Result,
    common::Vars,
    invoker::{NodeRuntime, RESULT_PREFIX},
};

const PRELUDE: &str = r#"# -*- coding: utf-8 -*-
import importlib.util
import json
import os
import sys

for _stream in (sys.stdout, sys.stderr):
    try:
        _stream.reconfigure(encoding="utf-8")
    except Exception:
        pass
"#;

/// Runs after the `_ENTRY`, `_INPUTS`, `_CONFIG` and `_PREFIX` bindings.
const BODY: &str = r#"

def _load(path):
    sys.path.insert(0, os.path.dirname(os.path.abspath(path)))
    spec = importlib.util.spec_from_file_location("nodeflow_entry", path)
    module = importlib.util.module_from_spec(spec)
    spec.loader.exec_module(module)
    return module


_module = _load(_ENTRY)
if hasattr(_module, "execute"):
    _result = _module.execute(_INPUTS, _CONFIG)
elif hasattr(_module, "Node"):
    _result = _module.Node(_INPUTS, _CONFIG).execute()
else:
    raise RuntimeError("%s defines neither execute(inputs, config) nor Node" % _ENTRY)

if not isinstance(_result, dict) or "outputs" not in _result:
    _result = {"outputs": _result if isinstance(_result, dict) else {}}

sys.stdout.flush()
sys.stderr.write(_PREFIX + " " + json.dumps(_result, ensure_ascii=False) + "\n")
sys.stderr.flush()
"#;

/// Runs Python entry scripts through a generated wrapper.
///
/// The entry module exposes either `execute(inputs, config)` or a class
/// `Node(inputs, config)` with an `execute()` method, returning
/// `{"outputs": {...}}` or a bare outputs dict.
#[derive(Debug, Clone)]
pub struct PythonRuntime {
    interpreter: String,
}

impl PythonRuntime {
    pub fn new(interpreter: &str) -> Self {
        Self {
            interpreter: interpreter.to_string(),
        }
    }
}

impl NodeRuntime for PythonRuntime {
    fn interpreter(&self) -> &str {
        &self.interpreter
    }

    fn script_suffix(&self) -> &str {
        ".py"
    }

    fn render(
        &self,
        entry: &Path,
        inputs: &Vars,
        config: &Vars,
    ) -> Result<String> {
        // JSON string literals are valid Python string literals.
        let entry = serde_json::to_string(&entry.to_string_lossy())?;
        let inputs = serde_json::to_string(&serde_json::to_string(inputs)?)?;
        let config = serde_json::to_string(&serde_json::to_string(config)?)?;
        let prefix = serde_json::to_string(RESULT_PREFIX)?;

        let mut script = String::with_capacity(PRELUDE.len() + BODY.len() + entry.len() + inputs.len() + config.len() + 128);
        script.push_str(PRELUDE);
        script.push_str(&format!("\n_ENTRY = {}\n", entry));
        script.push_str(&format!("_INPUTS = json.loads({})\n", inputs));
        script.push_str(&format!("_CONFIG = json.loads({})\n", config));
        script.push_str(&format!("_PREFIX = {}\n", prefix));
        script.push_str(BODY);
        Ok(script)
    }
}
