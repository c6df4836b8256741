#![allow(dead_code)]

use std::{fs, path::Path, sync::Arc};

use nodeflow::{Engine, EngineBuilder, NodeBundle, NodeRuntime, NodeflowError, Result, Vars};
use serde_json::{Value, json};
use tempfile::TempDir;

/// Runs `sh` entry scripts. Inputs and config arrive as `IN_<name>` and
/// `CFG_<name>` shell variables holding the raw value.
pub struct ShellRuntime;

impl NodeRuntime for ShellRuntime {
    fn interpreter(&self) -> &str {
        "sh"
    }

    fn script_suffix(&self) -> &str {
        ".sh"
    }

    fn render(
        &self,
        entry: &Path,
        inputs: &Vars,
        config: &Vars,
    ) -> Result<String> {
        let mut script = String::new();
        for (prefix, vars) in [("IN", inputs), ("CFG", config)] {
            for (name, value) in vars.iter() {
                if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(NodeflowError::Node(format!("`{}` is not a shell variable name", name)));
                }
                script.push_str(&format!("{}_{}={}\n", prefix, name, quote(&raw(value))));
            }
        }
        script.push_str(&format!(". {}\n", quote(&entry.to_string_lossy())));
        Ok(script)
    }
}

fn raw(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// A temporary node directory.
pub struct Bundles {
    dir: TempDir,
}

impl Bundles {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a bundle named `name` with a `main.sh` entry.
    pub fn add(
        &self,
        name: &str,
        mut manifest: Value,
        script: &str,
    ) -> NodeBundle {
        let dir = self.dir.path().join(name);
        fs::create_dir_all(&dir).unwrap();
        manifest["name"] = json!(name);
        manifest["entry"] = json!("main.sh");
        fs::write(dir.join("config.json"), serde_json::to_string_pretty(&manifest).unwrap()).unwrap();
        fs::write(dir.join("main.sh"), script).unwrap();
        NodeBundle::load(&dir).unwrap()
    }

    pub fn engine(&self) -> Engine {
        EngineBuilder::new()
            .node_dir(self.path())
            .scratch_dir(self.path().join(".scratch"))
            .node_runtime(Arc::new(ShellRuntime))
            .build()
            .unwrap()
    }
}

pub fn result_line(outputs: &str) -> String {
    format!("echo '{} {{\"outputs\": {}}}' >&2\n", nodeflow::RESULT_PREFIX, outputs)
}
