//! Node bundles on disk.
//!
//! A bundle is a directory with a `config.json` manifest and an entry script.
//! Bundles are templates: the editor instantiates them into [`NodeModel`]s.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    NodeflowError, Result,
    model::{ConfigItem, NodeKind, NodeModel, PortModel},
};

const MANIFEST_FILE: &str = "config.json";
const DEFAULT_ENTRY: &str = "main.py";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleParameters {
    #[serde(default)]
    pub inputs: Vec<PortModel>,
    #[serde(default)]
    pub outputs: Vec<PortModel>,
}

/// Parsed `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub parameters: BundleParameters,
    #[serde(default)]
    pub config: Vec<ConfigItem>,
    /// Entry script relative to the bundle directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeBundle {
    pub path: PathBuf,
    pub manifest: BundleManifest,
}

impl NodeBundle {
    /// Load and validate the bundle in `dir`.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let manifest_path = dir.join(MANIFEST_FILE);
        let data = fs::read_to_string(&manifest_path).map_err(|e| NodeflowError::Bundle(format!("failed to read {}: {}", manifest_path.display(), e)))?;

        Ok(Self {
            path: dir.to_path_buf(),
            manifest: Self::parse_manifest(&data)?,
        })
    }

    /// Load every bundle directly under `dir`, sorted by path.
    ///
    /// Directories without a manifest are ignored; invalid manifests are logged and skipped.
    pub fn scan<P: AsRef<Path>>(dir: P) -> Result<Vec<Self>> {
        let mut dirs = Vec::new();
        for entry in fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if path.is_dir() && path.join(MANIFEST_FILE).is_file() {
                dirs.push(path);
            }
        }
        dirs.sort();

        let bundles = dirs
            .into_iter()
            .filter_map(|path| match Self::load(&path) {
                Ok(bundle) => Some(bundle),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping invalid node bundle");
                    None
                }
            })
            .collect();

        Ok(bundles)
    }

    pub fn parse_manifest(data: &str) -> Result<BundleManifest> {
        let value: serde_json::Value = serde_json::from_str(data)?;
        jsonschema::validate(&Self::schema(), &value).map_err(|e| NodeflowError::Bundle(format!("invalid manifest: {}", e)))?;
        let manifest = serde_json::from_value::<BundleManifest>(value)?;
        Ok(manifest)
    }

    pub fn schema() -> serde_json::Value {
        let port = serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "type": { "type": "string" }
            },
            "required": ["name"]
        });

        serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "description": { "type": "string" },
                "type": {
                    "type": "string",
                    "enum": ["流", "任务", "flow", "task"]
                },
                "parameters": {
                    "type": "object",
                    "properties": {
                        "inputs": { "type": "array", "items": port },
                        "outputs": { "type": "array", "items": port }
                    }
                },
                "config": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "type": { "type": "string" },
                            "options": { "type": "array" }
                        },
                        "required": ["name"]
                    }
                },
                "entry": { "type": "string" }
            },
            "required": ["name"]
        })
    }

    /// Path of the script the wrapper loads.
    pub fn entry_point(&self) -> PathBuf {
        self.path.join(self.manifest.entry.as_deref().unwrap_or(DEFAULT_ENTRY))
    }

    /// Create a canvas node from this template.
    ///
    /// Config values start at their defaults and no output carries a value yet.
    pub fn instantiate(
        &self,
        id: &str,
    ) -> NodeModel {
        let config = self
            .manifest
            .config
            .iter()
            .cloned()
            .map(|mut item| {
                item.value = Some(item.default_value.clone());
                item
            })
            .collect();
        let outputs = self
            .manifest
            .parameters
            .outputs
            .iter()
            .cloned()
            .map(|mut port| {
                port.value = None;
                port
            })
            .collect();

        NodeModel {
            id: id.to_string(),
            path: self.path.clone(),
            kind: self.manifest.kind,
            inputs: self.manifest.parameters.inputs.clone(),
            outputs,
            config,
        }
    }
}

/// Resolve the entry script of a node, honouring an `entry` override in its manifest.
pub(crate) fn entry_point_of(node: &NodeModel) -> PathBuf {
    match NodeBundle::load(&node.path) {
        Ok(bundle) => bundle.entry_point(),
        Err(_) => node.path.join(DEFAULT_ENTRY),
    }
}
