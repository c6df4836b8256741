use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::Vars;

/// How a node takes part in a run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum NodeKind {
    /// Ordered by its edges and run one at a time.
    #[default]
    #[serde(rename = "flow", alias = "流")]
    #[strum(to_string = "flow", serialize = "流")]
    Flow,
    /// Launched at flow start and left running on its own.
    #[serde(rename = "task", alias = "任务")]
    #[strum(to_string = "task", serialize = "任务")]
    Task,
}

/// A named, typed input or output slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortModel {
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    /// Written by the engine once the node has run (outputs only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PortModel {
    pub fn new(
        name: &str,
        ty: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            ty: ty.to_string(),
            ..Default::default()
        }
    }

    pub fn with_default(
        mut self,
        value: impl Into<Value>,
    ) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConfigType {
    Number,
    #[default]
    Text,
    Select,
    Boolean,
    File,
    #[serde(other)]
    Other,
}

/// A user-editable node parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigItem {
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: ConfigType,
    #[serde(default)]
    pub default_value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<Value>,
}

impl ConfigItem {
    /// The current value, falling back to the default.
    pub fn effective_value(&self) -> Value {
        match &self.value {
            Some(v) if !v.is_null() => v.clone(),
            _ => self.default_value.clone(),
        }
    }
}

/// A node instance placed on the canvas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeModel {
    pub id: String,
    /// Bundle directory holding `config.json` and the entry script.
    pub path: PathBuf,
    #[serde(default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub inputs: Vec<PortModel>,
    #[serde(default)]
    pub outputs: Vec<PortModel>,
    #[serde(default)]
    pub config: Vec<ConfigItem>,
}

impl NodeModel {
    pub fn new(
        id: &str,
        kind: NodeKind,
    ) -> Self {
        Self {
            id: id.to_string(),
            kind,
            ..Default::default()
        }
    }

    pub fn is_task(&self) -> bool {
        self.kind == NodeKind::Task
    }

    /// Config record passed to the node: every item's effective value by name.
    pub fn config_values(&self) -> Vars {
        self.config.iter().map(|c| (c.name.clone(), c.effective_value())).collect()
    }

    /// Current output values by name; unset outputs are omitted.
    pub fn output_values(&self) -> Vars {
        self.outputs.iter().filter_map(|p| p.value.clone().map(|v| (p.name.clone(), v))).collect()
    }

    /// Write result values onto the declared outputs.
    ///
    /// Unknown names are ignored, declared outputs missing from `values` are reset to unset.
    pub fn apply_outputs(
        &mut self,
        values: &Vars,
    ) {
        for port in self.outputs.iter_mut() {
            port.value = values.get_value(&port.name).cloned();
        }
    }
}
