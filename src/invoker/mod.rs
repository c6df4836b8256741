//! Single-node invocation.
//!
//! An [`Invoke`] implementation runs one node with a resolved input record
//! and its config record, and returns the node's outputs. [`NodeInvoker`]
//! does that out of process through a [`NodeRuntime`].

mod executor;
mod protocol;
mod python;

use std::{collections::HashMap, path::Path, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Result, common::Vars, model::NodeModel, runtime::Context};

pub use executor::{NodeInvoker, resolve_inputs};
pub use protocol::{RESULT_PREFIX, parse_result};
pub use python::PythonRuntime;

/// Outputs reported by one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    #[serde(default)]
    pub outputs: Vars,
}

#[async_trait]
pub trait Invoke: Send + Sync {
    /// Runs a single node.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The [`Context`] of the current run.
    /// * `node` - The node to run.
    /// * `inputs` - Values gathered from incoming edges; missing ports fall back to their defaults.
    /// * `config` - The node's config record.
    ///
    /// # Returns
    ///
    /// Returns the [`InvocationResult`] reported by the node.
    async fn execute(
        &self,
        ctx: Arc<Context>,
        node: &NodeModel,
        inputs: Vars,
        config: Vars,
    ) -> Result<InvocationResult>;
}

/// Turns a node entry script into something an interpreter can run.
pub trait NodeRuntime: Send + Sync {
    /// Program used to run rendered scripts.
    fn interpreter(&self) -> &str;

    /// File suffix of rendered scripts, e.g. `.py`.
    fn script_suffix(&self) -> &str;

    /// Render a wrapper that loads `entry`, runs it with `inputs` and
    /// `config`, and prints one [`RESULT_PREFIX`] line to stderr.
    fn render(
        &self,
        entry: &Path,
        inputs: &Vars,
        config: &Vars,
    ) -> Result<String>;

    /// Extra environment forcing UTF-8 text I/O regardless of host locale.
    fn env(&self) -> HashMap<String, String> {
        HashMap::from([
            ("PYTHONIOENCODING".to_string(), "utf-8".to_string()),
            ("PYTHONUTF8".to_string(), "1".to_string()),
            ("PYTHONUNBUFFERED".to_string(), "1".to_string()),
            ("LC_ALL".to_string(), "C.UTF-8".to_string()),
            ("LANG".to_string(), "C.UTF-8".to_string()),
        ])
    }
}
