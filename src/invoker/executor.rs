use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    Result,
    common::Vars,
    events::Severity,
    invoker::{InvocationResult, Invoke, NodeRuntime, RESULT_PREFIX, parse_result},
    model::{NodeModel, entry_point_of},
    runtime::{Context, ProcessRunner, RunOptions, ScratchDir},
};

/// Invokes nodes as fresh interpreter processes.
pub struct NodeInvoker {
    runner: Arc<ProcessRunner>,
    scratch: Arc<ScratchDir>,
    runtime: Arc<dyn NodeRuntime>,
    env: HashMap<String, String>,
}

impl NodeInvoker {
    pub fn new(
        runner: Arc<ProcessRunner>,
        scratch: Arc<ScratchDir>,
        runtime: Arc<dyn NodeRuntime>,
    ) -> Self {
        Self {
            runner,
            scratch,
            runtime,
            env: HashMap::new(),
        }
    }

    /// Extra environment passed to every node process.
    pub fn with_env(
        mut self,
        env: HashMap<String, String>,
    ) -> Self {
        self.env = env;
        self
    }

    async fn invoke(
        &self,
        ctx: &Arc<Context>,
        node: &NodeModel,
        inputs: Vars,
        config: Vars,
    ) -> Result<InvocationResult> {
        let inputs = resolve_inputs(node, inputs);
        let entry = entry_point_of(node);
        let script = self.runtime.render(&entry, &inputs, &config)?;
        let file = self.scratch.create_guarded(&script, self.runtime.script_suffix())?;

        let mut options = RunOptions::new().node(&node.id, node.is_task()).envs(self.runtime.env()).envs(self.env.clone());
        if node.path.is_dir() {
            options = options.cwd(&node.path);
        }

        let out_ctx = ctx.clone();
        let out_nid = node.id.clone();
        let err_ctx = ctx.clone();
        let err_nid = node.id.clone();
        let options = options
            .on_stdout(move |line| out_ctx.emit_log(&out_nid, Severity::Info, line))
            .on_stderr(move |line| {
                if !line.trim_start().starts_with(RESULT_PREFIX) {
                    err_ctx.emit_log(&err_nid, Severity::Warn, line);
                }
            });

        let args = [file.path().to_string_lossy().into_owned()];
        let output = self.runner.run(self.runtime.interpreter(), &args, options).await?;
        parse_result(&node.id, &output.stderr)
    }
}

#[async_trait]
impl Invoke for NodeInvoker {
    async fn execute(
        &self,
        ctx: Arc<Context>,
        node: &NodeModel,
        inputs: Vars,
        config: Vars,
    ) -> Result<InvocationResult> {
        let ret = self.invoke(&ctx, node, inputs, config).await;
        match &ret {
            Ok(result) => tracing::debug!(rid = %ctx.rid(), nid = %node.id, outputs = result.outputs.len(), "node invoked"),
            Err(e) if e.is_stop() => tracing::debug!(rid = %ctx.rid(), nid = %node.id, "node invocation stopped"),
            Err(e) => {
                tracing::error!(rid = %ctx.rid(), nid = %node.id, error = %e, "node invocation failed");
                ctx.emit_log(&node.id, Severity::Error, e.to_string());
            }
        }
        ret
    }
}

/// Fill declared inputs that are absent or `null` with their defaults.
///
/// Inputs without a default resolve to `null`. Undeclared entries are kept.
pub fn resolve_inputs(
    node: &NodeModel,
    mut inputs: Vars,
) -> Vars {
    for port in node.inputs.iter() {
        if !inputs.has_value(&port.name) {
            inputs.set(&port.name, port.default_value.clone().unwrap_or(Value::Null));
        }
    }
    inputs
}
