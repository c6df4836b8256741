//! Execution controller - the host-facing entry point of Nodeflow.
//!
//! The engine owns the process registry, the event channel and the
//! scheduler. A host starts runs, stops them, and observes the running
//! state through it.

mod monitor;

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, Ordering},
};

use tokio::{
    runtime::{Handle, Runtime},
    sync::watch,
    task::JoinHandle,
};

use crate::{
    Config, NodeflowError, Result, ShareLock,
    dispatcher::{FlowReport, Scheduler},
    invoker::{Invoke, NodeInvoker, NodeRuntime, PythonRuntime},
    model::{EdgeModel, NodeBundle, NodeModel},
    runtime::{Channel, Context, ProcessRegistry, ProcessRunner, RunningState, ScratchDir},
    utils,
    workflow::{NodeId, Workflow},
};

pub use monitor::NodeStatus;

use monitor::Monitor;

/// The node flow engine.
///
/// # Example
///
/// ```rust,ignore
/// let engine = EngineBuilder::new().node_dir("nodes").build()?;
///
/// let init = NodeBundle::load("nodes/init")?.instantiate("init");
/// let calc = NodeBundle::load("nodes/calc")?.instantiate("calc");
/// let edges = vec![EdgeModel::new("init", "output-0", "calc", "input-0")];
///
/// let report = engine.start(vec![init, calc], edges).await?;
/// ```
pub struct Engine {
    config: Config,
    /// Event channel for run events and node logs.
    channel: Arc<Channel>,
    monitor: Monitor,
    registry: Arc<ProcessRegistry>,
    runner: Arc<ProcessRunner>,
    scratch: Arc<ScratchDir>,
    scheduler: Scheduler,

    /// The graph of the latest run, with the outputs written so far.
    current: ShareLock<Option<Workflow>>,
    /// Set while `start` is executing flow nodes.
    active: Arc<AtomicBool>,

    handle: Handle,
    /// Kept alive when the engine had to create its own runtime.
    _runtime: Option<Arc<Runtime>>,
}

impl Engine {
    pub(crate) fn new(
        config: Config,
        invoker: Option<Arc<dyn Invoke>>,
        node_runtime: Option<Arc<dyn NodeRuntime>>,
        handle: Handle,
        runtime: Option<Arc<Runtime>>,
    ) -> Self {
        let registry = Arc::new(ProcessRegistry::new());
        let runner = Arc::new(ProcessRunner::new(registry.clone()));
        let scratch = Arc::new(ScratchDir::new(config.scratch_dir.clone()));

        let invoker: Arc<dyn Invoke> = match invoker {
            Some(invoker) => invoker,
            None => {
                let node_runtime: Arc<dyn NodeRuntime> = match node_runtime {
                    Some(node_runtime) => node_runtime,
                    None => Arc::new(PythonRuntime::new(&config.interpreter)),
                };
                Arc::new(NodeInvoker::new(runner.clone(), scratch.clone(), node_runtime).with_env(config.env.clone()))
            }
        };

        let channel = Arc::new(Channel::new(handle.clone()));
        let monitor = Monitor::new(channel.clone(), registry.clone(), handle.clone());
        // handlers first, then listen, so no event is missed
        monitor.monitor();
        channel.listen();

        Self {
            scheduler: Scheduler::new(invoker, handle.clone()),
            config,
            channel,
            monitor,
            registry,
            runner,
            scratch,
            current: Arc::new(RwLock::new(None)),
            active: Arc::new(AtomicBool::new(false)),
            handle,
            _runtime: runtime,
        }
    }

    /// Run the graph made of `nodes` and `edges` until its flow nodes are done.
    ///
    /// Task nodes are launched and keep running after this returns. A second
    /// call while a run is still executing is rejected.
    pub async fn start(
        &self,
        nodes: Vec<NodeModel>,
        edges: Vec<EdgeModel>,
    ) -> Result<FlowReport> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(NodeflowError::Engine("a run is already in progress".to_string()));
        }
        let _active = ActiveGuard(self.active.clone());

        tokio::fs::create_dir_all(&self.config.node_dir)
            .await
            .map_err(|e| NodeflowError::IoError(format!("failed to create node dir {}: {}", self.config.node_dir.display(), e)))?;
        self.registry.clear_stop();

        let workflow = Workflow::new(nodes, &edges)?;
        tracing::trace!("flow graph:\n{}", workflow.schema());
        *self.current.write().unwrap() = Some(workflow.clone());

        let ctx = Arc::new(Context::new(utils::longid(), self.channel.clone(), self.registry.clone()));
        tracing::info!(rid = %ctx.rid(), nodes = workflow.nodes().len(), "flow starting");

        self.scheduler.run(ctx, workflow).await
    }

    /// Spawn [`Engine::start`] on the engine's runtime.
    pub fn launch(
        self: &Arc<Self>,
        nodes: Vec<NodeModel>,
        edges: Vec<EdgeModel>,
    ) -> JoinHandle<Result<FlowReport>> {
        let engine = self.clone();
        self.handle.spawn(async move { engine.start(nodes, edges).await })
    }

    /// Stop the current run. There is no softer mechanism than [`Engine::force_stop`] yet.
    pub fn stop(&self) {
        self.force_stop();
    }

    /// Kill every tracked process, flow and task nodes alike.
    ///
    /// Processes ending because of this are reported as stopped, not failed.
    /// Calling it with nothing running is a no-op.
    pub fn force_stop(&self) {
        self.registry.request_stop();
        let killed = self.runner.kill_all();
        if killed > 0 {
            tracing::info!(killed, "force stop");
        } else {
            tracing::debug!("force stop with nothing running");
        }
    }

    /// Stop everything and release background tasks and scratch files.
    pub fn shutdown(&self) {
        self.force_stop();
        self.monitor.shutdown();
        self.channel.shutdown();
        self.scratch.clear();
    }

    pub fn is_running(&self) -> bool {
        self.registry.is_running()
    }

    pub fn running_node_ids(&self) -> Vec<NodeId> {
        self.registry.running_node_ids()
    }

    /// Observe running state changes. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<RunningState> {
        self.registry.subscribe()
    }

    /// Nodes of the latest run with their current output values.
    pub fn nodes(&self) -> Vec<NodeModel> {
        self.current.read().unwrap().as_ref().map(|w| w.nodes()).unwrap_or_default()
    }

    pub fn node_status(
        &self,
        nid: &str,
    ) -> Option<NodeStatus> {
        self.monitor.status(nid)
    }

    pub fn node_statuses(&self) -> Vec<NodeStatus> {
        self.monitor.statuses()
    }

    /// Every valid bundle under the configured node directory.
    pub fn bundles(&self) -> Result<Vec<NodeBundle>> {
        NodeBundle::scan(&self.config.node_dir)
    }

    pub fn channel(&self) -> Arc<Channel> {
        self.channel.clone()
    }

    pub fn registry(&self) -> Arc<ProcessRegistry> {
        self.registry.clone()
    }

    pub fn runner(&self) -> Arc<ProcessRunner> {
        self.runner.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.monitor.shutdown();
        self.channel.shutdown();
    }
}

struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
