//! Graph scheduler.
//!
//! Task nodes are launched first and left running on their own. Flow nodes
//! then run one at a time in topological order, each fed by the outputs of
//! the nodes before it. The first flow failure ends the run.

use std::{collections::HashMap, sync::Arc};

use tokio::runtime::Handle;

use crate::{
    Result,
    common::Vars,
    events::{ErrorReason, FlowEvent, FlowFailedEvent, FlowStartEvent, FlowState, NodeEvent, Severity},
    invoker::Invoke,
    model::NodeModel,
    runtime::{Context, RunId},
    utils,
    workflow::{NodeId, Workflow},
};

/// Summary of a finished run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowReport {
    pub run_id: RunId,
    /// Flow nodes in the order they were scheduled.
    pub order: Vec<NodeId>,
    /// Task nodes launched at the start of the run.
    pub tasks: Vec<NodeId>,
    /// Outputs of every flow node that completed.
    pub outputs: HashMap<NodeId, Vars>,
    /// The run ended early because a stop was requested.
    pub stopped: bool,
}

pub struct Scheduler {
    invoker: Arc<dyn Invoke>,
    handle: Handle,
}

impl Scheduler {
    pub fn new(
        invoker: Arc<dyn Invoke>,
        handle: Handle,
    ) -> Self {
        Self {
            invoker,
            handle,
        }
    }

    /// Execute one run of `workflow`.
    ///
    /// Returns once every flow node has completed, the first one failed, or
    /// a stop was observed. Task nodes may still be running afterwards.
    pub async fn run(
        &self,
        ctx: Arc<Context>,
        workflow: Workflow,
    ) -> Result<FlowReport> {
        let mut report = FlowReport {
            run_id: ctx.rid(),
            ..Default::default()
        };

        ctx.emit_state(FlowState::Classifying);
        for nid in workflow.task_ids() {
            let Some(node) = workflow.get_node(&nid) else {
                continue;
            };
            self.spawn_task(&ctx, &workflow, node);
            report.tasks.push(nid);
        }

        ctx.emit_state(FlowState::Scheduling);
        report.order = match workflow.execution_order() {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(rid = %ctx.rid(), error = %e, "flow cannot be scheduled");
                ctx.emit_log("", Severity::Error, e.to_string());
                Self::fail(&ctx, "", &e.to_string());
                return Err(e);
            }
        };
        tracing::info!(rid = %ctx.rid(), order = ?report.order, tasks = ?report.tasks, "flow scheduled");
        ctx.emit_flow(FlowEvent::Started(FlowStartEvent {
            order: report.order.clone(),
            tasks: report.tasks.clone(),
        }));

        let order = report.order.clone();
        for (i, nid) in order.iter().enumerate() {
            ctx.emit_state(FlowState::Executing(i));
            if ctx.stop_requested() {
                return Ok(Self::stopped(&ctx, report));
            }

            let Some(node) = workflow.get_node(nid) else {
                continue;
            };
            let inputs = workflow.gather_inputs(nid);
            let config = node.config_values();

            let started = utils::time::time_millis();
            ctx.emit_node(nid, NodeEvent::Running(started));
            match self.invoker.execute(ctx.clone(), &node, inputs, config).await {
                Ok(result) => {
                    workflow.set_outputs(nid, &result.outputs);
                    let outputs = workflow.get_node(nid).map(|n| n.output_values()).unwrap_or_default();
                    report.outputs.insert(nid.clone(), outputs);
                    tracing::debug!(rid = %ctx.rid(), nid = %nid, elapsed_ms = utils::time::elapsed_millis(started), "node succeeded");
                    ctx.emit_node(nid, NodeEvent::Succeeded(utils::time::time_millis()));
                }
                Err(e) if e.is_stop() => {
                    ctx.emit_node(nid, NodeEvent::Stopped(utils::time::time_millis()));
                    return Ok(Self::stopped(&ctx, report));
                }
                Err(e) => {
                    tracing::error!(rid = %ctx.rid(), nid = %nid, error = %e, "flow aborted");
                    ctx.emit_node(nid, NodeEvent::Error(ErrorReason::Failed(e.to_string())));
                    Self::fail(&ctx, nid, &e.to_string());
                    return Err(e);
                }
            }
        }

        ctx.emit_state(FlowState::Completed);
        ctx.emit_flow(FlowEvent::Succeeded);
        tracing::info!(rid = %ctx.rid(), nodes = report.order.len(), "flow completed");
        Ok(report)
    }

    /// Launch a task node and attach a continuation that consumes its result.
    fn spawn_task(
        &self,
        ctx: &Arc<Context>,
        workflow: &Workflow,
        node: NodeModel,
    ) {
        let nid = node.id.clone();
        let config = node.config_values();
        let invoker = self.invoker.clone();
        let job_ctx = ctx.clone();

        ctx.emit_node(&nid, NodeEvent::TaskLaunched(utils::time::time_millis()));
        tracing::debug!(rid = %ctx.rid(), nid = %nid, "task launched");
        let job = self.handle.spawn(async move { invoker.execute(job_ctx, &node, Vars::new(), config).await });

        let ctx = ctx.clone();
        let workflow = workflow.clone();
        self.handle.spawn(async move {
            match job.await {
                Ok(Ok(result)) => {
                    workflow.set_outputs(&nid, &result.outputs);
                    ctx.emit_node(&nid, NodeEvent::TaskFinished(utils::time::time_millis()));
                    tracing::debug!(rid = %ctx.rid(), nid = %nid, "task finished");
                }
                Ok(Err(e)) if e.is_stop() => {
                    ctx.emit_node(&nid, NodeEvent::Stopped(utils::time::time_millis()));
                }
                Ok(Err(e)) => {
                    tracing::error!(rid = %ctx.rid(), nid = %nid, error = %e, "task failed");
                    ctx.emit_node(&nid, NodeEvent::Error(ErrorReason::Failed(e.to_string())));
                }
                Err(e) => {
                    tracing::error!(rid = %ctx.rid(), nid = %nid, error = %e, "task panicked");
                    ctx.emit_node(&nid, NodeEvent::Error(ErrorReason::Exception(e.to_string())));
                    ctx.emit_log(&nid, Severity::Error, format!("task {} panicked: {}", nid, e));
                }
            }
        });
    }

    fn stopped(
        ctx: &Context,
        mut report: FlowReport,
    ) -> FlowReport {
        tracing::info!(rid = %ctx.rid(), "flow stopped");
        ctx.emit_state(FlowState::Stopping);
        ctx.emit_flow(FlowEvent::Stopped);
        ctx.emit_state(FlowState::Idle);
        report.stopped = true;
        report
    }

    /// Node failures are logged by the invoker that saw them.
    fn fail(
        ctx: &Context,
        nid: &str,
        error: &str,
    ) {
        ctx.emit_flow(FlowEvent::Failed(FlowFailedEvent {
            nid: nid.to_string(),
            error: error.to_string(),
        }));
        ctx.emit_state(FlowState::Idle);
    }
}

#[cfg(test)]
mod test {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::{runtime::Handle, sync::broadcast};

    use super::Scheduler;
    use crate::{
        NodeflowError, Result,
        common::Vars,
        events::{Event, FlowEvent, GraphEvent, Message, NodeEvent, Severity},
        invoker::{InvocationResult, Invoke},
        model::{EdgeModel, NodeKind, NodeModel, PortModel},
        runtime::{Channel, Context, ProcessRegistry},
        workflow::Workflow,
    };

    type Behavior = Box<dyn Fn(&Vars) -> Result<Vars> + Send + Sync>;

    #[derive(Default)]
    struct MockInvoker {
        behaviors: HashMap<String, Behavior>,
        delays: HashMap<String, Duration>,
        calls: Mutex<Vec<(String, Vars)>>,
    }

    impl MockInvoker {
        fn on(
            mut self,
            nid: &str,
            f: impl Fn(&Vars) -> Result<Vars> + Send + Sync + 'static,
        ) -> Self {
            self.behaviors.insert(nid.to_string(), Box::new(f));
            self
        }

        fn delay(
            mut self,
            nid: &str,
            delay: Duration,
        ) -> Self {
            self.delays.insert(nid.to_string(), delay);
            self
        }

        fn called(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(nid, _)| nid.clone()).collect()
        }

        fn inputs_of(
            &self,
            nid: &str,
        ) -> Option<Vars> {
            self.calls.lock().unwrap().iter().find(|(n, _)| n == nid).map(|(_, inputs)| inputs.clone())
        }
    }

    #[async_trait]
    impl Invoke for MockInvoker {
        async fn execute(
            &self,
            _ctx: Arc<Context>,
            node: &NodeModel,
            inputs: Vars,
            _config: Vars,
        ) -> Result<InvocationResult> {
            self.calls.lock().unwrap().push((node.id.clone(), inputs.clone()));
            if let Some(delay) = self.delays.get(&node.id) {
                tokio::time::sleep(*delay).await;
            }
            let outputs = match self.behaviors.get(&node.id) {
                Some(f) => f(&inputs)?,
                None => Vars::new(),
            };
            Ok(InvocationResult {
                outputs,
            })
        }
    }

    fn node(
        id: &str,
        kind: NodeKind,
    ) -> NodeModel {
        let mut node = NodeModel::new(id, kind);
        node.inputs = vec![PortModel::new("a", "number"), PortModel::new("b", "number")];
        node.outputs = vec![PortModel::new("x", "number"), PortModel::new("y", "number")];
        node
    }

    fn context() -> (Arc<Context>, broadcast::Receiver<Event<Message>>) {
        let channel = Arc::new(Channel::new(Handle::current()));
        let events = channel.event_queue().subscribe();
        (Arc::new(Context::new("run".to_string(), channel, Arc::new(ProcessRegistry::new()))), events)
    }

    fn drain(events: &mut broadcast::Receiver<Event<Message>>) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(e) = events.try_recv() {
            messages.push(e.inner().clone());
        }
        messages
    }

    #[tokio::test]
    async fn test_outputs_flow_into_successors() {
        let nodes = vec![node("calc", NodeKind::Flow), node("init", NodeKind::Flow)];
        let edges = vec![
            EdgeModel::new("init", "output-0", "calc", "input-0"),
            EdgeModel::new("init", "output-1", "calc", "input-1"),
        ];
        let workflow = Workflow::new(nodes, &edges).unwrap();

        let invoker = Arc::new(MockInvoker::default().on("init", |_| Ok(Vars::from(json!({"x": 3, "y": 4})))).on("calc", |inputs| {
            let sum = inputs.get::<i64>("a").unwrap_or_default() + inputs.get::<i64>("b").unwrap_or_default();
            Ok(Vars::from(json!({"x": sum})))
        }));
        let (ctx, mut events) = context();

        let report = Scheduler::new(invoker.clone(), Handle::current()).run(ctx, workflow.clone()).await.unwrap();

        assert_eq!(report.order, vec!["init", "calc"]);
        assert_eq!(invoker.inputs_of("calc"), Some(Vars::from(json!({"a": 3, "b": 4}))));
        assert_eq!(report.outputs["calc"], Vars::from(json!({"x": 7})));
        assert_eq!(workflow.get_node("calc").unwrap().output_values(), Vars::from(json!({"x": 7})));
        assert!(!report.stopped);

        let messages = drain(&mut events);
        assert!(matches!(messages.last().map(|m| &m.event), Some(GraphEvent::Flow(FlowEvent::Succeeded))));
    }

    #[tokio::test]
    async fn test_first_failure_aborts_run() {
        let nodes = ["a", "b", "c"].into_iter().map(|id| node(id, NodeKind::Flow)).collect();
        let edges = vec![EdgeModel::new("a", "output-0", "b", "input-0"), EdgeModel::new("b", "output-0", "c", "input-0")];
        let workflow = Workflow::new(nodes, &edges).unwrap();

        let invoker = Arc::new(MockInvoker::default().on("a", |_| Ok(Vars::from(json!({"x": 1})))).on("b", |_| {
            Err(NodeflowError::ProcessExecution {
                code: Some(1),
                stdout: String::new(),
                stderr: "boom".to_string(),
            })
        }));
        let (ctx, mut events) = context();

        let err = Scheduler::new(invoker.clone(), Handle::current()).run(ctx, workflow.clone()).await.unwrap_err();

        assert!(matches!(err, NodeflowError::ProcessExecution { .. }));
        assert_eq!(invoker.called(), vec!["a", "b"]);
        assert_eq!(workflow.get_node("a").unwrap().output_values(), Vars::from(json!({"x": 1})));

        let messages = drain(&mut events);
        assert!(messages.iter().any(|m| m.nid == "b" && matches!(m.event, GraphEvent::Node(NodeEvent::Error(_)))));
        assert!(messages.iter().any(|m| matches!(&m.event, GraphEvent::Flow(FlowEvent::Failed(f)) if f.nid == "b")));
    }

    #[tokio::test]
    async fn test_cycle_fails_before_execution() {
        let nodes = vec![node("x", NodeKind::Flow), node("y", NodeKind::Flow)];
        let edges = vec![EdgeModel::new("x", "output-0", "y", "input-0"), EdgeModel::new("y", "output-0", "x", "input-0")];
        let workflow = Workflow::new(nodes, &edges).unwrap();

        let invoker = Arc::new(MockInvoker::default());
        let (ctx, _events) = context();
        let mut logs = ctx.channel().log_queue().subscribe();

        let err = Scheduler::new(invoker.clone(), Handle::current()).run(ctx, workflow).await.unwrap_err();
        assert!(matches!(err, NodeflowError::GraphCycle { .. }));
        assert!(invoker.called().is_empty());

        let log = logs.try_recv().unwrap();
        assert_eq!(log.severity, Severity::Error);
        assert!(log.content.contains("cycle"));
        assert!(logs.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_tasks_do_not_block_or_fail_the_flow() {
        let nodes = vec![node("slow", NodeKind::Task), node("broken", NodeKind::Task), node("a", NodeKind::Flow)];
        let workflow = Workflow::new(nodes, &[]).unwrap();

        let invoker = Arc::new(MockInvoker::default().delay("slow", Duration::from_secs(30)).on("broken", |_| Err(NodeflowError::Node("bad task".to_string()))));
        let (ctx, mut events) = context();

        let report = tokio::time::timeout(Duration::from_secs(5), Scheduler::new(invoker, Handle::current()).run(ctx, workflow)).await.unwrap().unwrap();
        assert_eq!(report.order, vec!["a"]);
        assert_eq!(report.tasks, vec!["slow", "broken"]);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let messages = drain(&mut events);
        assert!(messages.iter().any(|m| m.nid == "broken" && matches!(m.event, GraphEvent::Node(NodeEvent::Error(_)))));
        assert!(messages.iter().any(|m| matches!(m.event, GraphEvent::Flow(FlowEvent::Succeeded))));
        assert!(!messages.iter().any(|m| matches!(m.event, GraphEvent::Flow(FlowEvent::Failed(_)))));
    }

    #[tokio::test]
    async fn test_task_outputs_written_back() {
        let workflow = Workflow::new(vec![node("t", NodeKind::Task)], &[]).unwrap();
        let invoker = Arc::new(MockInvoker::default().on("t", |_| Ok(Vars::from(json!({"y": "done"})))));
        let (ctx, _events) = context();

        Scheduler::new(invoker, Handle::current()).run(ctx, workflow.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(workflow.get_node("t").unwrap().output_values(), Vars::from(json!({"y": "done"})));
    }

    #[tokio::test]
    async fn test_stop_ends_run_without_failure() {
        let nodes = ["a", "b", "c"].into_iter().map(|id| node(id, NodeKind::Flow)).collect();
        let edges = vec![EdgeModel::new("a", "output-0", "b", "input-0"), EdgeModel::new("b", "output-0", "c", "input-0")];
        let workflow = Workflow::new(nodes, &edges).unwrap();

        let invoker = Arc::new(MockInvoker::default().on("b", |_| Err(NodeflowError::StopSuppressed)));
        let (ctx, mut events) = context();

        let report = Scheduler::new(invoker.clone(), Handle::current()).run(ctx, workflow).await.unwrap();
        assert!(report.stopped);
        assert_eq!(invoker.called(), vec!["a", "b"]);

        let messages = drain(&mut events);
        assert!(messages.iter().any(|m| matches!(m.event, GraphEvent::Flow(FlowEvent::Stopped))));
        assert!(!messages.iter().any(|m| matches!(m.event, GraphEvent::Flow(FlowEvent::Failed(_)))));
    }

    #[tokio::test]
    async fn test_stop_requested_before_next_node() {
        let workflow = Workflow::new(vec![node("a", NodeKind::Flow)], &[]).unwrap();
        let invoker = Arc::new(MockInvoker::default());
        let (ctx, _events) = context();
        ctx.registry().request_stop();

        let report = Scheduler::new(invoker.clone(), Handle::current()).run(ctx, workflow).await.unwrap();
        assert!(report.stopped);
        assert!(invoker.called().is_empty());
    }
}
