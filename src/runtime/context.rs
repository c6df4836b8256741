use std::sync::Arc;

use crate::{
    events::{Event, FlowEvent, FlowState, GraphEvent, Log, Message, NodeEvent, Severity},
    runtime::{Channel, ProcessRegistry},
    utils,
    workflow::NodeId,
};

pub type RunId = String;

/// Per-run handle on the engine's shared pieces.
///
/// Cloned into every node invocation of a run, task nodes included.
#[derive(Clone)]
pub struct Context {
    rid: RunId,
    channel: Arc<Channel>,
    registry: Arc<ProcessRegistry>,
}

impl Context {
    pub fn new(
        rid: RunId,
        channel: Arc<Channel>,
        registry: Arc<ProcessRegistry>,
    ) -> Self {
        Self {
            rid,
            channel,
            registry,
        }
    }

    pub fn rid(&self) -> RunId {
        self.rid.to_owned()
    }

    pub fn channel(&self) -> Arc<Channel> {
        self.channel.clone()
    }

    pub fn registry(&self) -> Arc<ProcessRegistry> {
        self.registry.clone()
    }

    pub fn stop_requested(&self) -> bool {
        self.registry.is_stop_requested()
    }

    pub fn emit_node(
        &self,
        nid: &str,
        event: NodeEvent,
    ) {
        self.emit(nid, GraphEvent::Node(event));
    }

    pub fn emit_flow(
        &self,
        event: FlowEvent,
    ) {
        self.emit("", GraphEvent::Flow(event));
    }

    pub fn emit_state(
        &self,
        state: FlowState,
    ) {
        tracing::trace!(rid = %self.rid, ?state, "flow state");
        self.emit_flow(FlowEvent::State(state));
    }

    pub fn emit_log(
        &self,
        nid: &str,
        severity: Severity,
        content: impl Into<String>,
    ) {
        let log = Log {
            rid: self.rid.clone(),
            nid: NodeId::from(nid),
            severity,
            content: content.into(),
            timestamp: utils::time::time_millis(),
        };
        let _ = self.channel.log_queue().send(Event::new(&log));
    }

    fn emit(
        &self,
        nid: &str,
        event: GraphEvent,
    ) {
        let _ = self.channel.event_queue().send(Event::new(&Message {
            rid: self.rid.clone(),
            nid: NodeId::from(nid),
            event,
        }));
    }
}
