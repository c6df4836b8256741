//! Event types for flow execution.
//!
//! Events are emitted during a run to notify subscribers about state
//! changes, node completions, errors, and logs.

mod flow;
mod node;

pub use flow::*;
pub use node::*;

use serde::{Deserialize, Serialize};

use crate::{runtime::RunId, workflow::NodeId};

/// Generic event wrapper.
#[derive(Debug, Clone)]
pub struct Event<T> {
    inner: T,
}

/// Top-level event type for flow graph events.
#[derive(Debug, Clone)]
pub enum GraphEvent {
    /// Run-level events (start, state changes, completion).
    Flow(FlowEvent),
    /// Node-level events (running, succeeded, error, etc.).
    Node(NodeEvent),
}

/// Event message containing run and node context.
#[derive(Debug, Clone)]
pub struct Message {
    /// Run that generated this event.
    pub rid: RunId,
    /// Node that generated this event (empty for run events).
    pub nid: NodeId,
    /// The actual event data.
    pub event: GraphEvent,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// Log entry for the host's log panel.
#[derive(Debug, Clone)]
pub struct Log {
    pub rid: RunId,
    /// Node that produced the line, empty for engine messages.
    pub nid: NodeId,
    pub severity: Severity,
    pub content: String,
    /// Timestamp in milliseconds of the log entry.
    pub timestamp: i64,
}

impl<T> std::ops::Deref for Event<T>
where
    T: std::fmt::Debug + Clone,
{
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> Event<T>
where
    T: std::fmt::Debug + Clone,
{
    pub fn new(inner: &T) -> Self {
        Self {
            inner: inner.clone(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl GraphEvent {
    pub fn is_complete(&self) -> bool {
        matches!(self, GraphEvent::Flow(FlowEvent::Succeeded | FlowEvent::Stopped))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, GraphEvent::Flow(FlowEvent::Failed(_)) | GraphEvent::Node(NodeEvent::Error(_)))
    }
}
