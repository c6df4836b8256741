use crate::workflow::NodeId;

/// Run state machine.
///
/// `Idle -> Classifying -> Scheduling -> Executing(0..n) -> Completed`, with
/// `Stopping -> Idle` reachable from any `Executing` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowState {
    #[default]
    Idle,
    Classifying,
    Scheduling,
    /// Position of the running node in the execution order.
    Executing(usize),
    Completed,
    Stopping,
}

#[derive(Debug, Clone)]
pub enum FlowEvent {
    Started(FlowStartEvent),
    State(FlowState),
    Succeeded,
    Failed(FlowFailedEvent),
    Stopped,
}

/// Emitted once the execution order is known.
#[derive(Debug, Clone)]
pub struct FlowStartEvent {
    pub order: Vec<NodeId>,
    pub tasks: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct FlowFailedEvent {
    pub nid: NodeId,
    pub error: String,
}
