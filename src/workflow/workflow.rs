//! Runtime flow representation using a directed graph.
//!
//! Every node of a run lives in one petgraph graph, in declaration order.
//! Only flow nodes are wired: edges touching a task node or an unknown node
//! are dropped when the graph is built, so task nodes stay isolated.

use std::collections::{HashMap, VecDeque};

use petgraph::{
    Direction,
    graph::{DiGraph, EdgeIndex, NodeIndex},
    visit::EdgeRef,
};

use crate::{
    NodeflowError, Result, ShareLock,
    common::Vars,
    model::{EdgeModel, NodeModel},
    workflow::{
        NodeId,
        port::{PortDirection, PortRef},
    },
};

/// Resolved edge weight.
///
/// A `None` port means the handle did not parse; the edge still orders its
/// endpoints but carries no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Link {
    pub id: String,
    pub source: Option<PortRef>,
    pub target: Option<PortRef>,
}

#[derive(Clone)]
pub struct Workflow {
    graph: ShareLock<DiGraph<NodeModel, Link>>,
    index: HashMap<NodeId, NodeIndex>,
}

impl Workflow {
    pub fn new(
        nodes: Vec<NodeModel>,
        edges: &[EdgeModel],
    ) -> Result<Self> {
        let mut graph: DiGraph<NodeModel, Link> = DiGraph::new();
        let mut index = HashMap::new();

        for node in nodes {
            if index.contains_key(&node.id) {
                return Err(NodeflowError::Node(format!("duplicate node id '{}'", node.id)));
            }
            let nid = node.id.clone();
            let idx = graph.add_node(node);
            index.insert(nid, idx);
        }

        for edge in edges {
            let (Some(source), Some(target)) = (index.get(&edge.source), index.get(&edge.target)) else {
                tracing::warn!(source = %edge.source, target = %edge.target, "edge references an unknown node, ignored");
                continue;
            };
            if graph[*source].is_task() || graph[*target].is_task() {
                tracing::warn!(source = %edge.source, target = %edge.target, "edge touches a task node, ignored");
                continue;
            }

            let link = Link {
                id: edge.id.clone(),
                source: PortRef::parse_as(&edge.source_handle, PortDirection::Output),
                target: PortRef::parse_as(&edge.target_handle, PortDirection::Input),
            };
            if link.source.is_none() || link.target.is_none() {
                tracing::warn!(
                    source_handle = %edge.source_handle,
                    target_handle = %edge.target_handle,
                    "edge handle could not be resolved, no value will flow"
                );
            }
            graph.add_edge(*source, *target, link);
        }

        Ok(Self {
            graph: ShareLock::new(graph.into()),
            index,
        })
    }

    /// Output a human-readable representation of the flow graph
    pub fn schema(&self) -> String {
        let graph = self.graph.read().unwrap();
        let mut lines = Vec::new();

        lines.push("=== Flow Graph ===".to_string());
        lines.push(format!("Nodes: {}, Edges: {}", graph.node_count(), graph.edge_count()));

        for idx in graph.node_indices() {
            let node = &graph[idx];
            let outgoing: Vec<String> = Self::sorted_edges(&graph, idx, Direction::Outgoing)
                .into_iter()
                .map(|e| {
                    let link = &graph[e];
                    let target = graph.edge_endpoints(e).map(|(_, t)| graph[t].id.clone()).unwrap_or_default();
                    format!("{}({} -> {})", target, port_label(link.source), port_label(link.target))
                })
                .collect();

            if outgoing.is_empty() {
                lines.push(format!("[{}] {} -> (end)", node.kind.as_ref(), node.id));
            } else {
                lines.push(format!("[{}] {} -> {}", node.kind.as_ref(), node.id, outgoing.join(", ")));
            }
        }

        lines.join("\n")
    }

    /// get node by id
    pub fn get_node(
        &self,
        nid: &str,
    ) -> Option<NodeModel> {
        let graph = self.graph.read().unwrap();
        self.index.get(nid).map(|idx| graph[*idx].clone())
    }

    /// All nodes in declaration order, with the outputs written so far.
    pub fn nodes(&self) -> Vec<NodeModel> {
        let graph = self.graph.read().unwrap();
        graph.node_indices().map(|idx| graph[idx].clone()).collect()
    }

    /// Task node ids in declaration order.
    pub fn task_ids(&self) -> Vec<NodeId> {
        let graph = self.graph.read().unwrap();
        graph.node_indices().filter(|idx| graph[*idx].is_task()).map(|idx| graph[idx].id.clone()).collect()
    }

    /// Topological order of the flow nodes (Kahn's algorithm).
    ///
    /// Ready nodes are taken first-in first-out: initial roots in declaration
    /// order, then successors in edge declaration order. A cycle is an error
    /// naming every node that could not be ordered.
    pub fn execution_order(&self) -> Result<Vec<NodeId>> {
        let graph = self.graph.read().unwrap();
        let flow: Vec<NodeIndex> = graph.node_indices().filter(|idx| !graph[*idx].is_task()).collect();

        let mut in_degree: HashMap<NodeIndex, usize> = flow.iter().map(|idx| (*idx, graph.edges_directed(*idx, Direction::Incoming).count())).collect();
        let mut queue: VecDeque<NodeIndex> = flow.iter().copied().filter(|idx| in_degree[idx] == 0).collect();
        let mut order = Vec::with_capacity(flow.len());

        while let Some(idx) = queue.pop_front() {
            order.push(graph[idx].id.clone());

            for edge in Self::sorted_edges(&graph, idx, Direction::Outgoing) {
                let Some((_, target)) = graph.edge_endpoints(edge) else {
                    continue;
                };
                if let Some(degree) = in_degree.get_mut(&target) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(target);
                    }
                }
            }
        }

        if order.len() < flow.len() {
            let nodes = flow.iter().filter(|idx| in_degree[*idx] > 0).map(|idx| graph[*idx].id.clone()).collect();
            return Err(NodeflowError::GraphCycle {
                nodes,
            });
        }

        Ok(order)
    }

    /// Collect the input record of `nid` from its incoming edges.
    ///
    /// Each edge copies the source output value at its port index into the
    /// target input named at its port index. Unresolved ports and unset
    /// source values contribute nothing.
    pub fn gather_inputs(
        &self,
        nid: &str,
    ) -> Vars {
        let graph = self.graph.read().unwrap();
        let mut inputs = Vars::new();
        let Some(target_idx) = self.index.get(nid) else {
            return inputs;
        };
        let target = &graph[*target_idx];

        for edge in Self::sorted_edges(&graph, *target_idx, Direction::Incoming) {
            let link = &graph[edge];
            let Some((source_idx, _)) = graph.edge_endpoints(edge) else {
                continue;
            };
            let (Some(source_port), Some(target_port)) = (link.source, link.target) else {
                continue;
            };

            let value = graph[source_idx].outputs.get(source_port.index as usize).and_then(|p| p.value.clone());
            let input = target.inputs.get(target_port.index as usize);
            match (value, input) {
                (Some(value), Some(input)) => inputs.set(&input.name, value),
                _ => tracing::debug!(nid = %nid, edge = %link.id, "port not found, edge contributes no value"),
            }
        }

        inputs
    }

    /// Write invocation results onto the node's outputs.
    pub fn set_outputs(
        &self,
        nid: &str,
        outputs: &Vars,
    ) {
        let mut graph = self.graph.write().unwrap();
        if let Some(idx) = self.index.get(nid) {
            graph[*idx].apply_outputs(outputs);
        }
    }

    fn sorted_edges(
        graph: &DiGraph<NodeModel, Link>,
        idx: NodeIndex,
        direction: Direction,
    ) -> Vec<EdgeIndex> {
        let mut edges: Vec<EdgeIndex> = graph.edges_directed(idx, direction).map(|e| e.id()).collect();
        edges.sort();
        edges
    }
}

fn port_label(port: Option<PortRef>) -> String {
    port.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string())
}
