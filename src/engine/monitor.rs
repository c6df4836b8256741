use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use tokio::{runtime::Handle, sync::broadcast::error::RecvError};

use crate::{
    ShareLock,
    common::Shutdown,
    events::{FlowEvent, FlowState, GraphEvent, NodeEvent, Severity},
    runtime::{Channel, ProcessRegistry},
    workflow::NodeId,
};

/// Last known state of one node, as seen on the event channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeStatus {
    pub nid: NodeId,
    pub state: String,
    pub err: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
}

/// Folds channel traffic into per-node status and mirrors node logs into `tracing`.
pub struct Monitor {
    channel: Arc<Channel>,
    registry: Arc<ProcessRegistry>,
    statuses: ShareLock<HashMap<NodeId, NodeStatus>>,

    handle: Handle,
    shutdown: Arc<Shutdown>,
}

impl Monitor {
    pub fn new(
        channel: Arc<Channel>,
        registry: Arc<ProcessRegistry>,
        handle: Handle,
    ) -> Self {
        Self {
            channel,
            registry,
            statuses: Arc::new(RwLock::new(HashMap::new())),
            handle,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    pub fn monitor(&self) {
        let statuses = self.statuses.clone();
        let registry = self.registry.clone();
        let mut event_queue = self.channel.event_queue().subscribe();
        let shutdown = self.shutdown.clone();

        self.handle.spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.wait() => break,
                    event = event_queue.recv() => event,
                };
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "monitor lagged behind the event channel");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                match &event.event {
                    GraphEvent::Flow(FlowEvent::State(FlowState::Classifying)) => {
                        // tasks of earlier runs that are still alive keep their status
                        let alive = registry.running_node_ids();
                        statuses.write().unwrap().retain(|nid, _| alive.contains(nid));
                    }
                    GraphEvent::Flow(FlowEvent::Started(started)) => {
                        let mut statuses = statuses.write().unwrap();
                        for nid in started.order.iter().chain(started.tasks.iter()) {
                            statuses.entry(nid.clone()).or_insert_with(|| NodeStatus {
                                nid: nid.clone(),
                                state: "Pending".to_string(),
                                ..Default::default()
                            });
                        }
                    }
                    GraphEvent::Flow(_) => {}
                    GraphEvent::Node(n) => {
                        let mut statuses = statuses.write().unwrap();
                        let status = statuses.entry(event.nid.clone()).or_insert_with(|| NodeStatus {
                            nid: event.nid.clone(),
                            ..Default::default()
                        });
                        status.state = n.str().to_string();

                        match n {
                            NodeEvent::Running(ts) | NodeEvent::TaskLaunched(ts) => {
                                status.start_time = *ts;
                                status.err = None;
                            }
                            NodeEvent::Succeeded(ts) | NodeEvent::Stopped(ts) | NodeEvent::TaskFinished(ts) => {
                                status.end_time = *ts;
                            }
                            NodeEvent::Error(e) => {
                                status.err = Some(e.to_string());
                            }
                        }
                    }
                }
            }
        });

        let mut log_queue = self.channel.log_queue().subscribe();
        let shutdown = self.shutdown.clone();

        self.handle.spawn(async move {
            loop {
                let log = tokio::select! {
                    _ = shutdown.wait() => break,
                    log = log_queue.recv() => log,
                };
                let log = match log {
                    Ok(log) => log,
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                };

                match log.severity {
                    Severity::Debug => tracing::debug!(rid = %log.rid, nid = %log.nid, "{}", log.content),
                    Severity::Info => tracing::info!(rid = %log.rid, nid = %log.nid, "{}", log.content),
                    Severity::Warn => tracing::warn!(rid = %log.rid, nid = %log.nid, "{}", log.content),
                    // already reported through `tracing::error!` where it was raised
                    Severity::Error => tracing::debug!(rid = %log.rid, nid = %log.nid, "{}", log.content),
                }
            }
        });
    }

    pub fn status(
        &self,
        nid: &str,
    ) -> Option<NodeStatus> {
        self.statuses.read().unwrap().get(nid).cloned()
    }

    pub fn statuses(&self) -> Vec<NodeStatus> {
        let mut statuses: Vec<NodeStatus> = self.statuses.read().unwrap().values().cloned().collect();
        statuses.sort_by_key(|s| s.start_time);
        statuses
    }

    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }
}
