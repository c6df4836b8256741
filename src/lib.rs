//! # Nodeflow
//!
//! Nodeflow executes graphs of small external node scripts in dependency
//! order. It is meant to sit behind a visual flow editor: the host hands
//! over nodes and edges, and gets back outputs, logs and live running state.
//!
//! ## Core Features
//!
//! - **Ordered Flow Nodes**: flow nodes run one at a time in topological order, outputs feeding successors by port index
//! - **Detached Task Nodes**: task nodes start with the run and never block or fail it
//! - **Process Supervision**: every node is its own OS process, tracked in a registry and killable at any point
//! - **Observable State**: running state via `tokio::sync::watch`, run events and node logs via the event channel
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use nodeflow::{EdgeModel, EngineBuilder, NodeBundle};
//!
//! let engine = EngineBuilder::new().node_dir("nodes").build()?;
//!
//! let init = NodeBundle::load("nodes/init")?.instantiate("init");
//! let calc = NodeBundle::load("nodes/calc")?.instantiate("calc");
//! let edges = vec![EdgeModel::new("init", "output-0", "calc", "input-0")];
//!
//! let report = engine.start(vec![init, calc], edges).await?;
//! engine.force_stop();
//! ```

mod builder;
mod common;
mod config;
mod dispatcher;
mod engine;
mod error;
mod events;
mod invoker;
mod model;
mod runtime;
mod utils;
mod workflow;

use std::sync::{Arc, RwLock};

pub use builder::EngineBuilder;
pub use common::Vars;
pub use config::Config;
pub use dispatcher::FlowReport;
pub use engine::{Engine, NodeStatus};
pub use error::NodeflowError;
pub use events::{ErrorReason, Event, FlowEvent, FlowFailedEvent, FlowStartEvent, FlowState, GraphEvent, Log, Message, NodeEvent, Severity};
pub use invoker::{InvocationResult, Invoke, NodeInvoker, NodeRuntime, PythonRuntime, RESULT_PREFIX, parse_result, resolve_inputs};
pub use model::*;
pub use runtime::{
    Channel, ChannelEvent, ChannelOptions, Context, DetachedProcess, ErrorHandle, OutputHandle, ProcessHandle, ProcessOutput, ProcessRegistry, ProcessRunner, RunId, RunOptions, RunningState,
    ScratchDir, ScratchFile,
};
pub use workflow::{NodeId, PortDirection, PortRef, Workflow};

/// Result type alias for Nodeflow operations.
pub type Result<T> = std::result::Result<T, NodeflowError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
