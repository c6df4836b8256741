//! Error types for Nodeflow.
//!
//! All errors in Nodeflow are represented by the `NodeflowError` enum,
//! which provides specific variants for different error categories.

use std::{io::ErrorKind, string::FromUtf8Error};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all Nodeflow operations.
///
/// The process and graph variants are the ones a host reacts to; the rest
/// describe configuration and I/O trouble around them.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum NodeflowError {
    /// Engine-level errors (startup, runtime construction).
    #[error("{0}")]
    Engine(String),

    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors (JSON, TOML).
    #[error("{0}")]
    Convert(String),

    /// Node bundle (`config.json`) loading or validation errors.
    #[error("{0}")]
    Bundle(String),

    /// The interpreter or executable could not be launched.
    #[error("{message}")]
    ProcessSpawn {
        program: String,
        message: String,
    },

    /// The external process exited with a non-zero code.
    #[error("process exited with code {code:?}: {stderr}")]
    ProcessExecution {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// The process succeeded but no result line could be parsed from it.
    #[error("no parseable result from node {nid}: {reason}")]
    ResultParse {
        nid: String,
        reason: String,
    },

    /// A process ended because a stop was requested. Never reported as a failure.
    #[error("stopped on request")]
    StopSuppressed,

    /// The flow graph contains a dependency cycle.
    #[error("dependency cycle between nodes: {}", nodes.join(", "))]
    GraphCycle {
        nodes: Vec<String>,
    },

    /// Node definition or execution errors.
    #[error("{0}")]
    Node(String),

    /// Edge definition errors.
    #[error("{0}")]
    Edge(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),

    /// Message queue errors.
    #[error("{0}")]
    Queue(String),
}

impl NodeflowError {
    /// Whether this error is the consequence of a stop request rather than a failure.
    pub fn is_stop(&self) -> bool {
        matches!(self, NodeflowError::StopSuppressed)
    }
}

impl From<NodeflowError> for String {
    fn from(val: NodeflowError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for NodeflowError {
    fn from(error: std::io::Error) -> Self {
        NodeflowError::IoError(error.to_string())
    }
}

impl From<NodeflowError> for std::io::Error {
    fn from(val: NodeflowError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<FromUtf8Error> for NodeflowError {
    fn from(_: FromUtf8Error) -> Self {
        NodeflowError::Convert("Error with utf-8 string convert".to_string())
    }
}

impl From<serde_json::Error> for NodeflowError {
    fn from(error: serde_json::Error) -> Self {
        NodeflowError::Convert(error.to_string())
    }
}

impl From<toml::de::Error> for NodeflowError {
    fn from(error: toml::de::Error) -> Self {
        NodeflowError::Config(error.to_string())
    }
}
