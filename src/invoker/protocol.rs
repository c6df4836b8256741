//! Result side channel.
//!
//! A node reports its result as one stderr line starting with
//! [`RESULT_PREFIX`] followed by a JSON object with an `outputs` map. Any
//! other stderr or stdout text is log output.

use serde::Deserialize;
use serde_json::Value;

use crate::{NodeflowError, Result, invoker::InvocationResult};

pub const RESULT_PREFIX: &str = "@@NODEFLOW_RESULT@@";

#[derive(Deserialize)]
struct Envelope {
    outputs: Value,
}

/// Parse the last result line found in `stream`.
pub fn parse_result(
    nid: &str,
    stream: &str,
) -> Result<InvocationResult> {
    let parse_error = |reason: String| NodeflowError::ResultParse {
        nid: nid.to_string(),
        reason,
    };

    let payload = stream
        .lines()
        .rev()
        .find_map(|line| line.trim_start().strip_prefix(RESULT_PREFIX))
        .ok_or_else(|| parse_error("no result line on stderr".to_string()))?;

    let envelope: Envelope = serde_json::from_str(payload.trim()).map_err(|e| parse_error(format!("invalid result json: {}", e)))?;
    match envelope.outputs {
        Value::Object(_) => Ok(InvocationResult {
            outputs: envelope.outputs.into(),
        }),
        Value::Null => Ok(InvocationResult::default()),
        other => Err(parse_error(format!("`outputs` must be an object, got {}", other))),
    }
}
