use serde::{Deserialize, Serialize};

/// A connection from one node's output port to another node's input port,
/// as the editor serializes it.
///
/// Handles are port references such as `output-0` / `input-1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeModel {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub source_handle: String,
    pub target: String,
    pub target_handle: String,
}

impl EdgeModel {
    pub fn new(
        source: &str,
        source_handle: &str,
        target: &str,
        target_handle: &str,
    ) -> Self {
        Self {
            id: format!("{source}:{source_handle}->{target}:{target_handle}"),
            source: source.to_string(),
            source_handle: source_handle.to_string(),
            target: target.to_string(),
            target_handle: target_handle.to_string(),
        }
    }
}
