mod channel;
mod context;
mod registry;
mod runner;
mod scratch;

pub use channel::{Channel, ChannelEvent, ChannelOptions};
pub use context::{Context, RunId};
pub use registry::{ProcessHandle, ProcessRegistry, RunningState};
pub use runner::{DetachedProcess, ErrorHandle, OutputHandle, ProcessOutput, ProcessRunner, RunOptions};
pub use scratch::{ScratchDir, ScratchFile};
