use std::fmt;

#[derive(Debug, Clone)]
pub enum NodeEvent {
    Running(i64),
    Succeeded(i64),
    Stopped(i64),
    Error(ErrorReason),
    TaskLaunched(i64),
    TaskFinished(i64),
}

impl NodeEvent {
    pub fn str(&self) -> &str {
        match self {
            NodeEvent::Running(_) => "Running",
            NodeEvent::Succeeded(_) => "Succeeded",
            NodeEvent::Stopped(_) => "Stopped",
            NodeEvent::Error(_) => "Error",
            NodeEvent::TaskLaunched(_) => "TaskLaunched",
            NodeEvent::TaskFinished(_) => "TaskFinished",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ErrorReason {
    Failed(String),
    Exception(String),
}

impl fmt::Display for ErrorReason {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ErrorReason::Failed(msg) => write!(f, "Failed: {}", msg),
            ErrorReason::Exception(msg) => write!(f, "Exception: {}", msg),
        }
    }
}
