//! Run-level scheduling of a [`Workflow`](crate::workflow::Workflow).

mod scheduler;

pub use scheduler::{FlowReport, Scheduler};
