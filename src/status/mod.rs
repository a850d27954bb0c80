//! Channel liveness verification against the Acestream engine

pub mod checker;
pub mod engine;

pub use checker::{CheckSummary, StatusChecker};
pub use engine::{classify_status_response, EngineClient, EngineStatus, LivenessProbe, ProbeVerdict};
