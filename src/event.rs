use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Pipeline stage names as they appear in events and validator outcomes.
pub mod stage {
    pub const SEMANTIC: &str = "semantic";
    pub const GEOGRAPHIC: &str = "geographic";
    pub const NORMALIZE: &str = "normalize";
    pub const COUNTS: &str = "counts";
    pub const IDENTITY: &str = "identity";
    pub const SHARD: &str = "shard";
    pub const INDEX: &str = "index";
    pub const MERKLE: &str = "merkle";
    pub const PACKAGE: &str = "package";
    pub const REPLICATE: &str = "replicate";
    pub const ROLLOUT: &str = "rollout";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Accepted,
    Rejected,
    Warned,
    Completed,
    Failed,
}

/// One record in the append-only pipeline event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub at: DateTime<Utc>,
    pub stage: String,
    /// Dataset response hash, district id, or artifact key, depending on stage.
    pub subject: String,
    pub outcome: EventOutcome,
    pub detail: String,
}

/// Receiver for pipeline events. Implementations must be cheap; the pipeline
/// emits from worker threads.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Default sink: append-only in-memory log, drained at the end of a run for
/// the report.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<PipelineEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<PipelineEvent> {
        std::mem::take(&mut self.events.lock())
    }

    pub fn snapshot(&self) -> Vec<PipelineEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: PipelineEvent) {
        self.events.lock().push(event);
    }
}

/// Convenience constructor used throughout the pipeline.
pub fn event(stage: &str, subject: impl Into<String>, outcome: EventOutcome, detail: impl Into<String>) -> PipelineEvent {
    PipelineEvent {
        at: Utc::now(),
        stage: stage.to_string(),
        subject: subject.into(),
        outcome,
        detail: detail.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_preserves_emit_order() {
        let log = EventLog::new();
        log.emit(event(stage::SEMANTIC, "a", EventOutcome::Accepted, ""));
        log.emit(event(stage::GEOGRAPHIC, "a", EventOutcome::Rejected, "oob"));
        let events = log.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].stage, stage::SEMANTIC);
        assert_eq!(events[1].outcome, EventOutcome::Rejected);
        assert!(log.drain().is_empty());
    }
}
