use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::pipeline::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Processing,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub id: u64,
    pub message: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub severity: Severity,
    pub stage: Stage,
}

#[derive(Debug, Default)]
struct LogBuffer {
    next_id: u64,
    events: Vec<ProgressEvent>,
}

/// Append-only event log owned by one job.
///
/// Clones share the same buffer so the registry can read while the job
/// appends.
#[derive(Debug, Clone)]
pub struct ProgressLog {
    job_id: Arc<str>,
    buffer: Arc<Mutex<LogBuffer>>,
}

impl ProgressLog {
    pub fn new(job_id: &str) -> Self {
        Self {
            job_id: Arc::from(job_id),
            buffer: Arc::new(Mutex::new(LogBuffer::default())),
        }
    }

    pub fn push(&self, stage: Stage, severity: Severity, message: impl Into<String>) -> u64 {
        let message = message.into();
        match severity {
            Severity::Warning => warn!(job = %self.job_id, stage = %stage, "{}", message),
            _ => info!(job = %self.job_id, stage = %stage, ?severity, "{}", message),
        }

        let mut guard = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        guard.next_id += 1;
        let id = guard.next_id;
        guard.events.push(ProgressEvent {
            id,
            message,
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
            severity,
            stage,
        });
        id
    }

    pub fn info(&self, stage: Stage, message: impl Into<String>) -> u64 {
        self.push(stage, Severity::Info, message)
    }

    pub fn success(&self, stage: Stage, message: impl Into<String>) -> u64 {
        self.push(stage, Severity::Success, message)
    }

    pub fn processing(&self, stage: Stage, message: impl Into<String>) -> u64 {
        self.push(stage, Severity::Processing, message)
    }

    pub fn warning(&self, stage: Stage, message: impl Into<String>) -> u64 {
        self.push(stage, Severity::Warning, message)
    }

    pub fn snapshot(&self) -> Vec<ProgressEvent> {
        self.since(None)
    }

    /// Events with an id strictly greater than `after`.
    pub fn since(&self, after: Option<u64>) -> Vec<ProgressEvent> {
        let guard = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        let after = after.unwrap_or(0);
        guard
            .events
            .iter()
            .filter(|e| e.id > after)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner()).events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_delta_reads_skip_seen_events() {
        let log = ProgressLog::new("job-a");
        let first = log.success(Stage::Validating, "Validating inputs...");
        let second = log.processing(Stage::PlanningScript, "Generating script");
        let third = log.warning(Stage::FetchingFootage, "fallback");
        assert!(first < second && second < third);

        let delta = log.since(Some(first));
        assert_eq!(delta.len(), 2);
        assert_eq!(delta[0].id, second);
        assert_eq!(delta[1].severity, Severity::Warning);
        assert!(log.since(Some(third)).is_empty());
        assert_eq!(log.snapshot().len(), 3);
    }

    #[test]
    fn clones_share_one_buffer() {
        let log = ProgressLog::new("job-b");
        let reader = log.clone();
        log.info(Stage::Validating, "hello");
        assert_eq!(reader.len(), 1);
    }

    #[test]
    fn severity_serializes_lowercase_under_type() {
        let log = ProgressLog::new("job-c");
        log.processing(Stage::Muxing, "Merging video with voiceover...");
        let json = serde_json::to_value(&log.snapshot()[0]).unwrap();
        assert_eq!(json["type"], "processing");
        assert_eq!(json["id"], 1);
    }
}
