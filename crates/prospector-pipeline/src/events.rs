//! Pipeline event system for observability.
//!
//! Emits [`PipelineEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! external observers (loggers, progress displays, the review UI) can follow
//! run progress without coupling to the orchestrator internals.

use serde::{Deserialize, Serialize};

use prospector_types::{ErrorKind, LeadId, Stage};

/// Events emitted during a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    RunStarted {
        topic: String,
        target_count: usize,
    },
    RunCompleted {
        succeeded: usize,
        failed: usize,
        skipped: usize,
        duration_ms: u64,
    },
    RunCancelled,
    StageStarted {
        lead: LeadId,
        stage: Stage,
    },
    StageCompleted {
        lead: LeadId,
        stage: Stage,
    },
    StageRetrying {
        lead: LeadId,
        stage: Stage,
        attempt: u32,
    },
    LeadFailed {
        lead: LeadId,
        stage: Stage,
        kind: ErrorKind,
    },
    LeadSkipped {
        lead: LeadId,
        reason: String,
    },
    DraftFlagged {
        lead: LeadId,
        reason: String,
    },
}

/// Event emitter wrapping a broadcast sender. Sending never blocks and
/// ignores the absence of subscribers.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    pub fn emit(&self, event: PipelineEvent) {
        // A send error just means nobody is listening.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
