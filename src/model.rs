use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reserved "no selection" row in the animation list; never part of a batch.
pub const PLACEHOLDER_KEY: &str = "-";

/// Timing knobs for a batch run.
///
/// The settle/cooldown values are empirically chosen safety margins with no
/// documented lower bound, so they are configurable rather than hard-coded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Wait after triggering playback so the pose can materialize.
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
    /// Additional wait for one render-frame boundary after the settle delay.
    #[serde(with = "humantime_serde")]
    pub frame_wait: Duration,
    /// Pause between a finished export and the next item, so export requests
    /// never overlap in the exporter's own pipeline.
    #[serde(with = "humantime_serde")]
    pub export_cooldown: Duration,
    /// Cadence at which the completion latch and the cancel flag are polled.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(1500),
            frame_wait: Duration::from_millis(16),
            export_cooldown: Duration::from_millis(300),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// One unit of batch work: a display key plus the animation it plays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub key: String,
    pub animation_ref: String,
}

/// Derive the batch task list from the source mapping, dropping the
/// placeholder row and entries without a usable reference. Source order is
/// preserved exactly; no re-sort.
pub fn filter_tasks(entries: &[(String, String)]) -> Vec<Task> {
    entries
        .iter()
        .filter(|(key, anim_ref)| key != PLACEHOLDER_KEY && !anim_ref.is_empty())
        .map(|(key, anim_ref)| Task {
            key: key.clone(),
            animation_ref: anim_ref.clone(),
        })
        .collect()
}

/// Lifecycle of the one batch orchestrator instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchState {
    Idle,
    Running,
    Aborting,
}

/// How a batch run ended. Aborting is a normal terminal path, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Completed { exported: usize },
    Aborted { exported: usize },
}

impl BatchOutcome {
    pub fn exported(self) -> usize {
        match self {
            BatchOutcome::Completed { exported } | BatchOutcome::Aborted { exported } => exported,
        }
    }
}

/// The two-mode export affordance the UI reflects each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ButtonMode {
    /// Something is selected or playing: the button exports the current item.
    Single,
    /// Nothing is active: the button starts a batch over every real entry.
    Batch,
    /// A batch is in flight: the button aborts it.
    Abort,
}

impl ButtonMode {
    pub fn label(self) -> &'static str {
        match self {
            ButtonMode::Single => "Export current animation",
            ButtonMode::Batch => "Export all animations",
            ButtonMode::Abort => "Abort batch export",
        }
    }
}

/// Events emitted by the engine and orchestrator, consumed by UI/CLI layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BatchEvent {
    BatchStarted {
        total: usize,
    },
    TaskStarted {
        index: usize,
        total: usize,
        key: String,
    },
    ExportCompleted {
        key: String,
    },
    BatchCompleted {
        exported: usize,
    },
    BatchAborted {
        exported: usize,
    },
    ModeChanged {
        mode: ButtonMode,
    },
    Info(InfoEvent),
}

/// Structured info events for presentation layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InfoEvent {
    Message(String),
    StartRejected { reason: String },
    Aborting,
}

impl InfoEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::StartRejected { reason } => format!("Batch not started: {}", reason),
            InfoEvent::Aborting => "Aborting batch…".to_string(),
        }
    }
}

/// Final summary of one batch run, printed by the CLI (optionally as JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    #[serde(default)]
    pub timestamp_utc: String,
    pub total_tasks: usize,
    pub exported: usize,
    pub aborted: bool,
    pub exported_keys: Vec<String>,
}

impl BatchReport {
    pub fn new(total_tasks: usize, outcome: BatchOutcome, exported_keys: Vec<String>) -> Self {
        Self {
            timestamp_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            total_tasks,
            exported: outcome.exported(),
            aborted: matches!(outcome, BatchOutcome::Aborted { .. }),
            exported_keys,
        }
    }
}
