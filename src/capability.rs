//! Capability traits for the externally-owned collaborators the batch drives.
//!
//! The host environment owns the player, the exporter, and the list surface;
//! the orchestrator only ever sees them through these traits, injected at
//! construction. References are time-varying (panels rebind, surfaces go
//! away), so a [`CollaboratorProvider`] is consulted at every start instead of
//! caching resolved objects across runs.

use crate::signal::CompletionSignal;
use anyhow::Result;
use std::sync::Arc;

/// Read-only ordered mapping of display key to animation reference. The
/// mapping still contains the placeholder row; filtering happens in
/// [`crate::model::filter_tasks`].
pub trait AnimationSource: Send + Sync {
    fn entries(&self) -> Vec<(String, String)>;
}

/// Fire-and-forget playback control. No return contract beyond "playback
/// begins".
pub trait AnimationController: Send + Sync {
    fn play(&self, anim_ref: &str, looped: bool, start_time: f32);
}

/// Answers whether an animation is currently mid-playback. Consulted only by
/// the controller glue for mode reflection, never by the run loop.
pub trait ActiveProbe: Send + Sync {
    fn is_active(&self) -> bool;
}

/// Fire-and-forget export trigger with a single-shot completion observer.
///
/// The run loop registers a latch, triggers the export, and removes the
/// registration once the latch has been observed (or the run was aborted).
pub trait Exporter: Send + Sync {
    fn export(&self);
    fn on_complete(&self, done: CompletionSignal);
    fn clear_on_complete(&self);
}

/// Lock/unlock the selection surface while a batch runs (disable interaction,
/// dim it). Idempotent. Failures mean the underlying surface is gone; callers
/// contain and log them, a missing surface must never abort a running batch.
pub trait LockToggle: Send + Sync {
    fn lock(&self) -> Result<()>;
    fn unlock(&self) -> Result<()>;
}

/// Snapshot of the collaborators resolvable right now. Any field may be
/// absent when the host panel is not bound.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub source: Option<Arc<dyn AnimationSource>>,
    pub player: Option<Arc<dyn AnimationController>>,
    pub exporter: Option<Arc<dyn Exporter>>,
}

/// Resolves the current collaborator set at the moment a batch starts.
pub trait CollaboratorProvider: Send + Sync {
    fn current(&self) -> Collaborators;
}
