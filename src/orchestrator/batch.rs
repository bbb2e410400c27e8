//! Batch lifecycle state machine.
//!
//! `Idle --start--> Running --(loop exhausted)--> Idle` and
//! `Running --abort--> Aborting --(cleanup)--> Idle`; no other transitions.

use crate::capability::{CollaboratorProvider, LockToggle};
use crate::engine::BatchEngine;
use crate::model::{filter_tasks, BatchConfig, BatchEvent, BatchOutcome, BatchState};
use crate::signal::CompletionSignal;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Why a start attempt was rejected. Both cases are informational for the
/// caller; neither leaves the state machine outside Idle (for
/// `AlreadyRunning`, outside its current in-flight run).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("a batch is already running")]
    AlreadyRunning,
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),
}

/// Owns the task sequence and progress of one batch run at a time. The
/// collaborators are externally owned and resolved through the provider at
/// every start; only the lock toggle is held across runs.
pub struct BatchOrchestrator {
    cfg: BatchConfig,
    provider: Arc<dyn CollaboratorProvider>,
    lock: Arc<dyn LockToggle>,
    event_tx: mpsc::UnboundedSender<BatchEvent>,
    latch: CompletionSignal,
    state: BatchState,
    cancel: Arc<AtomicBool>,
    handle: Option<tokio::task::JoinHandle<BatchOutcome>>,
}

impl BatchOrchestrator {
    pub fn new(
        cfg: BatchConfig,
        provider: Arc<dyn CollaboratorProvider>,
        lock: Arc<dyn LockToggle>,
        event_tx: mpsc::UnboundedSender<BatchEvent>,
    ) -> Self {
        Self {
            cfg,
            provider,
            lock,
            event_tx,
            latch: CompletionSignal::new(),
            state: BatchState::Idle,
            cancel: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Resolve collaborators, derive the task list, lock the surface, and
    /// spawn the run loop. Returns the task count; the loop itself executes
    /// asynchronously to the caller.
    ///
    /// When a collaborator is missing the state stays Idle and the lock is
    /// never taken.
    pub fn start(&mut self) -> Result<usize, StartError> {
        if self.state != BatchState::Idle {
            return Err(StartError::AlreadyRunning);
        }

        let collab = self.provider.current();
        let source = collab
            .source
            .ok_or(StartError::MissingCollaborator("animation source"))?;
        let player = collab
            .player
            .ok_or(StartError::MissingCollaborator("animation controller"))?;
        let exporter = collab
            .exporter
            .ok_or(StartError::MissingCollaborator("exporter"))?;

        let tasks = filter_tasks(&source.entries());
        let total = tasks.len();

        self.set_locked(true);
        self.cancel = Arc::new(AtomicBool::new(false));
        self.latch.reset();

        let engine = BatchEngine::new(self.cfg.clone(), tasks);
        self.handle = Some(tokio::spawn(engine.run(
            player,
            exporter,
            self.latch.clone(),
            self.cancel.clone(),
            self.event_tx.clone(),
        )));
        self.state = BatchState::Running;
        let _ = self.event_tx.send(BatchEvent::BatchStarted { total });
        Ok(total)
    }

    /// Request cooperative cancellation of the in-flight run. No-op unless
    /// Running; the engine observes the flag at its next suspension point.
    pub fn abort(&mut self) {
        if self.state != BatchState::Running {
            return;
        }
        self.cancel.store(true, Ordering::Relaxed);
        self.state = BatchState::Aborting;
        warn!("batch export aborted by user");
    }

    pub fn is_running(&self) -> bool {
        self.state != BatchState::Idle
    }

    #[cfg(test)]
    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Resolve when the in-flight run finishes; pending forever while Idle so
    /// this can sit in a select loop. Cleanup (unlock, transition to Idle,
    /// dropping the run handle) happens here, exactly once per run.
    pub async fn completed(&mut self) -> BatchOutcome {
        // Poll the JoinHandle in place rather than taking it first: if another
        // select branch wins, the borrow is dropped and the handle survives.
        let join_res = match self.handle.as_mut() {
            Some(h) => h.await,
            None => futures::future::pending().await,
        };
        self.handle = None;
        let outcome = match join_res {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("batch task join failed: {e}");
                BatchOutcome::Aborted { exported: 0 }
            }
        };
        self.set_locked(false);
        self.state = BatchState::Idle;
        outcome
    }

    /// Lock or unlock the selection surface. A vanished surface is logged and
    /// contained; it must never interrupt the run loop.
    fn set_locked(&self, locked: bool) {
        let res = if locked {
            self.lock.lock()
        } else {
            self.lock.unlock()
        };
        if let Err(e) = res {
            warn!("failed to {} selection surface: {e:#}", if locked { "lock" } else { "unlock" });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Collaborators;
    use crate::sim::{SimExporter, SimLock, SimPlayer, StaticProvider, VecSource};
    use std::time::Duration;

    fn quick_cfg() -> BatchConfig {
        BatchConfig {
            settle_delay: Duration::from_millis(10),
            frame_wait: Duration::from_millis(1),
            export_cooldown: Duration::from_millis(5),
            poll_interval: Duration::from_millis(1),
        }
    }

    fn demo_entries() -> Vec<(String, String)> {
        [("-", ""), ("A", "a1"), ("B", "b1"), ("C", "c1")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    struct Fixture {
        orch: BatchOrchestrator,
        player: Arc<SimPlayer>,
        exporter: Arc<SimExporter>,
        lock: Arc<SimLock>,
    }

    fn fixture(exporter: SimExporter) -> Fixture {
        let player = Arc::new(SimPlayer::default());
        let exporter = Arc::new(exporter);
        let lock = Arc::new(SimLock::default());
        let provider = Arc::new(StaticProvider::new(Collaborators {
            source: Some(Arc::new(VecSource::new(demo_entries()))),
            player: Some(player.clone()),
            exporter: Some(exporter.clone()),
        }));
        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let orch = BatchOrchestrator::new(quick_cfg(), provider, lock.clone(), event_tx);
        Fixture {
            orch,
            player,
            exporter,
            lock,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn full_run_locks_then_unlocks() {
        let mut f = fixture(SimExporter::new(Duration::from_millis(5)));

        assert_eq!(f.orch.start().unwrap(), 3);
        assert!(f.orch.is_running());
        assert!(f.lock.is_locked());

        let outcome = f.orch.completed().await;
        assert_eq!(outcome, BatchOutcome::Completed { exported: 2 });
        assert!(!f.lock.is_locked());
        assert_eq!(f.orch.state(), BatchState::Idle);
        assert_eq!(f.player.played(), vec!["a1", "b1", "c1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn start_while_running_is_rejected_and_harmless() {
        let mut f = fixture(SimExporter::new(Duration::from_millis(5)));

        f.orch.start().unwrap();
        assert_eq!(f.orch.start(), Err(StartError::AlreadyRunning));

        // The rejected start did not disturb the in-flight run.
        let outcome = f.orch.completed().await;
        assert_eq!(outcome, BatchOutcome::Completed { exported: 2 });
        assert_eq!(f.exporter.export_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_during_latch_wait_still_unlocks() {
        let mut f = fixture(SimExporter::stalled());

        f.orch.start().unwrap();
        // Let the run reach the second task's latch wait.
        tokio::time::sleep(Duration::from_millis(50)).await;
        f.orch.abort();
        assert_eq!(f.orch.state(), BatchState::Aborting);
        // Idempotent while already aborting.
        f.orch.abort();

        let outcome = f.orch.completed().await;
        assert_eq!(outcome, BatchOutcome::Aborted { exported: 0 });
        assert!(!f.lock.is_locked());
        assert_eq!(f.orch.state(), BatchState::Idle);
        // The third task's play never fired.
        assert_eq!(f.player.played(), vec!["a1", "b1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_while_idle_is_a_no_op() {
        let mut f = fixture(SimExporter::new(Duration::from_millis(5)));
        f.orch.abort();
        assert_eq!(f.orch.state(), BatchState::Idle);
        assert!(!f.lock.is_locked());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_collaborator_never_locks() {
        let lock = Arc::new(SimLock::default());
        let provider = Arc::new(StaticProvider::new(Collaborators {
            source: Some(Arc::new(VecSource::new(demo_entries()))),
            player: Some(Arc::new(SimPlayer::default())),
            exporter: None,
        }));
        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let mut orch = BatchOrchestrator::new(quick_cfg(), provider, lock.clone(), event_tx);

        assert_eq!(
            orch.start(),
            Err(StartError::MissingCollaborator("exporter"))
        );
        assert_eq!(orch.state(), BatchState::Idle);
        assert!(!lock.is_locked());
    }

    #[tokio::test(start_paused = true)]
    async fn broken_lock_surface_does_not_stop_the_run() {
        let player = Arc::new(SimPlayer::default());
        let exporter = Arc::new(SimExporter::new(Duration::from_millis(5)));
        let provider = Arc::new(StaticProvider::new(Collaborators {
            source: Some(Arc::new(VecSource::new(demo_entries()))),
            player: Some(player.clone()),
            exporter: Some(exporter.clone()),
        }));
        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let mut orch = BatchOrchestrator::new(
            quick_cfg(),
            provider,
            Arc::new(SimLock::broken()),
            event_tx,
        );

        orch.start().unwrap();
        let outcome = orch.completed().await;
        assert_eq!(outcome, BatchOutcome::Completed { exported: 2 });
        assert_eq!(orch.state(), BatchState::Idle);
    }
}
