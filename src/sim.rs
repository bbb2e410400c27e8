//! Simulated collaborators backing the demo CLI and the test suite.
//!
//! These stand in for the host environment's player, exporter, and list
//! surface; they record every call so runs can be inspected afterwards.

use crate::capability::{
    ActiveProbe, AnimationController, AnimationSource, CollaboratorProvider, Collaborators,
    Exporter, LockToggle,
};
use crate::signal::CompletionSignal;
use anyhow::{bail, Result};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

/// Ordered key → animation-reference mapping held in memory.
pub struct VecSource {
    entries: Vec<(String, String)>,
}

impl VecSource {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }
}

impl AnimationSource for VecSource {
    fn entries(&self) -> Vec<(String, String)> {
        self.entries.clone()
    }
}

/// Player that records which references it was asked to play.
#[derive(Default)]
pub struct SimPlayer {
    played: Mutex<Vec<String>>,
    current: Mutex<Option<String>>,
}

impl SimPlayer {
    #[cfg(test)]
    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }
}

impl AnimationController for SimPlayer {
    fn play(&self, anim_ref: &str, _looped: bool, _start_time: f32) {
        self.played.lock().unwrap().push(anim_ref.to_string());
        *self.current.lock().unwrap() = Some(anim_ref.to_string());
    }
}

impl ActiveProbe for SimPlayer {
    fn is_active(&self) -> bool {
        self.current.lock().unwrap().is_some()
    }
}

/// Exporter that reports completion through the registered latch after a
/// fixed delay, from a spawned timer task (a foreign execution context, as in
/// the real subsystem).
pub struct SimExporter {
    delay: Option<Duration>,
    observer: Arc<Mutex<Option<CompletionSignal>>>,
    exports: AtomicUsize,
}

impl SimExporter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            observer: Arc::new(Mutex::new(None)),
            exports: AtomicUsize::new(0),
        }
    }

    /// An exporter whose completion callback never fires. Exercises the
    /// documented liveness gap: only an abort ends the wait.
    #[cfg(test)]
    pub fn stalled() -> Self {
        Self {
            delay: None,
            observer: Arc::new(Mutex::new(None)),
            exports: AtomicUsize::new(0),
        }
    }

    #[cfg(test)]
    pub fn export_count(&self) -> usize {
        self.exports.load(Ordering::Relaxed)
    }
}

impl Exporter for SimExporter {
    fn export(&self) {
        self.exports.fetch_add(1, Ordering::Relaxed);
        let Some(delay) = self.delay else {
            return;
        };
        let observer = Arc::clone(&self.observer);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Single-shot: take the registration so a late timer from an
            // earlier cycle cannot signal a later one.
            if let Some(latch) = observer.lock().unwrap().take() {
                latch.signal();
            }
        });
    }

    fn on_complete(&self, done: CompletionSignal) {
        *self.observer.lock().unwrap() = Some(done);
    }

    fn clear_on_complete(&self) {
        self.observer.lock().unwrap().take();
    }
}

/// Lock toggle that tracks its state; can be built broken to exercise the
/// containment path for a vanished surface.
#[derive(Default)]
pub struct SimLock {
    broken: bool,
    locked: AtomicBool,
}

impl SimLock {
    #[cfg(test)]
    pub fn broken() -> Self {
        Self {
            broken: true,
            locked: AtomicBool::new(false),
        }
    }

    #[cfg(test)]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl LockToggle for SimLock {
    fn lock(&self) -> Result<()> {
        if self.broken {
            bail!("selection surface is gone");
        }
        self.locked.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn unlock(&self) -> Result<()> {
        if self.broken {
            bail!("selection surface is gone");
        }
        self.locked.store(false, Ordering::Relaxed);
        Ok(())
    }
}

/// Provider that hands out the same collaborator set on every resolution.
pub struct StaticProvider {
    collaborators: Collaborators,
}

impl StaticProvider {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }
}

impl CollaboratorProvider for StaticProvider {
    fn current(&self) -> Collaborators {
        self.collaborators.clone()
    }
}
