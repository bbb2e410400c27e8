//! The batch run loop: play, settle, export, await completion, repeat.

use crate::capability::{AnimationController, Exporter};
use crate::model::{BatchConfig, BatchEvent, BatchOutcome, Task};
use crate::signal::CompletionSignal;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::mpsc;
use tracing::info;

/// Drives the player/exporter pair through one ordered task list.
///
/// The engine owns the task list and its progress cursor for the lifetime of
/// one run; the collaborators are borrowed from the host environment.
pub struct BatchEngine {
    cfg: BatchConfig,
    tasks: Vec<Task>,
}

impl BatchEngine {
    pub fn new(cfg: BatchConfig, tasks: Vec<Task>) -> Self {
        Self { cfg, tasks }
    }

    /// Run the batch to completion or until `cancel` is observed.
    ///
    /// Suspension points are the settle delay, the frame wait, the latch poll
    /// loop, and the inter-item cooldown; cancellation is cooperative and only
    /// takes effect there, never mid-collaborator-call. Task i's export is
    /// fully resolved (signaled or cancelled) before task i+1's play fires.
    pub async fn run(
        self,
        player: Arc<dyn AnimationController>,
        exporter: Arc<dyn Exporter>,
        latch: CompletionSignal,
        cancel: Arc<AtomicBool>,
        event_tx: mpsc::UnboundedSender<BatchEvent>,
    ) -> BatchOutcome {
        let total = self.tasks.len();
        let mut exported = 0usize;

        info!(total, "starting batch export");

        for (index, task) in self.tasks.iter().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                return BatchOutcome::Aborted { exported };
            }

            info!("[{}/{}] playing {}", index + 1, total, task.key);
            let _ = event_tx.send(BatchEvent::TaskStarted {
                index,
                total,
                key: task.key.clone(),
            });

            player.play(&task.animation_ref, true, 0.0);

            // Two-stage wait: the played animation needs simulation time and
            // at least one completed render before it is in a capturable state.
            tokio::time::sleep(self.cfg.settle_delay).await;
            if cancel.load(Ordering::Relaxed) {
                return BatchOutcome::Aborted { exported };
            }
            tokio::time::sleep(self.cfg.frame_wait).await;
            if cancel.load(Ordering::Relaxed) {
                return BatchOutcome::Aborted { exported };
            }

            // Warm-up skip: the very first play after binding never yields a
            // valid export, so index 0 is played but not captured.
            if index == 0 {
                continue;
            }

            latch.reset();
            exporter.on_complete(latch.clone());
            exporter.export();

            // No timeout here: an export that never signals stalls the batch
            // until the user aborts.
            while !latch.is_signaled() {
                if cancel.load(Ordering::Relaxed) {
                    exporter.clear_on_complete();
                    return BatchOutcome::Aborted { exported };
                }
                tokio::time::sleep(self.cfg.poll_interval).await;
            }
            exporter.clear_on_complete();
            latch.reset();

            exported += 1;
            info!("[{}/{}] exported {}", index + 1, total, task.key);
            let _ = event_tx.send(BatchEvent::ExportCompleted {
                key: task.key.clone(),
            });

            tokio::time::sleep(self.cfg.export_cooldown).await;
        }

        info!(exported, "batch export finished");
        BatchOutcome::Completed { exported }
    }
}
