//! Trigger handling and UI-mode reflection.
//!
//! A single trigger toggles between starting a batch and aborting the one in
//! flight; a tick interval reflects orchestrator state plus the playback probe
//! into the two-mode button affordance.

use crate::capability::ActiveProbe;
use crate::model::{BatchEvent, BatchOutcome, ButtonMode, InfoEvent};
use crate::orchestrator::BatchOrchestrator;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::Duration;

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub enum UiCommand {
    /// The export button was pressed.
    Trigger,
    Quit,
}

fn current_mode(orchestrator: &BatchOrchestrator, probe: &Arc<dyn ActiveProbe>) -> ButtonMode {
    if orchestrator.is_running() {
        ButtonMode::Abort
    } else if probe.is_active() {
        ButtonMode::Single
    } else {
        ButtonMode::Batch
    }
}

/// Drive the orchestrator from UI commands and emit events back to
/// presentation layers. Returns once a quit is requested and any in-flight
/// run has finished cleanup.
pub async fn run_controller(
    mut orchestrator: BatchOrchestrator,
    probe: Arc<dyn ActiveProbe>,
    event_tx: UnboundedSender<BatchEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut quit_pending = false;
    let mut mode = current_mode(&orchestrator, &probe);
    let _ = event_tx.send(BatchEvent::ModeChanged { mode });
    let mut ticker = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Trigger) => {
                        if orchestrator.is_running() {
                            orchestrator.abort();
                            let _ = event_tx.send(BatchEvent::Info(InfoEvent::Aborting));
                        } else if probe.is_active() {
                            // Single-item mode: the host's own export path owns
                            // this press, a batch only starts from an idle state.
                            tracing::debug!("trigger ignored: playback active");
                        } else {
                            match orchestrator.start() {
                                Ok(total) => {
                                    tracing::info!(total, "batch export started");
                                }
                                Err(e) => {
                                    tracing::warn!("batch start rejected: {e}");
                                    let _ = event_tx.send(BatchEvent::Info(
                                        InfoEvent::StartRejected {
                                            reason: e.to_string(),
                                        },
                                    ));
                                }
                            }
                        }
                    }
                    Some(UiCommand::Quit) | None => {
                        // Quit waits for the current run so cleanup (unlock,
                        // Idle transition) is observed before exiting.
                        if orchestrator.is_running() {
                            quit_pending = true;
                            orchestrator.abort();
                        } else {
                            break;
                        }
                    }
                }
            }
            outcome = orchestrator.completed() => {
                let _ = event_tx.send(match outcome {
                    BatchOutcome::Completed { exported } => {
                        BatchEvent::BatchCompleted { exported }
                    }
                    BatchOutcome::Aborted { exported } => {
                        BatchEvent::BatchAborted { exported }
                    }
                });
                if quit_pending {
                    break;
                }
            }
            _ = ticker.tick() => {
                let next = current_mode(&orchestrator, &probe);
                if next != mode {
                    mode = next;
                    let _ = event_tx.send(BatchEvent::ModeChanged { mode });
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Collaborators;
    use crate::model::BatchConfig;
    use crate::sim::{SimExporter, SimLock, SimPlayer, StaticProvider, VecSource};
    use tokio::sync::mpsc;

    fn quick_cfg() -> BatchConfig {
        BatchConfig {
            settle_delay: Duration::from_millis(10),
            frame_wait: Duration::from_millis(1),
            export_cooldown: Duration::from_millis(5),
            poll_interval: Duration::from_millis(1),
        }
    }

    fn entries() -> Vec<(String, String)> {
        [("-", ""), ("A", "a1"), ("B", "b1"), ("C", "c1")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_starts_then_completion_is_reported() {
        let player = Arc::new(SimPlayer::default());
        let exporter = Arc::new(SimExporter::new(Duration::from_millis(5)));
        let lock = Arc::new(SimLock::default());
        let provider = Arc::new(StaticProvider::new(Collaborators {
            source: Some(Arc::new(VecSource::new(entries()))),
            player: Some(player.clone()),
            exporter: Some(exporter.clone()),
        }));
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let orch =
            BatchOrchestrator::new(quick_cfg(), provider, lock.clone(), event_tx.clone());

        let controller = tokio::spawn(run_controller(orch, player.clone(), event_tx, cmd_rx));

        cmd_tx.send(UiCommand::Trigger).unwrap();

        let mut saw_started = false;
        let mut completed = None;
        while let Some(ev) = event_rx.recv().await {
            match ev {
                BatchEvent::BatchStarted { total } => {
                    saw_started = true;
                    assert_eq!(total, 3);
                }
                BatchEvent::BatchCompleted { exported } => {
                    completed = Some(exported);
                    break;
                }
                _ => {}
            }
        }
        assert!(saw_started);
        assert_eq!(completed, Some(2));
        assert!(!lock.is_locked());

        cmd_tx.send(UiCommand::Quit).unwrap();
        controller.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn second_trigger_aborts_the_run() {
        let player = Arc::new(SimPlayer::default());
        let exporter = Arc::new(SimExporter::stalled());
        let lock = Arc::new(SimLock::default());
        let provider = Arc::new(StaticProvider::new(Collaborators {
            source: Some(Arc::new(VecSource::new(entries()))),
            player: Some(player.clone()),
            exporter: Some(exporter.clone()),
        }));
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let orch =
            BatchOrchestrator::new(quick_cfg(), provider, lock.clone(), event_tx.clone());

        let controller = tokio::spawn(run_controller(orch, player.clone(), event_tx, cmd_rx));

        cmd_tx.send(UiCommand::Trigger).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        cmd_tx.send(UiCommand::Trigger).unwrap();

        let mut aborted = None;
        while let Some(ev) = event_rx.recv().await {
            if let BatchEvent::BatchAborted { exported } = ev {
                aborted = Some(exported);
                break;
            }
        }
        assert_eq!(aborted, Some(0));
        assert!(!lock.is_locked());
        assert_eq!(player.played(), vec!["a1", "b1"]);

        cmd_tx.send(UiCommand::Quit).unwrap();
        controller.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn quit_during_run_aborts_then_exits() {
        let player = Arc::new(SimPlayer::default());
        let exporter = Arc::new(SimExporter::stalled());
        let lock = Arc::new(SimLock::default());
        let provider = Arc::new(StaticProvider::new(Collaborators {
            source: Some(Arc::new(VecSource::new(entries()))),
            player: Some(player.clone()),
            exporter: Some(exporter.clone()),
        }));
        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let orch =
            BatchOrchestrator::new(quick_cfg(), provider, lock.clone(), event_tx.clone());

        let controller = tokio::spawn(run_controller(orch, player.clone(), event_tx, cmd_rx));

        cmd_tx.send(UiCommand::Trigger).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        cmd_tx.send(UiCommand::Quit).unwrap();

        controller.await.unwrap().unwrap();
        assert!(!lock.is_locked());
    }
}
