use crate::capability::Collaborators;
use crate::model::{BatchConfig, BatchEvent, BatchOutcome, BatchReport, InfoEvent};
use crate::orchestrator::{run_controller, BatchOrchestrator, UiCommand};
use crate::sim::{SimExporter, SimLock, SimPlayer, StaticProvider, VecSource};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "anim-export-batch",
    version,
    about = "Sequential batch export of animation clips through a player/exporter pair"
)]
pub struct Cli {
    /// JSON manifest: ordered array of [key, animation-ref] pairs.
    /// Defaults to a built-in demo set when omitted.
    #[arg(long)]
    pub manifest: Option<std::path::PathBuf>,

    /// Settle delay after triggering playback, before the pose is capturable
    #[arg(long, default_value = "1500ms")]
    pub settle_delay: humantime::Duration,

    /// Render-frame boundary wait applied after the settle delay
    #[arg(long, default_value = "16ms")]
    pub frame_wait: humantime::Duration,

    /// Cooldown between a finished export and the next item
    #[arg(long, default_value = "300ms")]
    pub export_cooldown: humantime::Duration,

    /// Poll cadence for the completion latch and the cancel flag
    #[arg(long, default_value = "50ms")]
    pub poll_interval: humantime::Duration,

    /// How long the simulated exporter takes to report completion
    #[arg(long, default_value = "200ms")]
    pub export_time: humantime::Duration,

    /// Send an abort trigger this long after the batch starts
    #[arg(long)]
    pub abort_after: Option<humantime::Duration>,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Build a `BatchConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> BatchConfig {
    BatchConfig {
        settle_delay: args.settle_delay.into(),
        frame_wait: args.frame_wait.into(),
        export_cooldown: args.export_cooldown.into(),
        poll_interval: args.poll_interval.into(),
    }
}

/// Load the animation mapping, placeholder row included, in source order.
fn load_entries(args: &Cli) -> Result<Vec<(String, String)>> {
    match args.manifest.as_deref() {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read manifest {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("invalid manifest {}", path.display()))
        }
        None => Ok([
            ("-", ""),
            ("Idle", "anim_idle"),
            ("Walk", "anim_walk"),
            ("Run", "anim_run"),
            ("Jump", "anim_jump"),
            ("Attack", "anim_attack"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()),
    }
}

/// Run one batch against the simulated collaborators and report the outcome.
pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let entries = load_entries(&args)?;

    let player = Arc::new(SimPlayer::default());
    let exporter = Arc::new(SimExporter::new(args.export_time.into()));
    let lock = Arc::new(SimLock::default());
    let provider = Arc::new(StaticProvider::new(Collaborators {
        source: Some(Arc::new(VecSource::new(entries))),
        player: Some(player.clone()),
        exporter: Some(exporter),
    }));

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<BatchEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let orchestrator = BatchOrchestrator::new(cfg, provider, lock, event_tx.clone());
    let controller = tokio::spawn(run_controller(orchestrator, player, event_tx, cmd_rx));

    let (out_tx, out_handle) = spawn_output_writer();

    // Ctrl-C requests a clean quit: an in-flight batch is aborted and cleanup
    // runs before the controller exits.
    let ctrl_c_cmd = cmd_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrl_c_cmd.send(UiCommand::Quit);
        }
    });

    cmd_tx.send(UiCommand::Trigger)?;
    if let Some(after) = args.abort_after {
        let cmd_tx = cmd_tx.clone();
        let after: Duration = after.into();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = cmd_tx.send(UiCommand::Trigger);
        });
    }

    let mut total = 0usize;
    let mut exported_keys: Vec<String> = Vec::new();
    let mut outcome = None;

    while let Some(ev) = event_rx.recv().await {
        match ev {
            BatchEvent::BatchStarted { total: t } => {
                total = t;
                let _ = out_tx.send(OutputLine::Stderr(format!(
                    "Starting batch of {} animations",
                    t
                )));
            }
            BatchEvent::TaskStarted { index, total, key } => {
                let _ = out_tx.send(OutputLine::Stderr(format!(
                    "[{}/{}] {}",
                    index + 1,
                    total,
                    key
                )));
            }
            BatchEvent::ExportCompleted { key } => {
                let _ = out_tx.send(OutputLine::Stderr(format!("Exported {}", key)));
                exported_keys.push(key);
            }
            BatchEvent::BatchCompleted { exported } => {
                outcome = Some(BatchOutcome::Completed { exported });
                break;
            }
            BatchEvent::BatchAborted { exported } => {
                outcome = Some(BatchOutcome::Aborted { exported });
                break;
            }
            BatchEvent::ModeChanged { mode } => {
                let _ = out_tx.send(OutputLine::Stderr(format!("Mode: {}", mode.label())));
            }
            BatchEvent::Info(info) => {
                let rejected = matches!(info, InfoEvent::StartRejected { .. });
                let _ = out_tx.send(OutputLine::Stderr(info.to_message()));
                if rejected {
                    // Nothing is in flight, so no completion event will follow.
                    break;
                }
            }
        }
    }

    let _ = cmd_tx.send(UiCommand::Quit);
    controller.await??;

    if let Some(outcome) = outcome {
        let report = BatchReport::new(total, outcome, exported_keys);
        if args.json {
            let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&report)?));
        } else {
            let _ = out_tx.send(OutputLine::Stdout(format!(
                "{} of {} animations exported{}",
                report.exported,
                report.total_tasks,
                if report.aborted { " (aborted)" } else { "" }
            )));
        }
    }

    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}
