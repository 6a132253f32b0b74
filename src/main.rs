//! Application entry point: interview coach CLI.
//!
//! # Startup sequence
//!
//! 1. Parse the command line (`--init-config` writes default settings and
//!    stops here).
//! 2. Load [`AppConfig`] (defaults on first run, API key from the
//!    environment when set).
//! 3. Initialise logging with the configured default level.
//! 4. Build the shared Gemini client handle and the directory-backed
//!    capture collaborators.
//! 5. Either answer a single `--ask` question, or spawn the orchestrator,
//!    send a `Process` command (and a `Debug` command once the problem is
//!    extracted, when `--extra` files were given) and print events until
//!    the run ends.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::mpsc;

use interview_coach::{
    capture::{DirectoryQueue, FsReader},
    config::{AppConfig, AppPaths},
    llm::SharedClient,
    pipeline::{PipelineCommand, PipelineEvent, PipelineOrchestrator, ProcessRequest, RawInput},
    types::{InputKind, QueueItem},
};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "interview-coach", version, about = "Structured answers for interview questions")]
struct Cli {
    /// Screenshots, audio clips or text files forming one problem.  When
    /// omitted, the buffered queue directory is processed.
    files: Vec<PathBuf>,

    /// Extra screenshots for a debug pass over the extracted problem.
    #[arg(long, num_args = 1..)]
    extra: Vec<PathBuf>,

    /// Settings file to use instead of the platform default.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Answer one typed question and exit.
    #[arg(long, conflicts_with_all = ["files", "extra"])]
    ask: Option<String>,

    /// Write a default settings file (unless one exists) and exit.
    #[arg(long, conflicts_with_all = ["files", "extra", "ask"])]
    init_config: bool,
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)
                .with_context(|| format!("reading settings from {}", path.display()))?;
            config.apply_env_overrides();
            Ok(config)
        }
        None => AppConfig::load().context("reading settings"),
    }
}

/// Write defaults to `path` (or the platform settings file) when absent.
/// Returns the file that now holds the settings.
fn init_config(path: Option<&Path>) -> Result<PathBuf> {
    let target = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppPaths::new().settings_file);
    if target.exists() {
        return Ok(target);
    }
    let defaults = AppConfig::default();
    match path {
        Some(path) => defaults.save_to(path),
        None => defaults.save(),
    }
    .with_context(|| format!("writing settings to {}", target.display()))?;
    Ok(target)
}

fn queue_items(files: &[PathBuf]) -> Result<Vec<QueueItem>> {
    files
        .iter()
        .map(|path| {
            let kind = path
                .extension()
                .and_then(|e| e.to_str())
                .and_then(InputKind::from_extension);
            match kind {
                Some(kind) => Ok(QueueItem::new(kind, path.display().to_string())),
                None => bail!("cannot tell the input kind of {}", path.display()),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Event output
// ---------------------------------------------------------------------------

/// Print `event`; returns `true` for error events.
fn print_event(event: &PipelineEvent) -> bool {
    match event {
        PipelineEvent::ProblemExtracted(info) => {
            if let Some(errors) = &info.processing_errors {
                for e in errors {
                    eprintln!("warning: {e}");
                }
            }
            println!("{}", info.solution.text);
            false
        }
        PipelineEvent::DebugSuccess(result) => {
            println!("\n{}", result.text);
            false
        }
        PipelineEvent::SolutionError(msg) | PipelineEvent::DebugError(msg) => {
            eprintln!("error: {msg}");
            true
        }
        PipelineEvent::NoInputAvailable => {
            eprintln!("error: nothing to process");
            true
        }
        other => {
            log::info!("{}", other.name());
            false
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Command line
    let cli = Cli::parse();
    if cli.init_config {
        let written = init_config(cli.config.as_deref())?;
        println!("{}", written.display());
        return Ok(());
    }

    // 2. Configuration
    let config = load_config(cli.config.as_deref())?;

    // 3. Logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();
    log::info!("interview coach starting up (model {})", config.llm.model);

    // 4. Collaborators
    let paths = AppPaths::new();
    let queue = DirectoryQueue::new(
        config.capture.queue_dir.clone().unwrap_or(paths.queue_dir),
        config
            .capture
            .extra_queue_dir
            .clone()
            .unwrap_or(paths.extra_queue_dir),
    );

    let config = Arc::new(config);
    let client = SharedClient::gemini(config.clone(), config.llm.clone());
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        &config,
        client,
        Arc::new(queue),
        Arc::new(FsReader),
        event_tx,
    ));

    // 5a. Simple call
    if let Some(question) = cli.ask {
        let result = orchestrator.respond(RawInput::Text(question)).await;
        println!("{}", result.text);
        return Ok(());
    }

    // 5b. Queue run, then an optional debug pass
    let request = if cli.files.is_empty() {
        ProcessRequest::Buffered
    } else {
        ProcessRequest::Items(queue_items(&cli.files)?)
    };
    let mut extra = if cli.extra.is_empty() {
        None
    } else {
        Some(queue_items(&cli.extra)?)
    };

    let (cmd_tx, cmd_rx) = mpsc::channel(4);
    let runner = tokio::spawn(Arc::clone(&orchestrator).run(cmd_rx));
    cmd_tx
        .send(PipelineCommand::Process(request))
        .await
        .context("orchestrator stopped")?;

    // Dropping the command sender lets the orchestrator shut down, which in
    // turn closes the event channel.
    let mut cmd_tx = Some(cmd_tx);
    let mut failed = false;

    while let Some(event) = event_rx.recv().await {
        failed |= print_event(&event);

        let follow_up = match &event {
            PipelineEvent::ProblemExtracted(_) => extra.take(),
            _ => None,
        };
        if let Some(items) = follow_up {
            if let Some(tx) = &cmd_tx {
                tx.send(PipelineCommand::Debug(ProcessRequest::Items(items)))
                    .await
                    .context("orchestrator stopped")?;
            }
        } else if event.is_terminal() {
            cmd_tx = None;
        }
    }

    runner.await.context("orchestrator task failed")?;
    if let Ok(st) = orchestrator.state().lock() {
        log::info!("pipeline finished: {}", st.pipeline.label());
    }
    if failed {
        bail!("processing failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_config_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        let written = init_config(Some(&path)).unwrap();
        assert_eq!(written, path);
        assert_eq!(AppConfig::load_from(&path).unwrap().llm.model, AppConfig::default().llm.model);

        std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();
        init_config(Some(&path)).unwrap();
        assert_eq!(AppConfig::load_from(&path).unwrap().logging.level, "debug");
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(queue_items(&[PathBuf::from("notes.docx")]).is_err());
        let items = queue_items(&[PathBuf::from("q.txt"), PathBuf::from("s.png")]).unwrap();
        assert_eq!(items[0].kind, InputKind::Text);
        assert_eq!(items[1].kind, InputKind::Screenshot);
    }
}
