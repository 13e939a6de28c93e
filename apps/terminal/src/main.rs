use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use flow_core::{
    EphemeralPreferences, FlowController, HistoryBackend, MemoryHistory, MissingHistory,
    PreferenceStore,
};
use shared::error::{ErrorReport, FlowError};
use storage::{FilePreferences, SeededDirectory};

mod app;
mod commands;
mod config;
mod receipt;

use app::{App, Outcome};
use receipt::PlainTextReceipt;

#[derive(Parser, Debug)]
#[command(name = "master-fees", about = "Pay school fees step by step")]
struct Args {
    /// Startup location; its fragment (e.g. `#pay-fees`) is used as a deep link.
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Keep preferences in memory only.
    #[arg(long)]
    ephemeral: bool,
    /// Run without platform history (no back/forward).
    #[arg(long)]
    no_history: bool,
    #[arg(long)]
    skip_tutorial: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = config::load_settings(args.config.as_deref());
    if let Some(dir) = args.data_dir.clone() {
        settings.data_dir = Some(dir);
    }
    settings.skip_tutorial |= args.skip_tutorial;

    tracing_subscriber::fmt()
        .with_env_filter(settings.log_filter.as_str())
        .with_writer(io::stderr)
        .init();

    let data_dir = settings.resolve_data_dir()?;
    let prefs: Arc<dyn PreferenceStore> = if args.ephemeral {
        Arc::new(EphemeralPreferences::default())
    } else {
        Arc::new(FilePreferences::open(&data_dir)?)
    };
    let history: Arc<dyn HistoryBackend> = match (&args.location, args.no_history) {
        (_, true) => Arc::new(MissingHistory),
        (Some(location), false) => Arc::new(
            MemoryHistory::with_location(location)
                .with_context(|| format!("invalid --location '{location}'"))?,
        ),
        (None, false) => Arc::new(MemoryHistory::new()),
    };

    let controller = FlowController::start(
        history,
        Arc::new(SeededDirectory::demo()),
        prefs,
        settings.flow_options(),
    )?;
    tracing::info!(data_dir = %data_dir.display(), "master-fees terminal started");

    let mut app = App::new(controller, PlainTextReceipt, data_dir);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in app.banner() {
        writeln!(out, "{line}")?;
    }

    let stdin = io::stdin();
    loop {
        write!(out, "master-fees> ")?;
        out.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        for event in app.drain_platform_events() {
            writeln!(out, "{event}")?;
        }
        if line.trim().is_empty() {
            continue;
        }

        let outcome = commands::parse_command(&line).and_then(|command| app.execute(command));
        match outcome {
            Ok(Outcome::Continue(lines)) => {
                for line in lines {
                    writeln!(out, "{line}")?;
                }
            }
            Ok(Outcome::Exit) => break,
            Err(err) => match err.downcast_ref::<FlowError>().map(ErrorReport::from) {
                Some(report) => {
                    writeln!(out, "error[{}]: {}", report.code.as_str(), report.message)?
                }
                None => writeln!(out, "error: {err:#}")?,
            },
        }
    }

    tracing::info!(step = %app.controller().current_step(), "master-fees terminal exiting");
    Ok(())
}
