use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use vigil_core::jobs::job_pool::JobStatus;
use vigil_core::service::{Collaborators, MonitorService};
use vigil_core::shared::settings::Settings;

/// Video monitoring: anomaly detection, watchlist matching and alerts.
#[derive(Parser)]
#[command(name = "vigil")]
struct Cli {
    /// Settings file (defaults to the per-user config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch a live source and write the annotated multipart stream.
    Watch {
        /// Device index, stream URL or file path.
        source: String,

        /// Session id.
        #[arg(long, default_value = "default")]
        id: String,

        /// Deployment role selecting the detection model.
        #[arg(long, default_value = "home")]
        role: String,

        /// Write the stream here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Analyse a video file in the background job pool and report alerts.
    Process {
        video: PathBuf,

        #[arg(long, default_value = "upload")]
        id: String,

        #[arg(long, default_value = "home")]
        role: String,
    },
    /// Reload the watchlist directory and print the number of encodings.
    Watchlist,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    let collaborators = Collaborators::from_settings(&settings);
    let service = MonitorService::new(settings, collaborators)?;

    match cli.command {
        Command::Watch {
            source,
            id,
            role,
            output,
        } => run_watch(&service, &source, &id, &role, output),
        Command::Process { video, id, role } => run_process(&service, &video, &id, &role),
        Command::Watchlist => {
            if !service.watchlist_enabled() {
                println!("Watchlist matching is disabled: no face model could be loaded");
                return Ok(());
            }
            let count = service.refresh_watchlist();
            println!("{count} watchlist encodings loaded");
            Ok(())
        }
    }
}

fn run_watch(
    service: &MonitorService,
    source: &str,
    id: &str,
    role: &str,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = service.start_session(id, source, role)?;
    let stream = service.stream(id)?;
    log::info!("Session {} streaming as {}", session.id(), stream.content_type());

    let mut out: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    let mut chunks = 0usize;
    for chunk in stream {
        out.write_all(&chunk)?;
        chunks += 1;
    }
    out.flush()?;

    service.flush_alerts();
    log::info!(
        "Session {} ended after {} frames ({chunks} streamed, {} alerts)",
        session.id(),
        session.frames_read(),
        service.recent_alerts().len()
    );
    if let Some(path) = output {
        log::info!("Stream written to {}", path.display());
    }
    Ok(())
}

fn run_process(
    service: &MonitorService,
    video: &Path,
    id: &str,
    role: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let handle = service.process_file(id, role, video);
    eprintln!("Processing {} as job {}", video.display(), handle.id());

    let report = match handle.wait() {
        JobStatus::Completed(report) => report,
        JobStatus::Failed(e) => return Err(e.into()),
        status => return Err(format!("job ended in unexpected state {status:?}").into()),
    };
    service.flush_alerts();

    println!("{} frames analysed, {} alerts", report.frames, report.alerts);
    for alert in service.recent_alerts() {
        let snapshot = alert
            .snapshot_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<not saved>".to_string());
        println!(
            "{}  {:<24} {snapshot}",
            alert.timestamp.format("%Y-%m-%d %H:%M:%S"),
            alert.reason.to_string()
        );
    }
    if service.dropped_alerts() > 0 {
        eprintln!("{} alerts dropped (queue full)", service.dropped_alerts());
    }
    Ok(())
}
