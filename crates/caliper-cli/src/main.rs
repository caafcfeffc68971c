//! caliper: measure an object in a photo against a reference of known size.
//!
//! # Usage
//!
//! ```text
//! caliper measure [--reference NAME] [--config FILE] [--json] <IMAGE_PATH>
//! caliper references [--config FILE]
//! ```
//!
//! `measure` runs the photo through the full lifecycle (pending,
//! processing, then completed or failed), printing each status event as it
//! is published.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use caliper_service::{
    BroadcastNotifier, FsImageSource, Measurement, MemoryStore, NewPhoto, Orchestrator, Photo,
    PhotoEvent, PhotoStatus, Settings,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::Level;

/// Measure real-world object dimensions from a photo.
#[derive(Parser)]
#[command(name = "caliper", version)]
struct Cli {
    /// Settings file (TOML or JSON). Environment variables prefixed with
    /// `CALIPER__` override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log pipeline stages at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Measure the object in a photo.
    Measure {
        /// Path to the photo (JPEG, PNG, BMP).
        image_path: PathBuf,

        /// Reference object type in the photo; auto-detected when omitted.
        #[arg(long)]
        reference: Option<String>,

        /// Print the final photo and its measurements as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List configured reference objects in detection order.
    References,
}

/// Final state of a measured photo.
#[derive(Serialize)]
struct Report<'a> {
    photo: &'a Photo,
    measurements: &'a [Measurement],
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading settings: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::References => {
            print_references(&settings);
            ExitCode::SUCCESS
        }
        Command::Measure {
            image_path,
            reference,
            json,
        } => match measure(&settings, &image_path, reference, json).await {
            Ok(PhotoStatus::Completed) => ExitCode::SUCCESS,
            Ok(_) => ExitCode::FAILURE,
            Err(msg) => {
                eprintln!("{msg}");
                ExitCode::FAILURE
            }
        },
    }
}

fn print_references(settings: &Settings) {
    for spec in settings.references.iter() {
        let extent = spec
            .calibration_extent()
            .map_or_else(|| "none".to_owned(), |e| format!("{e}"));
        println!(
            "{:<16} calibration extent {:<8} {:?} (threshold {})",
            spec.name, extent, spec.detection_method, spec.confidence_threshold,
        );
    }
}

/// Run one photo through the lifecycle and print the outcome.
///
/// Returns the photo's final status; the error is a message for the user.
async fn measure(
    settings: &Settings,
    image_path: &Path,
    reference: Option<String>,
    json: bool,
) -> Result<PhotoStatus, String> {
    let location = image_path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| format!("Not a file path: {}", image_path.display()))?
        .to_owned();
    let root = match image_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let size_bytes = std::fs::metadata(image_path)
        .map_err(|e| format!("Error reading {}: {e}", image_path.display()))?
        .len();

    let notifier = Arc::new(BroadcastNotifier::new());
    let orchestrator = Orchestrator::new(
        Arc::new(MemoryStore::new()),
        Arc::new(FsImageSource::new(root)),
        notifier.clone(),
        settings,
    );

    let upload = NewPhoto {
        storage_location: location,
        reference_object: reference,
        measurement_type: Some("size".to_owned()),
        size_bytes: Some(size_bytes),
    };
    let photo = orchestrator
        .register(upload)
        .await
        .map_err(|e| format!("Upload rejected: {e}"))?;
    let id = photo.id();

    let mut events = notifier.subscribe(id);
    eprintln!("photo {id}: {}", photo.status());
    let run = orchestrator
        .start(id)
        .await
        .map_err(|e| format!("Could not start processing: {e}"))?;
    follow_events(&mut events).await;
    run.finished()
        .await
        .map_err(|e| format!("Processing task aborted: {e}"))?;

    let photo = orchestrator
        .photo(id)
        .await
        .map_err(|e| format!("Error loading photo: {e}"))?;
    let measurements = if photo.status() == PhotoStatus::Completed {
        orchestrator
            .measurements(id)
            .await
            .map_err(|e| format!("Error loading measurements: {e}"))?
    } else {
        Vec::new()
    };

    if json {
        let report = Report {
            photo: &photo,
            measurements: &measurements,
        };
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("Error serializing report: {e}"))?;
        println!("{out}");
    } else {
        print_report(&photo, &measurements);
    }
    Ok(photo.status())
}

/// Print events until the photo reaches a terminal status.
async fn follow_events(events: &mut broadcast::Receiver<PhotoEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                match &event.error_message {
                    Some(msg) => eprintln!("photo {}: {} ({msg})", event.photo_id, event.status),
                    None => eprintln!("photo {}: {}", event.photo_id, event.status),
                }
                if event.status.is_terminal() {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

fn print_report(photo: &Photo, measurements: &[Measurement]) {
    println!("Photo:     {}", photo.id());
    println!("Image:     {}", photo.storage_location());
    println!("Status:    {}", photo.status());
    if let Some(reference) = photo.reference_object() {
        println!("Reference: {reference}");
    }
    if let Some(msg) = photo.error_message() {
        println!("Error:     {msg}");
    }
    for m in measurements {
        println!();
        println!("Length:     {:.2}", m.length);
        println!("Width:      {:.2}", m.width);
        println!("Area:       {:.2}", m.area);
        println!("Confidence: {:.2}", m.confidence);
    }
}
