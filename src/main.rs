//! CLI entry point for camdaq.
//!
//! Drives a recording run from the command line:
//! - `record` captures one or more timestamped recording segments
//! - `preview` streams and discards frames for placement checks
//! - `still` grabs a single frame and saves it as a PNG
//!
//! Settings come from a TOML file (`config/camdaq.toml` by default) with
//! `CAMDAQ_`-prefixed environment overrides; a few common knobs are also
//! exposed as flags. When a camera is busy or absent the operator is
//! prompted to free it and retry, matching how lab rigs actually behave.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use camdaq::camera::thermal::ThermalCamera;
use camdaq::camera::vision::VisionCamera;
use camdaq::camera::{CameraKind, FrameSource};
use camdaq::config::Settings;
use camdaq::error::CamError;
use camdaq::session::{RecordingSession, SessionPaths};
use camdaq::sink::SinkKind;

#[derive(Parser)]
#[command(name = "camdaq")]
#[command(about = "Laboratory camera acquisition and timestamped recording", long_about = None)]
struct Cli {
    /// Path to the settings file.
    #[arg(long, default_value = "config/camdaq.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one or more timestamped segments.
    Record {
        /// Which camera to drive.
        #[arg(long, value_enum, default_value = "thermal")]
        camera: CameraArg,

        /// Extra name component for output files (e.g. a subject id).
        #[arg(long, default_value = "run")]
        tag: String,

        /// Override the configured segment duration in seconds.
        #[arg(long)]
        duration: Option<f64>,

        /// Override the configured number of repetitions.
        #[arg(long)]
        reps: Option<u32>,
    },

    /// Stream and discard frames for an operator placement check.
    Preview {
        /// Which camera to drive.
        #[arg(long, value_enum, default_value = "thermal")]
        camera: CameraArg,

        /// Preview length in seconds.
        #[arg(long, default_value_t = 5.0)]
        seconds: f64,
    },

    /// Grab a single frame and save it as a PNG.
    Still {
        /// Which camera to drive.
        #[arg(long, value_enum, default_value = "thermal")]
        camera: CameraArg,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum CameraArg {
    Thermal,
    Vision,
}

impl From<CameraArg> for CameraKind {
    fn from(value: CameraArg) -> Self {
        match value {
            CameraArg::Thermal => CameraKind::Thermal,
            CameraArg::Vision => CameraKind::Vision,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load_from(&cli.config)
        .with_context(|| format!("failed to load settings from {}", cli.config.display()))?;
    settings
        .validate()
        .map_err(|msg| anyhow!("invalid settings: {msg}"))?;

    camdaq::logging::init(
        &settings.application.log_level,
        settings.application.error_log.as_deref(),
    )
    .map_err(|msg| anyhow!(msg))?;

    match cli.command {
        Commands::Record {
            camera,
            tag,
            duration,
            reps,
        } => record(&settings, camera.into(), &tag, duration, reps),
        Commands::Preview { camera, seconds } => preview(&settings, camera.into(), seconds),
        Commands::Still { camera } => still(&settings, camera.into()),
    }
}

fn record(
    settings: &Settings,
    kind: CameraKind,
    tag: &str,
    duration: Option<f64>,
    reps: Option<u32>,
) -> Result<()> {
    let mut recording = settings.recording.to_config();
    if let Some(duration_s) = duration {
        recording.duration_s = Some(duration_s);
    }
    if let Some(total_rec) = reps {
        recording.total_rec = total_rec;
    }

    let (camera, sink_kind, base_name) = build_camera(settings, kind)?;
    let paths = SessionPaths {
        dir: settings.storage.output_dir.clone(),
        base_name,
        tag: tag.to_string(),
    };

    let mut session = RecordingSession::new(camera, sink_kind, paths, recording);
    let record = session
        .run(&settings.application.experiment_name)
        .context("recording session failed")?;

    for segment in &record.segments {
        println!(
            "segment {}: {} frames -> {}",
            segment.repetition, segment.frame_count, segment.output_file
        );
    }
    Ok(())
}

fn preview(settings: &Settings, kind: CameraKind, seconds: f64) -> Result<()> {
    let (mut camera, _, _) = build_camera(settings, kind)?;
    camera.start()?;
    println!("previewing for {seconds} s ...");
    let deadline = std::time::Instant::now() + Duration::from_secs_f64(seconds);
    let timeout = settings.recording.to_config().grab_timeout;
    let mut seen: u64 = 0;
    while std::time::Instant::now() < deadline {
        match camera.get_frame(timeout) {
            camdaq::device::Grab::Image(image) => {
                seen += 1;
                if seen % 10 == 0 {
                    println!("frame {seen}: mean {:.2}", image.mean());
                }
            }
            camdaq::device::Grab::Timeout => println!("frame missing"),
            camdaq::device::Grab::Fault(err) => {
                camera.stop();
                return Err(err.into());
            }
        }
    }
    camera.stop();
    println!("previewed {seen} frames");
    Ok(())
}

fn still(settings: &Settings, kind: CameraKind) -> Result<()> {
    std::fs::create_dir_all(&settings.storage.output_dir)?;
    let timeout = settings.recording.to_config().grab_timeout;
    let path = match kind {
        CameraKind::Thermal => {
            let mut camera = ThermalCamera::simulated(settings.thermal.bounds());
            camera.open_with_retry(operator_retry)?;
            camera.start()?;
            let path = camera.save_still(&settings.storage.output_dir, timeout)?;
            camera.stop();
            camera.close();
            path
        }
        CameraKind::Vision => {
            let mut camera = VisionCamera::simulated();
            camera.open_with_retry(operator_retry)?;
            camera.set_frame_rate(settings.vision.frame_rate_fps)?;
            camera.start()?;
            let path = camera.save_still(&settings.storage.output_dir, timeout)?;
            camera.stop();
            camera.close();
            path
        }
    };
    println!("still saved to {}", path.display());
    Ok(())
}

/// Build the requested camera, open it with operator-prompted retry, and
/// pair it with its configured sink.
fn build_camera(
    settings: &Settings,
    kind: CameraKind,
) -> Result<(Box<dyn FrameSource>, SinkKind, String)> {
    match kind {
        CameraKind::Thermal => {
            let mut camera = ThermalCamera::simulated(settings.thermal.bounds());
            camera.open_with_retry(operator_retry)?;
            if settings.thermal.shutter_manual {
                camera.set_shutter_manual()?;
            }
            Ok((
                Box::new(camera),
                settings.storage.thermal_sink,
                "thermal-camera".to_string(),
            ))
        }
        CameraKind::Vision => {
            let mut camera = VisionCamera::simulated();
            camera.open_with_retry(operator_retry)?;
            camera.set_frame_rate(settings.vision.frame_rate_fps)?;
            Ok((
                Box::new(camera),
                settings.storage.vision_sink,
                "vision-camera".to_string(),
            ))
        }
    }
}

/// Ask the operator whether to retry a failed camera open.
fn operator_retry(err: &CamError) -> bool {
    eprintln!("Failed to open camera: {err}");
    eprint!("Please make the camera available and press Enter to try again (or 'q' to give up): ");
    let _ = std::io::stderr().flush();
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return false;
    }
    !line.trim().eq_ignore_ascii_case("q")
}
