use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use crossbeam_channel::{after, never, select, tick};

use facemood_core::annotation::infrastructure::box_annotator::BoxAnnotator;
use facemood_core::detection::domain::face_detector::FaceDetector;
use facemood_core::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use facemood_core::emotion::domain::emotion_classifier::EmotionClassifier;
use facemood_core::emotion::infrastructure::onnx_emotion_classifier::OnnxEmotionClassifier;
use facemood_core::pipeline::pipeline_config::PipelineConfig;
use facemood_core::session::domain::session::{SessionId, UserId};
use facemood_core::session::domain::session_repository::SessionRepository;
use facemood_core::session::infrastructure::in_memory_session_repository::InMemorySessionRepository;
use facemood_core::session::infrastructure::json_file_session_repository::JsonFileSessionRepository;
use facemood_core::session::session_controller::{SessionController, StopOutcome};
use facemood_core::shared::constants::{
    EMOTION_MODEL_NAME, EMOTION_MODEL_URL, YOLO_MODEL_NAME, YOLO_MODEL_URL,
};
use facemood_core::shared::model_resolver;
use facemood_core::video::infrastructure::ffmpeg_frame_source::{
    FfmpegFrameSource, FfmpegSourceSpec,
};

/// Live face tracking with emotion sampling.
#[derive(Parser)]
#[command(name = "facemood")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one live session against a camera, stream URL or video file.
    Run(RunArgs),
    /// Show a user's recorded sessions and emotion distribution.
    Stats(StatsArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Who the session is recorded against.
    #[arg(long)]
    user: String,

    /// Camera device, stream URL or video file.
    #[arg(long, default_value = "/dev/video0")]
    source: String,

    /// Capture demuxer (v4l2, avfoundation, dshow). Probed when omitted.
    #[arg(long)]
    format: Option<String>,

    /// Demuxer option as key=value, e.g. video_size=640x480. Repeatable.
    #[arg(long = "option", value_parser = parse_key_val)]
    options: Vec<(String, String)>,

    /// Restart file sources when they run out.
    #[arg(long = "loop")]
    looping: bool,

    /// Session store (JSON).
    #[arg(long, default_value = "facemood-sessions.json")]
    store: PathBuf,

    /// Keep records in memory only.
    #[arg(long, conflicts_with = "store")]
    no_store: bool,

    /// Stop after this many seconds. Without it, press Enter to stop.
    #[arg(long)]
    duration: Option<f64>,

    /// Classify emotions every Nth processed frame.
    #[arg(long, default_value = "5")]
    skip_interval: usize,

    /// Max centroid movement (display pixels) to keep a face's identity.
    #[arg(long, default_value = "75")]
    tracking_threshold: f64,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long, default_value = "0.5")]
    confidence: f64,

    /// TTF/OTF font for on-frame labels. Boxes only when omitted.
    #[arg(long)]
    font: Option<PathBuf>,

    /// Write the annotated multipart JPEG stream to this file.
    #[arg(long)]
    mjpeg_out: Option<PathBuf>,

    /// Seconds between printed summaries.
    #[arg(long, default_value = "2")]
    summary_every: f64,
}

#[derive(Args)]
struct StatsArgs {
    #[arg(long)]
    user: String,

    /// Session store (JSON).
    #[arg(long, default_value = "facemood-sessions.json")]
    store: PathBuf,

    /// Restrict the distribution to one session.
    #[arg(long)]
    session: Option<u64>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {
        Command::Run(args) => {
            validate_run(&args)?;
            run_session(args)
        }
        Command::Stats(args) => {
            validate_stats(&args)?;
            print_stats(&args)
        }
    }
}

fn run_session(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = PipelineConfig {
        skip_interval: args.skip_interval,
        tracking_threshold: args.tracking_threshold,
        ..PipelineConfig::default()
    };
    let source = FfmpegFrameSource::new(FfmpegSourceSpec {
        input: args.source.clone(),
        format: args.format.clone(),
        options: args.options.clone(),
        looping: args.looping,
    });
    let repository: Box<dyn SessionRepository> = if args.no_store {
        Box::new(InMemorySessionRepository::new())
    } else {
        Box::new(JsonFileSessionRepository::open(&args.store)?)
    };
    let annotator = match &args.font {
        Some(path) => BoxAnnotator::with_font(path)?,
        None => BoxAnnotator::new(),
    };

    let controller = SessionController::new(
        Box::new(source),
        build_detector(args.confidence)?,
        build_classifier()?,
        repository,
        config,
    )?
    .with_annotator(Arc::new(annotator));

    let user = UserId::new(args.user.as_str());
    let session = controller.start_session(&user)?;
    log::info!("Session {session} running for {user}");

    let writer = match &args.mjpeg_out {
        Some(path) => Some(spawn_stream_writer(&controller, path)?),
        None => None,
    };

    wait_for_stop(&controller, args.duration, args.summary_every)?;

    match controller.stop_session() {
        StopOutcome::Stopped(report) => {
            println!(
                "Session {} ended: {} faces, most common emotion {}",
                report.session, report.total_faces, report.dominant_emotion
            );
            if !report.persisted {
                log::warn!("Session results were not fully saved");
            }
        }
        StopOutcome::NotActive => log::warn!("Session was already stopped"),
    }

    if let Some(handle) = writer {
        match handle.join() {
            Ok(Ok(chunks)) => log::info!("Wrote {chunks} stream frames"),
            Ok(Err(e)) => log::error!("Stream writer failed: {e}"),
            Err(_) => log::error!("Stream writer panicked"),
        }
    }
    Ok(())
}

/// Prints the live summary as JSON until the deadline passes or Enter is
/// pressed.
fn wait_for_stop(
    controller: &SessionController,
    duration: Option<f64>,
    summary_every: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    let ticker = tick(Duration::from_secs_f64(summary_every));
    let deadline = match duration {
        Some(secs) => after(Duration::from_secs_f64(secs)),
        None => never(),
    };
    let enter = if duration.is_none() {
        eprintln!("Press Enter to stop");
        let (tx, rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            let mut line = String::new();
            let _ = std::io::stdin().lock().read_line(&mut line);
            let _ = tx.send(());
        });
        rx
    } else {
        never()
    };

    loop {
        select! {
            recv(ticker) -> _ => {
                println!("{}", serde_json::to_string(&controller.current_summary())?);
            }
            recv(deadline) -> _ => return Ok(()),
            recv(enter) -> _ => return Ok(()),
        }
    }
}

fn spawn_stream_writer(
    controller: &SessionController,
    path: &Path,
) -> Result<thread::JoinHandle<std::io::Result<usize>>, Box<dyn std::error::Error>> {
    let mut out = BufWriter::new(File::create(path)?);
    let stream = controller.frame_stream();
    log::info!("Writing annotated stream to {}", path.display());
    Ok(thread::spawn(move || {
        let mut chunks = 0;
        for chunk in stream {
            out.write_all(&chunk)?;
            chunks += 1;
        }
        out.flush()?;
        Ok(chunks)
    }))
}

fn print_stats(args: &StatsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let repo = JsonFileSessionRepository::open(&args.store)?;
    let user = UserId::new(args.user.as_str());

    let Some(stats) = repo.user_stats(&user)? else {
        println!("No sessions recorded for {user}");
        return Ok(());
    };
    println!("User:                 {}", stats.user);
    println!("Sessions:             {}", stats.total_sessions);
    println!("Faces detected:       {}", stats.total_faces_detected);
    println!("Most common emotion:  {}", stats.most_common_emotion);

    println!();
    println!("Recent sessions:");
    for s in repo.sessions_for(&user)? {
        let ended = s
            .end_time
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "running".to_string());
        let emotion = s
            .most_common_emotion
            .map(|e| e.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  #{:<4} {} -> {:<8} faces {:<3} {}",
            s.id,
            s.start_time.format("%Y-%m-%d %H:%M:%S"),
            ended,
            s.total_faces,
            emotion
        );
    }

    let scope = args.session.map(SessionId);
    println!();
    match scope {
        Some(id) => println!("Emotion distribution (session {id}):"),
        None => println!("Emotion distribution (all sessions):"),
    }
    for (emotion, count) in repo.emotion_distribution(&user, scope)? {
        println!("  {:<9} {count}", emotion.to_string());
    }
    Ok(())
}

fn build_detector(confidence: f64) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {YOLO_MODEL_NAME}");
    let model_path = model_resolver::resolve(
        YOLO_MODEL_NAME,
        YOLO_MODEL_URL,
        None,
        Some(Box::new(|d, t| download_progress("face detection", d, t))),
    )?;
    eprintln!();
    Ok(Box::new(OnnxYoloDetector::new(&model_path, confidence)?))
}

fn build_classifier() -> Result<Box<dyn EmotionClassifier>, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {EMOTION_MODEL_NAME}");
    let model_path = model_resolver::resolve(
        EMOTION_MODEL_NAME,
        EMOTION_MODEL_URL,
        None,
        Some(Box::new(|d, t| download_progress("emotion", d, t))),
    )?;
    eprintln!();
    Ok(Box::new(OnnxEmotionClassifier::new(&model_path)?))
}

fn validate_run(args: &RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.user.trim().is_empty() {
        return Err("User must not be empty".into());
    }
    if args.skip_interval == 0 {
        return Err("Skip interval must be at least 1".into());
    }
    if !(args.tracking_threshold > 0.0) {
        return Err(format!(
            "Tracking threshold must be positive, got {}",
            args.tracking_threshold
        )
        .into());
    }
    if !(0.0..=1.0).contains(&args.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            args.confidence
        )
        .into());
    }
    if let Some(secs) = args.duration {
        if !(secs > 0.0) {
            return Err(format!("Duration must be positive, got {secs}").into());
        }
    }
    if !(args.summary_every > 0.0) {
        return Err(format!(
            "Summary interval must be positive, got {}",
            args.summary_every
        )
        .into());
    }
    if let Some(font) = &args.font {
        if !font.exists() {
            return Err(format!("Font file not found: {}", font.display()).into());
        }
    }
    Ok(())
}

fn validate_stats(args: &StatsArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !args.store.exists() {
        return Err(format!("Session store not found: {}", args.store.display()).into());
    }
    Ok(())
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn download_progress(what: &str, downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading {what} model... {pct}%");
    } else {
        eprint!("\rDownloading {what} model... {downloaded} bytes");
    }
}
