//! Align Capture - offline replay harness
//!
//! Runs a full capture session against a still frame and a recording of
//! detector output, writing every capture to the configured directory.
//!
//! # Usage
//!
//! ```bash
//! # Replay recorded detections against a frame
//! align-capture --frame desk.png --detections run1.jsonl
//!
//! # Receipt guide pinned to a fixed spot, stop after 10 seconds
//! align-capture --frame desk.png --detections run1.jsonl \
//!     --mode receipt --guide 400,100,480,900 --duration 10
//! ```

use align_capture::{
    CaptureSession, CenteredGuideLayout, Collaborators, Config, GuideMode, JpegDirectorySink,
    LogNotifier, ReplayDetector, ScreenBounds, StillFrameSource, VideoSource, Viewport,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Command line options
#[derive(Debug, Clone)]
struct Args {
    /// Image served as the live frame
    frame: Option<PathBuf>,
    /// JSON Lines file of detection batches
    detections: Option<PathBuf>,
    /// Path to config file
    config_path: Option<PathBuf>,
    /// Override for the capture output directory
    output_dir: Option<PathBuf>,
    mode: GuideMode,
    viewport: Viewport,
    /// Pin the active guide to these viewport bounds
    guide: Option<ScreenBounds>,
    /// Stop after this long
    duration: Option<Duration>,
    /// Restart the recording when it runs out
    looping: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            frame: None,
            detections: None,
            config_path: None,
            output_dir: None,
            mode: GuideMode::default(),
            viewport: Viewport::new(1280.0, 720.0),
            guide: None,
            duration: None,
            looping: false,
        }
    }
}

fn fail(message: &str) -> ! {
    eprintln!("{}", message);
    eprintln!("Use --help for usage information.");
    std::process::exit(1);
}

/// Parse `WxH`
fn parse_viewport(s: &str) -> Option<Viewport> {
    let (w, h) = s.split_once(['x', 'X'])?;
    let viewport = Viewport::new(w.trim().parse().ok()?, h.trim().parse().ok()?);
    (viewport.width > 0.0 && viewport.height > 0.0).then_some(viewport)
}

/// Parse `X,Y,W,H`
fn parse_guide(s: &str) -> Option<ScreenBounds> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .ok()?;

    match parts.as_slice() {
        [x, y, w, h] => {
            let bounds = ScreenBounds::new(*x, *y, *w, *h);
            bounds.has_area().then_some(bounds)
        }
        _ => None,
    }
}

/// Parse command line arguments
fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = || {
            i += 1;
            args.get(i)
                .cloned()
                .unwrap_or_else(|| fail(&format!("Missing value for {}", flag)))
        };

        match flag {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-v" => {
                println!("Align Capture v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--frame" | "-f" => parsed.frame = Some(PathBuf::from(value())),
            "--detections" | "-d" => parsed.detections = Some(PathBuf::from(value())),
            "--config" | "-c" => parsed.config_path = Some(PathBuf::from(value())),
            "--output" | "-o" => parsed.output_dir = Some(PathBuf::from(value())),
            "--mode" | "-m" => {
                parsed.mode = value().parse().unwrap_or_else(|e: String| fail(&e));
            }
            "--viewport" => {
                let v = value();
                parsed.viewport =
                    parse_viewport(&v).unwrap_or_else(|| fail(&format!("Invalid viewport: {}", v)));
            }
            "--guide" => {
                let v = value();
                parsed.guide =
                    Some(parse_guide(&v).unwrap_or_else(|| fail(&format!("Invalid guide bounds: {}", v))));
            }
            "--duration" => {
                let v = value();
                let secs: f64 = v
                    .parse()
                    .ok()
                    .filter(|s: &f64| s.is_finite() && *s > 0.0)
                    .unwrap_or_else(|| fail(&format!("Invalid duration: {}", v)));
                parsed.duration = Some(Duration::from_secs_f64(secs));
            }
            "--loop" => parsed.looping = true,
            other => fail(&format!("Unknown argument: {}", other)),
        }
        i += 1;
    }

    parsed
}

fn print_help() {
    println!(
        r#"Align Capture - alignment-triggered capture replay

USAGE:
    align-capture --frame <IMAGE> --detections <JSONL> [OPTIONS]

OPTIONS:
    -h, --help              Show this help message
    -v, --version           Show version
    -f, --frame <PATH>      Image used as the live video frame
    -d, --detections <PATH> Recorded detector output, one JSON batch per line
    -c, --config <PATH>     Path to configuration file
    -o, --output <DIR>      Capture output directory (overrides config)
    -m, --mode <MODE>       Guide mode: card, document, receipt (default: card)
    --viewport <WxH>        Viewport size (default: 1280x720)
    --guide <X,Y,W,H>       Pin the active guide to these viewport bounds
    --duration <SECS>       Stop after this many seconds
    --loop                  Replay the recording indefinitely

DETECTIONS FORMAT:
    Each line is a JSON array of detections in model input pixels:
    [{{"bbox":{{"x":40,"y":60,"w":112,"h":70}},"score":0.92,"class_id":1}}]
    Blank lines and lines starting with '#' are ignored.

EXAMPLES:
    align-capture -f desk.png -d run1.jsonl
    align-capture -f desk.png -d run1.jsonl --mode document --duration 5
    align-capture -f desk.png -d run1.jsonl --guide 400,100,480,900 --loop
"#
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args();

    let mut config = match &args.config_path {
        Some(path) => Config::load_from_path(path.clone()),
        None => Config::load(),
    };

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.general.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Starting Align Capture");

    if !config.general.enabled {
        info!("Capture is disabled in configuration, exiting");
        return Ok(());
    }

    let frame_path = args
        .frame
        .clone()
        .unwrap_or_else(|| fail("Missing required --frame <IMAGE>"));
    let detections_path = args
        .detections
        .clone()
        .unwrap_or_else(|| fail("Missing required --detections <JSONL>"));

    if let Some(dir) = &args.output_dir {
        config.capture.output_dir = Some(dir.clone());
    }

    let video = StillFrameSource::from_path(&frame_path)?;
    let target = config.camera.target_size();
    if let Some(size) = video.frame_size().filter(|size| *size != target) {
        warn!(
            "Frame is {}x{}, camera target is {}x{}; crops use the frame's own size",
            size.width, size.height, target.width, target.height
        );
    }
    let detector = ReplayDetector::from_path(&detections_path, args.looping)?;
    let sink = JpegDirectorySink::from_config(&config.capture);

    let mut layout = CenteredGuideLayout::default();
    if let Some(bounds) = args.guide {
        layout = layout.with_guide(args.mode, bounds);
    }

    println!("🔧 Configuration:");
    println!("   Frame: {}", frame_path.display());
    println!("   Camera target: {}x{}", target.width, target.height);
    println!("   Detections: {} batches", detector.len());
    println!("   Output: {}", sink.dir().display());
    println!("   Mode: {}", args.mode);
    println!(
        "   Viewport: {}x{}",
        args.viewport.width, args.viewport.height
    );
    println!(
        "   Auto capture: {}",
        if config.auto_capture.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!();

    let collaborators = Collaborators {
        video: Arc::new(video),
        detector: Arc::new(detector),
        sink: Arc::new(sink),
        layout: Box::new(layout),
        notifier: Box::new(LogNotifier),
        renderer: None,
    };

    let mut session = CaptureSession::new(config, collaborators, args.viewport);
    session.set_mode(args.mode);

    // Setup shutdown signal
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        println!("\n🛑 Shutting down...");
        r.store(false, Ordering::SeqCst);
    })?;

    if let Some(duration) = args.duration {
        let r = running.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            info!("Replay duration of {:?} reached", duration);
            r.store(false, Ordering::SeqCst);
        });
    }

    session.run(running).await;

    // Let in-flight exports land before exiting
    session.flush(Instant::now()).await;

    let stats = session.stats();
    println!();
    println!("📊 Session summary:");
    println!(
        "   Samples: {} ({} failed)",
        stats.samples_started, stats.samples_failed
    );
    println!(
        "   Captures: {} auto, {} manual",
        stats.auto_captures, stats.manual_captures
    );
    println!(
        "   Exports: {} saved, {} failed",
        stats.exports_succeeded, stats.exports_failed
    );

    info!("👋 Shutdown complete");
    Ok(())
}
