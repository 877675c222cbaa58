use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use facegreet_core::identity;
use facegreet_core::recognizer::ARCFACE_MODEL_VERSION;
use facegreet_core::{DetectorOptions, FaceDetector, FaceRecognizer, Gallery, Metric};
use facegreet_hw::Camera;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod compare;
mod config;
mod prompt;
mod session;

use compare::Comparison;
use config::Config;
use prompt::TerminalPrompter;
use session::Session;

#[derive(Parser)]
#[command(name = "facegreet", about = "Greets known faces on a webcam and enrolls new ones")]
struct Cli {
    /// V4L2 device (overrides FACEGREET_CAMERA_DEVICE)
    #[arg(long, global = true)]
    device: Option<String>,
    /// Directory with det_10g.onnx and w600k_r50.onnx (overrides FACEGREET_MODEL_DIR)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,
    /// Gallery JSON file (overrides FACEGREET_GALLERY_PATH)
    #[arg(long, global = true)]
    gallery: Option<PathBuf>,
    /// Comparison metric (overrides FACEGREET_METRIC)
    #[arg(long, global = true, value_enum)]
    metric: Option<MetricArg>,
    /// Match threshold for the chosen metric (overrides FACEGREET_THRESHOLD)
    #[arg(long, global = true)]
    threshold: Option<f32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum MetricArg {
    Cosine,
    Euclidean,
}

impl From<MetricArg> for Metric {
    fn from(m: MetricArg) -> Self {
        match m {
            MetricArg::Cosine => Metric::Cosine,
            MetricArg::Euclidean => Metric::Euclidean,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the camera, greet known faces and ask unknown ones for a name
    Run {
        /// Stop after this many frames
        #[arg(long)]
        frames: Option<u64>,
        /// Write preview.png with detections marked after every frame
        #[arg(long)]
        preview: bool,
    },
    /// Compare the faces in two image files
    Compare { first: PathBuf, second: PathBuf },
    /// List enrolled faces
    List,
    /// Remove an enrolled face by identifier
    Remove { id: String },
    /// List V4L2 capture devices
    Devices,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = apply_overrides(Config::from_env(), &cli);

    match cli.command {
        Commands::Run { frames, preview } => run(&config, frames, preview),
        Commands::Compare { first, second } => compare(&config, &first, &second),
        Commands::List => list(&config),
        Commands::Remove { id } => remove(&config, &id),
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for d in devices {
                println!("{}\t{}\t{} ({})", d.path, d.name, d.driver, d.bus);
            }
            Ok(())
        }
    }
}

fn apply_overrides(mut config: Config, cli: &Cli) -> Config {
    if let Some(device) = &cli.device {
        config.camera_device = device.clone();
    }
    if let Some(dir) = &cli.model_dir {
        config.model_dir = dir.clone();
    }
    if let Some(path) = &cli.gallery {
        config.gallery_path = path.clone();
    }
    if let Some(metric) = cli.metric {
        config.set_metric(metric.into());
    }
    if let Some(threshold) = cli.threshold {
        config.threshold = threshold;
    }
    config
}

fn load_models(config: &Config) -> Result<(FaceDetector, FaceRecognizer)> {
    let options = DetectorOptions {
        min_face_size: config.min_face_size,
        ..DetectorOptions::default()
    };
    let detector = FaceDetector::load(&config.scrfd_model_path(), options)?;
    tracing::debug!(options = ?detector.options(), "detector ready");
    let recognizer = FaceRecognizer::load(&config.arcface_model_path())?;
    Ok((detector, recognizer))
}

fn run(config: &Config, frames: Option<u64>, preview: bool) -> Result<()> {
    let (detector, recognizer) = load_models(config)?;

    let camera = Camera::open(&config.camera_device, config.width, config.height)
        .with_context(|| format!("opening {}", config.camera_device))?;
    let stream = camera.stream()?;

    let mut session = Session::new(config, stream, detector, recognizer, TerminalPrompter::stdio())?
        .with_preview(preview);

    println!("Watching {} (Ctrl-C to quit)", config.camera_device);
    let stats = session.run(frames)?;
    println!(
        "{} frames, {} faces: {} greeted, {} enrolled",
        stats.frames, stats.faces, stats.greeted, stats.enrolled
    );
    Ok(())
}

fn compare(config: &Config, first: &Path, second: &Path) -> Result<()> {
    let (mut detector, mut recognizer) = load_models(config)?;
    let result = compare::compare_images(
        &mut detector,
        &mut recognizer,
        first,
        second,
        config.metric,
        config.threshold,
    )?;

    match result {
        Comparison::Compared { similar: true, score } => {
            println!("These images are similar (score {score:.3})")
        }
        Comparison::Compared { similar: false, score } => {
            println!("These images are not similar (score {score:.3})")
        }
        Comparison::MissingFace { first: missing_a, second: missing_b } => {
            for (missing, path) in [(missing_a, first), (missing_b, second)] {
                if missing {
                    println!("There's no face on image: {}", path.display());
                }
            }
        }
    }
    Ok(())
}

fn list(config: &Config) -> Result<()> {
    let gallery = Gallery::open(&config.gallery_path, ARCFACE_MODEL_VERSION)?;
    if gallery.is_empty() {
        println!("No faces enrolled");
        return Ok(());
    }
    for face in gallery.faces() {
        println!("{}\t{}", identity::display_name(&face.id), face.id);
    }
    Ok(())
}

fn remove(config: &Config, id: &str) -> Result<()> {
    let mut gallery = Gallery::open(&config.gallery_path, ARCFACE_MODEL_VERSION)?;
    if !gallery.remove(id) {
        anyhow::bail!("no enrolled face with id {id}");
    }
    gallery.save()?;

    let crop = config.face_crop_path(id);
    if crop.exists() {
        std::fs::remove_file(&crop).with_context(|| format!("removing {}", crop.display()))?;
    }
    println!("Removed {id}");
    Ok(())
}
