use facegreet_core::Metric;
use std::path::PathBuf;

const THRESHOLD_VAR: &str = "FACEGREET_THRESHOLD";

/// Greeter configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Requested capture size; the driver may pick another.
    pub width: u32,
    pub height: u32,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Directory holding face crops (`temp.png`, `<id>.png`, `preview.png`).
    pub faces_dir: PathBuf,
    /// JSON file with the identifier -> embedding mapping.
    pub gallery_path: PathBuf,
    /// How embeddings are compared.
    pub metric: Metric,
    /// Match threshold for `metric`.
    pub threshold: f32,
    /// Faces smaller than this (pixels, shorter side) are ignored.
    pub min_face_size: f32,
    /// Pixels added around each face before cropping.
    pub crop_margin: u32,
    /// Pause between frames.
    pub frame_interval_ms: u64,
}

impl Config {
    /// Load configuration from `FACEGREET_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facegreet");

        let model_dir = std::env::var("FACEGREET_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("models"));

        let faces_dir = std::env::var("FACEGREET_FACES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("faces"));

        let gallery_path = std::env::var("FACEGREET_GALLERY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| faces_dir.join("embeddings.json"));

        let metric = std::env::var("FACEGREET_METRIC")
            .ok()
            .map_or(Metric::Cosine, |raw| parse_metric(&raw));

        Self {
            camera_device: std::env::var("FACEGREET_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            width: env_parse("FACEGREET_WIDTH", 640),
            height: env_parse("FACEGREET_HEIGHT", 480),
            model_dir,
            faces_dir,
            gallery_path,
            metric,
            threshold: threshold_for(metric, std::env::var(THRESHOLD_VAR).ok().as_deref()),
            min_face_size: env_parse("FACEGREET_MIN_FACE_SIZE", 40.0),
            crop_margin: env_parse("FACEGREET_CROP_MARGIN", 100),
            frame_interval_ms: env_parse("FACEGREET_FRAME_INTERVAL_MS", 30),
        }
    }

    /// Switch metric. The threshold follows unless `FACEGREET_THRESHOLD` pins it.
    pub fn set_metric(&mut self, metric: Metric) {
        self.metric = metric;
        self.threshold = threshold_for(metric, std::env::var(THRESHOLD_VAR).ok().as_deref());
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> PathBuf {
        self.model_dir.join("w600k_r50.onnx")
    }

    /// Scratch crop of the face currently being processed.
    pub fn temp_crop_path(&self) -> PathBuf {
        self.faces_dir.join("temp.png")
    }

    /// Saved crop for an enrolled identifier.
    pub fn face_crop_path(&self, id: &str) -> PathBuf {
        self.faces_dir.join(format!("{id}.png"))
    }

    pub fn preview_path(&self) -> PathBuf {
        self.faces_dir.join("preview.png")
    }
}

/// Cosine similarity 0.40 for normalized ArcFace embeddings; 0.6 L2 distance otherwise.
pub fn default_threshold(metric: Metric) -> f32 {
    match metric {
        Metric::Cosine => 0.40,
        Metric::Euclidean => 0.6,
    }
}

/// `cosine` or `euclidean`, any case. Anything else falls back to cosine.
fn parse_metric(raw: &str) -> Metric {
    match raw.trim().to_ascii_lowercase().as_str() {
        "cosine" => Metric::Cosine,
        "euclidean" => Metric::Euclidean,
        _ => {
            tracing::warn!(value = raw, "unknown FACEGREET_METRIC, using cosine");
            Metric::Cosine
        }
    }
}

/// An explicit, parseable threshold wins over the metric default.
fn threshold_for(metric: Metric, explicit: Option<&str>) -> f32 {
    explicit
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or_else(|| default_threshold(metric))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            camera_device: "/dev/video0".into(),
            width: 640,
            height: 480,
            model_dir: PathBuf::from("/models"),
            faces_dir: PathBuf::from("/faces"),
            gallery_path: PathBuf::from("/faces/embeddings.json"),
            metric: Metric::Cosine,
            threshold: 0.4,
            min_face_size: 40.0,
            crop_margin: 100,
            frame_interval_ms: 30,
        }
    }

    #[test]
    fn test_model_paths() {
        let cfg = sample();
        assert_eq!(cfg.scrfd_model_path(), PathBuf::from("/models/det_10g.onnx"));
        assert_eq!(cfg.arcface_model_path(), PathBuf::from("/models/w600k_r50.onnx"));
    }

    #[test]
    fn test_crop_paths() {
        let cfg = sample();
        assert_eq!(cfg.temp_crop_path(), PathBuf::from("/faces/temp.png"));
        assert_eq!(
            cfg.face_crop_path("Ann_May012024120000"),
            PathBuf::from("/faces/Ann_May012024120000.png")
        );
    }

    #[test]
    fn test_default_threshold_per_metric() {
        assert_eq!(default_threshold(Metric::Cosine), 0.40);
        assert_eq!(default_threshold(Metric::Euclidean), 0.6);
    }

    #[test]
    fn test_parse_metric_ignores_case() {
        assert_eq!(parse_metric("Euclidean"), Metric::Euclidean);
        assert_eq!(parse_metric(" COSINE "), Metric::Cosine);
    }

    #[test]
    fn test_parse_metric_unknown_falls_back_to_cosine() {
        assert_eq!(parse_metric("manhattan"), Metric::Cosine);
    }

    #[test]
    fn test_explicit_threshold_survives_metric_change() {
        assert_eq!(threshold_for(Metric::Euclidean, Some("0.35")), 0.35);
        assert_eq!(threshold_for(Metric::Euclidean, None), 0.6);
        assert_eq!(threshold_for(Metric::Cosine, Some("not a number")), 0.40);
    }

    #[test]
    fn test_env_parse_default_when_unset() {
        assert_eq!(env_parse("FACEGREET_TEST_UNSET_VARIABLE", 7u32), 7);
    }
}
