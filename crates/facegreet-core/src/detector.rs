//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes the frame to 640x640, decodes the three anchor-free stride
//! heads (8/16/32) into boxes with five landmarks, then applies NMS and a
//! minimum face size filter.

use crate::imaging;
use crate::types::BoundingBox;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;
const SCRFD_OUTPUTS: usize = SCRFD_STRIDES.len() * 3;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; download det_10g.onnx from insightface into the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    FrameSize { expected: usize, actual: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Tunables for [`FaceDetector`].
#[derive(Debug, Clone, Copy)]
pub struct DetectorOptions {
    /// Minimum anchor score to keep a candidate.
    pub confidence_threshold: f32,
    /// IoU above which the lower-scoring box is suppressed.
    pub nms_threshold: f32,
    /// Faces whose shorter side is below this many pixels are dropped.
    pub min_face_size: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            nms_threshold: 0.4,
            min_face_size: 40.0,
        }
    }
}

/// Anything that can find faces in a grayscale frame.
pub trait Detect {
    /// Faces sorted by confidence, highest first.
    fn detect(&mut self, gray: &[u8], width: u32, height: u32) -> Result<Vec<BoundingBox>, DetectorError>;
}

/// Scale and padding applied when fitting a frame into the square model input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    scaled_width: usize,
    scaled_height: usize,
}

impl Letterbox {
    fn fit(width: usize, height: usize, target: usize) -> Self {
        let scale = (target as f32 / width as f32).min(target as f32 / height as f32);
        let scaled_width = ((width as f32 * scale).round() as usize).min(target);
        let scaled_height = ((height as f32 * scale).round() as usize).min(target);
        Self {
            scale,
            pad_x: (target - scaled_width) as f32 / 2.0,
            pad_y: (target - scaled_height) as f32 / 2.0,
            scaled_width,
            scaled_height,
        }
    }

    /// Map a point from model input space back to frame space.
    fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor indices for one stride: (score, bbox, kps).
type StrideOutputs = (usize, usize, usize);

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    options: DetectorOptions,
    /// Output slots for strides 8, 16, 32.
    outputs: [StrideOutputs; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path, options: DetectorOptions) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < SCRFD_OUTPUTS {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model needs {SCRFD_OUTPUTS} outputs (score/bbox/kps per stride), got {}",
                names.len()
            )));
        }

        let outputs = map_outputs(&names);
        tracing::info!(
            path = %model_path.display(),
            outputs = ?names,
            mapping = ?outputs,
            ?options,
            "loaded SCRFD model"
        );

        Ok(Self { session, options, outputs })
    }

    pub fn options(&self) -> &DetectorOptions {
        &self.options
    }

    /// Build the normalized NCHW input tensor. Padding uses the mean so it normalizes to 0.
    fn preprocess(gray: &[u8], width: usize, height: usize) -> (Array4<f32>, Letterbox) {
        let lb = Letterbox::fit(width, height, SCRFD_INPUT_SIZE);
        let resized = imaging::resize_bilinear(gray, width, height, lb.scaled_width, lb.scaled_height);

        let x0 = lb.pad_x.floor() as usize;
        let y0 = lb.pad_y.floor() as usize;
        let mut tensor =
            Array4::<f32>::zeros((1, 3, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE));

        for y in 0..SCRFD_INPUT_SIZE {
            for x in 0..SCRFD_INPUT_SIZE {
                let inside = (y0..y0 + lb.scaled_height).contains(&y)
                    && (x0..x0 + lb.scaled_width).contains(&x);
                let pixel = if inside {
                    resized[(y - y0) * lb.scaled_width + (x - x0)] as f32
                } else {
                    SCRFD_MEAN
                };
                let v = (pixel - SCRFD_MEAN) / SCRFD_STD;
                for c in 0..3 {
                    tensor[[0, c, y, x]] = v;
                }
            }
        }

        (tensor, lb)
    }
}

impl Detect for FaceDetector {
    fn detect(&mut self, gray: &[u8], width: u32, height: u32) -> Result<Vec<BoundingBox>, DetectorError> {
        let (w, h) = (width as usize, height as usize);
        if gray.len() < w * h || w == 0 || h == 0 {
            return Err(DetectorError::FrameSize { expected: w * h, actual: gray.len() });
        }

        let (input, letterbox) = Self::preprocess(gray, w, h);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let extract = |idx: usize, what: &'static str, stride: usize| {
            outputs[idx]
                .try_extract_tensor::<f32>()
                .map(|(_, data)| data)
                .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
        };

        let mut candidates = Vec::new();
        for (slot, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.outputs[slot];
            let head = StrideHead {
                stride,
                scores: extract(score_idx, "scores", stride)?,
                bboxes: extract(bbox_idx, "bboxes", stride)?,
                kps: extract(kps_idx, "kps", stride)?,
            };
            candidates.extend(head.decode(&letterbox, self.options.confidence_threshold));
        }

        let total = candidates.len();
        let faces = postprocess(candidates, &self.options);

        tracing::trace!(candidates = total, kept = faces.len(), "SCRFD detect");
        Ok(faces)
    }
}

/// NMS, then drop faces smaller than `min_face_size`. Keeps confidence order.
fn postprocess(candidates: Vec<BoundingBox>, options: &DetectorOptions) -> Vec<BoundingBox> {
    nms(candidates, options.nms_threshold)
        .into_iter()
        .filter(|f| f.min_side() >= options.min_face_size)
        .collect()
}

/// Map output tensor names to stride slots.
///
/// Exports that name their outputs `score_8`, `bbox_16`, `kps_32`, ... are
/// mapped by name in any order. Anything else falls back to the standard
/// positional layout: [0-2] scores, [3-5] bboxes, [6-8] kps.
fn map_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let by_name: Option<Vec<StrideOutputs>> = SCRFD_STRIDES
        .iter()
        .map(|&s| Some((find("score", s)?, find("bbox", s)?, find("kps", s)?)))
        .collect();

    match by_name {
        Some(slots) => [slots[0], slots[1], slots[2]],
        None => {
            tracing::debug!(?names, "SCRFD output names not recognized, using positional mapping");
            [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
        }
    }
}

/// Raw outputs of one stride level.
struct StrideHead<'a> {
    stride: usize,
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

impl StrideHead<'_> {
    fn decode(&self, letterbox: &Letterbox, threshold: f32) -> Vec<BoundingBox> {
        let grid_w = SCRFD_INPUT_SIZE / self.stride;
        let grid_h = SCRFD_INPUT_SIZE / self.stride;
        let anchors = grid_w * grid_h * SCRFD_ANCHORS_PER_CELL;
        let step = self.stride as f32;

        let mut out = Vec::new();
        for idx in 0..anchors.min(self.scores.len()) {
            let score = self.scores[idx];
            if score <= threshold {
                continue;
            }

            let Some(offsets) = self.bboxes.get(idx * 4..idx * 4 + 4) else {
                continue;
            };

            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let ax = (cell % grid_w) as f32 * step;
            let ay = (cell / grid_w) as f32 * step;

            let (x1, y1) = letterbox.to_frame(ax - offsets[0] * step, ay - offsets[1] * step);
            let (x2, y2) = letterbox.to_frame(ax + offsets[2] * step, ay + offsets[3] * step);

            let landmarks = self.kps.get(idx * 10..idx * 10 + 10).map(|k| {
                std::array::from_fn(|i| letterbox.to_frame(ax + k[i * 2] * step, ay + k[i * 2 + 1] * step))
            });

            out.push(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
                landmarks,
            });
        }
        out
    }
}

/// Greedy non-maximum suppression. Output is sorted by confidence, descending.
fn nms(mut boxes: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<BoundingBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Intersection-over-Union of two boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let inter_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 { inter / union } else { 0.0 }
}
