//! facegreet-core — face detection, recognition and the known-face gallery.
//!
//! Uses SCRFD for face detection and ArcFace for face recognition,
//! both running via ONNX Runtime for CPU inference. Known faces are kept
//! in a flat identifier -> embedding mapping persisted as JSON.

pub mod alignment;
pub mod detector;
pub mod gallery;
pub mod identity;
pub mod imaging;
pub mod recognizer;
pub mod types;

pub use detector::{Detect, DetectorError, DetectorOptions, FaceDetector};
pub use gallery::{Gallery, GalleryError};
pub use recognizer::{Encode, FaceRecognizer, RecognizerError};
pub use types::{BoundingBox, Embedding, KnownFace, LinearMatcher, MatchResult, Matcher, Metric};
