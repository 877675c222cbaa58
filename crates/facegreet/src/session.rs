//! The greeter loop: detect, encode, first-match scan, greet or enroll.

use crate::config::Config;
use crate::prompt::Prompter;
use facegreet_core::identity;
use facegreet_core::imaging::{self, CropRegion, ImagingError};
use facegreet_core::{
    BoundingBox, Detect, DetectorError, Encode, Gallery, GalleryError, KnownFace, LinearMatcher,
    Matcher, RecognizerError,
};
use facegreet_hw::{CameraError, Frame, FrameSource};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const CAUTION_TITLE: &str = "Caution!";
const CAUTION_TEXT: &str = "To ensure a correct detection, please keep your face in the centre of view. \
                            Please keep your face as straight as possible.";
const MARK_VALUE: u8 = 255;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("camera: {0}")]
    Camera(#[from] CameraError),
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("gallery: {0}")]
    Gallery(#[from] GalleryError),
    #[error("image: {0}")]
    Imaging(#[from] ImagingError),
    #[error("prompt: {0}")]
    Prompt(#[from] std::io::Error),
}

/// What happened to one detected face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaceOutcome {
    /// Matched a gallery entry and the person was greeted.
    Greeted { id: String },
    /// Unknown face, named by the user and added to the gallery.
    Enrolled { id: String },
    /// Unknown face, the user left the name blank.
    Skipped,
    /// The embedding step found no usable face.
    NoFace,
    /// The margin crop did not fit in the frame or could not be written.
    CropFailed,
}

/// Totals over a [`Session::run`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    pub dark_frames: u64,
    pub faces: u64,
    pub greeted: u64,
    pub enrolled: u64,
}

pub struct Session<'c, S, D, E, P> {
    config: &'c Config,
    source: S,
    detector: D,
    encoder: E,
    prompter: P,
    matcher: LinearMatcher,
    gallery: Gallery,
    preview: bool,
}

impl<'c, S, D, E, P> Session<'c, S, D, E, P>
where
    S: FrameSource,
    D: Detect,
    E: Encode,
    P: Prompter,
{
    /// Load the gallery and make sure the faces directory exists.
    pub fn new(
        config: &'c Config,
        source: S,
        detector: D,
        encoder: E,
        prompter: P,
    ) -> Result<Self, SessionError> {
        std::fs::create_dir_all(&config.faces_dir)?;
        let gallery = Gallery::open(&config.gallery_path, encoder.model_version())?;
        tracing::info!(
            gallery = %gallery.path().display(),
            known = gallery.len(),
            metric = ?config.metric,
            threshold = config.threshold,
            "session ready"
        );

        Ok(Self {
            config,
            source,
            detector,
            encoder,
            prompter,
            matcher: LinearMatcher::new(config.metric),
            gallery,
            preview: false,
        })
    }

    /// Write `preview.png` with every detection marked after each frame.
    pub fn with_preview(mut self, preview: bool) -> Self {
        self.preview = preview;
        self
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    /// Process frames until `max_frames` is reached (forever if `None`) or an error occurs.
    pub fn run(&mut self, max_frames: Option<u64>) -> Result<SessionStats, SessionError> {
        let mut stats = SessionStats::default();
        let interval = Duration::from_millis(self.config.frame_interval_ms);

        while max_frames.map_or(true, |max| stats.frames < max) {
            let frame = self.source.next_frame()?;
            stats.frames += 1;

            if frame.is_dark {
                stats.dark_frames += 1;
                tracing::debug!(seq = frame.sequence, "skipping dark frame");
            } else {
                for outcome in self.process_frame(&frame)? {
                    stats.faces += 1;
                    match outcome {
                        FaceOutcome::Greeted { .. } => stats.greeted += 1,
                        FaceOutcome::Enrolled { .. } => stats.enrolled += 1,
                        _ => {}
                    }
                }
            }

            if !interval.is_zero() {
                std::thread::sleep(interval);
            }
        }

        tracing::info!(?stats, "session finished");
        Ok(stats)
    }

    /// Handle every face in one frame.
    ///
    /// A face whose margin crop cannot be made ends processing of the frame
    /// after the user has been asked to re-centre.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<Vec<FaceOutcome>, SessionError> {
        let faces = self.detector.detect(&frame.data, frame.width, frame.height)?;
        if !faces.is_empty() {
            tracing::debug!(seq = frame.sequence, count = faces.len(), "faces detected");
        }

        let mut outcomes = Vec::with_capacity(faces.len());
        for face in &faces {
            let Some((crop, region)) = self.crop_face(frame, face)? else {
                outcomes.push(FaceOutcome::CropFailed);
                break;
            };
            outcomes.push(self.identify(&crop, &region)?);
        }

        if self.preview {
            self.write_preview(frame, &faces)?;
        }

        Ok(outcomes)
    }

    /// Cut the margin crop and save it as the temp crop. `None` after cautioning the user.
    fn crop_face(
        &mut self,
        frame: &Frame,
        face: &BoundingBox,
    ) -> Result<Option<(Vec<u8>, CropRegion)>, SessionError> {
        let saved = CropRegion::with_margin(face, self.config.crop_margin, frame.width, frame.height)
            .and_then(|region| {
                let crop = imaging::crop(&frame.data, frame.width, frame.height, &region)?;
                imaging::save_gray_png(&self.config.temp_crop_path(), &crop, region.width, region.height)?;
                Ok((crop, region))
            });

        match saved {
            Ok(pair) => Ok(Some(pair)),
            Err(e) => {
                tracing::warn!(error = %e, "face crop failed");
                self.prompter.caution(CAUTION_TITLE, CAUTION_TEXT)?;
                Ok(None)
            }
        }
    }

    /// Embed the face found again inside the margin crop, then match or enroll it.
    fn identify(&mut self, crop: &[u8], region: &CropRegion) -> Result<FaceOutcome, SessionError> {
        let found = self.detector.detect(crop, region.width, region.height)?;
        let Some(face) = found.first() else {
            tracing::info!(?region, "there's no face on the cropped image, skipping");
            return Ok(FaceOutcome::NoFace);
        };

        let embedding = match self.encoder.encode(crop, region.width, region.height, face) {
            Ok(e) => e,
            Err(RecognizerError::NoLandmarks) => {
                tracing::info!(confidence = face.confidence, "no landmarks on the cropped face, skipping");
                return Ok(FaceOutcome::NoFace);
            }
            Err(e) => return Err(e.into()),
        };

        let result = self
            .matcher
            .first_match(&embedding, self.gallery.faces(), self.config.threshold);

        if let Some(id) = result.face_id {
            let name = identity::display_name(&id);
            tracing::info!(%id, score = ?result.score, "recognized");
            self.prompter.greet(name, &self.config.face_crop_path(&id))?;
            return Ok(FaceOutcome::Greeted { id });
        }

        tracing::debug!(best = ?result.score, known = self.gallery.len(), "no match");
        let entered = self.prompter.ask_name(&self.config.temp_crop_path())?;
        let Some(name) = entered.as_deref().and_then(identity::sanitize_name) else {
            tracing::info!("enrollment skipped");
            return Ok(FaceOutcome::Skipped);
        };

        let id = identity::make_identifier(&name, &chrono::Local::now());
        self.gallery.insert(KnownFace { id: id.clone(), embedding });
        self.gallery.save()?;
        self.save_enrolled_crop(&id, crop, region);

        tracing::info!(%id, known = self.gallery.len(), "enrolled");
        Ok(FaceOutcome::Enrolled { id })
    }

    /// The gallery is the source of truth; a missing crop only loses the picture.
    fn save_enrolled_crop(&self, id: &str, crop: &[u8], region: &CropRegion) {
        let path = self.config.face_crop_path(id);
        if let Err(e) = imaging::save_gray_png(&path, crop, region.width, region.height) {
            tracing::warn!(path = %path.display(), error = %e, "could not save enrollment crop");
        }
    }

    fn write_preview(&self, frame: &Frame, faces: &[BoundingBox]) -> Result<(), SessionError> {
        let mut marked = frame.data.clone();
        let margin = i64::from(self.config.crop_margin);
        for f in faces {
            imaging::draw_rectangle(
                &mut marked,
                frame.width,
                frame.height,
                f.x.round() as i64 - margin,
                f.y.round() as i64 - margin,
                f.width.round() as i64 + 2 * margin,
                f.height.round() as i64 + 2 * margin,
                MARK_VALUE,
            );
        }
        write_png(&self.config.preview_path(), &marked, frame.width, frame.height)
    }
}

fn write_png(path: &Path, data: &[u8], width: u32, height: u32) -> Result<(), SessionError> {
    imaging::save_gray_png(path, data, width, height).map_err(SessionError::from)
}
