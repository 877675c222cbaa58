//! Compare the faces in two image files.

use facegreet_core::imaging;
use facegreet_core::{Detect, Embedding, Encode, Metric, RecognizerError};
use std::path::Path;

/// Outcome of encoding the face in one image.
#[derive(Debug)]
pub enum ImageFace {
    Found(Embedding),
    /// Nothing detected, or the detection could not be embedded.
    NoFace,
}

#[derive(Debug, PartialEq)]
pub enum Comparison {
    /// Both images had a face; `score` under the configured metric.
    Compared { similar: bool, score: f32 },
    /// At least one image had no usable face. Flags say which.
    MissingFace { first: bool, second: bool },
}

/// Detect the most confident face in an image file and embed it.
pub fn encode_image<D: Detect, E: Encode>(
    detector: &mut D,
    encoder: &mut E,
    path: &Path,
) -> anyhow::Result<ImageFace> {
    let (gray, width, height) = imaging::load_gray(path)?;
    let faces = detector.detect(&gray, width, height)?;
    let Some(face) = faces.first() else {
        tracing::info!(path = %path.display(), "there's no face on image");
        return Ok(ImageFace::NoFace);
    };

    match encoder.encode(&gray, width, height, face) {
        Ok(embedding) => Ok(ImageFace::Found(embedding)),
        Err(RecognizerError::NoLandmarks) => {
            tracing::info!(path = %path.display(), "there's no face on image");
            Ok(ImageFace::NoFace)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn compare_images<D: Detect, E: Encode>(
    detector: &mut D,
    encoder: &mut E,
    first: &Path,
    second: &Path,
    metric: Metric,
    threshold: f32,
) -> anyhow::Result<Comparison> {
    let a = encode_image(detector, encoder, first)?;
    let b = encode_image(detector, encoder, second)?;

    Ok(match (a, b) {
        (ImageFace::Found(a), ImageFace::Found(b)) => {
            let score = metric.score(&a, &b);
            Comparison::Compared {
                similar: metric.matches(&a, &b, threshold),
                score,
            }
        }
        (a, b) => Comparison::MissingFace {
            first: matches!(a, ImageFace::NoFace),
            second: matches!(b, ImageFace::NoFace),
        },
    })
}
