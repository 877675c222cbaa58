use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Length of the shorter side, in pixels.
    pub fn min_side(&self) -> f32 {
        self.width.min(self.height)
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model_version: None }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Cosine similarity in [-1, 1]. Higher = more similar; 0 if either vector is zero.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let (dot, norm_a, norm_b) = self
            .values
            .iter()
            .zip(other.values.iter())
            .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (a, b)| {
                (dot + a * b, na + a * a, nb + b * b)
            });

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Euclidean (L2) distance.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A named face embedding from the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct KnownFace {
    /// `<name>_<timestamp>`, see [`crate::identity`].
    pub id: String,
    pub embedding: Embedding,
}

/// Distance function used to decide whether two embeddings are the same person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    /// Match when cosine similarity >= threshold.
    #[default]
    Cosine,
    /// Match when Euclidean distance <= threshold.
    Euclidean,
}

impl Metric {
    /// Score of `candidate` against `probe` under this metric.
    pub fn score(self, probe: &Embedding, candidate: &Embedding) -> f32 {
        match self {
            Metric::Cosine => probe.similarity(candidate),
            Metric::Euclidean => probe.euclidean_distance(candidate),
        }
    }

    pub fn passes(self, score: f32, threshold: f32) -> bool {
        match self {
            Metric::Cosine => score >= threshold,
            Metric::Euclidean => score <= threshold,
        }
    }

    /// Thresholded comparison. Vectors of different dimension never match.
    pub fn matches(self, probe: &Embedding, candidate: &Embedding, threshold: f32) -> bool {
        probe.dim() == candidate.dim() && self.passes(self.score(probe, candidate), threshold)
    }
}

/// Result of scanning the gallery with a probe embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Score of the matched entry, or of the best-scoring entry when nothing matched.
    /// `None` when no comparable entry exists.
    pub score: Option<f32>,
    /// Identifier of the matched entry.
    pub face_id: Option<String>,
}

impl MatchResult {
    fn no_match(score: Option<f32>) -> Self {
        Self { matched: false, score, face_id: None }
    }
}

/// Strategy for comparing a probe embedding against the gallery.
pub trait Matcher {
    fn first_match(&self, probe: &Embedding, gallery: &[KnownFace], threshold: f32) -> MatchResult;
}

/// Linear scan in gallery order; the first entry within threshold wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearMatcher {
    pub metric: Metric,
}

impl LinearMatcher {
    pub fn new(metric: Metric) -> Self {
        Self { metric }
    }
}

impl Matcher for LinearMatcher {
    fn first_match(&self, probe: &Embedding, gallery: &[KnownFace], threshold: f32) -> MatchResult {
        let mut best: Option<f32> = None;

        for face in gallery {
            if face.embedding.dim() != probe.dim() {
                tracing::warn!(
                    id = %face.id,
                    stored_dim = face.embedding.dim(),
                    probe_dim = probe.dim(),
                    "skipping gallery entry with mismatched embedding size"
                );
                continue;
            }

            let score = self.metric.score(probe, &face.embedding);
            if self.metric.passes(score, threshold) {
                return MatchResult {
                    matched: true,
                    score: Some(score),
                    face_id: Some(face.id.clone()),
                };
            }

            best = Some(match best {
                Some(prev) if !self.metric.passes(score, prev) => prev,
                _ => score,
            });
        }

        MatchResult::no_match(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(id: &str, values: Vec<f32>) -> KnownFace {
        KnownFace { id: id.into(), embedding: Embedding::new(values) }
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!((a.similarity(&a.clone()) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        assert!(a.similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![-1.0, 0.0]);
        assert!((a.similarity(&b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_euclidean_distance() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_metric_dimension_mismatch_never_matches() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!(!Metric::Cosine.matches(&a, &b, -1.0));
        assert!(!Metric::Euclidean.matches(&a, &b, f32::MAX));
    }

    #[test]
    fn test_metric_euclidean_threshold_is_upper_bound() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![0.3, 0.4]);
        assert!(Metric::Euclidean.matches(&a, &b, 0.6));
        assert!(!Metric::Euclidean.matches(&a, &b, 0.4));
    }

    #[test]
    fn test_linear_matcher_returns_first_match_not_best() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let gallery = vec![
            known("decoy_1", vec![0.0, 1.0]),
            known("close_2", vec![0.8, 0.6]),
            known("exact_3", vec![1.0, 0.0]),
        ];

        let result = LinearMatcher::default().first_match(&probe, &gallery, 0.5);
        assert!(result.matched);
        assert_eq!(result.face_id.as_deref(), Some("close_2"));
        assert!((result.score.unwrap() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_linear_matcher_no_match_reports_best_score() {
        let probe = Embedding::new(vec![1.0, 0.0, 0.0]);
        let gallery = vec![
            known("a_1", vec![0.0, 1.0, 0.0]),
            known("b_2", vec![0.3, 1.0, 0.0]),
        ];

        let result = LinearMatcher::default().first_match(&probe, &gallery, 0.9);
        assert!(!result.matched);
        assert!(result.face_id.is_none());
        let expected = 0.3 / (1.09f32).sqrt();
        assert!((result.score.unwrap() - expected).abs() < 1e-5);
    }

    #[test]
    fn test_linear_matcher_euclidean() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let gallery = vec![known("far_1", vec![5.0, 5.0]), known("near_2", vec![0.1, 0.1])];

        let result = LinearMatcher::new(Metric::Euclidean).first_match(&probe, &gallery, 0.6);
        assert_eq!(result.face_id.as_deref(), Some("near_2"));
    }

    #[test]
    fn test_linear_matcher_skips_mismatched_dimensions() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let gallery = vec![known("old_1", vec![1.0, 0.0, 0.0]), known("new_2", vec![1.0, 0.0])];

        let result = LinearMatcher::default().first_match(&probe, &gallery, 0.5);
        assert_eq!(result.face_id.as_deref(), Some("new_2"));
    }

    #[test]
    fn test_linear_matcher_empty_gallery() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let result = LinearMatcher::default().first_match(&probe, &[], 0.5);
        assert!(!result.matched);
        assert_eq!(result.score, None);
    }
}
