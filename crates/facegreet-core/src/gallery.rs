//! Known-face gallery persisted as one JSON file.
//!
//! The whole mapping is loaded into memory and rewritten in full after each
//! change. There is no locking; one process owns the file.

use crate::types::{Embedding, KnownFace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery io {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("gallery file {path} is malformed: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("gallery {path} holds {found} embeddings but the recognizer produces {expected}")]
    ModelMismatch {
        path: PathBuf,
        found: String,
        expected: String,
    },
}

/// On-disk layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct GalleryFile {
    model_version: String,
    faces: BTreeMap<String, Vec<f32>>,
}

/// In-memory identifier -> embedding table bound to its file.
#[derive(Debug)]
pub struct Gallery {
    path: PathBuf,
    model_version: String,
    faces: Vec<KnownFace>,
}

impl Gallery {
    /// Load the gallery at `path`. A missing file is an empty gallery.
    pub fn open(path: impl Into<PathBuf>, model_version: &str) -> Result<Self, GalleryError> {
        let path = path.into();
        let file = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<GalleryFile>(&bytes).map_err(|source| GalleryError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no gallery yet, starting empty");
                GalleryFile {
                    model_version: model_version.to_string(),
                    faces: BTreeMap::new(),
                }
            }
            Err(source) => return Err(GalleryError::Io { path, source }),
        };

        if file.model_version != model_version {
            return Err(GalleryError::ModelMismatch {
                path,
                found: file.model_version,
                expected: model_version.to_string(),
            });
        }

        let faces = file
            .faces
            .into_iter()
            .map(|(id, values)| KnownFace {
                id,
                embedding: Embedding {
                    values,
                    model_version: Some(file.model_version.clone()),
                },
            })
            .collect::<Vec<_>>();

        tracing::debug!(path = %path.display(), count = faces.len(), "gallery loaded");
        Ok(Self {
            path,
            model_version: file.model_version,
            faces,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries in scan order (sorted by identifier).
    pub fn faces(&self) -> &[KnownFace] {
        &self.faces
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Add an entry; an existing identifier has its embedding replaced.
    pub fn insert(&mut self, face: KnownFace) {
        match self.position(&face.id) {
            Ok(i) => {
                tracing::warn!(id = %face.id, "identifier already enrolled, replacing embedding");
                self.faces[i] = face;
            }
            Err(i) => self.faces.insert(i, face),
        }
    }

    /// Returns whether an entry was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        match self.position(id) {
            Ok(i) => {
                self.faces.remove(i);
                true
            }
            Err(_) => false,
        }
    }

    /// Rewrite the whole file via a sibling temp file and rename.
    pub fn save(&self) -> Result<(), GalleryError> {
        let io_err = |source| GalleryError::Io { path: self.path.clone(), source };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let file = GalleryFile {
            model_version: self.model_version.clone(),
            faces: self
                .faces
                .iter()
                .map(|f| (f.id.clone(), f.embedding.values.clone()))
                .collect(),
        };
        let json = serde_json::to_vec(&file).map_err(|source| GalleryError::Parse {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;

        tracing::debug!(path = %self.path.display(), count = self.faces.len(), "gallery saved");
        Ok(())
    }

    fn position(&self, id: &str) -> Result<usize, usize> {
        self.faces.binary_search_by(|f| f.id.as_str().cmp(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERSION: &str = "w600k_r50";

    fn face(id: &str, values: Vec<f32>) -> KnownFace {
        KnownFace { id: id.into(), embedding: Embedding::new(values) }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let gallery = Gallery::open(dir.path().join("embeddings.json"), VERSION).unwrap();
        assert!(gallery.is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("embeddings.json");

        let mut gallery = Gallery::open(&path, VERSION).unwrap();
        gallery.insert(face("Zoe_January012025000000", vec![0.5, 0.5]));
        gallery.insert(face("Alice_March032025101010", vec![1.0, 0.0]));
        gallery.save().unwrap();

        let reloaded = Gallery::open(&path, VERSION).unwrap();
        let ids: Vec<&str> = reloaded.faces().iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["Alice_March032025101010", "Zoe_January012025000000"]);
        assert_eq!(reloaded.faces()[1].embedding.values, vec![0.5, 0.5]);
        assert!(!dir.path().join("nested").join("embeddings.json.tmp").exists());
    }

    #[test]
    fn test_insert_same_id_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let mut gallery = Gallery::open(dir.path().join("g.json"), VERSION).unwrap();
        gallery.insert(face("Bob_1", vec![1.0]));
        gallery.insert(face("Bob_1", vec![2.0]));
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery.faces()[0].embedding.values, vec![2.0]);
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut gallery = Gallery::open(dir.path().join("g.json"), VERSION).unwrap();
        gallery.insert(face("Bob_1", vec![1.0]));
        assert!(gallery.remove("Bob_1"));
        assert!(!gallery.remove("Bob_1"));
        assert!(gallery.is_empty());
    }

    #[test]
    fn test_model_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.json");
        std::fs::write(&path, r#"{"model_version":"dlib_128","faces":{"a_1":[0.1]}}"#).unwrap();

        let err = Gallery::open(&path, VERSION).unwrap_err();
        assert!(matches!(err, GalleryError::ModelMismatch { ref found, .. } if found == "dlib_128"));
    }

    #[test]
    fn test_malformed_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(Gallery::open(&path, VERSION), Err(GalleryError::Parse { .. })));
    }

    #[test]
    fn test_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.json");
        let mut gallery = Gallery::open(&path, VERSION).unwrap();
        gallery.insert(face("Eve_2", vec![0.25, -1.0]));
        gallery.save().unwrap();

        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["model_version"], VERSION);
        assert_eq!(raw["faces"]["Eve_2"], serde_json::json!([0.25, -1.0]));
    }
}
