use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::info;

use crate::geometry::NormalizedBox;
use crate::model::{GroundTruthManifest, PhotoIndexManifest, PhotoLabels, Split};
use crate::scoring::ExpectedBib;
use crate::util::{sha256_bytes, sha256_file};

/// Source of labeled photos for a benchmark run.
pub trait GroundTruthStore {
    /// Photos assigned to `split`, ordered by content hash.
    fn labeled_photos(&self, split: Split) -> Vec<&PhotoLabels>;

    /// Stable digest of the labeled data, recorded with every run.
    fn fingerprint(&self) -> &str;
}

/// Maps a photo's content hash to a readable file.
pub trait PhotoIndex {
    fn resolve(&self, content_hash: &str) -> Option<PathBuf>;

    fn fingerprint(&self) -> Option<&str> {
        None
    }
}

pub struct JsonGroundTruth {
    photos: Vec<PhotoLabels>,
    sha256: String,
}

impl JsonGroundTruth {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("ground truth not found: {}", path.display());
        }
        let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let manifest: GroundTruthManifest = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        let store = Self::from_manifest(manifest, sha256_bytes(&raw))?;
        info!(
            path = %path.display(),
            photos = store.photos.len(),
            "loaded ground truth"
        );
        Ok(store)
    }

    pub fn from_manifest(manifest: GroundTruthManifest, sha256: String) -> Result<Self> {
        let mut photos = manifest.photos;
        photos.sort_by(|left, right| left.content_hash.cmp(&right.content_hash));
        for pair in photos.windows(2) {
            if pair[0].content_hash == pair[1].content_hash {
                bail!("duplicate ground-truth entry for photo {}", pair[0].content_hash);
            }
        }
        Ok(Self { photos, sha256 })
    }
}

impl GroundTruthStore for JsonGroundTruth {
    fn labeled_photos(&self, split: Split) -> Vec<&PhotoLabels> {
        self.photos
            .iter()
            .filter(|photo| split.includes(photo.split))
            .collect()
    }

    fn fingerprint(&self) -> &str {
        &self.sha256
    }
}

pub struct JsonPhotoIndex {
    photos_root: PathBuf,
    entries: BTreeMap<String, Vec<String>>,
    sha256: Option<String>,
}

impl JsonPhotoIndex {
    pub fn load(path: &Path, photos_root: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("photo index not found: {}", path.display());
        }
        let manifest: PhotoIndexManifest = crate::util::read_json(path)?;
        let mut index = Self::from_entries(photos_root, manifest.photos);
        index.sha256 = Some(sha256_file(path)?);
        info!(
            path = %path.display(),
            photos = index.entries.len(),
            "loaded photo index"
        );
        Ok(index)
    }

    pub fn from_entries(photos_root: &Path, entries: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            photos_root: photos_root.to_path_buf(),
            entries,
            sha256: None,
        }
    }
}

impl PhotoIndex for JsonPhotoIndex {
    /// First listed candidate that exists on disk.
    fn resolve(&self, content_hash: &str) -> Option<PathBuf> {
        self.entries
            .get(content_hash)?
            .iter()
            .map(|candidate| {
                let candidate = Path::new(candidate);
                if candidate.is_absolute() {
                    candidate.to_path_buf()
                } else {
                    self.photos_root.join(candidate)
                }
            })
            .find(|path| path.is_file())
    }

    fn fingerprint(&self) -> Option<&str> {
        self.sha256.as_deref()
    }
}

/// Ground truth for one photo after boundary filtering: only scored, non-degenerate
/// boxes remain, and links refer to positions in the filtered lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoredLabels {
    pub bibs: Vec<ExpectedBib>,
    pub faces: Vec<NormalizedBox>,
    pub face_ignore_regions: Vec<NormalizedBox>,
    pub links: Vec<(usize, usize)>,
    pub dropped_boxes: usize,
    pub dropped_links: usize,
}

pub struct LabelValidator {
    content_hash: Regex,
}

impl LabelValidator {
    pub fn new() -> Result<Self> {
        Ok(Self {
            content_hash: Regex::new(r"^[0-9a-f]{8,64}$")
                .context("failed to compile content hash pattern")?,
        })
    }

    pub fn prepare(&self, labels: &PhotoLabels) -> Result<ScoredLabels> {
        if !self.content_hash.is_match(&labels.content_hash) {
            bail!(
                "invalid content hash '{}': expected 8-64 lowercase hex characters",
                labels.content_hash
            );
        }

        for link in &labels.links {
            if link.bib_index >= labels.bibs.len() || link.face_index >= labels.faces.len() {
                bail!(
                    "link ({}, {}) out of range for {} bibs and {} faces",
                    link.bib_index,
                    link.face_index,
                    labels.bibs.len(),
                    labels.faces.len()
                );
            }
        }

        let mut scored = ScoredLabels::default();

        let mut bib_positions = Vec::with_capacity(labels.bibs.len());
        for (index, bib) in labels.bibs.iter().enumerate() {
            bib.bbox
                .validate()
                .with_context(|| format!("bib {index} has invalid geometry"))?;
            if bib.bbox.has_area() && bib.scope.is_scored() {
                bib_positions.push(Some(scored.bibs.len()));
                scored.bibs.push(ExpectedBib {
                    bbox: bib.bbox,
                    number: bib.number.trim().to_string(),
                });
            } else {
                bib_positions.push(None);
                scored.dropped_boxes += 1;
            }
        }

        let mut face_positions = Vec::with_capacity(labels.faces.len());
        for (index, face) in labels.faces.iter().enumerate() {
            face.bbox
                .validate()
                .with_context(|| format!("face {index} has invalid geometry"))?;
            if !face.bbox.has_area() {
                face_positions.push(None);
                scored.dropped_boxes += 1;
            } else if face.scope.is_scored() {
                face_positions.push(Some(scored.faces.len()));
                scored.faces.push(face.bbox);
            } else {
                face_positions.push(None);
                scored.face_ignore_regions.push(face.bbox);
            }
        }

        let mut links = BTreeSet::new();
        for link in &labels.links {
            match (bib_positions[link.bib_index], face_positions[link.face_index]) {
                (Some(bib), Some(face)) => {
                    links.insert((bib, face));
                }
                _ => scored.dropped_links += 1,
            }
        }
        scored.links = links.into_iter().collect();

        Ok(scored)
    }
}
