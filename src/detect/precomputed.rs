use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Result, bail};
use serde::Deserialize;
use tracing::info;

use crate::util::{read_json, sha256_bytes};

use super::{Detector, PhotoImage, RawDetection};

const MIN_KEY_LEN: usize = 8;

#[derive(Debug, Deserialize)]
struct PredictionsFile {
    photos: BTreeMap<String, Vec<RawDetection>>,
}

/// Replays detections recorded earlier, keyed by the sha256 of the photo bytes
/// (or any prefix of at least eight hex characters).
pub struct PrecomputedDetector {
    source: String,
    photos: BTreeMap<String, Vec<RawDetection>>,
}

impl PrecomputedDetector {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("precomputed predictions not found: {}", path.display());
        }
        let file: PredictionsFile = read_json(path)?;
        let detector = Self::from_entries(path.display().to_string(), file.photos)?;
        info!(
            path = %path.display(),
            photos = detector.photos.len(),
            "loaded precomputed predictions"
        );
        Ok(detector)
    }

    pub fn from_entries(
        source: String,
        entries: BTreeMap<String, Vec<RawDetection>>,
    ) -> Result<Self> {
        let mut photos = BTreeMap::new();
        for (key, detections) in entries {
            let key = key.trim().to_ascii_lowercase();
            if key.len() < MIN_KEY_LEN || !key.chars().all(|c| c.is_ascii_hexdigit()) {
                bail!("invalid prediction key '{key}' in {source}: expected hex content hash");
            }
            photos.insert(key, detections);
        }
        Ok(Self { source, photos })
    }

    fn lookup(&self, digest: &str) -> Option<&Vec<RawDetection>> {
        self.photos
            .iter()
            .filter(|(key, _)| digest.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, detections)| detections)
    }
}

impl Detector for PrecomputedDetector {
    fn describe(&self) -> String {
        format!("precomputed:{}", self.source)
    }

    fn detect(&self, image: &PhotoImage) -> Result<Vec<RawDetection>> {
        let digest = sha256_bytes(image.bytes());
        Ok(self.lookup(&digest).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(text: &str) -> RawDetection {
        RawDetection {
            x: 0.1,
            y: 0.1,
            w: 0.1,
            h: 0.05,
            units: Default::default(),
            confidence: Some(0.9),
            text: Some(text.to_string()),
        }
    }

    #[test]
    fn lookup_uses_longest_matching_prefix() {
        let bytes = b"photo-bytes".to_vec();
        let digest = sha256_bytes(&bytes);

        let mut entries = BTreeMap::new();
        entries.insert(digest[..8].to_string(), vec![detection("short")]);
        entries.insert(digest[..16].to_uppercase(), vec![detection("long")]);
        entries.insert("deadbeefdeadbeef".to_string(), vec![detection("other")]);

        let detector = PrecomputedDetector::from_entries("test".to_string(), entries)
            .expect("entries should load");
        let detections = detector
            .detect(&PhotoImage::new(bytes))
            .expect("lookup should succeed");
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].text.as_deref(), Some("long"));
    }

    #[test]
    fn unknown_photo_has_no_detections() {
        let detector = PrecomputedDetector::from_entries("test".to_string(), BTreeMap::new())
            .expect("empty entries should load");
        let detections = detector
            .detect(&PhotoImage::new(b"unlisted".to_vec()))
            .expect("lookup should succeed");
        assert!(detections.is_empty());
    }

    #[test]
    fn rejects_non_hash_keys() {
        let mut entries = BTreeMap::new();
        entries.insert("IMG_0001.jpg".to_string(), vec![detection("1")]);
        assert!(PrecomputedDetector::from_entries("test".to_string(), entries).is_err());
    }

    #[test]
    fn load_fails_for_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let error = PrecomputedDetector::load(&dir.path().join("missing.json"))
            .err()
            .expect("missing file should fail");
        assert!(error.to_string().contains("not found"));
    }
}
