use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::geometry::NormalizedBox;

use super::scorecard::{PredictedBib, PredictedFace};

/// Torso-region bounds, in face heights relative to the face center.
/// Calibrated on one labeled dataset; camera angle and race direction can shift them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutolinkConfig {
    pub torso_top: f64,
    pub torso_bottom: f64,
    pub torso_half_width: f64,
    /// Horizontal shift of the region center; positive moves it right.
    pub torso_horizontal_offset: f64,
    pub bib_confidence_threshold: f64,
}

impl Default for AutolinkConfig {
    fn default() -> Self {
        Self {
            torso_top: 1.0,
            torso_bottom: 3.5,
            torso_half_width: 0.6,
            torso_horizontal_offset: 0.0,
            bib_confidence_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkRule {
    SingleFace,
    SpatialNearest,
}

impl LinkRule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SingleFace => "single_face",
            Self::SpatialNearest => "spatial_nearest",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutolinkPair {
    pub bib_index: usize,
    pub face_index: usize,
    pub bib_box: NormalizedBox,
    pub face_box: NormalizedBox,
    pub rule: LinkRule,
}

/// Bibs without a reported confidence are treated as fully confident.
fn bib_confidence(bib: &PredictedBib) -> f64 {
    bib.confidence.unwrap_or(1.0)
}

pub fn torso_region(face: &NormalizedBox, config: &AutolinkConfig) -> NormalizedBox {
    let (center_x, center_y) = face.center();
    let face_height = face.h;
    let region_center_x = center_x + config.torso_horizontal_offset * face_height;
    NormalizedBox::new(
        region_center_x - config.torso_half_width * face_height,
        center_y + config.torso_top * face_height,
        2.0 * config.torso_half_width * face_height,
        (config.torso_bottom - config.torso_top) * face_height,
    )
}

struct LinkCandidate {
    face_index: usize,
    bib_index: usize,
    confidence: f64,
    distance: f64,
}

fn compare_link_candidates(left: &LinkCandidate, right: &LinkCandidate) -> Ordering {
    right
        .confidence
        .total_cmp(&left.confidence)
        .then(left.distance.total_cmp(&right.distance))
        .then(left.face_index.cmp(&right.face_index))
        .then(left.bib_index.cmp(&right.bib_index))
}

/// Predicts which detected bib belongs to which detected face. Each bib and
/// each face appears in at most one pair.
pub fn predict_links(
    bibs: &[PredictedBib],
    faces: &[PredictedFace],
    config: &AutolinkConfig,
) -> Vec<AutolinkPair> {
    let eligible = bibs
        .iter()
        .enumerate()
        .filter(|(_, bib)| bib_confidence(bib) >= config.bib_confidence_threshold)
        .map(|(index, _)| index)
        .collect::<Vec<usize>>();

    if faces.is_empty() || eligible.is_empty() {
        return Vec::new();
    }

    if faces.len() == 1 && eligible.len() == 1 {
        let bib_index = eligible[0];
        return vec![AutolinkPair {
            bib_index,
            face_index: 0,
            bib_box: bibs[bib_index].bbox,
            face_box: faces[0].bbox,
            rule: LinkRule::SingleFace,
        }];
    }

    let mut candidates = Vec::<LinkCandidate>::new();
    for (face_index, face) in faces.iter().enumerate() {
        let region = torso_region(&face.bbox, config);
        for bib_index in &eligible {
            let bib = &bibs[*bib_index];
            let (bib_x, bib_y) = bib.bbox.center();
            if !region.contains_point(bib_x, bib_y) {
                continue;
            }
            candidates.push(LinkCandidate {
                face_index,
                bib_index: *bib_index,
                confidence: bib_confidence(bib),
                distance: face.bbox.center_distance(&bib.bbox),
            });
        }
    }

    candidates.sort_by(compare_link_candidates);

    let mut face_linked = vec![false; faces.len()];
    let mut bib_linked = vec![false; bibs.len()];
    let mut pairs = Vec::new();
    for candidate in candidates {
        if face_linked[candidate.face_index] || bib_linked[candidate.bib_index] {
            continue;
        }
        face_linked[candidate.face_index] = true;
        bib_linked[candidate.bib_index] = true;
        pairs.push(AutolinkPair {
            bib_index: candidate.bib_index,
            face_index: candidate.face_index,
            bib_box: bibs[candidate.bib_index].bbox,
            face_box: faces[candidate.face_index].bbox,
            rule: LinkRule::SpatialNearest,
        });
    }

    pairs.sort_by_key(|pair| pair.face_index);
    pairs
}
