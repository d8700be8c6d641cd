use serde::{Deserialize, Serialize};

use crate::geometry::NormalizedBox;

use super::matching::{MatchResult, match_boxes};

/// Ratio that is defined as `0` for an empty denominator.
pub fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

pub trait DetectionCounts {
    fn true_positives(&self) -> u64;
    fn false_positives(&self) -> u64;
    fn false_negatives(&self) -> u64;

    fn precision(&self) -> f64 {
        let tp = self.true_positives();
        ratio(tp, tp + self.false_positives())
    }

    fn recall(&self) -> f64 {
        let tp = self.true_positives();
        ratio(tp, tp + self.false_negatives())
    }

    fn f1(&self) -> f64 {
        let precision = self.precision();
        let recall = self.recall();
        if precision + recall <= 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictedBib {
    pub bbox: NormalizedBox,
    pub number: String,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedBib {
    pub bbox: NormalizedBox,
    pub number: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictedFace {
    pub bbox: NormalizedBox,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibScorecard {
    pub true_positives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub ocr_correct: u64,
    pub ocr_total: u64,
}

impl BibScorecard {
    pub fn accumulate(&mut self, photo: &Self) {
        self.true_positives += photo.true_positives;
        self.false_positives += photo.false_positives;
        self.false_negatives += photo.false_negatives;
        self.ocr_correct += photo.ocr_correct;
        self.ocr_total += photo.ocr_total;
    }

    /// OCR accuracy over geometrically matched bibs only.
    pub fn ocr_accuracy(&self) -> f64 {
        ratio(self.ocr_correct, self.ocr_total)
    }
}

impl DetectionCounts for BibScorecard {
    fn true_positives(&self) -> u64 {
        self.true_positives
    }

    fn false_positives(&self) -> u64 {
        self.false_positives
    }

    fn false_negatives(&self) -> u64 {
        self.false_negatives
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceScorecard {
    pub true_positives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    /// Unmatched predictions that landed on an exclude/uncertain region.
    #[serde(default)]
    pub ignored_predictions: u64,
}

impl FaceScorecard {
    pub fn accumulate(&mut self, photo: &Self) {
        self.true_positives += photo.true_positives;
        self.false_positives += photo.false_positives;
        self.false_negatives += photo.false_negatives;
        self.ignored_predictions += photo.ignored_predictions;
    }
}

impl DetectionCounts for FaceScorecard {
    fn true_positives(&self) -> u64 {
        self.true_positives
    }

    fn false_positives(&self) -> u64 {
        self.false_positives
    }

    fn false_negatives(&self) -> u64 {
        self.false_negatives
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkScorecard {
    pub true_positives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub gt_link_count: u64,
}

impl LinkScorecard {
    pub fn accumulate(&mut self, photo: &Self) {
        self.true_positives += photo.true_positives;
        self.false_positives += photo.false_positives;
        self.false_negatives += photo.false_negatives;
        self.gt_link_count += photo.gt_link_count;
    }
}

impl DetectionCounts for LinkScorecard {
    fn true_positives(&self) -> u64 {
        self.true_positives
    }

    fn false_positives(&self) -> u64 {
        self.false_positives
    }

    fn false_negatives(&self) -> u64 {
        self.false_negatives
    }
}

/// Matches bib boxes, then scores OCR on the matched pairs only.
pub fn score_bibs(
    predicted: &[PredictedBib],
    expected: &[ExpectedBib],
    iou_threshold: f64,
) -> (MatchResult, BibScorecard) {
    let predicted_boxes = predicted.iter().map(|bib| bib.bbox).collect::<Vec<_>>();
    let expected_boxes = expected.iter().map(|bib| bib.bbox).collect::<Vec<_>>();
    let matches = match_boxes(&predicted_boxes, &expected_boxes, iou_threshold);

    let ocr_correct = matches
        .true_positives
        .iter()
        .filter(|(predicted_index, expected_index)| {
            predicted[*predicted_index].number == expected[*expected_index].number
        })
        .count() as u64;

    let scorecard = BibScorecard {
        true_positives: matches.tp(),
        false_positives: matches.fp(),
        false_negatives: matches.fn_count(),
        ocr_correct,
        ocr_total: matches.tp(),
    };
    (matches, scorecard)
}

/// Matches face boxes against `keep` ground truth. Unmatched predictions that
/// overlap an ignore region at the threshold are not counted as false positives.
pub fn score_faces(
    predicted: &[PredictedFace],
    expected: &[NormalizedBox],
    ignore_regions: &[NormalizedBox],
    iou_threshold: f64,
) -> (MatchResult, FaceScorecard) {
    let predicted_boxes = predicted.iter().map(|face| face.bbox).collect::<Vec<_>>();
    let matches = match_boxes(&predicted_boxes, expected, iou_threshold);

    let ignored_predictions = matches
        .false_positives
        .iter()
        .filter(|predicted_index| {
            let predicted_box = &predicted_boxes[**predicted_index];
            ignore_regions.iter().any(|region| {
                let iou = predicted_box.iou(region);
                iou > 0.0 && iou >= iou_threshold
            })
        })
        .count() as u64;

    let scorecard = FaceScorecard {
        true_positives: matches.tp(),
        false_positives: matches.fp() - ignored_predictions,
        false_negatives: matches.fn_count(),
        ignored_predictions,
    };
    (matches, scorecard)
}
