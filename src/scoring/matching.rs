use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::geometry::NormalizedBox;

/// Outcome of one greedy matching pass. Every predicted and ground-truth index
/// appears exactly once across the three lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    /// `(predicted_index, ground_truth_index)` in selection order.
    pub true_positives: Vec<(usize, usize)>,
    pub false_positives: Vec<usize>,
    pub false_negatives: Vec<usize>,
}

impl MatchResult {
    pub fn tp(&self) -> u64 {
        self.true_positives.len() as u64
    }

    pub fn fp(&self) -> u64 {
        self.false_positives.len() as u64
    }

    pub fn fn_count(&self) -> u64 {
        self.false_negatives.len() as u64
    }

    pub fn ground_truth_for(&self, predicted_index: usize) -> Option<usize> {
        self.true_positives
            .iter()
            .find(|(predicted, _)| *predicted == predicted_index)
            .map(|(_, ground_truth)| *ground_truth)
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    iou: f64,
    predicted: usize,
    ground_truth: usize,
}

/// Greedy bipartite matching under an IoU threshold (inclusive). The highest
/// IoU pair wins; equal IoUs resolve to the lowest `(predicted, ground_truth)`.
pub fn match_boxes(
    predicted: &[NormalizedBox],
    ground_truth: &[NormalizedBox],
    iou_threshold: f64,
) -> MatchResult {
    let mut candidates = Vec::<Candidate>::new();
    for (predicted_index, predicted_box) in predicted.iter().enumerate() {
        for (ground_truth_index, ground_truth_box) in ground_truth.iter().enumerate() {
            let iou = predicted_box.iou(ground_truth_box);
            if iou > 0.0 && iou >= iou_threshold {
                candidates.push(Candidate {
                    iou,
                    predicted: predicted_index,
                    ground_truth: ground_truth_index,
                });
            }
        }
    }

    candidates.sort_by(compare_candidates);

    let mut predicted_used = vec![false; predicted.len()];
    let mut ground_truth_used = vec![false; ground_truth.len()];
    let mut true_positives = Vec::new();

    for candidate in candidates {
        if predicted_used[candidate.predicted] || ground_truth_used[candidate.ground_truth] {
            continue;
        }
        predicted_used[candidate.predicted] = true;
        ground_truth_used[candidate.ground_truth] = true;
        true_positives.push((candidate.predicted, candidate.ground_truth));
    }

    MatchResult {
        true_positives,
        false_positives: unused_indices(&predicted_used),
        false_negatives: unused_indices(&ground_truth_used),
    }
}

fn compare_candidates(left: &Candidate, right: &Candidate) -> Ordering {
    right
        .iou
        .total_cmp(&left.iou)
        .then(left.predicted.cmp(&right.predicted))
        .then(left.ground_truth.cmp(&right.ground_truth))
}

fn unused_indices(used: &[bool]) -> Vec<usize> {
    used.iter()
        .enumerate()
        .filter(|(_, used)| !**used)
        .map(|(index, _)| index)
        .collect()
}
