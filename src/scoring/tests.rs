use approx::assert_abs_diff_eq;

use super::*;
use crate::geometry::NormalizedBox;

fn bib(x: f64, y: f64, w: f64, h: f64, number: &str) -> PredictedBib {
    PredictedBib {
        bbox: NormalizedBox::new(x, y, w, h),
        number: number.to_string(),
        confidence: Some(0.9),
    }
}

fn expected_bib(x: f64, y: f64, w: f64, h: f64, number: &str) -> ExpectedBib {
    ExpectedBib {
        bbox: NormalizedBox::new(x, y, w, h),
        number: number.to_string(),
    }
}

fn face(x: f64, y: f64, w: f64, h: f64) -> PredictedFace {
    PredictedFace {
        bbox: NormalizedBox::new(x, y, w, h),
        confidence: Some(0.99),
    }
}

#[test]
fn disjoint_sets_yield_only_false_positives_and_negatives() {
    let predicted = (0..4)
        .map(|index| NormalizedBox::new(0.05 + 0.1 * index as f64, 0.05, 0.05, 0.05))
        .collect::<Vec<_>>();
    let ground_truth = (0..3)
        .map(|index| NormalizedBox::new(0.05 + 0.1 * index as f64, 0.6, 0.05, 0.05))
        .collect::<Vec<_>>();

    let result = match_boxes(&predicted, &ground_truth, 0.5);
    assert_eq!(result.tp(), 0);
    assert_eq!(result.false_positives, vec![0, 1, 2, 3]);
    assert_eq!(result.false_negatives, vec![0, 1, 2]);
}

#[test]
fn identical_sets_match_every_box_once() {
    let boxes = vec![
        NormalizedBox::new(0.1, 0.1, 0.1, 0.05),
        NormalizedBox::new(0.4, 0.3, 0.2, 0.1),
        NormalizedBox::new(0.7, 0.6, 0.1, 0.2),
    ];

    let result = match_boxes(&boxes, &boxes, 0.5);
    let mut pairs = result.true_positives.clone();
    pairs.sort();
    assert_eq!(pairs, vec![(0, 0), (1, 1), (2, 2)]);
    assert!(result.false_positives.is_empty());
    assert!(result.false_negatives.is_empty());
}

#[test]
fn empty_inputs_are_not_errors() {
    let boxes = vec![NormalizedBox::new(0.1, 0.1, 0.1, 0.1)];

    let no_predictions = match_boxes(&[], &boxes, 0.5);
    assert_eq!((no_predictions.tp(), no_predictions.fp(), no_predictions.fn_count()), (0, 0, 1));

    let no_ground_truth = match_boxes(&boxes, &[], 0.5);
    assert_eq!((no_ground_truth.tp(), no_ground_truth.fp(), no_ground_truth.fn_count()), (0, 1, 0));

    let nothing = match_boxes(&[], &[], 0.5);
    assert_eq!(nothing, MatchResult::default());
}

#[test]
fn greedy_matching_prefers_highest_iou() {
    let ground_truth = vec![NormalizedBox::new(0.0, 0.0, 0.2, 0.2)];
    let predicted = vec![
        NormalizedBox::new(0.0, 0.0, 0.2, 0.12),
        NormalizedBox::new(0.0, 0.0, 0.2, 0.18),
    ];

    let result = match_boxes(&predicted, &ground_truth, 0.5);
    assert_eq!(result.true_positives, vec![(1, 0)]);
    assert_eq!(result.false_positives, vec![0]);
}

#[test]
fn equal_iou_ties_break_on_lowest_indices() {
    let shared = NormalizedBox::new(0.3, 0.3, 0.1, 0.1);

    let duplicate_predictions = match_boxes(&[shared, shared], &[shared], 0.5);
    assert_eq!(duplicate_predictions.true_positives, vec![(0, 0)]);
    assert_eq!(duplicate_predictions.false_positives, vec![1]);

    let duplicate_ground_truth = match_boxes(&[shared], &[shared, shared], 0.5);
    assert_eq!(duplicate_ground_truth.true_positives, vec![(0, 0)]);
    assert_eq!(duplicate_ground_truth.false_negatives, vec![1]);
}

#[test]
fn threshold_is_inclusive() {
    let ground_truth = vec![NormalizedBox::new(0.0, 0.0, 0.5, 0.5)];
    let predicted = vec![NormalizedBox::new(0.0, 0.0, 0.5, 0.25)];

    assert_eq!(match_boxes(&predicted, &ground_truth, 0.5).tp(), 1);
    assert_eq!(match_boxes(&predicted, &ground_truth, 0.75).tp(), 0);
}

#[test]
fn matching_is_deterministic() {
    let predicted = vec![
        NormalizedBox::new(0.1, 0.1, 0.2, 0.2),
        NormalizedBox::new(0.15, 0.12, 0.2, 0.2),
        NormalizedBox::new(0.5, 0.5, 0.2, 0.2),
    ];
    let ground_truth = vec![
        NormalizedBox::new(0.12, 0.1, 0.2, 0.2),
        NormalizedBox::new(0.52, 0.48, 0.2, 0.2),
    ];

    let first = match_boxes(&predicted, &ground_truth, 0.3);
    let second = match_boxes(&predicted, &ground_truth, 0.3);
    assert_eq!(first, second);
}

#[test]
fn derived_metrics_are_zero_on_empty_denominators() {
    let empty = BibScorecard::default();
    assert_eq!(empty.precision(), 0.0);
    assert_eq!(empty.recall(), 0.0);
    assert_eq!(empty.f1(), 0.0);
    assert_eq!(empty.ocr_accuracy(), 0.0);

    let only_misses = FaceScorecard {
        false_negatives: 4,
        ..FaceScorecard::default()
    };
    assert_eq!(only_misses.precision(), 0.0);
    assert_eq!(only_misses.recall(), 0.0);
}

#[test]
fn derived_metrics_stay_in_unit_interval() {
    for tp in 0..6_u64 {
        for fp in 0..6_u64 {
            for fn_count in 0..6_u64 {
                let scorecard = LinkScorecard {
                    true_positives: tp,
                    false_positives: fp,
                    false_negatives: fn_count,
                    gt_link_count: tp + fn_count,
                };
                for value in [scorecard.precision(), scorecard.recall(), scorecard.f1()] {
                    assert!((0.0..=1.0).contains(&value), "out of range: {value}");
                }
            }
        }
    }
}

#[test]
fn f1_is_harmonic_mean_of_precision_and_recall() {
    let scorecard = BibScorecard {
        true_positives: 3,
        false_positives: 1,
        false_negatives: 2,
        ..BibScorecard::default()
    };
    assert_abs_diff_eq!(scorecard.precision(), 0.75, epsilon = 1e-12);
    assert_abs_diff_eq!(scorecard.recall(), 0.6, epsilon = 1e-12);
    assert_abs_diff_eq!(scorecard.f1(), 2.0 / 3.0, epsilon = 1e-12);
}

#[test]
fn accumulation_sums_counts_before_ratios() {
    let mut total = BibScorecard::default();
    total.accumulate(&BibScorecard {
        true_positives: 1,
        false_positives: 0,
        false_negatives: 0,
        ocr_correct: 1,
        ocr_total: 1,
    });
    total.accumulate(&BibScorecard {
        true_positives: 0,
        false_positives: 0,
        false_negatives: 3,
        ocr_correct: 0,
        ocr_total: 0,
    });

    assert_eq!(total.true_positives, 1);
    assert_eq!(total.false_negatives, 3);
    assert_abs_diff_eq!(total.recall(), 0.25, epsilon = 1e-12);
}

#[test]
fn identical_bib_scores_detection_and_ocr() {
    let expected = vec![expected_bib(0.1, 0.1, 0.1, 0.05, "123")];
    let predicted = vec![bib(0.1, 0.1, 0.1, 0.05, "123")];

    let (_, scorecard) = score_bibs(&predicted, &expected, 0.5);
    assert_eq!(
        scorecard,
        BibScorecard {
            true_positives: 1,
            false_positives: 0,
            false_negatives: 0,
            ocr_correct: 1,
            ocr_total: 1,
        }
    );
}

#[test]
fn wrong_number_still_counts_as_detection() {
    let expected = vec![expected_bib(0.1, 0.1, 0.1, 0.05, "123")];
    let predicted = vec![bib(0.1, 0.1, 0.1, 0.05, "128")];

    let (_, scorecard) = score_bibs(&predicted, &expected, 0.5);
    assert_eq!(scorecard.true_positives, 1);
    assert_eq!(scorecard.ocr_total, 1);
    assert_eq!(scorecard.ocr_correct, 0);
    assert_eq!(scorecard.precision(), 1.0);
    assert_eq!(scorecard.ocr_accuracy(), 0.0);
}

#[test]
fn ocr_is_not_scored_for_unmatched_bibs() {
    let expected = vec![expected_bib(0.1, 0.1, 0.1, 0.05, "123")];
    let predicted = vec![bib(0.6, 0.6, 0.1, 0.05, "123")];

    let (_, scorecard) = score_bibs(&predicted, &expected, 0.5);
    assert_eq!(scorecard.ocr_total, 0);
    assert_eq!(scorecard.ocr_correct, 0);
    assert_eq!(scorecard.false_positives, 1);
    assert_eq!(scorecard.false_negatives, 1);
}

#[test]
fn face_predictions_on_ignore_regions_are_not_penalized() {
    let keep = vec![NormalizedBox::new(0.1, 0.1, 0.1, 0.1)];
    let ignore = vec![NormalizedBox::new(0.5, 0.1, 0.1, 0.1)];
    let predicted = vec![
        face(0.1, 0.1, 0.1, 0.1),
        face(0.5, 0.1, 0.1, 0.1),
        face(0.8, 0.8, 0.1, 0.1),
    ];

    let (matches, scorecard) = score_faces(&predicted, &keep, &ignore, 0.5);
    assert_eq!(matches.true_positives, vec![(0, 0)]);
    assert_eq!(scorecard.true_positives, 1);
    assert_eq!(scorecard.false_positives, 1);
    assert_eq!(scorecard.ignored_predictions, 1);
    assert_eq!(scorecard.false_negatives, 0);
}

fn link_fixture() -> (Vec<PredictedBib>, Vec<ExpectedBib>, Vec<PredictedFace>, Vec<NormalizedBox>) {
    let predicted_bibs = vec![
        bib(0.2, 0.4, 0.1, 0.05, "11"),
        bib(0.6, 0.4, 0.1, 0.05, "22"),
    ];
    let expected_bibs = vec![
        expected_bib(0.2, 0.4, 0.1, 0.05, "11"),
        expected_bib(0.6, 0.4, 0.1, 0.05, "22"),
    ];
    let predicted_faces = vec![face(0.2, 0.1, 0.1, 0.1), face(0.6, 0.1, 0.1, 0.1)];
    let expected_faces = vec![
        NormalizedBox::new(0.2, 0.1, 0.1, 0.1),
        NormalizedBox::new(0.6, 0.1, 0.1, 0.1),
    ];
    (predicted_bibs, expected_bibs, predicted_faces, expected_faces)
}

fn pair(bib_index: usize, face_index: usize) -> AutolinkPair {
    AutolinkPair {
        bib_index,
        face_index,
        bib_box: NormalizedBox::new(0.0, 0.0, 0.1, 0.1),
        face_box: NormalizedBox::new(0.0, 0.0, 0.1, 0.1),
        rule: LinkRule::SpatialNearest,
    }
}

#[test]
fn link_requires_both_matches_and_a_ground_truth_link() {
    let (predicted_bibs, expected_bibs, predicted_faces, expected_faces) = link_fixture();
    let (bib_matches, _) = score_bibs(&predicted_bibs, &expected_bibs, 0.5);
    let (face_matches, _) = score_faces(&predicted_faces, &expected_faces, &[], 0.5);

    let scorecard = score_links(
        &[pair(0, 0), pair(1, 1)],
        &bib_matches,
        &face_matches,
        &[(0, 0), (1, 1)],
    );
    assert_eq!(
        scorecard,
        LinkScorecard {
            true_positives: 2,
            false_positives: 0,
            false_negatives: 0,
            gt_link_count: 2,
        }
    );
}

#[test]
fn removing_the_ground_truth_link_flips_pair_to_false_positive() {
    let (predicted_bibs, expected_bibs, predicted_faces, expected_faces) = link_fixture();
    let (bib_matches, _) = score_bibs(&predicted_bibs, &expected_bibs, 0.5);
    let (face_matches, _) = score_faces(&predicted_faces, &expected_faces, &[], 0.5);

    let scorecard = score_links(
        &[pair(0, 0), pair(1, 1)],
        &bib_matches,
        &face_matches,
        &[(0, 1), (1, 1)],
    );
    assert_eq!(scorecard.true_positives, 1);
    assert_eq!(scorecard.false_positives, 1);
    assert_eq!(scorecard.false_negatives, 1);
}

#[test]
fn missing_face_match_flips_pair_without_touching_bib_scores() {
    let (predicted_bibs, expected_bibs, mut predicted_faces, expected_faces) = link_fixture();
    let (bib_matches, bib_before) = score_bibs(&predicted_bibs, &expected_bibs, 0.5);

    predicted_faces[1] = face(0.85, 0.8, 0.1, 0.1);
    let (face_matches, _) = score_faces(&predicted_faces, &expected_faces, &[], 0.5);
    let (_, bib_after) = score_bibs(&predicted_bibs, &expected_bibs, 0.5);

    let scorecard = score_links(
        &[pair(0, 0), pair(1, 1)],
        &bib_matches,
        &face_matches,
        &[(0, 0), (1, 1)],
    );
    assert_eq!(bib_before, bib_after);
    assert_eq!(scorecard.true_positives, 1);
    assert_eq!(scorecard.false_positives, 1);
    assert_eq!(scorecard.false_negatives, 1);
}

#[test]
fn links_without_ground_truth_are_all_false_positives() {
    let (predicted_bibs, expected_bibs, predicted_faces, expected_faces) = link_fixture();
    let (bib_matches, _) = score_bibs(&predicted_bibs, &expected_bibs, 0.5);
    let (face_matches, _) = score_faces(&predicted_faces, &expected_faces, &[], 0.5);

    let scorecard = score_links(&[pair(0, 0)], &bib_matches, &face_matches, &[]);
    assert_eq!(scorecard.false_positives, 1);
    assert_eq!(scorecard.gt_link_count, 0);
    assert_eq!(scorecard.recall(), 0.0);
}

#[test]
fn single_face_rule_ignores_position() {
    let faces = vec![face(0.1, 0.1, 0.1, 0.1)];
    let bibs = vec![bib(0.8, 0.05, 0.1, 0.05, "7")];

    let pairs = predict_links(&bibs, &faces, &AutolinkConfig::default());
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].rule, LinkRule::SingleFace);
    assert_eq!((pairs[0].bib_index, pairs[0].face_index), (0, 0));
}

#[test]
fn bib_outside_every_torso_region_stays_unlinked() {
    let faces = vec![face(0.2, 0.1, 0.1, 0.1), face(0.6, 0.1, 0.1, 0.1)];
    let bibs = vec![
        bib(0.22, 0.33, 0.06, 0.04, "101"),
        bib(0.42, 0.88, 0.06, 0.04, "202"),
    ];

    let pairs = predict_links(&bibs, &faces, &AutolinkConfig::default());
    assert_eq!(pairs.len(), 1);
    assert_eq!((pairs[0].bib_index, pairs[0].face_index), (0, 0));
    assert_eq!(pairs[0].rule, LinkRule::SpatialNearest);
}

#[test]
fn spatial_rule_prefers_higher_confidence_bib() {
    let faces = vec![face(0.2, 0.1, 0.1, 0.1), face(0.6, 0.1, 0.1, 0.1)];
    let mut bibs = vec![
        bib(0.22, 0.27, 0.06, 0.04, "1"),
        bib(0.22, 0.38, 0.06, 0.04, "2"),
    ];
    bibs[0].confidence = Some(0.6);
    bibs[1].confidence = Some(0.95);

    let pairs = predict_links(&bibs, &faces, &AutolinkConfig::default());
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].bib_index, 1);
}

#[test]
fn spatial_rule_breaks_confidence_ties_by_distance() {
    let faces = vec![face(0.2, 0.1, 0.1, 0.1), face(0.6, 0.1, 0.1, 0.1)];
    let bibs = vec![
        bib(0.22, 0.38, 0.06, 0.04, "far"),
        bib(0.22, 0.27, 0.06, 0.04, "near"),
    ];

    let pairs = predict_links(&bibs, &faces, &AutolinkConfig::default());
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].bib_index, 1);
}

#[test]
fn spatial_rule_assigns_each_bib_once() {
    let faces = vec![face(0.2, 0.1, 0.1, 0.1), face(0.22, 0.1, 0.1, 0.1)];
    let bibs = vec![bib(0.22, 0.33, 0.06, 0.04, "5")];

    let pairs = predict_links(&bibs, &faces, &AutolinkConfig::default());
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].face_index, 0);
}

#[test]
fn low_confidence_bibs_are_not_linked() {
    let faces = vec![face(0.2, 0.1, 0.1, 0.1)];
    let mut bibs = vec![bib(0.22, 0.33, 0.06, 0.04, "9")];
    bibs[0].confidence = Some(0.3);

    assert!(predict_links(&bibs, &faces, &AutolinkConfig::default()).is_empty());
}

#[test]
fn no_faces_or_no_bibs_yield_no_links() {
    let config = AutolinkConfig::default();
    assert!(predict_links(&[], &[face(0.2, 0.1, 0.1, 0.1)], &config).is_empty());
    assert!(predict_links(&[bib(0.2, 0.3, 0.1, 0.05, "1")], &[], &config).is_empty());
}

#[test]
fn torso_region_spans_configured_face_heights() {
    let config = AutolinkConfig::default();
    let region = torso_region(&NormalizedBox::new(0.2, 0.1, 0.1, 0.1), &config);
    assert_abs_diff_eq!(region.x, 0.19, epsilon = 1e-9);
    assert_abs_diff_eq!(region.y, 0.25, epsilon = 1e-9);
    assert_abs_diff_eq!(region.w, 0.12, epsilon = 1e-9);
    assert_abs_diff_eq!(region.h, 0.25, epsilon = 1e-9);

    let shifted = torso_region(
        &NormalizedBox::new(0.2, 0.1, 0.1, 0.1),
        &AutolinkConfig {
            torso_horizontal_offset: 0.5,
            ..config
        },
    );
    assert_abs_diff_eq!(shifted.x, 0.24, epsilon = 1e-9);
}
