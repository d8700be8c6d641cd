use std::collections::BTreeSet;

use super::autolink::AutolinkPair;
use super::matching::MatchResult;
use super::scorecard::LinkScorecard;

/// Scores predicted links against ground-truth links by index. A predicted pair
/// is a true positive only when its bib and its face each matched a ground-truth
/// box and those two ground-truth boxes are linked.
pub fn score_links(
    predicted: &[AutolinkPair],
    bib_matches: &MatchResult,
    face_matches: &MatchResult,
    expected_links: &[(usize, usize)],
) -> LinkScorecard {
    let expected = expected_links.iter().copied().collect::<BTreeSet<(usize, usize)>>();
    let mut credited = BTreeSet::<(usize, usize)>::new();

    let mut true_positives = 0_u64;
    let mut false_positives = 0_u64;
    for pair in predicted {
        let resolved = bib_matches
            .ground_truth_for(pair.bib_index)
            .zip(face_matches.ground_truth_for(pair.face_index));

        match resolved {
            Some(link) if expected.contains(&link) && credited.insert(link) => {
                true_positives += 1;
            }
            _ => false_positives += 1,
        }
    }

    let gt_link_count = expected.len() as u64;
    LinkScorecard {
        true_positives,
        false_positives,
        false_negatives: gt_link_count - credited.len() as u64,
        gt_link_count,
    }
}
