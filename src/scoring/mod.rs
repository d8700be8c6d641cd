mod autolink;
mod links;
mod matching;
mod scorecard;
#[cfg(test)]
mod tests;

pub use autolink::{AutolinkConfig, AutolinkPair, LinkRule, predict_links, torso_region};
pub use links::score_links;
pub use matching::{MatchResult, match_boxes};
pub use scorecard::{
    BibScorecard, DetectionCounts, ExpectedBib, FaceScorecard, LinkScorecard, PredictedBib,
    PredictedFace, ratio, score_bibs, score_faces,
};
