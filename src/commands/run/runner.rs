use std::fs;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};

use crate::detect::{Detector, PhotoImage, RawDetection};
use crate::geometry::NormalizedBox;
use crate::ground_truth::{LabelValidator, PhotoIndex, ScoredLabels};
use crate::model::{LinkDetail, OcrMismatch, PhotoLabels, PhotoResult, PhotoStatus, RunScorecards};
use crate::scoring::{
    AutolinkConfig, BibScorecard, FaceScorecard, LinkScorecard, MatchResult, PredictedBib,
    PredictedFace, predict_links, score_bibs, score_faces, score_links,
};

#[derive(Debug, Clone, Copy)]
pub struct RunnerSettings {
    pub bib_iou_threshold: f64,
    pub face_iou_threshold: f64,
    pub autolink: AutolinkConfig,
}

pub struct RunnerOutput {
    pub scorecards: RunScorecards,
    pub photo_results: Vec<PhotoResult>,
    pub scored_photo_count: usize,
    pub error_count: usize,
}

/// Sequential evaluation loop. Detectors are built once by the caller and
/// borrowed for the whole run; `None` means that dimension is disabled.
pub struct BenchmarkRunner<'a> {
    settings: RunnerSettings,
    bib_detector: Option<&'a dyn Detector>,
    face_detector: Option<&'a dyn Detector>,
    photo_index: &'a dyn PhotoIndex,
    validator: LabelValidator,
}

/// Scores for one photo, assigned to the photo result only once every step succeeded.
struct PhotoScores {
    bib: Option<BibScorecard>,
    face: Option<FaceScorecard>,
    link: Option<LinkScorecard>,
}

impl<'a> BenchmarkRunner<'a> {
    pub fn new(
        settings: RunnerSettings,
        bib_detector: Option<&'a dyn Detector>,
        face_detector: Option<&'a dyn Detector>,
        photo_index: &'a dyn PhotoIndex,
    ) -> Result<Self> {
        Ok(Self {
            settings,
            bib_detector,
            face_detector,
            photo_index,
            validator: LabelValidator::new()?,
        })
    }

    pub fn evaluate(&self, photos: &[&PhotoLabels]) -> RunnerOutput {
        let mut scorecards = RunScorecards {
            bib: self.bib_detector.map(|_| BibScorecard::default()),
            face: self.face_detector.map(|_| FaceScorecard::default()),
            link: self
                .bib_detector
                .zip(self.face_detector)
                .map(|_| LinkScorecard::default()),
        };
        let mut photo_results = Vec::with_capacity(photos.len());
        let mut scored_photo_count = 0_usize;
        let mut error_count = 0_usize;

        for (position, labels) in photos.iter().enumerate() {
            let started = Instant::now();
            let mut result = PhotoResult::new(&labels.content_hash, labels.split);

            match self.evaluate_photo(labels, &mut result) {
                Ok(scores) => {
                    if let (Some(total), Some(photo)) = (scorecards.bib.as_mut(), scores.bib.as_ref()) {
                        total.accumulate(photo);
                    }
                    if let (Some(total), Some(photo)) = (scorecards.face.as_mut(), scores.face.as_ref()) {
                        total.accumulate(photo);
                    }
                    if let (Some(total), Some(photo)) = (scorecards.link.as_mut(), scores.link.as_ref()) {
                        total.accumulate(photo);
                    }
                    result.status = scores.bib.as_ref().map(PhotoStatus::classify);
                    result.bib = scores.bib;
                    result.face = scores.face;
                    result.link = scores.link;
                    scored_photo_count += 1;
                }
                Err(error) => {
                    let path = result.path.take();
                    result = PhotoResult::new(&labels.content_hash, labels.split);
                    result.path = path;
                    warn!(
                        photo = %labels.content_hash,
                        error = %format!("{error:#}"),
                        "photo skipped"
                    );
                    result.errors.push(format!("{error:#}"));
                    error_count += 1;
                }
            }

            result.elapsed_ms = started.elapsed().as_millis();
            debug!(
                photo = %labels.content_hash,
                progress = position + 1,
                total = photos.len(),
                status = result.status.map(PhotoStatus::as_str).unwrap_or("-"),
                elapsed_ms = result.elapsed_ms as u64,
                "photo evaluated"
            );
            photo_results.push(result);
        }

        RunnerOutput {
            scorecards,
            photo_results,
            scored_photo_count,
            error_count,
        }
    }

    fn evaluate_photo(&self, labels: &PhotoLabels, result: &mut PhotoResult) -> Result<PhotoScores> {
        let expected = self
            .validator
            .prepare(labels)
            .context("ground truth rejected")?;

        let path = self
            .photo_index
            .resolve(&labels.content_hash)
            .ok_or_else(|| anyhow!("photo file not found for {}", labels.content_hash))?;
        result.path = Some(path.display().to_string());
        let bytes =
            fs::read(&path).with_context(|| format!("failed to read photo {}", path.display()))?;
        let image = PhotoImage::new(bytes);

        let mut scores = PhotoScores {
            bib: None,
            face: None,
            link: None,
        };

        let bibs = match self.bib_detector {
            Some(detector) => Some(self.detect_bibs(detector, &image, &expected, result)?),
            None => None,
        };
        let faces = match self.face_detector {
            Some(detector) => Some(self.detect_faces(detector, &image, &expected, result)?),
            None => None,
        };

        if let (Some((predicted_bibs, bib_matches, _)), Some((predicted_faces, face_matches, _))) =
            (bibs.as_ref(), faces.as_ref())
        {
            let pairs = predict_links(predicted_bibs, predicted_faces, &self.settings.autolink);
            scores.link = Some(score_links(&pairs, bib_matches, face_matches, &expected.links));
            result.links = pairs
                .iter()
                .map(|pair| LinkDetail {
                    bib_index: pair.bib_index,
                    face_index: pair.face_index,
                    bib_number: predicted_bibs[pair.bib_index].number.clone(),
                    rule: pair.rule,
                })
                .collect();
        }

        scores.bib = bibs.map(|(_, _, scorecard)| scorecard);
        scores.face = faces.map(|(_, _, scorecard)| scorecard);
        Ok(scores)
    }

    fn detect_bibs(
        &self,
        detector: &dyn Detector,
        image: &PhotoImage,
        expected: &ScoredLabels,
        result: &mut PhotoResult,
    ) -> Result<(Vec<PredictedBib>, MatchResult, BibScorecard)> {
        let raw = detector.detect(image).context("bib detector failed")?;
        let mut predicted = Vec::with_capacity(raw.len());
        for detection in &raw {
            let Some(bbox) = normalize_prediction(detection, image, result)? else {
                continue;
            };
            predicted.push(PredictedBib {
                bbox,
                number: detection.text.as_deref().unwrap_or_default().trim().to_string(),
                confidence: detection.confidence,
            });
        }

        let (matches, scorecard) =
            score_bibs(&predicted, &expected.bibs, self.settings.bib_iou_threshold);

        result.expected_numbers = expected.bibs.iter().map(|bib| bib.number.clone()).collect();
        result.detected_numbers = predicted.iter().map(|bib| bib.number.clone()).collect();
        result.missed_numbers = matches
            .false_negatives
            .iter()
            .map(|index| expected.bibs[*index].number.clone())
            .collect();
        result.ocr_mismatches = matches
            .true_positives
            .iter()
            .filter(|(predicted_index, expected_index)| {
                predicted[*predicted_index].number != expected.bibs[*expected_index].number
            })
            .map(|(predicted_index, expected_index)| OcrMismatch {
                expected: expected.bibs[*expected_index].number.clone(),
                detected: predicted[*predicted_index].number.clone(),
            })
            .collect();

        Ok((predicted, matches, scorecard))
    }

    fn detect_faces(
        &self,
        detector: &dyn Detector,
        image: &PhotoImage,
        expected: &ScoredLabels,
        result: &mut PhotoResult,
    ) -> Result<(Vec<PredictedFace>, MatchResult, FaceScorecard)> {
        let raw = detector.detect(image).context("face detector failed")?;
        let mut predicted = Vec::with_capacity(raw.len());
        for detection in &raw {
            let Some(bbox) = normalize_prediction(detection, image, result)? else {
                continue;
            };
            predicted.push(PredictedFace {
                bbox,
                confidence: detection.confidence,
            });
        }

        let (matches, scorecard) = score_faces(
            &predicted,
            &expected.faces,
            &expected.face_ignore_regions,
            self.settings.face_iou_threshold,
        );
        Ok((predicted, matches, scorecard))
    }
}

/// Degenerate predictions never reach matching; they are counted on the photo instead.
fn normalize_prediction(
    detection: &RawDetection,
    image: &PhotoImage,
    result: &mut PhotoResult,
) -> Result<Option<NormalizedBox>> {
    let bbox = detection.to_normalized(image)?;
    if bbox.is_finite() && bbox.has_area() {
        Ok(Some(bbox))
    } else {
        result.dropped_predictions += 1;
        Ok(None)
    }
}
