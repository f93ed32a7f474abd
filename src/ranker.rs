use crate::error::RankError;
use crate::labels::LabelSet;
use crate::types::{ConfidenceVector, Recognition, RecognitionResult};
use std::cmp::Reverse;

/// Number of results shown to the user unless configured otherwise.
pub const DEFAULT_TOP_K: usize = 3;

/// Pick the `k` most confident labels.
///
/// Results are ordered by confidence, highest first. Equal confidences keep
/// their label order, so the output is fully deterministic. The output holds
/// `min(k, labels.len())` entries.
pub fn rank(
    confidences: &ConfidenceVector,
    labels: &LabelSet,
    k: usize,
) -> Result<RecognitionResult, RankError> {
    if confidences.is_empty() {
        return Err(RankError::EmptyConfidences);
    }
    if labels.is_empty() {
        return Err(RankError::EmptyLabels);
    }
    if confidences.len() != labels.len() {
        return Err(RankError::LengthMismatch {
            confidences: confidences.len(),
            labels: labels.len(),
        });
    }

    let scores = confidences.as_slice();
    let mut order: Vec<usize> = (0..scores.len()).collect();
    // Stable sort: ties stay in ascending index order.
    order.sort_by_key(|&i| Reverse(scores[i]));

    let recognitions = order
        .into_iter()
        .take(k)
        .map(|i| Recognition::new(&labels[i], scores[i]))
        .collect();

    Ok(RecognitionResult::new(recognitions))
}
