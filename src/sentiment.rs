use crate::model::Sentiment;

const POSITIVE_THRESHOLD: f64 = 0.05;
const NEGATIVE_THRESHOLD: f64 = -0.05;

/// Maps an externally computed polarity score in [-1, 1] to a label.
///
/// | polarity        | label    |
/// |-----------------|----------|
/// | >= 0.05         | Positive |
/// | <= -0.05        | Negative |
/// | otherwise       | Neutral  |
///
/// NaN falls through to `Neutral`.
pub fn classify(polarity: f64) -> Sentiment {
    if polarity >= POSITIVE_THRESHOLD {
        Sentiment::Positive
    } else if polarity <= NEGATIVE_THRESHOLD {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}
