//! Emotion fusion
//!
//! Combines the primary model with the GoEmotions primary-worthy labels into
//! one emotion plus its source, and derives the coarse intensity bucket.

use tracing::debug;

use crate::labels::{Emotion, Label};
use crate::models::{
    ClassifierReadings, EmotionSource, FusedAnalysis, Intensity, MessageAnalysis, PrimaryReading,
    SecondaryReading,
};

/// GoEmotions must be strictly above this to beat the primary model.
pub const SECONDARY_OVERRIDE_THRESHOLD: f64 = 0.70;

// Last-resort word lists, checked in this order. Known to misfire on
// negation ("no estoy triste") and sarcasm.
const KEYWORD_RULES: &[(Emotion, &[&str])] = &[
    (
        Emotion::Sadness,
        &[
            "triste", "tristeza", "llorar", "llorando", "deprimido", "deprimida", "sad", "crying",
            "lonely",
        ],
    ),
    (
        Emotion::Fear,
        &[
            "miedo", "asustado", "asustada", "ansiedad", "ansioso", "ansiosa", "scared", "afraid",
            "anxious",
        ],
    ),
    (
        Emotion::Anger,
        &["enojado", "enojada", "furioso", "furiosa", "rabia", "odio", "angry", "furious"],
    ),
    (
        Emotion::Joy,
        &["feliz", "contento", "contenta", "alegre", "happy", "glad"],
    ),
];

pub fn fuse(primary: &PrimaryReading, secondary: &SecondaryReading) -> (Emotion, EmotionSource) {
    if let Some((label, score)) = secondary.dominant_primary() {
        if score > SECONDARY_OVERRIDE_THRESHOLD {
            if let Some(emotion) = label.as_fused() {
                debug!(emotion = %emotion, score, "secondary model wins fusion");
                return (emotion, EmotionSource::SecondaryModel);
            }
        }
    }

    debug!(
        emotion = %primary.dominant,
        confidence = primary.confidence,
        "primary model wins fusion"
    );
    (Emotion::from(primary.dominant), EmotionSource::PrimaryModel)
}

// Far below the 4-decimal score precision, far above float averaging error.
const AVERAGE_TOLERANCE: f64 = 1e-9;

/// Averages the three confidences and buckets the result. An average that
/// sits exactly on a bucket boundary lands in the upper bucket.
pub fn intensity(
    primary_confidence: f64,
    sentiment_confidence: f64,
    secondary_score: f64,
) -> Intensity {
    let average = (primary_confidence + sentiment_confidence + secondary_score) / 3.0;
    Intensity::from_average(average + AVERAGE_TOLERANCE)
}

/// Keyword match over the raw text. Only consulted when the primary model
/// produced nothing but its catch-all default.
pub fn keyword_heuristic(text: &str) -> Option<Emotion> {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    KEYWORD_RULES
        .iter()
        .find(|(_, keywords)| words.iter().any(|w| keywords.contains(w)))
        .map(|(emotion, _)| *emotion)
}

/// Full fused reading for one message.
pub fn analyze(text: &str, readings: ClassifierReadings) -> MessageAnalysis {
    let (mut primary_emotion, mut source) = fuse(&readings.primary, &readings.secondary);

    if source == EmotionSource::PrimaryModel && readings.primary.is_fallback() {
        if let Some(emotion) = keyword_heuristic(text) {
            debug!(emotion = %emotion, "primary model gave no signal, using keyword heuristic");
            primary_emotion = emotion;
            source = EmotionSource::Heuristic;
        }
    }

    let secondary_score = readings
        .secondary
        .dominant_primary()
        .map(|(_, score)| score)
        .unwrap_or(0.0);
    let intensity = intensity(
        readings.primary.confidence,
        readings.sentiment.confidence,
        secondary_score,
    );

    let fused = FusedAnalysis {
        primary_emotion,
        primary_emotion_source: source,
        intensity,
        secondary_emotions: readings.secondary.secondary.clone(),
        sentiment: readings.sentiment.dominant,
        sentiment_scores: readings.sentiment.scores.clone(),
    };

    debug_assert!(Emotion::ALL.contains(&fused.primary_emotion));
    MessageAnalysis { readings, fused }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::{PrimaryEmotion, ScoreSet, SecondaryEmotion, Sentiment};
    use crate::models::SentimentReading;

    fn primary(pairs: &[(PrimaryEmotion, f64)]) -> PrimaryReading {
        PrimaryReading::from_scores(ScoreSet::from_pairs(pairs.iter().copied()))
    }

    fn secondary(worthy: &[(SecondaryEmotion, f64)]) -> SecondaryReading {
        SecondaryReading {
            primary_worthy: ScoreSet::from_pairs(worthy.iter().copied()),
            secondary: ScoreSet::from_pairs([(SecondaryEmotion::Curiosity, 0.2)]),
        }
    }

    fn sentiment(negative: f64, neutral: f64, positive: f64) -> SentimentReading {
        SentimentReading::from_scores(ScoreSet::from_pairs([
            (Sentiment::Negative, negative),
            (Sentiment::Neutral, neutral),
            (Sentiment::Positive, positive),
        ]))
    }

    #[test]
    fn confident_secondary_label_overrides_any_primary_output() {
        let worthy = secondary(&[
            (SecondaryEmotion::Gratitude, 0.85),
            (SecondaryEmotion::Pride, 0.1),
        ]);
        for dominant in PrimaryEmotion::ALL {
            let reading = primary(&[(*dominant, 0.99)]);
            assert_eq!(
                fuse(&reading, &worthy),
                (Emotion::Gratitude, EmotionSource::SecondaryModel)
            );
        }
    }

    #[test]
    fn secondary_must_be_strictly_above_threshold() {
        let reading = primary(&[(PrimaryEmotion::Joy, 0.6)]);
        let at_threshold = secondary(&[(SecondaryEmotion::Pride, 0.70)]);
        let above = secondary(&[(SecondaryEmotion::Pride, 0.7001)]);
        assert_eq!(fuse(&reading, &at_threshold), (Emotion::Joy, EmotionSource::PrimaryModel));
        assert_eq!(fuse(&reading, &above), (Emotion::Pride, EmotionSource::SecondaryModel));
    }

    #[test]
    fn tied_primary_worthy_scores_prefer_gratitude() {
        let reading = primary(&[(PrimaryEmotion::Joy, 0.6)]);
        let tied = secondary(&[(SecondaryEmotion::Pride, 0.9), (SecondaryEmotion::Gratitude, 0.9)]);
        assert_eq!(fuse(&reading, &tied).0, Emotion::Gratitude);
    }

    #[test]
    fn missing_secondary_signal_keeps_primary() {
        let reading = primary(&[(PrimaryEmotion::Anger, 0.5), (PrimaryEmotion::Fear, 0.5)]);
        assert_eq!(
            fuse(&reading, &SecondaryReading::fallback()),
            (Emotion::Anger, EmotionSource::PrimaryModel)
        );
    }

    #[test]
    fn intensity_averages_three_confidences() {
        assert_eq!(intensity(0.9, 0.9, 0.9), Intensity::High);
        assert_eq!(intensity(0.9, 0.8, 0.0), Intensity::Medium);
        assert_eq!(intensity(0.3, 0.3, 0.0), Intensity::Low);
        assert_eq!(intensity(0.0, 0.0, 0.0), Intensity::Low);
    }

    #[test]
    fn intensity_boundaries_survive_float_averaging() {
        assert_eq!(intensity(0.7, 0.7, 0.7), Intensity::High);
        assert_eq!(intensity(0.4, 0.4, 0.4), Intensity::Medium);
        assert_eq!(intensity(0.9, 0.8, 0.4), Intensity::High);
        assert_eq!(intensity(0.6999, 0.7, 0.7), Intensity::Medium);
    }

    #[test]
    fn analyze_fills_every_field() {
        let readings = ClassifierReadings {
            primary: primary(&[(PrimaryEmotion::Sadness, 0.8), (PrimaryEmotion::Joy, 0.1)]),
            secondary: secondary(&[(SecondaryEmotion::Gratitude, 0.3)]),
            sentiment: sentiment(0.9, 0.05, 0.05),
        };
        let analysis = analyze("me siento mal", readings);
        let fused = &analysis.fused;
        assert_eq!(fused.primary_emotion, Emotion::Sadness);
        assert_eq!(fused.primary_emotion_source, EmotionSource::PrimaryModel);
        // (0.8 + 0.9 + 0.3) / 3
        assert_eq!(fused.intensity, Intensity::Medium);
        assert_eq!(fused.sentiment, Sentiment::Negative);
        assert_eq!(fused.secondary_emotions.get(SecondaryEmotion::Curiosity), 0.2);
    }

    #[test]
    fn heuristic_only_runs_without_primary_signal() {
        let no_signal = ClassifierReadings {
            primary: PrimaryReading::fallback(),
            secondary: SecondaryReading::fallback(),
            sentiment: SentimentReading::fallback(),
        };
        let analysis = analyze("Hoy estoy muy triste.", no_signal.clone());
        assert_eq!(analysis.fused.primary_emotion, Emotion::Sadness);
        assert_eq!(analysis.fused.primary_emotion_source, EmotionSource::Heuristic);
        assert_eq!(analysis.fused.intensity, Intensity::Low);

        let unmatched = analyze("nada que decir", no_signal);
        assert_eq!(unmatched.fused.primary_emotion, Emotion::Others);
        assert_eq!(unmatched.fused.primary_emotion_source, EmotionSource::PrimaryModel);

        let with_signal = ClassifierReadings {
            primary: primary(&[(PrimaryEmotion::Joy, 0.6)]),
            secondary: SecondaryReading::fallback(),
            sentiment: SentimentReading::fallback(),
        };
        let analysis = analyze("estoy triste", with_signal);
        assert_eq!(analysis.fused.primary_emotion, Emotion::Joy);
    }

    #[test]
    fn heuristic_matches_whole_words_in_order() {
        assert_eq!(keyword_heuristic("I'm SCARED and angry"), Some(Emotion::Fear));
        assert_eq!(keyword_heuristic("gladiator movie"), None);
        assert_eq!(keyword_heuristic(""), None);
    }
}
