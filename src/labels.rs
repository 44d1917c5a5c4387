use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A closed label vocabulary for one classifier.
///
/// Declaration order of the variants is the canonical enumeration order, so
/// the derived `Ord` doubles as the tie-break order.
pub trait Label: Copy + Ord + Eq + fmt::Debug + Send + Sync + 'static {
    const ALL: &'static [Self];
    const CATCH_ALL: Self;

    fn as_str(self) -> &'static str;

    /// Maps a raw service label onto the vocabulary. Unknown labels return
    /// `None` and are dropped by the caller.
    fn from_label(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|label| label.as_str().eq_ignore_ascii_case(raw))
    }
}

/// Output labels of the 7-class primary emotion model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryEmotion {
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Disgust,
    Others,
}

impl Label for PrimaryEmotion {
    const ALL: &'static [Self] = &[
        Self::Joy,
        Self::Sadness,
        Self::Anger,
        Self::Fear,
        Self::Surprise,
        Self::Disgust,
        Self::Others,
    ];
    const CATCH_ALL: Self = Self::Others;

    fn as_str(self) -> &'static str {
        match self {
            Self::Joy => "joy",
            Self::Sadness => "sadness",
            Self::Anger => "anger",
            Self::Fear => "fear",
            Self::Surprise => "surprise",
            Self::Disgust => "disgust",
            Self::Others => "others",
        }
    }
}

/// Which part of the secondary vocabulary a label belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondaryGroup {
    PrimaryWorthy,
    Secondary,
    Ignored,
}

/// Output labels of the 28-way GoEmotions model (27 emotions plus neutral).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondaryEmotion {
    Gratitude,
    Pride,
    Admiration,
    Amusement,
    Approval,
    Caring,
    Confusion,
    Curiosity,
    Desire,
    Disappointment,
    Disapproval,
    Embarrassment,
    Excitement,
    Grief,
    Love,
    Nervousness,
    Optimism,
    Relief,
    Remorse,
    Neutral,
    Realization,
    Anger,
    Annoyance,
    Disgust,
    Fear,
    Joy,
    Sadness,
    Surprise,
}

impl SecondaryEmotion {
    pub fn group(self) -> SecondaryGroup {
        match self {
            Self::Gratitude | Self::Pride => SecondaryGroup::PrimaryWorthy,
            Self::Anger
            | Self::Annoyance
            | Self::Disgust
            | Self::Fear
            | Self::Joy
            | Self::Sadness
            | Self::Surprise => SecondaryGroup::Ignored,
            _ => SecondaryGroup::Secondary,
        }
    }

    /// The fused label for a primary-worthy secondary label.
    pub fn as_fused(self) -> Option<Emotion> {
        match self {
            Self::Gratitude => Some(Emotion::Gratitude),
            Self::Pride => Some(Emotion::Pride),
            _ => None,
        }
    }
}

impl Label for SecondaryEmotion {
    const ALL: &'static [Self] = &[
        Self::Gratitude,
        Self::Pride,
        Self::Admiration,
        Self::Amusement,
        Self::Approval,
        Self::Caring,
        Self::Confusion,
        Self::Curiosity,
        Self::Desire,
        Self::Disappointment,
        Self::Disapproval,
        Self::Embarrassment,
        Self::Excitement,
        Self::Grief,
        Self::Love,
        Self::Nervousness,
        Self::Optimism,
        Self::Relief,
        Self::Remorse,
        Self::Neutral,
        Self::Realization,
        Self::Anger,
        Self::Annoyance,
        Self::Disgust,
        Self::Fear,
        Self::Joy,
        Self::Sadness,
        Self::Surprise,
    ];
    const CATCH_ALL: Self = Self::Neutral;

    fn as_str(self) -> &'static str {
        match self {
            Self::Gratitude => "gratitude",
            Self::Pride => "pride",
            Self::Admiration => "admiration",
            Self::Amusement => "amusement",
            Self::Approval => "approval",
            Self::Caring => "caring",
            Self::Confusion => "confusion",
            Self::Curiosity => "curiosity",
            Self::Desire => "desire",
            Self::Disappointment => "disappointment",
            Self::Disapproval => "disapproval",
            Self::Embarrassment => "embarrassment",
            Self::Excitement => "excitement",
            Self::Grief => "grief",
            Self::Love => "love",
            Self::Nervousness => "nervousness",
            Self::Optimism => "optimism",
            Self::Relief => "relief",
            Self::Remorse => "remorse",
            Self::Neutral => "neutral",
            Self::Realization => "realization",
            Self::Anger => "anger",
            Self::Annoyance => "annoyance",
            Self::Disgust => "disgust",
            Self::Fear => "fear",
            Self::Joy => "joy",
            Self::Sadness => "sadness",
            Self::Surprise => "surprise",
        }
    }
}

/// Sentiment polarity. Declaration order is the dominance tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Label for Sentiment {
    const ALL: &'static [Self] = &[Self::Positive, Self::Negative, Self::Neutral];
    const CATCH_ALL: Self = Self::Neutral;

    fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }

    fn from_label(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "POS" | "POSITIVE" => Some(Self::Positive),
            "NEG" | "NEGATIVE" => Some(Self::Negative),
            "NEU" | "NEUTRAL" => Some(Self::Neutral),
            _ => None,
        }
    }
}

/// The fused vocabulary: every label a `FusedAnalysis` can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Disgust,
    Others,
    Gratitude,
    Pride,
}

impl Emotion {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Joy => "Joy",
            Self::Sadness => "Sadness",
            Self::Anger => "Anger",
            Self::Fear => "Fear",
            Self::Surprise => "Surprise",
            Self::Disgust => "Disgust",
            Self::Others => "Neutral",
            Self::Gratitude => "Gratitude",
            Self::Pride => "Pride",
        }
    }

    /// Emotions that open the support gate.
    pub fn is_negative(self) -> bool {
        matches!(
            self,
            Self::Sadness | Self::Fear | Self::Anger | Self::Disgust
        )
    }
}

impl Label for Emotion {
    const ALL: &'static [Self] = &[
        Self::Joy,
        Self::Sadness,
        Self::Anger,
        Self::Fear,
        Self::Surprise,
        Self::Disgust,
        Self::Others,
        Self::Gratitude,
        Self::Pride,
    ];
    const CATCH_ALL: Self = Self::Others;

    fn as_str(self) -> &'static str {
        match self {
            Self::Joy => "joy",
            Self::Sadness => "sadness",
            Self::Anger => "anger",
            Self::Fear => "fear",
            Self::Surprise => "surprise",
            Self::Disgust => "disgust",
            Self::Others => "others",
            Self::Gratitude => "gratitude",
            Self::Pride => "pride",
        }
    }
}

impl From<PrimaryEmotion> for Emotion {
    fn from(label: PrimaryEmotion) -> Self {
        match label {
            PrimaryEmotion::Joy => Self::Joy,
            PrimaryEmotion::Sadness => Self::Sadness,
            PrimaryEmotion::Anger => Self::Anger,
            PrimaryEmotion::Fear => Self::Fear,
            PrimaryEmotion::Surprise => Self::Surprise,
            PrimaryEmotion::Disgust => Self::Disgust,
            PrimaryEmotion::Others => Self::Others,
        }
    }
}

macro_rules! impl_display_as_label {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

impl_display_as_label!(PrimaryEmotion, SecondaryEmotion, Sentiment, Emotion);

/// Label → score mapping for one classifier output. Scores are clamped to
/// `[0, 1]` and need not sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreSet<L: Label> {
    scores: BTreeMap<L, f64>,
}

impl<L: Label> Default for ScoreSet<L> {
    fn default() -> Self {
        Self {
            scores: BTreeMap::new(),
        }
    }
}

impl<L: Label> ScoreSet<L> {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (L, f64)>) -> Self {
        let scores = pairs
            .into_iter()
            .map(|(label, score)| (label, clamp_score(score)))
            .collect();
        Self { scores }
    }

    /// Every label at zero except the catch-all at 1.0.
    pub fn catch_all() -> Self {
        Self::from_pairs(L::ALL.iter().map(|&label| {
            let score = if label == L::CATCH_ALL { 1.0 } else { 0.0 };
            (label, score)
        }))
    }

    pub fn get(&self, label: L) -> f64 {
        self.scores.get(&label).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (L, f64)> + '_ {
        self.scores.iter().map(|(label, score)| (*label, *score))
    }

    /// Highest score; exact ties go to the label that comes first in the
    /// canonical order.
    pub fn top(&self) -> Option<(L, f64)> {
        let mut best: Option<(L, f64)> = None;
        for (label, score) in self.iter() {
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((label, score)),
            }
        }
        best
    }

    pub fn filter(&self, mut keep: impl FnMut(L, f64) -> bool) -> Self {
        Self {
            scores: self
                .iter()
                .filter(|(label, score)| keep(*label, *score))
                .collect(),
        }
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_labels_are_rejected() {
        assert_eq!(
            PrimaryEmotion::from_label("sadness"),
            Some(PrimaryEmotion::Sadness)
        );
        assert_eq!(PrimaryEmotion::from_label(" Joy "), Some(PrimaryEmotion::Joy));
        assert_eq!(PrimaryEmotion::from_label("sadnes"), None);
        assert_eq!(
            SecondaryEmotion::from_label("gratitude"),
            Some(SecondaryEmotion::Gratitude)
        );
        assert_eq!(SecondaryEmotion::from_label("boredom"), None);
    }

    #[test]
    fn sentiment_accepts_wire_abbreviations() {
        assert_eq!(Sentiment::from_label("POS"), Some(Sentiment::Positive));
        assert_eq!(Sentiment::from_label("neg"), Some(Sentiment::Negative));
        assert_eq!(Sentiment::from_label("NEU"), Some(Sentiment::Neutral));
        assert_eq!(Sentiment::from_label("mixed"), None);
    }

    #[test]
    fn secondary_vocabulary_partitions() {
        let worthy: Vec<_> = SecondaryEmotion::ALL
            .iter()
            .filter(|l| l.group() == SecondaryGroup::PrimaryWorthy)
            .collect();
        let secondary = SecondaryEmotion::ALL
            .iter()
            .filter(|l| l.group() == SecondaryGroup::Secondary)
            .count();
        assert_eq!(worthy, vec![&SecondaryEmotion::Gratitude, &SecondaryEmotion::Pride]);
        assert_eq!(secondary, 19);
        assert_eq!(SecondaryEmotion::ALL.len(), 28);
    }

    #[test]
    fn top_breaks_exact_ties_in_canonical_order() {
        let scores = ScoreSet::from_pairs([
            (PrimaryEmotion::Fear, 0.4),
            (PrimaryEmotion::Sadness, 0.4),
            (PrimaryEmotion::Joy, 0.2),
        ]);
        assert_eq!(scores.top(), Some((PrimaryEmotion::Sadness, 0.4)));
    }

    #[test]
    fn scores_are_clamped() {
        let scores = ScoreSet::from_pairs([
            (Sentiment::Positive, 1.4),
            (Sentiment::Negative, -0.2),
            (Sentiment::Neutral, f64::NAN),
        ]);
        assert_eq!(scores.get(Sentiment::Positive), 1.0);
        assert_eq!(scores.get(Sentiment::Negative), 0.0);
        assert_eq!(scores.get(Sentiment::Neutral), 0.0);
    }

    #[test]
    fn catch_all_defaults() {
        let scores = ScoreSet::<PrimaryEmotion>::catch_all();
        assert_eq!(scores.len(), 7);
        assert_eq!(scores.top(), Some((PrimaryEmotion::Others, 1.0)));
    }

    #[test]
    fn score_sets_serialize_as_label_maps() {
        let scores = ScoreSet::from_pairs([(Sentiment::Negative, 0.8), (Sentiment::Positive, 0.1)]);
        let json = serde_json::to_string(&scores).unwrap();
        assert_eq!(json, r#"{"positive":0.1,"negative":0.8}"#);
        let back: ScoreSet<Sentiment> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scores);
    }
}
