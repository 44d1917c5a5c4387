use std::collections::BTreeMap;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::labels::{Emotion, Label, PrimaryEmotion, ScoreSet, SecondaryEmotion, Sentiment};

/// Normalized output of the 7-class primary emotion model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryReading {
    pub scores: ScoreSet<PrimaryEmotion>,
    pub dominant: PrimaryEmotion,
    pub confidence: f64,
}

impl PrimaryReading {
    pub fn from_scores(scores: ScoreSet<PrimaryEmotion>) -> Self {
        match scores.top() {
            Some((dominant, confidence)) => Self {
                scores,
                dominant,
                confidence,
            },
            None => Self::fallback(),
        }
    }

    pub fn fallback() -> Self {
        Self {
            scores: ScoreSet::catch_all(),
            dominant: PrimaryEmotion::CATCH_ALL,
            confidence: 0.0,
        }
    }

    /// True when the model gave nothing beyond its catch-all default.
    pub fn is_fallback(&self) -> bool {
        self.dominant == PrimaryEmotion::CATCH_ALL && self.confidence == 0.0
    }
}

/// Normalized output of the GoEmotions model, split by label group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryReading {
    pub primary_worthy: ScoreSet<SecondaryEmotion>,
    pub secondary: ScoreSet<SecondaryEmotion>,
}

impl SecondaryReading {
    pub fn fallback() -> Self {
        Self {
            primary_worthy: ScoreSet::default(),
            secondary: ScoreSet::from_pairs([(SecondaryEmotion::CATCH_ALL, 1.0)]),
        }
    }

    /// Best primary-worthy label and its score.
    pub fn dominant_primary(&self) -> Option<(SecondaryEmotion, f64)> {
        self.primary_worthy.top()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentReading {
    pub scores: ScoreSet<Sentiment>,
    pub dominant: Sentiment,
    pub confidence: f64,
}

impl SentimentReading {
    pub fn from_scores(scores: ScoreSet<Sentiment>) -> Self {
        match scores.top() {
            Some((dominant, confidence)) => Self {
                scores,
                dominant,
                confidence,
            },
            None => Self::fallback(),
        }
    }

    pub fn fallback() -> Self {
        Self {
            scores: ScoreSet::catch_all(),
            dominant: Sentiment::CATCH_ALL,
            confidence: 0.0,
        }
    }

    pub fn negative_score(&self) -> f64 {
        self.scores.get(Sentiment::Negative)
    }
}

/// Raw readings of all three classifiers for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierReadings {
    pub primary: PrimaryReading,
    pub secondary: SecondaryReading,
    pub sentiment: SentimentReading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionSource {
    PrimaryModel,
    SecondaryModel,
    Heuristic,
}

impl EmotionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PrimaryModel => "primary_model",
            Self::SecondaryModel => "secondary_model",
            Self::Heuristic => "heuristic",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "primary_model" => Some(Self::PrimaryModel),
            "secondary_model" => Some(Self::SecondaryModel),
            "heuristic" => Some(Self::Heuristic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intensity {
    Low,
    Medium,
    High,
}

impl Intensity {
    /// Coarse three-bucket mapping of an averaged confidence.
    pub fn from_average(avg: f64) -> Self {
        if avg >= 0.70 {
            Self::High
        } else if avg >= 0.40 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// The fused reading attached to a user message at ingestion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedAnalysis {
    pub primary_emotion: Emotion,
    pub primary_emotion_source: EmotionSource,
    pub intensity: Intensity,
    pub secondary_emotions: ScoreSet<SecondaryEmotion>,
    pub sentiment: Sentiment,
    pub sentiment_scores: ScoreSet<Sentiment>,
}

impl FusedAnalysis {
    pub fn negative_score(&self) -> f64 {
        self.sentiment_scores.get(Sentiment::Negative)
    }

    /// Secondary emotions at or above the 10% display floor.
    pub fn notable_secondary(&self) -> ScoreSet<SecondaryEmotion> {
        self.secondary_emotions.filter(|_, score| score >= 0.10)
    }
}

/// Everything computed for one user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageAnalysis {
    pub readings: ClassifierReadings,
    pub fused: FusedAnalysis,
}

/// Column form of a `MessageAnalysis` as stored on the message row.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisColumns {
    pub dominant_emotion: String,
    pub primary_emotion: String,
    pub primary_emotion_source: String,
    pub intensity: String,
    pub sentiment: String,
    pub primary_scores: serde_json::Value,
    pub secondary_primary_scores: serde_json::Value,
    pub secondary_emotions: serde_json::Value,
    pub sentiment_scores: serde_json::Value,
}

impl AnalysisColumns {
    pub fn from_analysis(analysis: &MessageAnalysis) -> anyhow::Result<Self> {
        let readings = &analysis.readings;
        let fused = &analysis.fused;
        Ok(Self {
            dominant_emotion: readings.primary.dominant.as_str().to_string(),
            primary_emotion: fused.primary_emotion.as_str().to_string(),
            primary_emotion_source: fused.primary_emotion_source.as_str().to_string(),
            intensity: fused.intensity.as_str().to_string(),
            sentiment: fused.sentiment.as_str().to_string(),
            primary_scores: serde_json::to_value(&readings.primary.scores)?,
            secondary_primary_scores: serde_json::to_value(&readings.secondary.primary_worthy)?,
            secondary_emotions: serde_json::to_value(&fused.secondary_emotions)?,
            sentiment_scores: serde_json::to_value(&fused.sentiment_scores)?,
        })
    }

    pub fn to_fused(&self) -> anyhow::Result<FusedAnalysis> {
        Ok(FusedAnalysis {
            primary_emotion: Emotion::from_label(&self.primary_emotion)
                .with_context(|| format!("unknown stored emotion {}", self.primary_emotion))?,
            primary_emotion_source: EmotionSource::parse(&self.primary_emotion_source)
                .with_context(|| format!("unknown stored source {}", self.primary_emotion_source))?,
            intensity: Intensity::parse(&self.intensity)
                .with_context(|| format!("unknown stored intensity {}", self.intensity))?,
            secondary_emotions: serde_json::from_value(self.secondary_emotions.clone())?,
            sentiment: Sentiment::from_label(&self.sentiment)
                .with_context(|| format!("unknown stored sentiment {}", self.sentiment))?,
            sentiment_scores: serde_json::from_value(self.sentiment_scores.clone())?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Bot => "bot",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Course {
    pub id: Uuid,
    pub code: String,
    pub name: String,
}

/// A message row as read back for course aggregation.
#[derive(Debug, Clone)]
pub struct CourseMessage {
    pub student_id: Uuid,
    pub sender: Sender,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub primary_emotion: Option<Emotion>,
    pub sentiment: Option<Sentiment>,
}

/// One turn of conversation history.
#[derive(Debug, Clone)]
pub struct HistoryTurn {
    pub sender: Sender,
    pub text: String,
    pub sentiment: Option<Sentiment>,
}

/// A stored conversation message with its reloaded analysis.
#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub sender: Sender,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub analysis: Option<FusedAnalysis>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSample {
    pub text: String,
    pub primary_emotion: Emotion,
    pub sentiment: Option<Sentiment>,
}

/// Per-course emotional snapshot over a trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseStats {
    pub time_window_days: i64,
    pub total_messages: usize,
    pub active_students: usize,
    pub emotion_counts: BTreeMap<Emotion, usize>,
    pub emotion_ratios: BTreeMap<Emotion, f64>,
    pub sentiment_counts: BTreeMap<Sentiment, usize>,
    pub recent_samples: Vec<MessageSample>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    Threshold,
    Dominant,
}

impl TriggerReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Threshold => "threshold",
            Self::Dominant => "dominant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerDecision {
    pub emotion: Emotion,
    pub ratio: f64,
    pub reason: TriggerReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub activity: String,
    #[serde(default)]
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationContent {
    pub overview: String,
    pub suggestions: Vec<Suggestion>,
    pub disclaimer: String,
    #[serde(default)]
    pub is_fallback: bool,
}

/// Append-only course alert with the stats that caused it.
#[derive(Debug, Clone, Serialize)]
pub struct CourseEmotionTrigger {
    pub id: Uuid,
    pub course_id: Uuid,
    pub triggered_emotion: Emotion,
    pub ratio: f64,
    pub reason: TriggerReason,
    pub time_window_days: i64,
    pub stats_snapshot: CourseStats,
    pub content: RecommendationContent,
    pub requested_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Trigger row as listed in reports.
#[derive(Debug, Clone)]
pub struct TriggerSummary {
    pub triggered_emotion: String,
    pub ratio: f64,
    pub reason: String,
    pub time_window_days: i32,
    pub overview: String,
    pub is_fallback: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technique {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceBundle {
    pub techniques: Vec<Technique>,
    pub supportive_message: String,
    #[serde(default)]
    pub educational_insight: String,
    #[serde(default)]
    pub is_fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecentPattern {
    pub negative_count: usize,
    pub pattern_detected: bool,
    pub total_analyzed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SupportDecision {
    pub requires_support: bool,
    pub pattern: RecentPattern,
    pub resources: Option<ResourceBundle>,
    pub generated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_analysis() -> MessageAnalysis {
        let primary = PrimaryReading::from_scores(ScoreSet::from_pairs([
            (PrimaryEmotion::Sadness, 0.81),
            (PrimaryEmotion::Joy, 0.05),
        ]));
        let sentiment = SentimentReading::from_scores(ScoreSet::from_pairs([
            (Sentiment::Negative, 0.74),
            (Sentiment::Neutral, 0.2),
            (Sentiment::Positive, 0.06),
        ]));
        let secondary = SecondaryReading {
            primary_worthy: ScoreSet::from_pairs([(SecondaryEmotion::Gratitude, 0.02)]),
            secondary: ScoreSet::from_pairs([
                (SecondaryEmotion::Disappointment, 0.42),
                (SecondaryEmotion::Relief, 0.03),
            ]),
        };
        let fused = FusedAnalysis {
            primary_emotion: Emotion::Sadness,
            primary_emotion_source: EmotionSource::PrimaryModel,
            intensity: Intensity::Medium,
            secondary_emotions: secondary.secondary.clone(),
            sentiment: sentiment.dominant,
            sentiment_scores: sentiment.scores.clone(),
        };
        MessageAnalysis {
            readings: ClassifierReadings {
                primary,
                secondary,
                sentiment,
            },
            fused,
        }
    }

    #[test]
    fn intensity_buckets_at_boundaries() {
        assert_eq!(Intensity::from_average(0.39), Intensity::Low);
        assert_eq!(Intensity::from_average(0.40), Intensity::Medium);
        assert_eq!(Intensity::from_average(0.69), Intensity::Medium);
        assert_eq!(Intensity::from_average(0.70), Intensity::High);
        assert_eq!(Intensity::from_average(0.71), Intensity::High);
    }

    #[test]
    fn stored_columns_reload_the_same_analysis() {
        let analysis = sample_analysis();
        let columns = AnalysisColumns::from_analysis(&analysis).unwrap();
        assert_eq!(columns.primary_emotion, "sadness");
        assert_eq!(columns.primary_emotion_source, "primary_model");
        assert_eq!(columns.dominant_emotion, "sadness");

        let reloaded = columns.to_fused().unwrap();
        assert_eq!(reloaded.primary_emotion, analysis.fused.primary_emotion);
        assert_eq!(reloaded.primary_emotion_source, analysis.fused.primary_emotion_source);
        assert_eq!(reloaded.intensity, analysis.fused.intensity);
        assert_eq!(reloaded, analysis.fused);
    }

    #[test]
    fn stored_columns_reject_unknown_labels() {
        let mut columns = AnalysisColumns::from_analysis(&sample_analysis()).unwrap();
        columns.intensity = "extreme".to_string();
        assert!(columns.to_fused().is_err());
    }

    #[test]
    fn notable_secondary_applies_ten_percent_floor() {
        let analysis = sample_analysis();
        let notable = analysis.fused.notable_secondary();
        assert_eq!(notable.len(), 1);
        assert_eq!(notable.get(SecondaryEmotion::Disappointment), 0.42);
    }

    #[test]
    fn fallback_readings_are_detectable() {
        assert!(PrimaryReading::fallback().is_fallback());
        let reading =
            PrimaryReading::from_scores(ScoreSet::from_pairs([(PrimaryEmotion::Others, 0.9)]));
        assert!(!reading.is_fallback());
        assert_eq!(SentimentReading::fallback().dominant, Sentiment::Neutral);
        assert_eq!(SentimentReading::fallback().confidence, 0.0);
    }
}
