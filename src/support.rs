//! Support-resource policy
//!
//! Decides from a fused analysis whether a student should be offered
//! self-help resources, and produces those resources. The gate is four
//! ordered rules; the recent-pattern signal is advisory and only shapes the
//! tone of the generated content.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use crate::generator::{parse_json_reply, TextGenerator};
use crate::labels::{Label, Sentiment};
use crate::models::{
    FusedAnalysis, Intensity, RecentPattern, ResourceBundle, SupportDecision, Technique,
};

const MEDIUM_NEGATIVE_FLOOR: f64 = 0.60;
const NEGATIVE_SENTIMENT_FLOOR: f64 = 0.70;
const PATTERN_WINDOW: usize = 5;
const PATTERN_MIN_NEGATIVE: usize = 3;

/// The four-rule support gate, first match wins.
pub fn requires_support(analysis: &FusedAnalysis) -> bool {
    let negative_emotion = analysis.primary_emotion.is_negative();
    let negative_score = analysis.negative_score();

    if negative_emotion && analysis.intensity == Intensity::High {
        return true;
    }
    if negative_emotion
        && analysis.intensity == Intensity::Medium
        && negative_score > MEDIUM_NEGATIVE_FLOOR
    {
        return true;
    }
    negative_score > NEGATIVE_SENTIMENT_FLOOR
}

/// Counts negative sentiment across the newest five user messages.
/// `recent` is ordered newest first.
pub fn analyze_recent_pattern(recent: &[Option<Sentiment>]) -> RecentPattern {
    let window = &recent[..recent.len().min(PATTERN_WINDOW)];
    let negative_count = window
        .iter()
        .filter(|sentiment| **sentiment == Some(Sentiment::Negative))
        .count();

    RecentPattern {
        negative_count,
        pattern_detected: negative_count >= PATTERN_MIN_NEGATIVE,
        total_analyzed: window.len(),
    }
}

/// The fixed bundle used whenever generation fails. Deterministic: the same
/// emotion always yields byte-identical content.
pub fn fallback_resources(emotion_name: &str) -> ResourceBundle {
    let emotion = emotion_name.to_lowercase();
    ResourceBundle {
        techniques: vec![
            Technique {
                kind: "breathing".to_string(),
                title: "4-7-8 breathing".to_string(),
                steps: vec![
                    "Breathe in slowly through your nose while counting to 4".to_string(),
                    "Hold your breath while counting to 7".to_string(),
                    "Breathe out completely through your mouth while counting to 8".to_string(),
                    "Repeat 3 or 4 times".to_string(),
                ],
                duration: "2-3 minutes".to_string(),
            },
            Technique {
                kind: "grounding".to_string(),
                title: "5-4-3-2-1 grounding".to_string(),
                steps: vec![
                    "Name 5 things you can SEE".to_string(),
                    "Name 4 things you can TOUCH".to_string(),
                    "Name 3 things you can HEAR".to_string(),
                    "Name 2 things you can SMELL".to_string(),
                    "Name 1 thing you can TASTE".to_string(),
                ],
                duration: "3-5 minutes".to_string(),
            },
        ],
        supportive_message: format!(
            "It sounds like you are feeling {emotion}. It is completely valid to feel this way. \
             These techniques can help you handle what you are feeling right now."
        ),
        educational_insight: format!(
            "{} is a natural emotion that helps us process difficult situations. \
             Recognizing it is the first step.",
            capitalize(&emotion)
        ),
        is_fallback: true,
    }
}

#[derive(Deserialize)]
struct GeneratedResources {
    techniques: Vec<Technique>,
    supportive_message: String,
    #[serde(default)]
    educational_insight: String,
}

pub struct SupportAdvisor {
    generator: Arc<dyn TextGenerator>,
}

impl SupportAdvisor {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Runs the gate and, when it fires, produces resources. Content is never
    /// empty when `requires_support` is true.
    pub async fn evaluate(
        &self,
        text: &str,
        analysis: &FusedAnalysis,
        recent: &[Option<Sentiment>],
    ) -> SupportDecision {
        let pattern = analyze_recent_pattern(recent);
        if !requires_support(analysis) {
            return SupportDecision {
                requires_support: false,
                pattern,
                resources: None,
                generated_at: None,
            };
        }

        info!(
            emotion = %analysis.primary_emotion,
            intensity = analysis.intensity.as_str(),
            negative = analysis.negative_score(),
            pattern_detected = pattern.pattern_detected,
            "support gate fired"
        );
        let resources = self.generate_resources(text, analysis, &pattern).await;
        SupportDecision {
            requires_support: true,
            pattern,
            resources: Some(resources),
            generated_at: Some(Utc::now()),
        }
    }

    pub async fn generate_resources(
        &self,
        text: &str,
        analysis: &FusedAnalysis,
        pattern: &RecentPattern,
    ) -> ResourceBundle {
        let emotion_name = analysis.primary_emotion.display_name();
        let prompt = build_prompt(text, analysis, pattern);

        let raw = match self.generator.generate(&prompt).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "support generator unavailable, using fallback resources");
                return fallback_resources(emotion_name);
            }
        };

        match parse_json_reply::<GeneratedResources>(&raw) {
            Ok(generated)
                if !generated.techniques.is_empty()
                    && !generated.supportive_message.trim().is_empty() =>
            {
                ResourceBundle {
                    techniques: generated.techniques,
                    supportive_message: generated.supportive_message,
                    educational_insight: generated.educational_insight,
                    is_fallback: false,
                }
            }
            Ok(_) => {
                warn!("support generator returned incomplete resources, using fallback");
                fallback_resources(emotion_name)
            }
            Err(err) => {
                warn!(error = %err, "support generator returned malformed JSON, using fallback");
                fallback_resources(emotion_name)
            }
        }
    }
}

fn build_prompt(text: &str, analysis: &FusedAnalysis, pattern: &RecentPattern) -> String {
    let tone = if pattern.pattern_detected {
        format!(
            "- Recent pattern: {} of the last {} messages were negative; be especially warm \
             and mention talking to a trusted adult.\n",
            pattern.negative_count, pattern.total_analyzed
        )
    } else {
        String::new()
    };

    format!(
        r#"You are an emotional-literacy assistant for students aged 12 to 18.

DETECTED SITUATION:
- Student message: "{text}"
- Identified emotion: {emotion}
- Intensity: {intensity}
- Overall sentiment: {sentiment}
{tone}
TASK:
Produce emotional support resources as JSON with:
1. techniques: 2-3 practical techniques, each with a title and steps
2. supportive_message: an empathetic, validating message (2-3 sentences)
3. educational_insight: a short educational note about the emotion (1-2 sentences)

Technique types: breathing, grounding, journaling, movement, contact.
Use close, non-condescending language. Every emotion is valid. Do not give
therapy or diagnoses; give tools, not solutions.

OUTPUT FORMAT (strict JSON, no comments):
{{
  "techniques": [
    {{"type": "breathing|grounding|journaling|movement|contact", "title": "Short title", "steps": ["Step 1", "Step 2"], "duration": "1-2 minutes"}}
  ],
  "supportive_message": "...",
  "educational_insight": "..."
}}

RETURN ONLY THE JSON:"#,
        emotion = analysis.primary_emotion.display_name(),
        intensity = analysis.intensity.as_str(),
        sentiment = analysis.sentiment.as_str(),
    )
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
