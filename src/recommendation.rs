//! Course recommendations
//!
//! Turns a course trigger into pedagogical suggestions. Generated content
//! must carry an overview and at least one suggestion; anything else is
//! replaced by the fixed template.

use std::fmt::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregation::{self, TriggerPolicy};
use crate::error::RecommendationError;
use crate::generator::{parse_json_reply, TextGenerator};
use crate::labels::{Emotion, Label};
use crate::models::{
    Course, CourseEmotionTrigger, CourseMessage, CourseStats, RecommendationContent, Suggestion,
    TriggerDecision,
};

pub const DISCLAIMER: &str = "These suggestions draw on social-emotional learning \
(Bisquerra, CASEL, Goleman) and do not replace support from a professional \
psychologist or school counsellor.";

fn literature_reference(emotion: Emotion) -> &'static str {
    match emotion {
        Emotion::Sadness => {
            "R. Bisquerra, 'La educación emocional' (handling sadness in the classroom)"
        }
        Emotion::Fear => "D. J. Siegel, 'The Whole-Brain Child' (window of tolerance and safety)",
        Emotion::Anger => "CASEL Framework, social-emotional skills for channelling anger",
        Emotion::Disgust => {
            "Daniel Goleman, 'Emotional Intelligence' (self-awareness and boundaries)"
        }
        Emotion::Surprise => "CASEL, curiosity and growth mindset",
        Emotion::Joy => "Barbara Fredrickson, broaden-and-build theory of positive emotions",
        _ => "General references: Bisquerra, Goleman, CASEL, Siegel",
    }
}

/// The fixed template used when generation is unavailable or malformed.
pub fn fallback_content(decision: &TriggerDecision) -> RecommendationContent {
    let emotion = decision.emotion.display_name().to_lowercase();
    RecommendationContent {
        overview: format!(
            "A notable presence of {emotion} was detected. Short spaces to validate the emotion \
             and activities that strengthen group connection are suggested."
        ),
        suggestions: vec![
            Suggestion {
                title: "Guided emotion wheel".to_string(),
                description: "The teacher spends 10 minutes helping students name what they feel, \
                              validating each emotion and reminding them that expressing it is safe."
                    .to_string(),
                activity: "Form a circle, share how everyone feels using cards and suggest \
                           self-care strategies."
                    .to_string(),
                reference: literature_reference(decision.emotion).to_string(),
            },
            Suggestion {
                title: "Resilience log".to_string(),
                description: "Invite students to write three ideas for looking after themselves \
                              or asking for help. Reinforces mutual support."
                    .to_string(),
                activity: "5 minutes of individual writing, then voluntarily share \
                           resources that help."
                    .to_string(),
                reference: "D. Goleman, 'Emotional Intelligence'".to_string(),
            },
        ],
        disclaimer: DISCLAIMER.to_string(),
        is_fallback: true,
    }
}

#[derive(Deserialize)]
struct GeneratedContent {
    overview: String,
    suggestions: Vec<Suggestion>,
    disclaimer: Option<String>,
}

/// Validates generator output. `None` means the output must be discarded.
pub fn parse_content(raw: &str) -> Option<RecommendationContent> {
    let generated: GeneratedContent = parse_json_reply(raw).ok()?;
    if generated.overview.trim().is_empty() || generated.suggestions.is_empty() {
        return None;
    }
    Some(RecommendationContent {
        overview: generated.overview,
        suggestions: generated.suggestions,
        disclaimer: generated
            .disclaimer
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DISCLAIMER.to_string()),
        is_fallback: false,
    })
}

pub fn build_prompt(course: &Course, decision: &TriggerDecision, stats: &CourseStats) -> String {
    let mut samples = String::new();
    for sample in stats.recent_samples.iter() {
        let _ = writeln!(
            samples,
            "- \"{}\" (emotion: {})",
            sample.text, sample.primary_emotion
        );
    }
    if samples.is_empty() {
        samples.push_str("- No recent examples available\n");
    }

    let counts = format_counts(stats.emotion_counts.iter().map(|(e, c)| (e.as_str(), *c)));
    let sentiments = format_counts(stats.sentiment_counts.iter().map(|(s, c)| (s.as_str(), *c)));

    format!(
        r#"You are a pedagogical advisor specialised in social-emotional learning.
Suggest actions for the course "{name}" (code {code}).

Available data (last {days} days):
- Messages analysed: {total} from {students} students
- Predominant emotion: {emotion} ({percent:.1}% of student messages)
- Emotion counts: {counts}
- Sentiment counts: {sentiments}
- Recent examples:
{samples}
Always keep in mind:
- These are educational recommendations inspired by {reference}.
- They never replace psychology or counselling professionals.
- Propose activities feasible in class or in short tutorials (10-20 min).
- Include at least one collective action and one individual or reflective action.

Format your answer as strict JSON:
{{
  "overview": "Short summary of what is happening and the pedagogical goal",
  "suggestions": [
    {{"title": "Short title", "description": "Why this strategy helps", "activity": "Concrete activity", "reference": "Supporting book or author"}}
  ],
  "disclaimer": "{disclaimer}"
}}
Include 2 or 3 suggestions."#,
        name = course.name,
        code = course.code,
        days = stats.time_window_days,
        total = stats.total_messages,
        students = stats.active_students,
        emotion = decision.emotion,
        percent = decision.ratio * 100.0,
        reference = literature_reference(decision.emotion),
        disclaimer = DISCLAIMER,
    )
}

fn format_counts<'a>(counts: impl Iterator<Item = (&'a str, usize)>) -> String {
    let parts: Vec<String> = counts.map(|(label, count)| format!("{label}: {count}")).collect();
    if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join(", ")
    }
}

pub struct RecommendationBuilder {
    generator: Arc<dyn TextGenerator>,
    policy: TriggerPolicy,
}

impl RecommendationBuilder {
    pub fn new(generator: Arc<dyn TextGenerator>, policy: TriggerPolicy) -> Self {
        Self { generator, policy }
    }

    pub async fn build_content(
        &self,
        course: &Course,
        decision: &TriggerDecision,
        stats: &CourseStats,
    ) -> RecommendationContent {
        let prompt = build_prompt(course, decision, stats);
        match self.generator.generate(&prompt).await {
            Ok(raw) => match parse_content(&raw) {
                Some(content) => content,
                None => {
                    warn!(
                        course = %course.code,
                        "recommendation output failed validation, using fallback"
                    );
                    fallback_content(decision)
                }
            },
            Err(err) => {
                warn!(
                    course = %course.code,
                    error = %err,
                    "recommendation generator unavailable, using fallback"
                );
                fallback_content(decision)
            }
        }
    }

    /// Aggregate, decide and build a trigger record ready to append.
    pub async fn recommend(
        &self,
        course: &Course,
        messages: &[CourseMessage],
        window_days: i64,
        now: DateTime<Utc>,
        requested_by: Option<&str>,
    ) -> Result<CourseEmotionTrigger, RecommendationError> {
        let stats = aggregation::aggregate(messages, window_days, now, &self.policy)?;
        let window_days = stats.time_window_days;
        let decision = aggregation::decide_trigger(&stats, &self.policy)
            .ok_or(RecommendationError::NoSignificantPattern { window_days })?;

        info!(
            course = %course.code,
            emotion = %decision.emotion,
            ratio = decision.ratio,
            reason = decision.reason.as_str(),
            total = stats.total_messages,
            "course trigger selected"
        );

        let content = self.build_content(course, &decision, &stats).await;
        Ok(CourseEmotionTrigger {
            id: Uuid::new_v4(),
            course_id: course.id,
            triggered_emotion: decision.emotion,
            ratio: decision.ratio,
            reason: decision.reason,
            time_window_days: window_days,
            stats_snapshot: stats,
            content,
            requested_by: requested_by.map(str::to_string),
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::tests::FakeGenerator;
    use crate::labels::Sentiment;
    use crate::models::{Sender, TriggerReason};
    use chrono::Duration;

    fn course() -> Course {
        Course {
            id: Uuid::new_v4(),
            code: "HUM-301".to_string(),
            name: "Humanities 3B".to_string(),
        }
    }

    fn course_messages(mix: &[(Emotion, usize)]) -> Vec<CourseMessage> {
        let now = Utc::now();
        let mut hour = 0;
        let mut out = Vec::new();
        for (emotion, count) in mix {
            for _ in 0..*count {
                hour += 1;
                out.push(CourseMessage {
                    student_id: Uuid::new_v4(),
                    sender: Sender::User,
                    text: format!("{emotion} message {hour}"),
                    sent_at: now - Duration::hours(hour),
                    primary_emotion: Some(*emotion),
                    sentiment: Some(Sentiment::Negative),
                });
            }
        }
        out
    }

    fn sadness_decision() -> TriggerDecision {
        TriggerDecision {
            emotion: Emotion::Sadness,
            ratio: 0.6,
            reason: TriggerReason::Threshold,
        }
    }

    #[test]
    fn fallback_content_is_deterministic() {
        let first = serde_json::to_string(&fallback_content(&sadness_decision())).unwrap();
        let second = serde_json::to_string(&fallback_content(&sadness_decision())).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn parse_content_requires_overview_and_suggestions() {
        assert!(parse_content(r#"{"overview":"x","suggestions":[]}"#).is_none());
        assert!(parse_content(r#"{"suggestions":[{"title":"t"}]}"#).is_none());
        assert!(parse_content("not json").is_none());

        let parsed = parse_content(r#"```json
{"overview":"Group is anxious","suggestions":[{"title":"Breathing break"}]}
```"#)
        .unwrap();
        assert_eq!(parsed.suggestions[0].title, "Breathing break");
        assert_eq!(parsed.disclaimer, DISCLAIMER);
        assert!(!parsed.is_fallback);
    }

    #[tokio::test]
    async fn insufficient_data_is_rejected_before_generation() {
        let generator = FakeGenerator::replying("{}");
        let builder = RecommendationBuilder::new(generator.clone(), TriggerPolicy::default());
        let err = builder
            .recommend(
                &course(),
                &course_messages(&[(Emotion::Sadness, 9)]),
                7,
                Utc::now(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RecommendationError::InsufficientData { found: 9, .. }));
        assert!(generator.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn neutral_course_triggers_on_dominance_but_zero_ratios_do_not() {
        let builder =
            RecommendationBuilder::new(FakeGenerator::failing(), TriggerPolicy::default());
        let messages = course_messages(&[(Emotion::Others, 12)]);
        let trigger = builder
            .recommend(&course(), &messages, 7, Utc::now(), None)
            .await
            .unwrap();
        assert_eq!(trigger.triggered_emotion, Emotion::Others);
        assert_eq!(trigger.reason, TriggerReason::Dominant);

        let stats = CourseStats {
            time_window_days: 7,
            total_messages: 12,
            active_students: 3,
            emotion_counts: Default::default(),
            emotion_ratios: [(Emotion::Joy, 0.0)].into_iter().collect(),
            sentiment_counts: Default::default(),
            recent_samples: Vec::new(),
        };
        assert!(aggregation::decide_trigger(&stats, &TriggerPolicy::default()).is_none());
    }

    #[tokio::test]
    async fn generator_failure_produces_fallback_trigger() {
        let builder =
            RecommendationBuilder::new(FakeGenerator::failing(), TriggerPolicy::default());
        let messages = course_messages(&[(Emotion::Sadness, 6), (Emotion::Joy, 4)]);
        let trigger = builder
            .recommend(&course(), &messages, 7, Utc::now(), Some("prof_lucia"))
            .await
            .unwrap();

        assert_eq!(trigger.triggered_emotion, Emotion::Sadness);
        assert_eq!(trigger.ratio, 0.6);
        assert_eq!(trigger.reason, TriggerReason::Threshold);
        assert_eq!(trigger.stats_snapshot.total_messages, 10);
        assert_eq!(trigger.requested_by.as_deref(), Some("prof_lucia"));
        assert!(trigger.content.is_fallback);
        assert_eq!(trigger.content, fallback_content(&sadness_decision()));
    }

    #[tokio::test]
    async fn valid_generated_content_is_kept() {
        let reply = r#"{"overview":"Fear around presentations","suggestions":[
            {"title":"Rehearsal pairs","description":"Lowers stakes","activity":"Practice in pairs","reference":"CASEL"}],
            "disclaimer":"Not a substitute for professionals."}"#;
        let generator = FakeGenerator::replying(reply);
        let builder = RecommendationBuilder::new(generator.clone(), TriggerPolicy::default());
        let messages = course_messages(&[(Emotion::Fear, 5), (Emotion::Joy, 5)]);
        let trigger = builder
            .recommend(&course(), &messages, 7, Utc::now(), None)
            .await
            .unwrap();

        assert_eq!(trigger.triggered_emotion, Emotion::Fear);
        assert_eq!(trigger.content.suggestions[0].title, "Rehearsal pairs");
        assert_eq!(trigger.content.disclaimer, "Not a substitute for professionals.");
        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("Humanities 3B"));
        assert!(prompts[0].contains("fear (50.0% of student messages)"));
        assert!(prompts[0].contains("- Emotion counts: joy: 5, fear: 5"));
        assert!(prompts[0].contains("- Sentiment counts: negative: 10"));
    }

    #[tokio::test]
    async fn trigger_records_the_window_actually_queried() {
        let builder =
            RecommendationBuilder::new(FakeGenerator::failing(), TriggerPolicy::default());
        let messages = course_messages(&[(Emotion::Sadness, 10)]);
        let trigger = builder
            .recommend(&course(), &messages, 0, Utc::now(), None)
            .await
            .unwrap();
        assert_eq!(trigger.time_window_days, 1);
        assert_eq!(trigger.stats_snapshot.time_window_days, 1);
    }
}
