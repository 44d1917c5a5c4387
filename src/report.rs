use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::aggregation::{self, TriggerPolicy};
use crate::labels::Label;
use crate::models::{Course, CourseStats, TriggerSummary};

pub fn build_report(
    course: &Course,
    stats: &CourseStats,
    triggers: &[TriggerSummary],
    policy: &TriggerPolicy,
    generated_at: DateTime<Utc>,
) -> String {
    let mut output = String::new();
    let cutoff = aggregation::window_start(generated_at, stats.time_window_days);

    let _ = writeln!(output, "# Course Emotion Report");
    let _ = writeln!(
        output,
        "Generated for {} ({}) over messages since {}",
        course.name,
        course.code,
        cutoff.date_naive()
    );
    let _ = writeln!(
        output,
        "{} analyzed messages from {} students",
        stats.total_messages, stats.active_students
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Emotion Mix");

    if stats.total_messages == 0 {
        let _ = writeln!(output, "No analyzed messages in this window.");
    } else {
        let mut counts: Vec<_> = stats.emotion_counts.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1));
        for (emotion, count) in counts {
            let ratio = stats.emotion_ratios.get(emotion).copied().unwrap_or(0.0);
            let _ = writeln!(
                output,
                "- {}: {} messages ({:.1}%)",
                emotion.display_name(),
                count,
                ratio * 100.0
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Sentiment Mix");

    if stats.sentiment_counts.is_empty() {
        let _ = writeln!(output, "No sentiment recorded for this window.");
    } else {
        for (sentiment, count) in stats.sentiment_counts.iter() {
            let _ = writeln!(output, "- {}: {}", sentiment.as_str(), count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Current Signal");

    if stats.total_messages < policy.min_messages {
        let _ = writeln!(
            output,
            "Not enough data: {} of {} required messages.",
            stats.total_messages, policy.min_messages
        );
    } else {
        match aggregation::decide_trigger(stats, policy) {
            Some(decision) => {
                let _ = writeln!(
                    output,
                    "{} at {:.1}% ({})",
                    decision.emotion.display_name(),
                    decision.ratio * 100.0,
                    decision.reason.as_str()
                );
            }
            None => {
                let _ = writeln!(output, "No significant emotional pattern.");
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Excerpts");

    if stats.recent_samples.is_empty() {
        let _ = writeln!(output, "No messages recorded for this window.");
    } else {
        for sample in stats.recent_samples.iter() {
            let sentiment = sample.sentiment.map(|s| s.as_str()).unwrap_or("unknown");
            let _ = writeln!(
                output,
                "- [{} / {}] {}",
                sample.primary_emotion.display_name(),
                sentiment,
                sample.text
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recommendation Log");

    if triggers.is_empty() {
        let _ = writeln!(output, "No recommendations generated yet.");
    } else {
        for trigger in triggers.iter() {
            let fallback = if trigger.is_fallback { ", fallback" } else { "" };
            let _ = writeln!(
                output,
                "- {} {} at {:.1}% ({}, {} days{}): {}",
                trigger.created_at.format("%Y-%m-%d %H:%M"),
                trigger.triggered_emotion,
                trigger.ratio * 100.0,
                trigger.reason,
                trigger.time_window_days,
                fallback,
                trigger.overview
            );
        }
    }

    output
}
