use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};

use crate::error::RecommendationError;
use crate::labels::Emotion;
use crate::models::{
    CourseMessage, CourseStats, MessageSample, Sender, TriggerDecision, TriggerReason,
};

pub const DEFAULT_WINDOW_DAYS: i64 = 7;
pub const MAX_WINDOW_DAYS: i64 = 365;
const SAMPLE_LIMIT: usize = 5;
const SAMPLE_CHARS: usize = 160;

/// Thresholds are checked in list order; the first one met wins.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerPolicy {
    pub min_messages: usize,
    pub thresholds: Vec<(Emotion, f64)>,
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        Self {
            min_messages: 10,
            thresholds: vec![
                (Emotion::Sadness, 0.50),
                (Emotion::Fear, 0.45),
                (Emotion::Anger, 0.45),
            ],
        }
    }
}

/// The window actually queried for a requested length, in days.
pub fn effective_window_days(window_days: i64) -> i64 {
    window_days.clamp(1, MAX_WINDOW_DAYS)
}

pub fn window_start(now: DateTime<Utc>, window_days: i64) -> DateTime<Utc> {
    now - Duration::days(effective_window_days(window_days))
}

/// Counts, ratios and recent excerpts over user messages in the window that
/// carry a primary emotion. No minimum applies here.
pub fn collect_stats(
    messages: &[CourseMessage],
    window_days: i64,
    now: DateTime<Utc>,
) -> CourseStats {
    let window_days = effective_window_days(window_days);
    let cutoff = window_start(now, window_days);
    let mut qualifying: Vec<(&CourseMessage, Emotion)> = messages
        .iter()
        .filter(|message| message.sender == Sender::User && message.sent_at >= cutoff)
        .filter_map(|message| message.primary_emotion.map(|emotion| (message, emotion)))
        .collect();

    let total = qualifying.len();
    let active_students = qualifying
        .iter()
        .map(|(message, _)| message.student_id)
        .collect::<HashSet<_>>()
        .len();
    let mut emotion_counts: BTreeMap<Emotion, usize> = BTreeMap::new();
    let mut sentiment_counts = BTreeMap::new();

    for (message, emotion) in qualifying.iter() {
        *emotion_counts.entry(*emotion).or_insert(0) += 1;
        if let Some(sentiment) = message.sentiment {
            *sentiment_counts.entry(sentiment).or_insert(0) += 1;
        }
    }

    let emotion_ratios = emotion_counts
        .iter()
        .map(|(emotion, count)| (*emotion, ratio(*count, total)))
        .collect();

    qualifying.sort_by(|a, b| b.0.sent_at.cmp(&a.0.sent_at));
    let recent_samples = qualifying
        .iter()
        .take(SAMPLE_LIMIT)
        .map(|(message, emotion)| MessageSample {
            text: message.text.chars().take(SAMPLE_CHARS).collect(),
            primary_emotion: *emotion,
            sentiment: message.sentiment,
        })
        .collect();

    CourseStats {
        time_window_days: window_days,
        total_messages: total,
        active_students,
        emotion_counts,
        emotion_ratios,
        sentiment_counts,
        recent_samples,
    }
}

/// `collect_stats` plus the minimum-data gate.
pub fn aggregate(
    messages: &[CourseMessage],
    window_days: i64,
    now: DateTime<Utc>,
    policy: &TriggerPolicy,
) -> Result<CourseStats, RecommendationError> {
    let stats = collect_stats(messages, window_days, now);
    if stats.total_messages < policy.min_messages {
        return Err(RecommendationError::InsufficientData {
            found: stats.total_messages,
            required: policy.min_messages,
            window_days: stats.time_window_days,
        });
    }
    Ok(stats)
}

/// Threshold-or-dominance selection. Thresholds are scanned in order and the
/// first one met triggers even if a later emotion has a higher ratio. With
/// no threshold met, the single highest ratio across every observed emotion
/// triggers, unless it is zero.
pub fn decide_trigger(stats: &CourseStats, policy: &TriggerPolicy) -> Option<TriggerDecision> {
    for (emotion, threshold) in policy.thresholds.iter() {
        let ratio = stats.emotion_ratios.get(emotion).copied().unwrap_or(0.0);
        if ratio >= *threshold {
            return Some(TriggerDecision {
                emotion: *emotion,
                ratio,
                reason: TriggerReason::Threshold,
            });
        }
    }

    let mut dominant: Option<(Emotion, f64)> = None;
    for (emotion, ratio) in stats.emotion_ratios.iter() {
        match dominant {
            Some((_, best)) if *ratio <= best => {}
            _ => dominant = Some((*emotion, *ratio)),
        }
    }

    match dominant {
        Some((emotion, ratio)) if ratio > 0.0 => Some(TriggerDecision {
            emotion,
            ratio,
            reason: TriggerReason::Dominant,
        }),
        _ => None,
    }
}

fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = count as f64 / total as f64;
    (raw * 1000.0).round() / 1000.0
}
