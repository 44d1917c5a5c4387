use std::collections::{HashMap, HashSet};

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::classifier::ClassifierAdapter;
use crate::fusion;
use crate::labels::{Emotion, Label, PrimaryEmotion, ScoreSet, SecondaryEmotion, Sentiment};
use crate::models::{
    AnalysisColumns, ClassifierReadings, Course, CourseEmotionTrigger, CourseMessage,
    HistoryTurn, MessageAnalysis, PrimaryReading, SecondaryReading, Sender, SentimentReading,
    StoredMessage, SupportDecision, TriggerSummary,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn upsert_course(pool: &PgPool, code: &str, name: &str) -> anyhow::Result<Course> {
    let row = sqlx::query(
        r#"
        INSERT INTO emotion_signals.courses (id, code, name)
        VALUES ($1, $2, $3)
        ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name
        RETURNING id, code, name
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(code)
    .bind(name)
    .fetch_one(pool)
    .await?;

    Ok(Course {
        id: row.get("id"),
        code: row.get("code"),
        name: row.get("name"),
    })
}

pub async fn find_course(pool: &PgPool, code: &str) -> anyhow::Result<Option<Course>> {
    let row = sqlx::query("SELECT id, code, name FROM emotion_signals.courses WHERE code = $1")
        .bind(code)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|row| Course {
        id: row.get("id"),
        code: row.get("code"),
        name: row.get("name"),
    }))
}

pub async fn upsert_student(pool: &PgPool, full_name: &str, email: &str) -> anyhow::Result<Uuid> {
    let id = sqlx::query(
        r#"
        INSERT INTO emotion_signals.students (id, full_name, email)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE SET full_name = EXCLUDED.full_name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(full_name)
    .bind(email)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

pub async fn find_student(pool: &PgPool, email: &str) -> anyhow::Result<Option<Uuid>> {
    let row = sqlx::query("SELECT id FROM emotion_signals.students WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| row.get("id")))
}

pub async fn enroll(pool: &PgPool, course_id: Uuid, student_id: Uuid) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO emotion_signals.enrollments (course_id, student_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(course_id)
    .bind(student_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn start_conversation(pool: &PgPool, student_id: Uuid) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO emotion_signals.conversations (id, student_id) VALUES ($1, $2)")
        .bind(id)
        .bind(student_id)
        .execute(pool)
        .await?;
    Ok(id)
}

/// Creates the conversation unless a row with `id` already exists.
pub async fn ensure_conversation(pool: &PgPool, id: Uuid, student_id: Uuid) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO emotion_signals.conversations (id, student_id)
        VALUES ($1, $2)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(student_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn conversation_belongs_to(
    pool: &PgPool,
    conversation_id: Uuid,
    student_id: Uuid,
) -> anyhow::Result<bool> {
    let row = sqlx::query(
        "SELECT 1 AS found FROM emotion_signals.conversations WHERE id = $1 AND student_id = $2",
    )
    .bind(conversation_id)
    .bind(student_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

/// Inserts a message with its analysis columns. Returns `None` when a row
/// with the same `source_key` already exists.
pub async fn insert_message(
    pool: &PgPool,
    conversation_id: Uuid,
    sender: Sender,
    text: &str,
    sent_at: DateTime<Utc>,
    analysis: Option<&MessageAnalysis>,
    source_key: Option<&str>,
) -> anyhow::Result<Option<Uuid>> {
    let columns = analysis.map(AnalysisColumns::from_analysis).transpose()?;
    let id = Uuid::new_v4();

    let result = sqlx::query(
        r#"
        INSERT INTO emotion_signals.messages
        (id, conversation_id, sender, body, sent_at, source_key,
         dominant_emotion, primary_emotion, primary_emotion_source, intensity, sentiment,
         primary_scores, secondary_primary_scores, secondary_emotions, sentiment_scores)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(conversation_id)
    .bind(sender.as_str())
    .bind(text)
    .bind(sent_at)
    .bind(source_key)
    .bind(columns.as_ref().map(|c| c.dominant_emotion.clone()))
    .bind(columns.as_ref().map(|c| c.primary_emotion.clone()))
    .bind(columns.as_ref().map(|c| c.primary_emotion_source.clone()))
    .bind(columns.as_ref().map(|c| c.intensity.clone()))
    .bind(columns.as_ref().map(|c| c.sentiment.clone()))
    .bind(columns.as_ref().map(|c| c.primary_scores.clone()))
    .bind(columns.as_ref().map(|c| c.secondary_primary_scores.clone()))
    .bind(columns.as_ref().map(|c| c.secondary_emotions.clone()))
    .bind(columns.as_ref().map(|c| c.sentiment_scores.clone()))
    .execute(pool)
    .await?;

    Ok((result.rows_affected() > 0).then_some(id))
}

/// Newest `limit` turns of a conversation, returned oldest first.
pub async fn fetch_history(
    pool: &PgPool,
    conversation_id: Uuid,
    limit: i64,
) -> anyhow::Result<Vec<HistoryTurn>> {
    let rows = sqlx::query(
        r#"
        SELECT sender, body, sentiment
        FROM emotion_signals.messages
        WHERE conversation_id = $1
        ORDER BY sent_at DESC
        LIMIT $2
        "#,
    )
    .bind(conversation_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut turns: Vec<HistoryTurn> = rows
        .into_iter()
        .map(|row| HistoryTurn {
            sender: parse_sender(row.get("sender")),
            text: row.get("body"),
            sentiment: row
                .get::<Option<String>, _>("sentiment")
                .and_then(|s| Sentiment::from_label(&s)),
        })
        .collect();
    turns.reverse();
    Ok(turns)
}

/// Sentiments of the newest user messages, newest first.
pub async fn fetch_recent_user_sentiments(
    pool: &PgPool,
    conversation_id: Uuid,
    limit: i64,
) -> anyhow::Result<Vec<Option<Sentiment>>> {
    let rows = sqlx::query(
        r#"
        SELECT sentiment
        FROM emotion_signals.messages
        WHERE conversation_id = $1 AND sender = 'user'
        ORDER BY sent_at DESC
        LIMIT $2
        "#,
    )
    .bind(conversation_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            row.get::<Option<String>, _>("sentiment")
                .and_then(|s| Sentiment::from_label(&s))
        })
        .collect())
}

/// Stored messages of a conversation with their reloaded analyses.
pub async fn fetch_conversation(
    pool: &PgPool,
    conversation_id: Uuid,
) -> anyhow::Result<Vec<StoredMessage>> {
    let rows = sqlx::query(
        r#"
        SELECT sender, body, sent_at, dominant_emotion, primary_emotion, primary_emotion_source,
               intensity, sentiment, primary_scores, secondary_primary_scores,
               secondary_emotions, sentiment_scores
        FROM emotion_signals.messages
        WHERE conversation_id = $1
        ORDER BY sent_at
        "#,
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;

    let mut messages = Vec::with_capacity(rows.len());
    for row in rows {
        let analysis = match row.get::<Option<String>, _>("primary_emotion") {
            Some(primary_emotion) => {
                let columns = AnalysisColumns {
                    dominant_emotion: row
                        .get::<Option<String>, _>("dominant_emotion")
                        .unwrap_or_default(),
                    primary_emotion,
                    primary_emotion_source: row
                        .get::<Option<String>, _>("primary_emotion_source")
                        .unwrap_or_default(),
                    intensity: row.get::<Option<String>, _>("intensity").unwrap_or_default(),
                    sentiment: row.get::<Option<String>, _>("sentiment").unwrap_or_default(),
                    primary_scores: json_column(&row, "primary_scores"),
                    secondary_primary_scores: json_column(&row, "secondary_primary_scores"),
                    secondary_emotions: json_column(&row, "secondary_emotions"),
                    sentiment_scores: json_column(&row, "sentiment_scores"),
                };
                Some(columns.to_fused().context("stored analysis is corrupt")?)
            }
            None => None,
        };
        messages.push(StoredMessage {
            sender: parse_sender(row.get("sender")),
            text: row.get("body"),
            sent_at: row.get("sent_at"),
            analysis,
        });
    }
    Ok(messages)
}

pub async fn insert_support_resources(
    pool: &PgPool,
    message_id: Uuid,
    decision: &SupportDecision,
) -> anyhow::Result<()> {
    let (Some(resources), Some(generated_at)) = (&decision.resources, decision.generated_at) else {
        return Ok(());
    };

    sqlx::query(
        r#"
        INSERT INTO emotion_signals.support_resources
        (id, message_id, resources, negative_count, pattern_detected, generated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(message_id)
    .bind(Json(resources))
    .bind(decision.pattern.negative_count as i32)
    .bind(decision.pattern.pattern_detected)
    .bind(generated_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// User messages of every enrolled student since `since`.
pub async fn fetch_course_messages(
    pool: &PgPool,
    course_id: Uuid,
    since: DateTime<Utc>,
) -> anyhow::Result<Vec<CourseMessage>> {
    let rows = sqlx::query(
        r#"
        SELECT c.student_id, m.sender, m.body, m.sent_at, m.primary_emotion, m.sentiment
        FROM emotion_signals.messages m
        JOIN emotion_signals.conversations c ON c.id = m.conversation_id
        JOIN emotion_signals.enrollments e ON e.student_id = c.student_id
        WHERE e.course_id = $1
          AND m.sender = 'user'
          AND m.sent_at >= $2
          AND m.primary_emotion IS NOT NULL
        ORDER BY m.sent_at DESC
        "#,
    )
    .bind(course_id)
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| CourseMessage {
            student_id: row.get("student_id"),
            sender: parse_sender(row.get("sender")),
            text: row.get("body"),
            sent_at: row.get("sent_at"),
            primary_emotion: row
                .get::<Option<String>, _>("primary_emotion")
                .and_then(|e| Emotion::from_label(&e)),
            sentiment: row
                .get::<Option<String>, _>("sentiment")
                .and_then(|s| Sentiment::from_label(&s)),
        })
        .collect())
}

/// Appends a trigger. Trigger rows are never updated.
pub async fn insert_trigger(pool: &PgPool, trigger: &CourseEmotionTrigger) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO emotion_signals.course_emotion_triggers
        (id, course_id, triggered_emotion, emotion_ratio, trigger_reason, time_window_days,
         stats_snapshot, overview, suggestions, disclaimer, is_fallback, requested_by, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(trigger.id)
    .bind(trigger.course_id)
    .bind(trigger.triggered_emotion.as_str())
    .bind(trigger.ratio)
    .bind(trigger.reason.as_str())
    .bind(i32::try_from(trigger.time_window_days).context("window too large")?)
    .bind(Json(&trigger.stats_snapshot))
    .bind(&trigger.content.overview)
    .bind(Json(&trigger.content.suggestions))
    .bind(&trigger.content.disclaimer)
    .bind(trigger.content.is_fallback)
    .bind(trigger.requested_by.as_deref())
    .bind(trigger.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_triggers(
    pool: &PgPool,
    course_id: Uuid,
    limit: i64,
) -> anyhow::Result<Vec<TriggerSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT triggered_emotion, emotion_ratio, trigger_reason, time_window_days,
               overview, is_fallback, created_at
        FROM emotion_signals.course_emotion_triggers
        WHERE course_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(course_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| TriggerSummary {
            triggered_emotion: row.get("triggered_emotion"),
            ratio: row.get("emotion_ratio"),
            reason: row.get("trigger_reason"),
            time_window_days: row.get("time_window_days"),
            overview: row.get("overview"),
            is_fallback: row.get("is_fallback"),
            created_at: row.get("created_at"),
        })
        .collect())
}

/// The subset of `keys` already stored on some message.
pub async fn existing_source_keys(
    pool: &PgPool,
    keys: &[String],
) -> anyhow::Result<HashSet<String>> {
    if keys.is_empty() {
        return Ok(HashSet::new());
    }
    let rows = sqlx::query(
        "SELECT source_key FROM emotion_signals.messages WHERE source_key = ANY($1)",
    )
    .bind(keys)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| row.get::<String, _>("source_key"))
        .collect())
}

#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    course_code: String,
    course_name: String,
    full_name: String,
    email: String,
    text: String,
    sent_at: Option<DateTime<Utc>>,
    source_key: Option<String>,
}

/// Drops rows whose key is already stored or repeats an earlier row in the
/// same file. Rows without a key are always kept.
fn pending_rows(rows: Vec<CsvRow>, stored: &HashSet<String>) -> Vec<CsvRow> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| match row.source_key.as_deref() {
            Some(key) => !stored.contains(key) && seen.insert(key.to_string()),
            None => true,
        })
        .collect()
}

pub async fn import_csv(
    pool: &PgPool,
    adapter: &ClassifierAdapter,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let rows = reader
        .deserialize::<CsvRow>()
        .collect::<Result<Vec<_>, _>>()?;
    let keys: Vec<String> = rows.iter().filter_map(|row| row.source_key.clone()).collect();
    let stored = existing_source_keys(pool, &keys).await?;
    let total = rows.len();
    let rows = pending_rows(rows, &stored);
    if rows.len() < total {
        info!(skipped = total - rows.len(), "skipping rows already imported");
    }

    let mut conversations: HashMap<String, Uuid> = HashMap::new();
    let mut inserted = 0usize;

    for row in rows {
        let course = upsert_course(pool, &row.course_code, &row.course_name).await?;
        let student_id = upsert_student(pool, &row.full_name, &row.email).await?;
        enroll(pool, course.id, student_id).await?;

        let conversation_id = match conversations.get(&row.email) {
            Some(id) => *id,
            None => {
                let id = start_conversation(pool, student_id).await?;
                conversations.insert(row.email.clone(), id);
                id
            }
        };

        let readings = adapter.classify_all(&row.text).await;
        let analysis = fusion::analyze(&row.text, readings);
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let id = insert_message(
            pool,
            conversation_id,
            Sender::User,
            &row.text,
            row.sent_at.unwrap_or_else(Utc::now),
            Some(&analysis),
            Some(&source_key),
        )
        .await?;

        if id.is_some() {
            inserted += 1;
        }
    }

    Ok(inserted)
}

struct SeedCourse {
    code: &'static str,
    name: &'static str,
    dominant: PrimaryEmotion,
    ratio: f64,
    students: [(&'static str, &'static str); 5],
}

const SEED_MESSAGES_PER_COURSE: usize = 20;

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let courses = [
        SeedCourse {
            code: "HUM-301",
            name: "Humanities 3B",
            dominant: PrimaryEmotion::Sadness,
            ratio: 0.65,
            students: [
                ("Avery Lee", "avery.lee@example.edu"),
                ("Jules Moreno", "jules.moreno@example.edu"),
                ("Kiara Patel", "kiara.patel@example.edu"),
                ("Tomás Ruiz", "tomas.ruiz@example.edu"),
                ("Mina Okafor", "mina.okafor@example.edu"),
            ],
        },
        SeedCourse {
            code: "STEM-202",
            name: "STEM Lab 2A",
            dominant: PrimaryEmotion::Fear,
            ratio: 0.52,
            students: [
                ("Lucas Silva", "lucas.silva@example.edu"),
                ("Ana Gómez", "ana.gomez@example.edu"),
                ("Noah Kim", "noah.kim@example.edu"),
                ("Sofía Vega", "sofia.vega@example.edu"),
                ("Ravi Nair", "ravi.nair@example.edu"),
            ],
        },
        SeedCourse {
            code: "ART-105",
            name: "Artistic Expression 1C",
            dominant: PrimaryEmotion::Joy,
            ratio: 0.58,
            students: [
                ("Elena Costa", "elena.costa@example.edu"),
                ("Mateo Salas", "mateo.salas@example.edu"),
                ("Iris Chen", "iris.chen@example.edu"),
                ("Omar Haddad", "omar.haddad@example.edu"),
                ("Lía Torres", "lia.torres@example.edu"),
            ],
        },
    ];

    let now = Utc::now();
    for seed_course in courses.iter() {
        let course = upsert_course(pool, seed_course.code, seed_course.name).await?;
        let mut conversation_ids = Vec::new();
        for (name, email) in seed_course.students.iter() {
            let student_id = upsert_student(pool, name, email).await?;
            enroll(pool, course.id, student_id).await?;
            let conversation_id = seed_conversation_id(seed_course.code, email);
            ensure_conversation(pool, conversation_id, student_id).await?;
            conversation_ids.push(conversation_id);
        }

        let emotions = seed_emotions(
            seed_course.dominant,
            seed_course.ratio,
            SEED_MESSAGES_PER_COURSE,
        );
        for (index, emotion) in emotions.into_iter().enumerate() {
            let text = seed_text(emotion, index);
            let analysis = fusion::analyze(text, seed_readings(emotion));
            let conversation_id = conversation_ids[index % conversation_ids.len()];
            let sent_at = now - Duration::hours(3 * index as i64 + 1);
            let source_key = format!("seed-{}-{:03}", seed_course.code, index);

            insert_message(
                pool,
                conversation_id,
                Sender::User,
                text,
                sent_at,
                Some(&analysis),
                Some(&source_key),
            )
            .await?;
        }
    }

    Ok(())
}

/// Stable per course and student so reseeding reuses the same conversations.
fn seed_conversation_id(course_code: &str, email: &str) -> Uuid {
    let name = format!("seed-conversation:{course_code}:{email}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

/// `ratio` of the messages carry `dominant`; the rest rotate through a mix.
fn seed_emotions(dominant: PrimaryEmotion, ratio: f64, total: usize) -> Vec<PrimaryEmotion> {
    let dominant_count = (ratio * total as f64).round() as usize;
    let filler: Vec<PrimaryEmotion> = [
        PrimaryEmotion::Joy,
        PrimaryEmotion::Others,
        PrimaryEmotion::Surprise,
        PrimaryEmotion::Anger,
    ]
    .into_iter()
    .filter(|emotion| *emotion != dominant)
    .collect();

    (0..total)
        .map(|i| {
            if i < dominant_count {
                dominant
            } else {
                filler[i % filler.len()]
            }
        })
        .collect()
}

fn seed_readings(emotion: PrimaryEmotion) -> ClassifierReadings {
    let primary = PrimaryReading::from_scores(ScoreSet::from_pairs(PrimaryEmotion::ALL.iter().map(
        |&label| {
            let score = if label == emotion { 0.82 } else { 0.03 };
            (label, score)
        },
    )));

    let sentiment_label = match emotion {
        PrimaryEmotion::Sadness
        | PrimaryEmotion::Fear
        | PrimaryEmotion::Anger
        | PrimaryEmotion::Disgust => Sentiment::Negative,
        PrimaryEmotion::Joy => Sentiment::Positive,
        _ => Sentiment::Neutral,
    };
    let sentiment = SentimentReading::from_scores(ScoreSet::from_pairs(Sentiment::ALL.iter().map(
        |&label| {
            let score = if label == sentiment_label { 0.76 } else { 0.12 };
            (label, score)
        },
    )));

    let cue = |target: PrimaryEmotion, hit: f64, miss: f64| {
        if emotion == target {
            hit
        } else {
            miss
        }
    };
    let secondary = SecondaryReading {
        primary_worthy: ScoreSet::from_pairs([
            (SecondaryEmotion::Gratitude, 0.02),
            (SecondaryEmotion::Pride, 0.01),
        ]),
        secondary: ScoreSet::from_pairs([
            (SecondaryEmotion::Nervousness, cue(PrimaryEmotion::Fear, 0.41, 0.04)),
            (SecondaryEmotion::Disappointment, cue(PrimaryEmotion::Sadness, 0.38, 0.03)),
            (SecondaryEmotion::Excitement, cue(PrimaryEmotion::Joy, 0.35, 0.02)),
            (SecondaryEmotion::Neutral, 0.15),
        ]),
    };

    ClassifierReadings {
        primary,
        secondary,
        sentiment,
    }
}

fn seed_text(emotion: PrimaryEmotion, index: usize) -> &'static str {
    let pool: &[&str] = match emotion {
        PrimaryEmotion::Sadness => &[
            "Me siento muy solo últimamente, nadie entiende lo que pasa en mi casa",
            "Saqué mala nota otra vez y no tengo ganas de nada",
            "Extraño a mi abuela, desde que se fue todo es más difícil",
        ],
        PrimaryEmotion::Fear => &[
            "Tengo miedo de presentar frente a toda la clase mañana",
            "Me da ansiedad pensar en el examen final",
            "No sé si voy a poder terminar el proyecto a tiempo y me asusta",
        ],
        PrimaryEmotion::Joy => &[
            "¡Hoy terminamos el mural y quedó increíble!",
            "Me encantó la clase de música, cantamos todos juntos",
            "Estoy feliz porque mi dibujo va a estar en la exposición",
        ],
        PrimaryEmotion::Anger => &[
            "Me molesta que siempre me interrumpan cuando hablo",
            "Es injusto que castiguen a todo el curso por uno",
        ],
        PrimaryEmotion::Surprise => &["No puedo creer que cambiaran la fecha del examen"],
        _ => &[
            "Hoy tuvimos clase normal, nada especial",
            "Mañana hay reunión de apoderados",
        ],
    };
    pool[index % pool.len()]
}

fn parse_sender(raw: String) -> Sender {
    if raw == "bot" {
        Sender::Bot
    } else {
        Sender::User
    }
}

fn json_column(row: &sqlx::postgres::PgRow, column: &str) -> serde_json::Value {
    row.get::<Option<serde_json::Value>, _>(column)
        .unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmotionSource, Intensity};

    #[test]
    fn seed_mix_respects_dominant_ratio() {
        let emotions = seed_emotions(PrimaryEmotion::Sadness, 0.65, 20);
        let dominant = emotions.iter().filter(|e| **e == PrimaryEmotion::Sadness).count();
        assert_eq!(emotions.len(), 20);
        assert_eq!(dominant, 13);
        assert!(!emotions[13..].contains(&PrimaryEmotion::Sadness));
    }

    #[test]
    fn seed_readings_fuse_to_the_intended_emotion() {
        let analysis = fusion::analyze("texto", seed_readings(PrimaryEmotion::Fear));
        assert_eq!(analysis.fused.primary_emotion, Emotion::Fear);
        assert_eq!(analysis.fused.primary_emotion_source, EmotionSource::PrimaryModel);
        // (0.82 + 0.76 + 0.02) / 3
        assert_eq!(analysis.fused.intensity, Intensity::Medium);
        assert_eq!(analysis.fused.sentiment, Sentiment::Negative);
    }

    #[test]
    fn seed_conversations_are_stable_per_student() {
        let first = seed_conversation_id("HUM-301", "avery.lee@example.edu");
        assert_eq!(first, seed_conversation_id("HUM-301", "avery.lee@example.edu"));
        assert_ne!(first, seed_conversation_id("HUM-301", "jules.moreno@example.edu"));
        assert_ne!(first, seed_conversation_id("STEM-202", "avery.lee@example.edu"));
    }

    fn csv_row(email: &str, source_key: Option<&str>) -> CsvRow {
        CsvRow {
            course_code: "HUM-301".to_string(),
            course_name: "Humanities 3B".to_string(),
            full_name: "Avery Lee".to_string(),
            email: email.to_string(),
            text: "tengo miedo de la prueba".to_string(),
            sent_at: None,
            source_key: source_key.map(str::to_string),
        }
    }

    #[test]
    fn stored_and_repeated_keys_are_skipped_before_analysis() {
        let stored = HashSet::from(["msg-1".to_string()]);
        let rows = vec![
            csv_row("a@example.edu", Some("msg-1")),
            csv_row("b@example.edu", Some("msg-2")),
            csv_row("c@example.edu", Some("msg-2")),
            csv_row("d@example.edu", None),
        ];
        let pending = pending_rows(rows, &stored);
        let emails: Vec<&str> = pending.iter().map(|row| row.email.as_str()).collect();
        assert_eq!(emails, vec!["b@example.edu", "d@example.edu"]);
    }

    #[test]
    fn seed_texts_cycle() {
        assert_eq!(seed_text(PrimaryEmotion::Surprise, 7), seed_text(PrimaryEmotion::Surprise, 0));
        assert_ne!(seed_text(PrimaryEmotion::Joy, 0), seed_text(PrimaryEmotion::Joy, 1));
    }
}
