use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use uuid::Uuid;

mod aggregation;
mod chat;
mod classifier;
mod config;
mod db;
mod dialogue;
mod error;
mod fusion;
mod generator;
mod labels;
mod models;
mod recommendation;
mod report;
mod retry;
mod support;

use aggregation::TriggerPolicy;
use chat::ChatService;
use classifier::ClassifierAdapter;
use config::{ServiceArgs, ServiceConfig};
use dialogue::Tutor;
use models::Sender;
use recommendation::RecommendationBuilder;
use support::SupportAdvisor;

const HISTORY_TURNS: i64 = 7;
const REPORT_TRIGGER_LIMIT: i64 = 10;

#[derive(Parser)]
#[command(name = "emotion-signals")]
#[command(about = "Emotion and sentiment signals for classroom chat", long_about = None)]
struct Cli {
    #[command(flatten)]
    service: ServiceArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo courses, students and analyzed messages
    Seed,
    /// Import and analyze student messages from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Send one student message through analysis, support and the tutor
    Chat {
        #[arg(long)]
        email: String,
        /// Continue an existing conversation instead of starting a new one
        #[arg(long)]
        conversation: Option<Uuid>,
        #[arg(long)]
        text: String,
    },
    /// Aggregate a course window and record a teaching recommendation
    Recommend {
        #[arg(long)]
        course: String,
        #[arg(
            long,
            default_value_t = aggregation::DEFAULT_WINDOW_DAYS,
            value_parser = clap::value_parser!(i64).range(1..=aggregation::MAX_WINDOW_DAYS)
        )]
        window_days: i64,
        #[arg(long)]
        requested_by: Option<String>,
    },
    /// Generate a markdown course report
    Report {
        #[arg(long)]
        course: String,
        #[arg(
            long,
            default_value_t = aggregation::DEFAULT_WINDOW_DAYS,
            value_parser = clap::value_parser!(i64).range(1..=aggregation::MAX_WINDOW_DAYS)
        )]
        since_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Print a stored conversation with its analyses
    History {
        #[arg(long)]
        conversation: Uuid,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    let config = ServiceConfig::from_args(&cli.service);
    let generator = generator::from_config(config.generator.as_ref())?;
    let adapter = ClassifierAdapter::from_config(&config.classifiers, config.translator.as_ref())?;
    let chat = ChatService::new(
        adapter,
        SupportAdvisor::new(Arc::clone(&generator)),
        Tutor::new(Arc::clone(&generator)),
    );
    let policy = TriggerPolicy::default();
    let recommender = RecommendationBuilder::new(generator, policy.clone());

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, chat.adapter(), &csv).await?;
            println!("Inserted {inserted} messages from {}.", csv.display());
        }
        Commands::Chat {
            email,
            conversation,
            text,
        } => {
            let student_id = db::find_student(&pool, &email)
                .await?
                .with_context(|| format!("no student registered as {email}"))?;

            let conversation_id = match conversation {
                Some(id) => {
                    if !db::conversation_belongs_to(&pool, id, student_id).await? {
                        anyhow::bail!("conversation {id} does not belong to {email}");
                    }
                    id
                }
                None => db::start_conversation(&pool, student_id).await?,
            };

            let history = db::fetch_history(&pool, conversation_id, HISTORY_TURNS).await?;
            let prior =
                db::fetch_recent_user_sentiments(&pool, conversation_id, chat::PRIOR_SENTIMENTS)
                    .await?;
            let turn = chat.handle(&text, &history, &prior).await;

            let received_at = Utc::now();
            let message_id = db::insert_message(
                &pool,
                conversation_id,
                Sender::User,
                &text,
                received_at,
                Some(&turn.analysis),
                None,
            )
            .await?
            .context("message was not stored")?;
            db::insert_support_resources(&pool, message_id, &turn.support).await?;
            db::insert_message(
                &pool,
                conversation_id,
                Sender::Bot,
                &turn.reply,
                received_at + Duration::milliseconds(1),
                None,
                None,
            )
            .await?;

            let output = serde_json::json!({
                "conversation_id": conversation_id,
                "message_id": message_id,
                "turn": turn,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Recommend {
            course,
            window_days,
            requested_by,
        } => {
            let course = db::find_course(&pool, &course)
                .await?
                .with_context(|| format!("unknown course {course}"))?;
            let now = Utc::now();
            let messages = db::fetch_course_messages(
                &pool,
                course.id,
                aggregation::window_start(now, window_days),
            )
            .await?;

            let trigger = recommender
                .recommend(&course, &messages, window_days, now, requested_by.as_deref())
                .await?;
            db::insert_trigger(&pool, &trigger).await?;
            info!(course = %course.code, trigger = %trigger.id, "trigger recorded");
            println!("{}", serde_json::to_string_pretty(&trigger)?);
        }
        Commands::Report {
            course,
            since_days,
            out,
        } => {
            let course = db::find_course(&pool, &course)
                .await?
                .with_context(|| format!("unknown course {course}"))?;
            let now = Utc::now();
            let messages = db::fetch_course_messages(
                &pool,
                course.id,
                aggregation::window_start(now, since_days),
            )
            .await?;
            let stats = aggregation::collect_stats(&messages, since_days, now);
            let triggers = db::fetch_triggers(&pool, course.id, REPORT_TRIGGER_LIMIT).await?;

            let report = report::build_report(&course, &stats, &triggers, &policy, now);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::History { conversation } => {
            let messages = db::fetch_conversation(&pool, conversation).await?;
            if messages.is_empty() {
                println!("No messages found for conversation {conversation}.");
                return Ok(());
            }
            println!("{}", serde_json::to_string_pretty(&messages)?);
        }
    }

    Ok(())
}
