use std::sync::Arc;

use tracing::warn;

use crate::generator::TextGenerator;
use crate::labels::{Emotion, Label};
use crate::models::{FusedAnalysis, HistoryTurn, Sender};

pub const APOLOGY: &str =
    "Sorry, I'm having trouble answering right now. Could you rephrase your message?";

const HISTORY_TURNS: usize = 7;

pub fn educational_tip(emotion: Emotion) -> &'static str {
    match emotion {
        Emotion::Joy => {
            "Joy connects us with what is good. What could you do to have more moments like this?"
        }
        Emotion::Sadness => {
            "Sadness is valid and helps us process losses or disappointments. Give yourself permission to feel it."
        }
        Emotion::Anger => {
            "Anger tells us something is wrong or a limit was crossed. What do you need to communicate?"
        }
        Emotion::Fear => {
            "Fear warns us about danger. Is it a real fear or an anticipated one? Naming it helps."
        }
        Emotion::Disgust => {
            "Disgust keeps us away from what harms us. What boundary do you need to set?"
        }
        Emotion::Surprise => {
            "Surprise keeps us alert to the unexpected. Is this surprise pleasant or uncomfortable?"
        }
        Emotion::Others => {
            "Calm and neutrality are valid too. We do not always need intense emotions."
        }
        Emotion::Gratitude => {
            "Gratitude strengthens our relationships. Who or what are you thankful for?"
        }
        Emotion::Pride => "Pride recognizes our effort. What did you do that made this possible?",
    }
}

/// `history` is ordered oldest first; only the last seven turns are used.
pub fn build_prompt(history: &[HistoryTurn], text: &str, analysis: &FusedAnalysis) -> String {
    let start = history.len().saturating_sub(HISTORY_TURNS);
    let context = if history.is_empty() {
        "This is the first interaction.".to_string()
    } else {
        history[start..]
            .iter()
            .map(|turn| match (turn.sender, turn.sentiment) {
                (Sender::User, Some(sentiment)) => format!("Student [{sentiment}]: {}", turn.text),
                (Sender::User, None) => format!("Student: {}", turn.text),
                (Sender::Bot, _) => format!("You: {}", turn.text),
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let nuances = analysis.notable_secondary();
    let nuance_line = if nuances.is_empty() {
        String::new()
    } else {
        let mut parts = Vec::with_capacity(nuances.len());
        for (label, score) in nuances.iter() {
            parts.push(format!("{label} ({:.0}%)", score * 100.0));
        }
        format!("- Nuances: {}\n", parts.join(", "))
    };

    format!(
        r#"You are an emotional-literacy assistant for students aged 12 to 18. Your goal is to help them IDENTIFY, NAME and UNDERSTAND their emotions through reflective dialogue.

You are not a psychologist or therapist. You are a complementary educational tool for emotional self-awareness.

CONVERSATION CONTEXT:
{context}

CURRENT STUDENT MESSAGE:
"{text}"

DETECTED EMOTIONAL READING:
- Perceived emotion: {emotion}
- Overall tone: {sentiment}
{nuance_line}
YOUR APPROACH:
1. Validate and name emotions.
2. Ask reflective questions that help the student explore what they feel.
3. Briefly explain why the emotion is normal.
4. Guide the student to their own conclusions instead of giving direct solutions.
5. Use close, authentic language for teenagers without being condescending.
6. At most 3-4 sentences.

DO NOT minimise emotions, give unsolicited advice, say "you should", or diagnose.

Reply to the student:"#,
        emotion = analysis.primary_emotion.display_name(),
        sentiment = analysis.sentiment.as_str(),
    )
}

pub struct Tutor {
    generator: Arc<dyn TextGenerator>,
}

impl Tutor {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Never fails: a generator error yields the canned apology.
    pub async fn reply(
        &self,
        history: &[HistoryTurn],
        text: &str,
        analysis: &FusedAnalysis,
    ) -> String {
        let prompt = build_prompt(history, text, analysis);
        match self.generator.generate(&prompt).await {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => APOLOGY.to_string(),
            Err(err) => {
                warn!(error = %err, "tutor reply generation failed");
                APOLOGY.to_string()
            }
        }
    }
}
