use serde::Serialize;
use tracing::info;

use crate::classifier::ClassifierAdapter;
use crate::dialogue::{self, Tutor};
use crate::fusion;
use crate::labels::Sentiment;
use crate::models::{HistoryTurn, MessageAnalysis, SupportDecision};
use crate::support::SupportAdvisor;

/// Number of previous user sentiments that join the current one in the
/// recent-pattern window.
pub const PRIOR_SENTIMENTS: i64 = 4;

#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub analysis: MessageAnalysis,
    pub support: SupportDecision,
    pub reply: String,
    pub tip: &'static str,
}

pub struct ChatService {
    adapter: ClassifierAdapter,
    advisor: SupportAdvisor,
    tutor: Tutor,
}

impl ChatService {
    pub fn new(adapter: ClassifierAdapter, advisor: SupportAdvisor, tutor: Tutor) -> Self {
        Self {
            adapter,
            advisor,
            tutor,
        }
    }

    pub fn adapter(&self) -> &ClassifierAdapter {
        &self.adapter
    }

    /// Analyzes one student message and prepares everything returned to them.
    ///
    /// `history` is oldest first. `prior_sentiments` holds the sentiments of
    /// earlier user messages, newest first, not including this one.
    pub async fn handle(
        &self,
        text: &str,
        history: &[HistoryTurn],
        prior_sentiments: &[Option<Sentiment>],
    ) -> ChatTurn {
        let readings = self.adapter.classify_all(text).await;
        let analysis = fusion::analyze(text, readings);
        info!(
            emotion = %analysis.fused.primary_emotion,
            source = analysis.fused.primary_emotion_source.as_str(),
            intensity = analysis.fused.intensity.as_str(),
            sentiment = %analysis.fused.sentiment,
            "message analyzed"
        );

        let mut recent = Vec::with_capacity(prior_sentiments.len() + 1);
        recent.push(Some(analysis.fused.sentiment));
        recent.extend_from_slice(prior_sentiments);

        let support = self.advisor.evaluate(text, &analysis.fused, &recent).await;
        let reply = self.tutor.reply(history, text, &analysis.fused).await;
        let tip = dialogue::educational_tip(analysis.fused.primary_emotion);

        ChatTurn {
            analysis,
            support,
            reply,
            tip,
        }
    }
}
