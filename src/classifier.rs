//! Classifier adapter
//!
//! Wraps the three hosted classifiers (primary 7-class emotion model,
//! GoEmotions on translated text, sentiment model) and normalizes their
//! label → score output into closed vocabularies. Every failure degrades to
//! a documented default reading; nothing propagates to the caller.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::{ClassifierConfig, EndpointConfig, TranslatorConfig};
use crate::error::{ClassifierError, TranslationError};
use crate::labels::{Label, ScoreSet, SecondaryEmotion, SecondaryGroup};
use crate::models::{ClassifierReadings, PrimaryReading, SecondaryReading, SentimentReading};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f64,
}

/// The inference API answers either `[[{..}]]` or `[{..}]` depending on the
/// pipeline, so accept both.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

impl InferenceResponse {
    fn into_scores(self) -> Vec<LabelScore> {
        match self {
            Self::Nested(rows) => rows.into_iter().next().unwrap_or_default(),
            Self::Flat(scores) => scores,
        }
    }
}

/// An opaque text classifier returning label → score pairs.
#[async_trait]
pub trait ScoreModel: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(&self, text: &str) -> Result<Vec<LabelScore>, ClassifierError>;
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str) -> Result<String, TranslationError>;
}

/// Hosted inference endpoint speaking the `{"inputs": text}` protocol.
pub struct InferenceClient {
    http: Client,
    name: String,
    url: String,
    token: Option<String>,
}

impl InferenceClient {
    pub fn new(
        name: &str,
        endpoint: &EndpointConfig,
        token: Option<String>,
    ) -> Result<Self, ClassifierError> {
        let http = Client::builder().timeout(endpoint.timeout).build()?;
        Ok(Self {
            http,
            name: name.to_string(),
            url: endpoint.url.clone(),
            token,
        })
    }
}

#[async_trait]
impl ScoreModel for InferenceClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn classify(&self, text: &str) -> Result<Vec<LabelScore>, ClassifierError> {
        let mut request = self.http.post(&self.url).json(&json!({ "inputs": text }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(ClassifierError::Loading);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let parsed: InferenceResponse = response.json().await?;
        Ok(parsed.into_scores())
    }
}

/// Sends text through unchanged.
pub struct PassthroughTranslator;

#[async_trait]
impl Translator for PassthroughTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        Ok(text.to_string())
    }
}

/// LibreTranslate-compatible translation endpoint.
pub struct HttpTranslator {
    http: Client,
    config: TranslatorConfig,
}

#[derive(Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

impl HttpTranslator {
    pub fn new(config: TranslatorConfig) -> Result<Self, TranslationError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        let mut body = json!({
            "q": text,
            "source": self.config.source_lang,
            "target": self.config.target_lang,
            "format": "text",
        });
        if let Some(key) = &self.config.api_key {
            body["api_key"] = json!(key);
        }

        let response = self.http.post(&self.config.url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(TranslationError::Status(response.status().as_u16()));
        }

        let parsed: TranslateResponse = response.json().await?;
        if parsed.translated_text.trim().is_empty() {
            return Err(TranslationError::Empty);
        }
        Ok(parsed.translated_text)
    }
}

pub struct ClassifierAdapter {
    primary: Arc<dyn ScoreModel>,
    secondary: Arc<dyn ScoreModel>,
    sentiment: Arc<dyn ScoreModel>,
    translator: Arc<dyn Translator>,
    secondary_retry: RetryPolicy,
}

impl ClassifierAdapter {
    pub fn new(
        primary: Arc<dyn ScoreModel>,
        secondary: Arc<dyn ScoreModel>,
        sentiment: Arc<dyn ScoreModel>,
        translator: Arc<dyn Translator>,
        secondary_retry: RetryPolicy,
    ) -> Self {
        Self {
            primary,
            secondary,
            sentiment,
            translator,
            secondary_retry,
        }
    }

    pub fn from_config(
        config: &ClassifierConfig,
        translator: Option<&TranslatorConfig>,
    ) -> anyhow::Result<Self> {
        if config.api_token.is_none() {
            warn!(
                "HUGGINGFACE_API_TOKEN is not set; classifier calls will likely fail \
                 and fall back to defaults"
            );
        }
        let token = config.api_token.clone();
        let translator: Arc<dyn Translator> = match translator {
            Some(translator) => Arc::new(HttpTranslator::new(translator.clone())?),
            None => Arc::new(PassthroughTranslator),
        };

        Ok(Self::new(
            Arc::new(InferenceClient::new("primary", &config.primary, token.clone())?),
            Arc::new(InferenceClient::new("goemotions", &config.secondary, token.clone())?),
            Arc::new(InferenceClient::new("sentiment", &config.sentiment, token)?),
            translator,
            config.secondary_retry,
        ))
    }

    /// Single attempt; any failure yields the catch-all reading.
    pub async fn classify_primary(&self, text: &str) -> PrimaryReading {
        RetryPolicy::single_attempt()
            .run(
                self.primary.name(),
                |_| async move {
                    let raw = self.primary.classify(text).await?;
                    let scores = normalize(self.primary.as_ref(), raw)?;
                    Ok::<_, ClassifierError>(PrimaryReading::from_scores(scores))
                },
                ClassifierError::is_retryable,
                PrimaryReading::fallback,
            )
            .await
    }

    /// Translates first, then retries the GoEmotions call on cold starts.
    pub async fn classify_secondary(&self, text: &str) -> SecondaryReading {
        let translated = match self.translator.translate(text).await {
            Ok(translated) => {
                debug!(
                    source = %preview(text),
                    translated = %preview(&translated),
                    "translated message for secondary classifier"
                );
                translated
            }
            Err(err) => {
                warn!(error = %err, "translation failed, classifying original text");
                text.to_string()
            }
        };

        let translated = translated.as_str();
        self.secondary_retry
            .run(
                self.secondary.name(),
                |_| async move {
                    let raw = self.secondary.classify(translated).await?;
                    let scores = normalize(self.secondary.as_ref(), raw)?;
                    Ok::<_, ClassifierError>(split_secondary(&scores))
                },
                ClassifierError::is_retryable,
                SecondaryReading::fallback,
            )
            .await
    }

    pub async fn classify_sentiment(&self, text: &str) -> SentimentReading {
        RetryPolicy::single_attempt()
            .run(
                self.sentiment.name(),
                |_| async move {
                    let scores =
                        normalize(self.sentiment.as_ref(), self.sentiment.classify(text).await?)?;
                    Ok::<_, ClassifierError>(SentimentReading::from_scores(scores))
                },
                ClassifierError::is_retryable,
                SentimentReading::fallback,
            )
            .await
    }

    /// Issues the three calls concurrently. Each one carries its own
    /// fallback, so a failure in one never affects the others.
    pub async fn classify_all(&self, text: &str) -> ClassifierReadings {
        let (primary, secondary, sentiment) = tokio::join!(
            self.classify_primary(text),
            self.classify_secondary(text),
            self.classify_sentiment(text),
        );
        ClassifierReadings {
            primary,
            secondary,
            sentiment,
        }
    }
}

fn normalize<L: Label>(
    model: &dyn ScoreModel,
    raw: Vec<LabelScore>,
) -> Result<ScoreSet<L>, ClassifierError> {
    let mut pairs = Vec::with_capacity(raw.len());
    for entry in raw {
        match L::from_label(&entry.label) {
            Some(label) => pairs.push((label, round4(entry.score))),
            None => warn!(model = model.name(), label = %entry.label, "dropping unknown label"),
        }
    }

    if pairs.is_empty() {
        return Err(ClassifierError::Parse(format!(
            "{} returned no recognizable labels",
            model.name()
        )));
    }
    Ok(ScoreSet::from_pairs(pairs))
}

fn split_secondary(scores: &ScoreSet<SecondaryEmotion>) -> SecondaryReading {
    SecondaryReading {
        primary_worthy: scores.filter(|label, _| label.group() == SecondaryGroup::PrimaryWorthy),
        secondary: scores.filter(|label, _| label.group() == SecondaryGroup::Secondary),
    }
}

fn round4(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::labels::{PrimaryEmotion, Sentiment};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted classifier: pops one response per call, repeating the last.
    pub(crate) struct FakeModel {
        name: &'static str,
        responses: Mutex<VecDeque<Result<Vec<LabelScore>, ClassifierError>>>,
        pub(crate) inputs: Mutex<Vec<String>>,
    }

    impl FakeModel {
        pub(crate) fn new(
            name: &'static str,
            responses: Vec<Result<Vec<LabelScore>, ClassifierError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                responses: Mutex::new(responses.into()),
                inputs: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn ok(name: &'static str, pairs: &[(&str, f64)]) -> Arc<Self> {
            Self::new(name, vec![Ok(scores(pairs))])
        }

        pub(crate) fn failing(name: &'static str, err: ClassifierError) -> Arc<Self> {
            Self::new(name, vec![Err(err)])
        }

        pub(crate) fn calls(&self) -> usize {
            self.inputs.lock().unwrap().len()
        }
    }

    fn clone_response(
        response: &Result<Vec<LabelScore>, ClassifierError>,
    ) -> Result<Vec<LabelScore>, ClassifierError> {
        match response {
            Ok(scores) => Ok(scores.clone()),
            Err(ClassifierError::Loading) => Err(ClassifierError::Loading),
            Err(ClassifierError::Timeout) => Err(ClassifierError::Timeout),
            Err(other) => Err(ClassifierError::Network(other.to_string())),
        }
    }

    #[async_trait]
    impl ScoreModel for FakeModel {
        fn name(&self) -> &str {
            self.name
        }

        async fn classify(&self, text: &str) -> Result<Vec<LabelScore>, ClassifierError> {
            self.inputs.lock().unwrap().push(text.to_string());
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.pop_front().unwrap()
            } else {
                clone_response(responses.front().unwrap())
            }
        }
    }

    struct FakeTranslator(Option<&'static str>);

    #[async_trait]
    impl Translator for FakeTranslator {
        async fn translate(&self, _text: &str) -> Result<String, TranslationError> {
            self.0.map(str::to_string).ok_or(TranslationError::Empty)
        }
    }

    pub(crate) fn scores(pairs: &[(&str, f64)]) -> Vec<LabelScore> {
        pairs
            .iter()
            .map(|(label, score)| LabelScore {
                label: label.to_string(),
                score: *score,
            })
            .collect()
    }

    fn adapter(
        primary: Arc<FakeModel>,
        secondary: Arc<FakeModel>,
        sentiment: Arc<FakeModel>,
        translator: FakeTranslator,
    ) -> ClassifierAdapter {
        ClassifierAdapter::new(
            primary,
            secondary,
            sentiment,
            Arc::new(translator),
            RetryPolicy::new(2, Duration::ZERO),
        )
    }

    #[test]
    fn parses_nested_and_flat_inference_payloads() {
        let nested: InferenceResponse = serde_json::from_str(
            r#"[[{"label":"joy","score":0.9},{"label":"others","score":0.1}]]"#,
        )
        .unwrap();
        let flat: InferenceResponse =
            serde_json::from_str(r#"[{"label":"POS","score":0.8}]"#).unwrap();
        assert_eq!(nested.into_scores().len(), 2);
        assert_eq!(flat.into_scores()[0].label, "POS");
    }

    #[tokio::test]
    async fn primary_reading_picks_dominant_and_drops_unknown_labels() {
        let primary = FakeModel::ok(
            "primary",
            &[("joy", 0.12345), ("sadness", 0.7), ("melancholy", 0.99)],
        );
        let adapter = adapter(
            primary,
            FakeModel::ok("goemotions", &[("neutral", 0.9)]),
            FakeModel::ok("sentiment", &[("NEU", 0.9)]),
            FakeTranslator(Some("hi")),
        );

        let reading = adapter.classify_primary("hola").await;
        assert_eq!(reading.dominant, PrimaryEmotion::Sadness);
        assert_eq!(reading.confidence, 0.7);
        assert_eq!(reading.scores.len(), 2);
        assert_eq!(reading.scores.get(PrimaryEmotion::Joy), 0.1235);
    }

    #[tokio::test]
    async fn primary_failure_is_single_attempt_with_default() {
        let primary = FakeModel::failing("primary", ClassifierError::Loading);
        let adapter = adapter(
            primary.clone(),
            FakeModel::ok("goemotions", &[("neutral", 0.9)]),
            FakeModel::ok("sentiment", &[("NEU", 0.9)]),
            FakeTranslator(Some("hi")),
        );

        let reading = adapter.classify_primary("hola").await;
        assert!(reading.is_fallback());
        assert_eq!(reading.scores.get(PrimaryEmotion::Others), 1.0);
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn secondary_retries_once_when_model_is_loading() {
        let secondary = FakeModel::new(
            "goemotions",
            vec![
                Err(ClassifierError::Loading),
                Ok(scores(&[("gratitude", 0.91), ("curiosity", 0.3), ("anger", 0.2)])),
            ],
        );
        let adapter = adapter(
            FakeModel::ok("primary", &[("joy", 0.5)]),
            secondary.clone(),
            FakeModel::ok("sentiment", &[("POS", 0.9)]),
            FakeTranslator(Some("thank you so much")),
        );

        let reading = adapter.classify_secondary("muchas gracias").await;
        assert_eq!(secondary.calls(), 2);
        assert_eq!(
            reading.dominant_primary(),
            Some((SecondaryEmotion::Gratitude, 0.91))
        );
        assert_eq!(reading.secondary.get(SecondaryEmotion::Curiosity), 0.3);
        assert_eq!(reading.secondary.get(SecondaryEmotion::Anger), 0.0);
        assert_eq!(
            secondary.inputs.lock().unwrap().as_slice(),
            ["thank you so much", "thank you so much"]
        );
    }

    #[tokio::test]
    async fn secondary_falls_back_after_two_loading_attempts() {
        let secondary = FakeModel::failing("goemotions", ClassifierError::Loading);
        let adapter = adapter(
            FakeModel::ok("primary", &[("joy", 0.5)]),
            secondary.clone(),
            FakeModel::ok("sentiment", &[("POS", 0.9)]),
            FakeTranslator(Some("hello")),
        );

        let reading = adapter.classify_secondary("hola").await;
        assert_eq!(secondary.calls(), 2);
        assert_eq!(reading, SecondaryReading::fallback());
    }

    #[tokio::test]
    async fn translation_failure_sends_original_text() {
        let secondary = FakeModel::ok("goemotions", &[("pride", 0.4)]);
        let adapter = adapter(
            FakeModel::ok("primary", &[("joy", 0.5)]),
            secondary.clone(),
            FakeModel::ok("sentiment", &[("POS", 0.9)]),
            FakeTranslator(None),
        );

        adapter.classify_secondary("estoy orgulloso").await;
        assert_eq!(secondary.inputs.lock().unwrap().as_slice(), ["estoy orgulloso"]);
    }

    #[tokio::test]
    async fn one_failing_classifier_does_not_disturb_the_others() {
        let adapter = adapter(
            FakeModel::ok("primary", &[("fear", 0.8), ("joy", 0.1)]),
            FakeModel::failing("goemotions", ClassifierError::Network("reset".to_string())),
            FakeModel::failing("sentiment", ClassifierError::Timeout),
            FakeTranslator(Some("scared")),
        );

        let readings = adapter.classify_all("tengo miedo").await;
        assert_eq!(readings.primary.dominant, PrimaryEmotion::Fear);
        assert_eq!(readings.secondary, SecondaryReading::fallback());
        assert_eq!(readings.sentiment.dominant, Sentiment::Neutral);
        assert_eq!(readings.sentiment.confidence, 0.0);
    }

    #[tokio::test]
    async fn unrecognizable_payload_falls_back() {
        let adapter = adapter(
            FakeModel::ok("primary", &[("joy", 0.5)]),
            FakeModel::ok("goemotions", &[("neutral", 0.5)]),
            FakeModel::ok("sentiment", &[("MIXED", 0.9)]),
            FakeTranslator(Some("ok")),
        );
        assert_eq!(adapter.classify_sentiment("ok").await, SentimentReading::fallback());
    }
}
