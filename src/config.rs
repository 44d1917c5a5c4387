//! Service configuration
//!
//! Resolved once at startup from CLI flags with environment fallbacks, then
//! handed to the clients that need it. Nothing here is global.

use std::time::Duration;

use clap::Args;

use crate::retry::RetryPolicy;

const DEFAULT_EMOTION_MODEL_URL: &str =
    "https://api-inference.huggingface.co/models/finiteautomata/beto-emotion-analysis";
const DEFAULT_SENTIMENT_MODEL_URL: &str =
    "https://api-inference.huggingface.co/models/finiteautomata/beto-sentiment-analysis";
const DEFAULT_GOEMOTIONS_MODEL_URL: &str =
    "https://api-inference.huggingface.co/models/SamLowe/roberta-base-go_emotions";
const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

const PRIMARY_TIMEOUT: Duration = Duration::from_secs(10);
const SENTIMENT_TIMEOUT: Duration = Duration::from_secs(10);
const SECONDARY_TIMEOUT: Duration = Duration::from_secs(15);
const TRANSLATOR_TIMEOUT: Duration = Duration::from_secs(10);
const GENERATOR_TIMEOUT: Duration = Duration::from_secs(30);

const SECONDARY_ATTEMPTS: u32 = 2;
const SECONDARY_RETRY_GAP: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Args)]
pub struct ServiceArgs {
    /// Hugging Face inference token
    #[arg(long, env = "HUGGINGFACE_API_TOKEN", hide_env_values = true)]
    pub hf_token: Option<String>,

    #[arg(long, env = "EMOTION_MODEL_URL", default_value = DEFAULT_EMOTION_MODEL_URL)]
    pub emotion_model_url: String,

    #[arg(long, env = "SENTIMENT_MODEL_URL", default_value = DEFAULT_SENTIMENT_MODEL_URL)]
    pub sentiment_model_url: String,

    #[arg(long, env = "GOEMOTIONS_MODEL_URL", default_value = DEFAULT_GOEMOTIONS_MODEL_URL)]
    pub goemotions_model_url: String,

    /// LibreTranslate-compatible endpoint; messages go untranslated when unset
    #[arg(long, env = "TRANSLATOR_URL")]
    pub translator_url: Option<String>,

    #[arg(long, env = "TRANSLATOR_API_KEY", hide_env_values = true)]
    pub translator_api_key: Option<String>,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-2.5-flash")]
    pub gemini_model: String,
}

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub api_token: Option<String>,
    pub primary: EndpointConfig,
    pub secondary: EndpointConfig,
    pub sentiment: EndpointConfig,
    pub secondary_retry: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct TranslatorConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub source_lang: String,
    pub target_lang: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub classifiers: ClassifierConfig,
    pub translator: Option<TranslatorConfig>,
    pub generator: Option<GeneratorConfig>,
}

impl ServiceConfig {
    pub fn from_args(args: &ServiceArgs) -> Self {
        let classifiers = ClassifierConfig {
            api_token: non_empty(args.hf_token.as_deref()),
            primary: EndpointConfig {
                url: args.emotion_model_url.clone(),
                timeout: PRIMARY_TIMEOUT,
            },
            secondary: EndpointConfig {
                url: args.goemotions_model_url.clone(),
                timeout: SECONDARY_TIMEOUT,
            },
            sentiment: EndpointConfig {
                url: args.sentiment_model_url.clone(),
                timeout: SENTIMENT_TIMEOUT,
            },
            secondary_retry: RetryPolicy::new(SECONDARY_ATTEMPTS, SECONDARY_RETRY_GAP),
        };

        let translator = non_empty(args.translator_url.as_deref()).map(|url| TranslatorConfig {
            url,
            api_key: non_empty(args.translator_api_key.as_deref()),
            source_lang: "es".to_string(),
            target_lang: "en".to_string(),
            timeout: TRANSLATOR_TIMEOUT,
        });

        let generator = non_empty(args.gemini_api_key.as_deref()).map(|api_key| GeneratorConfig {
            endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            api_key,
            model: args.gemini_model.clone(),
            timeout: GENERATOR_TIMEOUT,
        });

        Self {
            classifiers,
            translator,
            generator,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
