//! Classifier adapter — one-shot Gemini call normalized to a `Category`.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::warn;

use crate::category::Category;
use crate::error::ClassifierError;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Text-classification oracle. Always yields a terminal `Category`;
/// transport failures surface as `Category::Error`, never as an `Err`.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, subject: &str, snippet: &str) -> Category;
}

/// Gemini-backed classifier.
pub struct GeminiClassifier {
    api_key: SecretString,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiClassifier {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            api_key,
            model: model.into(),
            base_url: API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// The fixed prompt embedding the five category names.
    fn prompt(subject: &str, snippet: &str) -> String {
        let categories = Category::PROMPT_NAMES
            .iter()
            .map(|name| format!("- {name}"))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Classify this email into one of the categories:\n{categories}\n\n\
             Email Subject: {subject}\nEmail Content: {snippet}"
        )
    }

    /// Issue one generateContent request and return the raw response text.
    async fn call_oracle(&self, prompt: &str) -> Result<String, ClassifierError> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            self.base_url,
            self.model,
            self.api_key.expose_secret()
        );

        let body = serde_json::json!({
            "contents": [{"parts": [{"text": prompt}]}]
        });

        let resp = self.client.post(&url).json(&body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ClassifierError::Status { status, body });
        }

        let parsed: GenerateContentResponse = resp
            .json()
            .await
            .map_err(|e| ClassifierError::Request(e.to_string()))?;

        parsed
            .first_text()
            .ok_or(ClassifierError::EmptyResponse)
    }
}

#[async_trait]
impl Classifier for GeminiClassifier {
    async fn classify(&self, subject: &str, snippet: &str) -> Category {
        let prompt = Self::prompt(subject, snippet);
        match self.call_oracle(&prompt).await {
            Ok(text) => Category::from_oracle(&text),
            Err(e) => {
                warn!(error = %e, subject, "Classification call failed");
                Category::Error(e.to_string())
            }
        }
    }
}

// ── Response shapes ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

impl GenerateContentResponse {
    fn first_text(&self) -> Option<String> {
        let text = self
            .candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .trim()
            .to_string();
        (!text.is_empty()).then_some(text)
    }
}
