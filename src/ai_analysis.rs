//! Free-text chart commentary from an OpenAI-compatible vision model.

use crate::error::AnalysisError;
use crate::storage_utils::AnalysisConfig;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, data_summary: &str, image_url: &str) -> Result<String, AnalysisError>;
}

// --- Wire Types ---

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize, Debug)]
struct ChatMessage<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: String },
    ImageUrl { image_url: ImageRef<'a> },
}

#[derive(Serialize, Debug)]
struct ImageRef<'a> {
    url: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    content: Option<String>,
}

pub fn build_prompt(data_summary: &str) -> String {
    format!(
        "Analyze the following stock data summary and the provided candlestick chart.\n\
         Provide insights on price action, volatility, trends, and market behavior.\n\n\
         Data Summary:\n{}",
        data_summary
    )
}

fn build_request<'a>(
    config: &'a AnalysisConfig,
    data_summary: &str,
    image_url: &'a str,
) -> ChatRequest<'a> {
    ChatRequest {
        model: &config.model,
        messages: vec![ChatMessage {
            role: "user",
            content: vec![
                ContentPart::Text {
                    text: build_prompt(data_summary),
                },
                ContentPart::ImageUrl {
                    image_url: ImageRef { url: image_url },
                },
            ],
        }],
        max_tokens: config.max_tokens,
    }
}

fn first_content(response: ChatResponse) -> Result<String, AnalysisError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or(AnalysisError::EmptyResult)
}

fn status_error(status: StatusCode, body: String) -> Option<AnalysisError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Some(AnalysisError::Auth(body))
    } else if !status.is_success() {
        Some(AnalysisError::Http {
            status: status.as_u16(),
            body,
        })
    } else {
        None
    }
}

// --- Client ---

pub struct OpenAiVisionClient {
    client: Client,
    config: AnalysisConfig,
    api_key: Option<String>,
}

impl OpenAiVisionClient {
    pub fn new(config: AnalysisConfig, api_key: Option<String>) -> Result<Self, AnalysisError> {
        // the only bounded wait of the run
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(AnalysisError::from_reqwest)?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }
}

#[async_trait]
impl AnalysisService for OpenAiVisionClient {
    async fn analyze(&self, data_summary: &str, image_url: &str) -> Result<String, AnalysisError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AnalysisError::Auth("OPENAI_API_KEY is not set".to_string()))?;

        let request = build_request(&self.config, data_summary, image_url);
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(AnalysisError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if let Some(err) = status_error(status, body) {
                return Err(err);
            }
            unreachable!("status_error maps every non-success status to an error");
        }

        let parsed: ChatResponse = response.json().await.map_err(AnalysisError::from_reqwest)?;
        first_content(parsed)
    }
}
