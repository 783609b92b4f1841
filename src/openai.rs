use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::conversation::{Content, Message, Part};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Product default; gpt-4o is offered for image turns.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ApiMessage>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: ApiContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Parts(Vec<ApiPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiPart {
    Text { text: String },
    ImageUrl { image_url: ApiImageUrl },
}

#[derive(Serialize)]
struct ApiImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    api_base: String,
}

impl OpenAIClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_base(api_key, DEFAULT_API_BASE)
    }

    pub fn with_base(api_key: &str, api_base: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Send the full (already trimmed) history and return the assistant text.
    pub async fn chat(&self, model: &str, history: &[Message]) -> Result<String> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: history.iter().map(to_api_message).collect(),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API error {}: {}", status, text));
        }

        let chat_response: ChatResponse = response.json().await?;
        Ok(chat_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default())
    }

    pub fn list_models() -> Vec<String> {
        vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()]
    }

    /// Image turns are only offered on the vision-enabled model.
    pub fn supports_images(model: &str) -> bool {
        model == "gpt-4o"
    }
}

fn to_api_message(message: &Message) -> ApiMessage {
    let content = match &message.content {
        Content::Text(text) => ApiContent::Text(text.clone()),
        Content::Parts(parts) => ApiContent::Parts(
            parts
                .iter()
                .map(|part| match part {
                    Part::Text(text) => ApiPart::Text { text: text.clone() },
                    Part::Image { data_uri } => ApiPart::ImageUrl {
                        image_url: ApiImageUrl {
                            url: data_uri.clone(),
                        },
                    },
                })
                .collect(),
        ),
    };
    ApiMessage {
        role: message.role.as_str(),
        content,
    }
}
