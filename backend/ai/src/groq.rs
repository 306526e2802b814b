use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{ChatModel, ImageFormat};

pub const ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const TEXT_MODEL: &str = "llama-3.3-70b-versatile";
pub const VISION_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";

pub struct Groq {
    client: Client,
    api_key: String,
    endpoint: String,
    text_model: String,
    vision_model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Content<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Content<'a> {
    Text(&'a str),
    Parts(Vec<Part<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Part<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl Groq {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            endpoint: ENDPOINT.to_string(),
            text_model: TEXT_MODEL.to_string(),
            vision_model: VISION_MODEL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_text_model(mut self, model: &str) -> Self {
        self.text_model = model.to_string();
        self
    }

    pub fn with_vision_model(mut self, model: &str) -> Self {
        self.vision_model = model.to_string();
        self
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<String> {
        debug!("Groq request to {} with model {}", self.endpoint, request.model);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Groq request failed with status {status}: {body}");
            bail!("Groq request failed with status {status}");
        }

        let reply: ChatResponse = response.json().await?;

        reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("no response from Groq"))
    }
}

#[async_trait]
impl ChatModel for Groq {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.text_model,
            messages: vec![Message {
                role: "user",
                content: Content::Text(prompt),
            }],
        };

        self.send(&request).await
    }

    async fn complete_with_image(
        &self,
        prompt: &str,
        image: &[u8],
        format: ImageFormat,
    ) -> Result<String> {
        let request = ChatRequest {
            model: &self.vision_model,
            messages: vec![Message {
                role: "user",
                content: Content::Parts(vec![
                    Part::Text { text: prompt },
                    Part::ImageUrl {
                        image_url: ImageUrl {
                            url: format.data_uri(image),
                        },
                    },
                ]),
            }],
        };

        self.send(&request).await
    }
}
