use anyhow::{Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{ChatModel, ImageFormat};

pub const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const MODEL: &str = "gemini-1.5-flash";

pub struct Gemini {
    client: Client,
    api_key: String,
    base_url: String,
    text_model: String,
    vision_model: String,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
}

#[derive(Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum RequestPart {
    Text(String),
    InlineData {
        mime_type: &'static str,
        data: String,
    },
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl Gemini {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: BASE_URL.to_string(),
            text_model: MODEL.to_string(),
            vision_model: MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
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

    async fn generate(&self, model: &str, parts: Vec<RequestPart>) -> Result<String> {
        let url = format!("{}/{model}:generateContent", self.base_url);
        debug!("Gemini request to {url}");

        let response = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&GenerateRequest {
                contents: vec![RequestContent { parts }],
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Gemini request failed with status {status}: {body}");
            bail!("Gemini request failed with status {status}");
        }

        let reply: GenerateResponse = response.json().await?;

        let Some(candidate) = reply.candidates.into_iter().next() else {
            bail!("no candidates from Gemini");
        };

        let text: String = candidate
            .content
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect();

        if text.trim().is_empty() {
            bail!("Gemini returned an empty candidate");
        }

        Ok(text)
    }
}

#[async_trait]
impl ChatModel for Gemini {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.generate(&self.text_model, vec![RequestPart::Text(prompt.to_string())])
            .await
    }

    async fn complete_with_image(
        &self,
        prompt: &str,
        image: &[u8],
        format: ImageFormat,
    ) -> Result<String> {
        let parts = vec![
            RequestPart::Text(prompt.to_string()),
            RequestPart::InlineData {
                mime_type: format.mime(),
                data: ImageFormat::encode(image),
            },
        ];

        self.generate(&self.vision_model, parts).await
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use axum::{
        Json, Router,
        extract::{Path, Query, State},
        routing::post,
    };
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    use super::*;

    #[derive(Clone, Default)]
    struct Seen {
        request: Arc<Mutex<Option<(String, String, Value)>>>,
    }

    async fn generate(
        State(seen): State<Seen>,
        Path(call): Path<String>,
        Query(query): Query<HashMap<String, String>>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        *seen.request.lock().unwrap() = Some((
            call,
            query.get("key").cloned().unwrap_or_default(),
            body,
        ));

        Json(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Swap " }, { "text": "maida for atta." }] }
            }]
        }))
    }

    async fn serve(seen: Seen) -> String {
        let router = Router::new()
            .route("/models/{call}", post(generate))
            .with_state(seen);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        format!("http://{address}/models")
    }

    #[tokio::test]
    async fn joins_text_parts() {
        let seen = Seen::default();
        let base = serve(seen.clone()).await;

        let reply = Gemini::new("g-key")
            .with_base_url(&base)
            .complete("tip please")
            .await
            .unwrap();

        assert_eq!(reply, "Swap maida for atta.");

        let (call, key, body) = seen.request.lock().unwrap().clone().unwrap();
        assert_eq!(call, format!("{MODEL}:generateContent"));
        assert_eq!(key, "g-key");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "tip please");
    }

    #[tokio::test]
    async fn image_goes_inline() {
        let seen = Seen::default();
        let base = serve(seen.clone()).await;

        Gemini::new("g-key")
            .with_base_url(&base)
            .with_vision_model("gemini-vision-test")
            .complete_with_image("calories?", b"abc", ImageFormat::Png)
            .await
            .unwrap();

        let (call, _, body) = seen.request.lock().unwrap().clone().unwrap();
        let inline = &body["contents"][0]["parts"][1]["inline_data"];

        assert_eq!(call, "gemini-vision-test:generateContent");
        assert_eq!(inline["mime_type"], "image/png");
        assert_eq!(inline["data"], "YWJj");
    }
}
