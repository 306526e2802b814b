//! # Hosted AI
//!
//! Thin clients for the chat/vision APIs the backend leans on for diet plans,
//! short suggestions and meal photo calorie estimates.
//!
//! ## Providers
//! - Groq: OpenAI compatible chat completions, bearer auth
//! - Gemini: `generateContent`, key passed as a query parameter
//!
//! Both sit behind [`ChatModel`]. [`Assistant`] owns the prompts and the parsing,
//! so swapping providers never touches the route handlers.
use std::{fmt, str::FromStr, sync::Arc};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};

pub mod analysis;
pub mod gemini;
pub mod groq;
pub mod prompts;

pub use analysis::{MealAnalysis, TOTAL_CALORIES, parse_meal_analysis};
use gemini::Gemini;
use groq::Groq;

/// What the web layer needs from a nutritionist, whoever answers.
#[async_trait]
pub trait Nutritionist: Send + Sync {
    async fn diet_plan(&self, profile: &str) -> Result<String>;

    async fn quick_tip(&self, profile: &str) -> Result<String>;

    async fn analyze_meal(&self, image: &[u8], format: ImageFormat) -> Result<MealAnalysis>;
}

/// A raw completion endpoint.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;

    async fn complete_with_image(
        &self,
        prompt: &str,
        image: &[u8],
        format: ImageFormat,
    ) -> Result<String>;
}

pub struct Assistant {
    model: Box<dyn ChatModel>,
}

impl Assistant {
    pub fn new(model: impl ChatModel + 'static) -> Self {
        Self {
            model: Box::new(model),
        }
    }
}

#[async_trait]
impl Nutritionist for Assistant {
    async fn diet_plan(&self, profile: &str) -> Result<String> {
        self.model.complete(&prompts::diet_plan(profile)).await
    }

    async fn quick_tip(&self, profile: &str) -> Result<String> {
        self.model.complete(&prompts::quick_tip(profile)).await
    }

    async fn analyze_meal(&self, image: &[u8], format: ImageFormat) -> Result<MealAnalysis> {
        let reply = self
            .model
            .complete_with_image(prompts::MEAL_ANALYSIS, image, format)
            .await?;

        parse_meal_analysis(&reply)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Groq,
    Gemini,
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(Provider::Groq),
            "gemini" => Ok(Provider::Gemini),
            other => Err(anyhow!("unknown AI provider {other:?}, expected groq or gemini")),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Groq => f.write_str("groq"),
            Provider::Gemini => f.write_str("gemini"),
        }
    }
}

#[derive(Clone)]
pub struct Settings {
    pub provider: Provider,
    pub api_key: String,
    pub text_model: Option<String>,
    pub vision_model: Option<String>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("text_model", &self.text_model)
            .field("vision_model", &self.vision_model)
            .finish()
    }
}

pub fn nutritionist(settings: &Settings) -> Arc<dyn Nutritionist> {
    match settings.provider {
        Provider::Groq => {
            let mut groq = Groq::new(&settings.api_key);
            if let Some(model) = &settings.text_model {
                groq = groq.with_text_model(model);
            }
            if let Some(model) = &settings.vision_model {
                groq = groq.with_vision_model(model);
            }

            Arc::new(Assistant::new(groq))
        }
        Provider::Gemini => {
            let mut gemini = Gemini::new(&settings.api_key);
            if let Some(model) = &settings.text_model {
                gemini = gemini.with_text_model(model);
            }
            if let Some(model) = &settings.vision_model {
                gemini = gemini.with_vision_model(model);
            }

            Arc::new(Assistant::new(gemini))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
    Gif,
}

impl ImageFormat {
    /// Detects the format from magic numbers. `None` for anything that is not a photo we can send.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0x89, b'P', b'N', b'G', ..] => Some(ImageFormat::Png),
            [0xFF, 0xD8, 0xFF, ..] => Some(ImageFormat::Jpeg),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => {
                Some(ImageFormat::Webp)
            }
            [b'G', b'I', b'F', b'8', ..] => Some(ImageFormat::Gif),
            _ => None,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Gif => "image/gif",
        }
    }

    pub fn encode(bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    pub fn data_uri(self, bytes: &[u8]) -> String {
        format!("data:{};base64,{}", self.mime(), Self::encode(bytes))
    }
}
