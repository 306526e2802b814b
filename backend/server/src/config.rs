use std::{env, fmt::Display, fs::read_to_string, path::PathBuf, str::FromStr};

use ai::{Provider, Settings};
use tracing::{info, warn};

use crate::error::AppError;

pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub postgres: Postgres,
    pub ai: Settings,
    pub auth_backend: AuthBackend,
    pub users_file: PathBuf,
    pub bcrypt_cost: u32,
    pub static_dir: PathBuf,
    pub max_upload_bytes: usize,
}

pub struct Postgres {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub db: String,
    pub pool_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthBackend {
    Postgres,
    Json,
}

impl FromStr for AuthBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(AuthBackend::Postgres),
            "json" => Ok(AuthBackend::Json),
            other => Err(format!("unknown auth backend {other:?}, expected postgres or json")),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        Self::from_lookup(|key| {
            env::var(key)
                .ok()
                .or_else(|| read_secret(key))
                .filter(|value| !value.is_empty())
        })
    }

    /// Builds the config from any key lookup, environment or otherwise.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let provider: Provider = try_load(&lookup, "AI_PROVIDER", "groq")?;
        let key_name = match provider {
            Provider::Groq => "GROQ_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
        };

        Ok(Self {
            port: try_load(&lookup, "PORT", "8080")?,
            bind_address: try_load(&lookup, "BIND_ADDRESS", "127.0.0.1")?,
            postgres: Postgres {
                user: try_load(&lookup, "POSTGRES_USER", "postgres")?,
                password: require(&lookup, "POSTGRES_PASS")?,
                host: try_load(&lookup, "POSTGRES_HOST", "localhost")?,
                port: try_load(&lookup, "POSTGRES_PORT", "5432")?,
                db: try_load(&lookup, "POSTGRES_DB", "blissful_bites")?,
                pool_size: try_load(&lookup, "POSTGRES_POOL_SIZE", "10")?,
            },
            ai: Settings {
                provider,
                api_key: require(&lookup, key_name)?,
                text_model: lookup("AI_TEXT_MODEL"),
                vision_model: lookup("AI_VISION_MODEL"),
            },
            auth_backend: try_load(&lookup, "AUTH_BACKEND", "postgres")?,
            users_file: try_load(&lookup, "USERS_FILE", "users.json")?,
            bcrypt_cost: try_load(&lookup, "BCRYPT_COST", "12")?,
            static_dir: try_load(&lookup, "STATIC_DIR", "static")?,
            max_upload_bytes: try_load(&lookup, "MAX_UPLOAD_BYTES", "20971520")?,
        })
    }
}

fn try_load<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> Result<T, AppError>
where
    T::Err: Display,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
            AppError::Config(format!("invalid {key}: {e}"))
        })
}

fn require(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, AppError> {
    lookup(key).ok_or_else(|| {
        warn!("{key} is required but was not set");
        AppError::Config(format!("{key} must be set"))
    })
}

fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path).map(|s| s.trim().to_string()).ok()
}
