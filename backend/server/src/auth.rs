//! # Auth
//!
//! Email + password credentials, bcrypt hashed.
//!
//! - [`DbAuth`]: the `user_credentials` table, uniqueness enforced by its primary key
//! - [`JsonAuth`]: a JSON file of `{"username", "password"}` records for running without
//!   Postgres credentials. Every read and write goes through one mutex and the file is rewritten
//!   after each signup.
use std::{io::ErrorKind, path::PathBuf};

use async_trait::async_trait;
use deadpool_postgres::Pool;
use serde::{Deserialize, Serialize};
use tokio::{fs, sync::Mutex, task};
use tracing::{info, warn};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signup {
    Created,
    Taken,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn signup(&self, email: &str, password: &str) -> Result<Signup, AppError>;

    async fn login(&self, email: &str, password: &str) -> Result<bool, AppError>;
}

async fn hash(password: &str, cost: u32) -> Result<String, AppError> {
    let password = password.to_string();

    task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::InternalError(Box::new(e)))?
        .map_err(|e| AppError::InternalError(Box::new(e)))
}

async fn verify(password: &str, hashed: &str) -> Result<bool, AppError> {
    let password = password.to_string();
    let hashed = hashed.to_string();

    let verified = task::spawn_blocking(move || bcrypt::verify(password, &hashed))
        .await
        .map_err(|e| AppError::InternalError(Box::new(e)))?;

    // a corrupt stored hash is a failed login, not a server error
    Ok(verified.unwrap_or_else(|e| {
        warn!("Stored password hash could not be checked: {e}");
        false
    }))
}

pub struct DbAuth {
    pool: Pool,
    cost: u32,
}

impl DbAuth {
    pub fn new(pool: Pool, cost: u32) -> Self {
        Self { pool, cost }
    }
}

#[async_trait]
impl Authenticator for DbAuth {
    async fn signup(&self, email: &str, password: &str) -> Result<Signup, AppError> {
        let hashed = hash(password, self.cost).await?;
        let client = self.pool.get().await?;

        let inserted = client
            .execute(
                "INSERT INTO user_credentials (email, password) VALUES ($1, $2)
                ON CONFLICT (email) DO NOTHING",
                &[&email, &hashed],
            )
            .await?;

        Ok(if inserted == 0 {
            Signup::Taken
        } else {
            Signup::Created
        })
    }

    async fn login(&self, email: &str, password: &str) -> Result<bool, AppError> {
        let client = self.pool.get().await?;

        let row = client
            .query_opt(
                "SELECT password FROM user_credentials WHERE email = $1",
                &[&email],
            )
            .await?;

        match row {
            Some(row) => verify(password, &row.try_get::<_, String>(0)?).await,
            None => Ok(false),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    username: String,
    password: String,
}

pub struct JsonAuth {
    path: PathBuf,
    cost: u32,
    users: Mutex<Vec<User>>,
}

impl JsonAuth {
    /// A missing file starts an empty store; an unreadable one is an error.
    pub async fn open(path: PathBuf, cost: u32) -> Result<Self, AppError> {
        let users = match fs::read(&path).await {
            Ok(data) => serde_json::from_slice(&data).map_err(|e| {
                AppError::Config(format!("{} is not a valid users file: {e}", path.display()))
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("{} not found, starting with no users", path.display());
                Vec::new()
            }
            Err(e) => return Err(AppError::InternalError(Box::new(e))),
        };

        Ok(Self {
            path,
            cost,
            users: Mutex::new(users),
        })
    }

    async fn save(&self, users: &[User]) -> Result<(), AppError> {
        let data = serde_json::to_vec(users).map_err(|e| AppError::InternalError(Box::new(e)))?;

        fs::write(&self.path, data)
            .await
            .map_err(|e| AppError::InternalError(Box::new(e)))
    }
}

#[async_trait]
impl Authenticator for JsonAuth {
    async fn signup(&self, email: &str, password: &str) -> Result<Signup, AppError> {
        let mut users = self.users.lock().await;

        if users.iter().any(|user| user.username == email) {
            return Ok(Signup::Taken);
        }

        users.push(User {
            username: email.to_string(),
            password: hash(password, self.cost).await?,
        });

        if let Err(e) = self.save(&users).await {
            users.pop();
            return Err(e);
        }

        Ok(Signup::Created)
    }

    async fn login(&self, email: &str, password: &str) -> Result<bool, AppError> {
        let users = self.users.lock().await;

        match users.iter().find(|user| user.username == email) {
            Some(user) => verify(password, &user.password).await,
            None => Ok(false),
        }
    }
}
