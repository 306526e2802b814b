//! # Postgres
//!
//! Relational store for credentials, profiles and meal tracking.
//!
//! ## Tables
//!
//! - `user_credentials`: email + bcrypt hash, only written by the Postgres auth backend.
//!   `user_details.email` references it only under that backend
//! - `user_details`: one row per user, keyed by email, holding biometrics, the latest diet plan,
//!   the health score, the meal **track** (JSONB array, one entry per tracked day) and the short
//!   AI suggestion (**dm**)
//! - `contact_messages`: whatever the contact form sends in
//!
//! ## Notes
//!
//! - Every query is a single statement, there are no transactions
//! - Meal tracking appends inside the `UPDATE` itself so two uploads for the same user never
//!   overwrite each other
//! - Migrations are idempotent `CREATE TABLE IF NOT EXISTS`, run on every start
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::info;

use crate::{
    config::{AuthBackend, Postgres},
    error::AppError,
};

const CREDENTIALS: &str = r#"
CREATE TABLE IF NOT EXISTS user_credentials (
    email VARCHAR(100) PRIMARY KEY,
    password VARCHAR(255) NOT NULL
);
"#;

const DETAILS: &str = r#"
CREATE TABLE IF NOT EXISTS user_details (
    email VARCHAR(100) PRIMARY KEY,
    name VARCHAR(100) NOT NULL,
    gender VARCHAR(10) NOT NULL,
    age INTEGER NOT NULL,
    activity_level VARCHAR(20) NOT NULL,
    goals TEXT NOT NULL,
    height FLOAT NOT NULL,
    weight FLOAT NOT NULL,
    target_weight FLOAT NOT NULL,
    diseases TEXT NOT NULL,
    diet_plan TEXT,
    healthscore INTEGER NOT NULL,
    track JSONB,
    dm TEXT
);
"#;

const CREDENTIALS_KEY: &str = r#"
DO $$
BEGIN
    IF NOT EXISTS (
        SELECT 1 FROM pg_constraint WHERE conname = 'user_details_email_fkey'
    ) THEN
        ALTER TABLE user_details
            ADD CONSTRAINT user_details_email_fkey
            FOREIGN KEY (email) REFERENCES user_credentials(email);
    END IF;
END $$;
"#;

const DROP_CREDENTIALS_KEY: &str = r#"
ALTER TABLE user_details DROP CONSTRAINT IF EXISTS user_details_email_fkey;
"#;

const CONTACT: &str = r#"
CREATE TABLE IF NOT EXISTS contact_messages (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    phone TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
"#;

/// Builds the pool without touching the network.
pub fn create_pool(postgres: &Postgres) -> Result<Pool, AppError> {
    let mut config = Config::new();
    config.user = Some(postgres.user.clone());
    config.password = Some(postgres.password.clone());
    config.host = Some(postgres.host.clone());
    config.port = Some(postgres.port);
    config.dbname = Some(postgres.db.clone());
    config.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    config.pool = Some(PoolConfig::new(postgres.pool_size));

    config
        .create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| AppError::Config(format!("Failed to create Postgres pool: {e}")))
}

pub async fn init_pool(postgres: &Postgres) -> Result<Pool, AppError> {
    let pool = create_pool(postgres)?;

    info!(
        "Connecting to Postgres at {}:{}/{}",
        postgres.host, postgres.port, postgres.db
    );
    pool.get().await?;
    info!("Connected to Postgres");

    Ok(pool)
}

/// Profiles only reference `user_credentials` when Postgres owns the credentials. With the
/// JSON backend that table stays empty, so the key is dropped.
pub fn migrations(auth_backend: AuthBackend) -> String {
    let key = match auth_backend {
        AuthBackend::Postgres => CREDENTIALS_KEY,
        AuthBackend::Json => DROP_CREDENTIALS_KEY,
    };

    [CREDENTIALS, DETAILS, key, CONTACT].concat()
}

pub async fn migrate(pool: &Pool, auth_backend: AuthBackend) -> Result<(), AppError> {
    info!("Running database migrations for {auth_backend:?} auth...");

    let client = pool.get().await?;
    client.batch_execute(&migrations(auth_backend)).await?;

    info!("Database migrations complete");
    Ok(())
}
