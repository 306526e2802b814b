use deadpool_postgres::Pool;
use serde::Serialize;
use serde_json::Value;
use tokio_postgres::Row;

use crate::{error::AppError, meals::MealEntry};

/// What the profile form collects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub email: String,
    pub name: String,
    pub gender: String,
    pub age: i32,
    pub activity_level: String,
    pub goals: String,
    pub height: f64,
    pub weight: f64,
    pub target_weight: f64,
    pub diseases: String,
    pub healthscore: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserDetails {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub diet_plan: Option<String>,
    pub track: Option<Value>,
    pub dm: Option<String>,
}

pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub message: String,
}

const DETAIL_COLUMNS: &str = "email, name, gender, age, activity_level, goals, height, weight, \
     target_weight, diseases, healthscore, diet_plan, track, dm";

impl UserDetails {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            profile: UserProfile {
                email: row.try_get("email")?,
                name: row.try_get("name")?,
                gender: row.try_get("gender")?,
                age: row.try_get("age")?,
                activity_level: row.try_get("activity_level")?,
                goals: row.try_get("goals")?,
                height: row.try_get("height")?,
                weight: row.try_get("weight")?,
                target_weight: row.try_get("target_weight")?,
                diseases: row.try_get("diseases")?,
                healthscore: row.try_get("healthscore")?,
            },
            diet_plan: row.try_get("diet_plan")?,
            track: row.try_get("track")?,
            dm: row.try_get("dm")?,
        })
    }
}

pub async fn upsert_profile(pool: &Pool, profile: &UserProfile) -> Result<(), AppError> {
    let client = pool.get().await?;

    client
        .execute(
            "INSERT INTO user_details (
                email, name, gender, age, activity_level, goals,
                height, weight, target_weight, diseases, healthscore
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (email) DO UPDATE SET
                name = EXCLUDED.name,
                gender = EXCLUDED.gender,
                age = EXCLUDED.age,
                activity_level = EXCLUDED.activity_level,
                goals = EXCLUDED.goals,
                height = EXCLUDED.height,
                weight = EXCLUDED.weight,
                target_weight = EXCLUDED.target_weight,
                diseases = EXCLUDED.diseases,
                healthscore = EXCLUDED.healthscore",
            &[
                &profile.email,
                &profile.name,
                &profile.gender,
                &profile.age,
                &profile.activity_level,
                &profile.goals,
                &profile.height,
                &profile.weight,
                &profile.target_weight,
                &profile.diseases,
                &profile.healthscore,
            ],
        )
        .await?;

    Ok(())
}

pub async fn fetch_details(pool: &Pool, email: &str) -> Result<Option<UserDetails>, AppError> {
    let client = pool.get().await?;
    let query = format!("SELECT {DETAIL_COLUMNS} FROM user_details WHERE email = $1");

    let row = client.query_opt(&query, &[&email]).await?;

    Ok(row.as_ref().map(UserDetails::from_row).transpose()?)
}

pub async fn all_users(pool: &Pool) -> Result<Vec<UserDetails>, AppError> {
    let client = pool.get().await?;
    let query = format!("SELECT {DETAIL_COLUMNS} FROM user_details ORDER BY email");

    let rows = client.query(&query, &[]).await?;

    Ok(rows
        .iter()
        .map(UserDetails::from_row)
        .collect::<Result<_, _>>()?)
}

pub async fn exists(pool: &Pool, email: &str) -> Result<bool, AppError> {
    let client = pool.get().await?;

    let row = client
        .query_one(
            "SELECT EXISTS (SELECT 1 FROM user_details WHERE email = $1)",
            &[&email],
        )
        .await?;

    Ok(row.try_get(0)?)
}

pub async fn fetch_name(pool: &Pool, email: &str) -> Result<Option<String>, AppError> {
    let client = pool.get().await?;

    let row = client
        .query_opt("SELECT name FROM user_details WHERE email = $1", &[&email])
        .await?;

    Ok(row.map(|row| row.try_get(0)).transpose()?)
}

/// Height (cm) and weight (kg).
pub async fn fetch_metrics(pool: &Pool, email: &str) -> Result<Option<(f64, f64)>, AppError> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            "SELECT height, weight FROM user_details WHERE email = $1",
            &[&email],
        )
        .await?;

    Ok(row
        .map(|row| Ok::<_, tokio_postgres::Error>((row.try_get(0)?, row.try_get(1)?)))
        .transpose()?)
}

pub async fn fetch_healthscore(pool: &Pool, email: &str) -> Result<Option<i32>, AppError> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            "SELECT healthscore FROM user_details WHERE email = $1",
            &[&email],
        )
        .await?;

    Ok(row.map(|row| row.try_get(0)).transpose()?)
}

pub async fn set_healthscore(pool: &Pool, email: &str, score: i32) -> Result<(), AppError> {
    let client = pool.get().await?;

    client
        .execute(
            "UPDATE user_details SET healthscore = $1 WHERE email = $2",
            &[&score, &email],
        )
        .await?;

    Ok(())
}

/// Returns false when no profile exists for `email`.
pub async fn append_meal(pool: &Pool, email: &str, entry: &MealEntry) -> Result<bool, AppError> {
    let client = pool.get().await?;
    let entry = serde_json::to_value(entry).map_err(|e| AppError::InternalError(Box::new(e)))?;

    // legacy rows may hold a single object instead of an array
    let updated = client
        .execute(
            "UPDATE user_details
            SET track = CASE jsonb_typeof(track)
                WHEN 'array' THEN track || jsonb_build_array($1::jsonb)
                WHEN 'object' THEN jsonb_build_array(track, $1::jsonb)
                ELSE jsonb_build_array($1::jsonb)
            END
            WHERE email = $2",
            &[&entry, &email],
        )
        .await?;

    Ok(updated > 0)
}

/// `healthscore` is left untouched when `None`.
pub async fn update_diet(
    pool: &Pool,
    email: &str,
    plan: &str,
    healthscore: Option<i32>,
) -> Result<bool, AppError> {
    let client = pool.get().await?;

    let updated = match healthscore {
        Some(score) => {
            client
                .execute(
                    "UPDATE user_details SET diet_plan = $1, healthscore = $2 WHERE email = $3",
                    &[&plan, &score, &email],
                )
                .await?
        }
        None => {
            client
                .execute(
                    "UPDATE user_details SET diet_plan = $1 WHERE email = $2",
                    &[&plan, &email],
                )
                .await?
        }
    };

    Ok(updated > 0)
}

pub async fn update_dm(pool: &Pool, email: &str, message: &str) -> Result<bool, AppError> {
    let client = pool.get().await?;

    let updated = client
        .execute(
            "UPDATE user_details SET dm = $1 WHERE email = $2",
            &[&message, &email],
        )
        .await?;

    Ok(updated > 0)
}

pub async fn insert_contact(pool: &Pool, contact: &ContactMessage) -> Result<(), AppError> {
    let client = pool.get().await?;

    client
        .execute(
            "INSERT INTO contact_messages (name, email, phone, message) VALUES ($1, $2, $3, $4)",
            &[
                &contact.name,
                &contact.email,
                &contact.phone,
                &contact.message,
            ],
        )
        .await?;

    Ok(())
}
