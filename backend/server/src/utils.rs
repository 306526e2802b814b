use std::collections::HashMap;

use axum::body::Bytes;
use chrono::Local;
use serde_json::{Map, Value};
use url::form_urlencoded;

use crate::{
    error::AppError::{self, MalformedPayload},
    users::{UserDetails, UserProfile},
};

/// A urlencoded form body. Checkbox groups repeat their key, so every key keeps all its values.
#[derive(Debug, Default)]
pub struct FormFields {
    fields: HashMap<String, Vec<String>>,
}

impl FormFields {
    pub fn parse(body: &Bytes) -> Self {
        let mut fields: HashMap<String, Vec<String>> = HashMap::new();

        for (key, value) in form_urlencoded::parse(body) {
            fields
                .entry(key.into_owned())
                .or_default()
                .push(value.into_owned());
        }

        Self { fields }
    }

    /// First value, trimmed, empty when absent.
    pub fn get(&self, key: &str) -> &str {
        self.fields
            .get(key)
            .and_then(|values| values.first())
            .map(|value| value.trim())
            .unwrap_or("")
    }

    /// Every non-blank value joined with commas.
    pub fn joined(&self, key: &str) -> String {
        self.fields
            .get(key)
            .map(|values| {
                values
                    .iter()
                    .map(|value| value.trim())
                    .filter(|value| !value.is_empty())
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_default()
    }

    pub fn parsed<T: std::str::FromStr>(&self, key: &str, label: &str) -> Result<T, AppError> {
        self.get(key)
            .parse()
            .map_err(|_| MalformedPayload(format!("Invalid {label} format")))
    }
}

pub fn profile_from_form(form: &FormFields) -> Result<UserProfile, AppError> {
    let email = form.get("email");
    if email.is_empty() {
        return Err(AppError::email_required());
    }

    Ok(UserProfile {
        email: email.to_string(),
        name: form.get("name").to_string(),
        gender: form.get("gender").to_string(),
        age: form.parsed("age", "age")?,
        activity_level: form.get("activityLevel").to_string(),
        goals: form.joined("goals"),
        height: form.parsed("height", "height")?,
        weight: form.parsed("weight", "weight")?,
        target_weight: form.parsed("tweight", "target weight")?,
        diseases: form.joined("disease"),
        healthscore: form.parsed("healthscore", "healthscore")?,
    })
}

pub fn require_email(email: Option<&str>) -> Result<&str, AppError> {
    match email.map(str::trim) {
        Some(email) if !email.is_empty() => Ok(email),
        _ => Err(AppError::email_required()),
    }
}

/// A submitted health score. Blank, unparseable and 0 all mean "keep the stored one".
pub fn optional_score(raw: &str) -> Option<i32> {
    raw.trim().parse().ok().filter(|score| *score != 0)
}

pub fn today() -> String {
    Local::now().date_naive().format("%Y-%m-%d").to_string()
}

/// Renders the loosely typed `/genDietPlan` body as prompt lines.
pub fn profile_text_from_json(data: &Map<String, Value>) -> String {
    let field = |key: &str| -> String {
        match data.get(key) {
            None | Some(Value::Null) => "not provided".to_string(),
            Some(Value::String(text)) if text.trim().is_empty() => "not provided".to_string(),
            Some(Value::String(text)) => text.trim().to_string(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", "),
            Some(other) => other.to_string(),
        }
    };

    format!(
        "Name: {}\nAge: {}\nGender: {}\nActivity Level: {}\nGoals: {}\nHeight: {} cm\n\
         Weight: {} kg\nTarget Weight: {} kg\nMedical Conditions: {}\n\n\
         Please provide a detailed daily diet plan including breakfast, lunch, dinner, and snacks. \
         Include portion sizes and timing. Consider their medical conditions and fitness goals.",
        field("name"),
        field("age"),
        field("gender"),
        field("activityLevel"),
        field("goals"),
        field("height"),
        field("weight"),
        field("tweight"),
        field("disease"),
    )
}

/// Profile plus tracked meals, for the short suggestion.
pub fn profile_text_from_details(details: &UserDetails, bmi: Option<f64>) -> String {
    let profile = &details.profile;
    let or_none = |text: &str| {
        if text.trim().is_empty() {
            "none".to_string()
        } else {
            text.to_string()
        }
    };

    let mut text = format!(
        "Name: {}\nAge: {}\nGender: {}\nActivity Level: {}\nGoals: {}\nHeight: {} cm\n\
         Weight: {} kg\nTarget Weight: {} kg\nMedical Conditions: {}\n",
        profile.name,
        profile.age,
        profile.gender,
        profile.activity_level,
        or_none(&profile.goals),
        profile.height,
        profile.weight,
        profile.target_weight,
        or_none(&profile.diseases),
    );

    if let Some(bmi) = bmi {
        text.push_str(&format!("BMI: {bmi}\n"));
    }

    match &details.track {
        Some(track) if !track.is_null() => {
            text.push_str(&format!("Tracked meals: {track}\n"));
        }
        _ => text.push_str("Tracked meals: none yet\n"),
    }

    text
}
