use std::{collections::HashMap, sync::Arc};

use axum::{
    Json,
    body::Bytes,
    extract::{
        Multipart, Query, State,
        multipart::MultipartRejection,
        rejection::JsonRejection,
    },
    http::{StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::{
    auth::Signup,
    error::AppError::{self, MalformedPayload},
    health::{bmi, health_score},
    meals::{MealSlot, Upload, analyze_uploads, assemble_entry, check_slots},
    state::AppState,
    users::{self, ContactMessage},
    utils::{
        FormFields, optional_score, profile_from_form, profile_text_from_details,
        profile_text_from_json, require_email,
    },
};

type AppResult = Result<Response, AppError>;

#[derive(Deserialize)]
pub struct EmailQuery {
    email: Option<String>,
}

#[derive(Deserialize)]
pub struct Credentials {
    username: String,
    password: String,
}

fn found(location: &'static str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location)]).into_response()
}

fn ok(body: Value) -> AppResult {
    Ok((StatusCode::OK, Json(body)).into_response())
}

fn credentials(payload: Result<Json<Credentials>, JsonRejection>) -> Result<Credentials, AppError> {
    let invalid = || MalformedPayload("Invalid request".to_string());

    let Json(credentials) = payload.map_err(|e| {
        debug!("Rejected credentials payload: {e}");
        invalid()
    })?;

    if credentials.username.trim().is_empty() || credentials.password.is_empty() {
        return Err(invalid());
    }

    Ok(credentials)
}

pub async fn root_handler() -> Response {
    found("/login")
}

pub async fn favicon_handler() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> AppResult {
    let credentials = credentials(payload)?;

    match state
        .auth
        .signup(credentials.username.trim(), &credentials.password)
        .await?
    {
        Signup::Created => {
            info!("New signup: {}", credentials.username.trim());
            ok(json!({ "message": "Signup successful" }))
        }
        Signup::Taken => Err(AppError::Conflict(
            "Username already exists or error occurred".to_string(),
        )),
    }
}

pub async fn signin_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> AppResult {
    let credentials = credentials(payload)?;

    if state
        .auth
        .login(credentials.username.trim(), &credentials.password)
        .await?
    {
        ok(json!({ "message": "Signin successful" }))
    } else {
        Err(AppError::Unauthorized(
            "Invalid username or password".to_string(),
        ))
    }
}

pub async fn form_handler(State(state): State<Arc<AppState>>, body: Bytes) -> AppResult {
    let profile = profile_from_form(&FormFields::parse(&body))?;
    info!("Saving profile for {}", profile.email);

    users::upsert_profile(&state.pool, &profile).await?;

    Ok(found("/dashboard"))
}

pub async fn user_details_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EmailQuery>,
) -> AppResult {
    let email = require_email(query.email.as_deref())?;

    let mut details = users::fetch_details(&state.pool, email)
        .await?
        .ok_or_else(AppError::user_not_found)?;

    let bmi = bmi(details.profile.height, details.profile.weight);
    let score = health_score(&details.profile, bmi);

    if score != details.profile.healthscore {
        match users::set_healthscore(&state.pool, email, score).await {
            Ok(()) => details.profile.healthscore = score,
            Err(e) => warn!("Failed to update health score for {email}: {e}"),
        }
    }

    let profile = &details.profile;
    ok(json!({
        "name": profile.name,
        "gender": profile.gender,
        "age": profile.age,
        "activity_level": profile.activity_level,
        "goals": profile.goals,
        "height": profile.height,
        "weight": profile.weight,
        "target_weight": profile.target_weight,
        "diseases": profile.diseases,
        "email": profile.email,
        "diet_plan": details.diet_plan.clone().unwrap_or_default(),
        "healthscore": score,
        "track": details.track.clone().unwrap_or(Value::Null),
        "bmi": bmi,
    }))
}

pub async fn basic_info_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EmailQuery>,
) -> AppResult {
    let email = require_email(query.email.as_deref())?;

    let name = users::fetch_name(&state.pool, email)
        .await?
        .ok_or_else(AppError::user_not_found)?;

    ok(json!({ "name": name, "email": email }))
}

pub async fn bmi_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EmailQuery>,
) -> AppResult {
    let email = require_email(query.email.as_deref())?;

    let (height, weight) = users::fetch_metrics(&state.pool, email)
        .await?
        .ok_or_else(AppError::user_not_found)?;

    ok(json!({ "bmi": bmi(height, weight) }))
}

pub async fn health_score_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EmailQuery>,
) -> AppResult {
    let email = require_email(query.email.as_deref())?;

    let healthscore = users::fetch_healthscore(&state.pool, email)
        .await?
        .ok_or_else(AppError::user_not_found)?;

    ok(json!({ "healthscore": healthscore }))
}

pub async fn first_login_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EmailQuery>,
) -> AppResult {
    let email = require_email(query.email.as_deref())?;

    let has_profile = users::exists(&state.pool, email).await?;

    ok(json!({ "first_login": !has_profile }))
}

/// Text fields and photo uploads of a `/trackMeal` body.
#[derive(Default)]
pub struct MealForm {
    pub text: HashMap<String, String>,
    pub uploads: Vec<Upload>,
}

/// Empty photos and files in fields other than the three meal slots are dropped.
pub async fn read_meal_form(mut multipart: Multipart) -> Result<MealForm, AppError> {
    let mut form = MealForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| MalformedPayload(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        let Some(file_name) = field.file_name().map(str::to_string) else {
            let value = field
                .text()
                .await
                .map_err(|e| MalformedPayload(e.body_text()))?;
            form.text.insert(name, value);
            continue;
        };

        let bytes = field
            .bytes()
            .await
            .map_err(|e| MalformedPayload(e.body_text()))?;

        match MealSlot::from_image_field(&name) {
            Some(slot) if !bytes.is_empty() => form.uploads.push(Upload {
                slot,
                file_name,
                bytes: bytes.to_vec(),
            }),
            Some(_) => debug!("Empty upload for {name}"),
            None => debug!("Ignoring upload in unexpected field {name}"),
        }
    }

    Ok(form)
}

pub async fn track_meal_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult {
    let multipart = multipart.map_err(|e| MalformedPayload(e.body_text()))?;
    let MealForm { text, uploads } = read_meal_form(multipart).await?;

    let email = require_email(text.get("email").map(String::as_str))?.to_string();
    check_slots(&text, &uploads)?;

    // unknown users never reach the model
    if !users::exists(&state.pool, &email).await? {
        return Err(AppError::user_not_found());
    }

    info!("Tracking meals for {email} with {} photo(s)", uploads.len());

    let analyses = analyze_uploads(state.nutritionist.clone(), uploads).await;
    let entry = assemble_entry(&text, analyses)?;

    if !users::append_meal(&state.pool, &email, &entry).await? {
        return Err(AppError::user_not_found());
    }

    ok(json!({ "status": "message sent" }))
}

pub async fn update_diet_handler(State(state): State<Arc<AppState>>, body: Bytes) -> AppResult {
    let form = FormFields::parse(&body);
    let email = require_email(Some(form.get("email")))?;

    let healthscore = optional_score(form.get("healthscore"));

    if !users::update_diet(&state.pool, email, form.get("diet_plan"), healthscore).await? {
        return Err(AppError::user_not_found());
    }

    ok(json!({ "status": "plan updated" }))
}

pub async fn gen_diet_plan_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> AppResult {
    let Json(data) = payload.map_err(|e| MalformedPayload(e.body_text()))?;

    let email = data
        .get("email")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .ok_or_else(|| MalformedPayload("email is missing or invalid".to_string()))?;

    if !users::exists(&state.pool, email).await? {
        return Err(AppError::user_not_found());
    }

    info!("Generating diet plan for {email}");
    let plan = state
        .nutritionist
        .diet_plan(&profile_text_from_json(&data))
        .await?;

    users::update_diet(&state.pool, email, &plan, None).await?;
    info!("Diet plan saved for {email}");

    ok(json!({ "diet_plan": plan }))
}

pub async fn dm_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EmailQuery>,
) -> AppResult {
    let email = require_email(query.email.as_deref())?;

    let details = users::fetch_details(&state.pool, email)
        .await?
        .ok_or_else(AppError::user_not_found)?;

    let bmi = bmi(details.profile.height, details.profile.weight);
    let tip = state
        .nutritionist
        .quick_tip(&profile_text_from_details(&details, bmi))
        .await?;

    users::update_dm(&state.pool, email, &tip).await?;

    ok(json!({ "dm": tip }))
}

pub async fn admin_handler(State(state): State<Arc<AppState>>) -> AppResult {
    let users = users::all_users(&state.pool).await?;
    info!("Admin listing {} user(s)", users.len());

    Ok(Json(users).into_response())
}

pub async fn contact_handler(State(state): State<Arc<AppState>>, body: Bytes) -> AppResult {
    let form = FormFields::parse(&body);

    let contact = ContactMessage {
        name: form.get("name").to_string(),
        email: form.get("email").to_string(),
        phone: form.get("phone").to_string(),
        message: form.get("message").to_string(),
    };

    if contact.message.is_empty() {
        return Err(MalformedPayload("Message is required".to_string()));
    }

    users::insert_contact(&state.pool, &contact).await?;
    info!("Contact message received from {}", contact.email);

    ok(json!({ "status": "message received" }))
}
