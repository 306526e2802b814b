//! Backend of Blissful Bites, a diet tracking site.
//!
//! # Overview
//! - Users sign up with an email and password, then fill in a profile form
//! - The dashboard shows BMI and a 0-10 health score computed from the profile
//! - Meals are tracked once a day, either as text or as photos analyzed by a vision model
//! - Diet plans and short suggestions are generated by a text model and stored per user
//!
//! # Storage
//! Everything lives in Postgres. Credentials can optionally be kept in a JSON file instead
//! (`AUTH_BACKEND=json`) for running locally.
//!
//! # AI
//! Groq by default, Gemini with `AI_PROVIDER=gemini`. See the `ai` crate.
//!
//! # Setup
//!
//! Run the server.
//! ```sh
//! POSTGRES_PASS=... GROQ_API_KEY=... RUST_LOG=info cargo run -p bites
//! ```
//!
//! Smoke test a running server.
//! ```sh
//! cargo run -p tester -- http://127.0.0.1:8080
//! ```
//!
//! Regenerate every user's suggestion offline.
//! ```sh
//! cargo run -p digest -- --only-missing
//! ```
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{Method, header::CONTENT_TYPE},
    routing::{get, get_service, post},
};
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod meals;
pub mod routes;
pub mod state;
pub mod users;
pub mod utils;

use config::Config;
use error::AppError;
use routes::{
    admin_handler, basic_info_handler, bmi_handler, contact_handler, dm_handler,
    favicon_handler, first_login_handler, form_handler, gen_diet_plan_handler,
    health_score_handler, root_handler, signin_handler, signup_handler, track_meal_handler,
    update_diet_handler, user_details_handler,
};
use state::AppState;

pub fn app(state: Arc<AppState>) -> Router {
    let static_dir = state.config.static_dir.clone();
    let page = |file: &str| get_service(ServeFile::new(static_dir.join(file)));

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/", get(root_handler))
        .route("/favicon.ico", get(favicon_handler))
        .route("/login", page("auth.html"))
        .route("/signup", page("signup.html").post(signup_handler))
        .route("/dashboard", page("Home.html"))
        .route("/form", page("form.html"))
        .route("/track", page("track.html"))
        .route("/contact", page("Contact.html"))
        .route("/user", page("user.html"))
        .route("/signin", post(signin_handler))
        .route("/userFormDetails", post(form_handler))
        .route("/userDetails", get(user_details_handler))
        .route("/userBasicInfo", get(basic_info_handler))
        .route("/userBMI", get(bmi_handler))
        .route("/userHealthScore", get(health_score_handler))
        .route("/firstlogin", get(first_login_handler))
        .route("/trackMeal", post(track_meal_handler))
        .route("/genDietPlan", post(gen_diet_plan_handler))
        .route("/updateDiet", post(update_diet_handler))
        .route("/dm", get(dm_handler))
        .route("/admin", get(admin_handler))
        .route("/contactUs", post(contact_handler))
        .nest_service("/static", ServeDir::new(&static_dir))
        .nest_service("/images", ServeDir::new(static_dir.join("images")))
        .nest_service(
            "/intlTelInput",
            ServeDir::new(static_dir.join("intlTelInput")),
        )
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() -> Result<(), AppError> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;

    info!("Initializing state...");
    let state = AppState::new(config).await?;

    info!("Starting server...");
    let address = format!("{}:{}", state.config.bind_address, state.config.port);
    let app = app(state);

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await.map_err(|e| {
        error!("Failed to bind {address}: {e}");
        AppError::InternalError(Box::new(e))
    })?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::InternalError(Box::new(e)))?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        path::Path,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use ai::{ImageFormat, MealAnalysis, Nutritionist};
    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        extract::{FromRequest, Multipart},
        http::{
            Request, StatusCode,
            header::{CONTENT_TYPE, LOCATION},
        },
        response::Response,
    };
    use deadpool_postgres::Pool;
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        auth::JsonAuth,
        database::{create_pool, init_pool, migrate},
        meals::MealSlot,
        routes::read_meal_form,
    };

    #[derive(Default)]
    struct Scripted {
        vision_calls: AtomicUsize,
    }

    #[async_trait]
    impl Nutritionist for Scripted {
        async fn diet_plan(&self, _profile: &str) -> Result<String> {
            Ok("Oats for breakfast".to_string())
        }

        async fn quick_tip(&self, _profile: &str) -> Result<String> {
            Ok("Drink water".to_string())
        }

        async fn analyze_meal(&self, _image: &[u8], _format: ImageFormat) -> Result<MealAnalysis> {
            self.vision_calls.fetch_add(1, Ordering::SeqCst);
            bail!("no vision in tests")
        }
    }

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn state(
        config: Config,
        pool: Pool,
        auth: JsonAuth,
        nutritionist: Arc<Scripted>,
    ) -> Arc<AppState> {
        Arc::new(AppState {
            config,
            pool,
            auth: Arc::new(auth),
            nutritionist,
        })
    }

    /// Nothing listens on port 1, so any route that reaches Postgres fails fast.
    async fn test_app_with(dir: &Path, nutritionist: Arc<Scripted>) -> Router {
        let vars: HashMap<&str, String> = HashMap::from([
            ("POSTGRES_PASS", "pw".to_string()),
            ("POSTGRES_HOST", "127.0.0.1".to_string()),
            ("POSTGRES_PORT", "1".to_string()),
            ("GROQ_API_KEY", "gsk".to_string()),
            ("AUTH_BACKEND", "json".to_string()),
            ("STATIC_DIR", dir.display().to_string()),
        ]);
        let config = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();

        let pool = create_pool(&config.postgres).unwrap();
        let auth = JsonAuth::open(dir.join("users.json"), 4).await.unwrap();

        app(state(config, pool, auth, nutritionist))
    }

    async fn test_app(dir: &Path) -> Router {
        test_app_with(dir, Arc::default()).await
    }

    /// Runs against a real database when `BITES_TEST_POSTGRES_PASS` is set, JSON auth on top.
    async fn live_app(dir: &Path, nutritionist: Arc<Scripted>) -> Option<Router> {
        let Ok(password) = std::env::var("BITES_TEST_POSTGRES_PASS") else {
            eprintln!("BITES_TEST_POSTGRES_PASS not set, skipping");
            return None;
        };

        let config = Config::from_lookup(|key| match key {
            "POSTGRES_PASS" => Some(password.clone()),
            "GROQ_API_KEY" => Some("gsk".to_string()),
            "AUTH_BACKEND" => Some("json".to_string()),
            "STATIC_DIR" => Some(dir.display().to_string()),
            "POSTGRES_USER" | "POSTGRES_HOST" | "POSTGRES_PORT" | "POSTGRES_DB" => {
                std::env::var(format!("BITES_TEST_{key}")).ok()
            }
            _ => None,
        })
        .unwrap();

        let pool = init_pool(&config.postgres).await.unwrap();
        migrate(&pool, config.auth_backend).await.unwrap();
        let auth = JsonAuth::open(dir.join("users.json"), 4).await.unwrap();

        Some(app(state(config, pool, auth, nutritionist)))
    }

    fn setup() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("auth.html"), "<h1>login</h1>").unwrap();
        std::fs::write(dir.path().join("signup.html"), "<h1>signup</h1>").unwrap();
        dir
    }

    fn json_request(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn form_request(uri: &str, body: String) -> Request<Body> {
        Request::post(uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    /// `(name, file name, contents)`; parts without a file name are plain text fields.
    fn multipart_parts(parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
        let boundary = "bitesboundary";
        let mut body = Vec::new();
        for (name, file_name, contents) in parts {
            let disposition = match file_name {
                Some(file_name) => format!(
                    "form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                     Content-Type: application/octet-stream"
                ),
                None => format!("form-data; name=\"{name}\""),
            };
            body.extend_from_slice(
                format!("--{boundary}\r\nContent-Disposition: {disposition}\r\n\r\n").as_bytes(),
            );
            body.extend_from_slice(contents);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        Request::post("/trackMeal")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn multipart_request(fields: &[(&str, &str)]) -> Request<Body> {
        let parts: Vec<(&str, Option<&str>, &[u8])> = fields
            .iter()
            .map(|(name, value)| (*name, None, value.as_bytes()))
            .collect();

        multipart_parts(&parts)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn root_redirects_to_login() {
        let dir = setup();
        let response = test_app(dir.path())
            .await
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "/login");
    }

    #[tokio::test]
    async fn favicon_is_empty() {
        let dir = setup();
        let response = test_app(dir.path())
            .await
            .oneshot(Request::get("/favicon.ico").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn pages_are_served_from_the_static_dir() {
        let dir = setup();
        let app = test_app(dir.path()).await;

        let response = app
            .clone()
            .oneshot(Request::get("/login").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"<h1>login</h1>");

        let response = app
            .oneshot(Request::get("/signup").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn signup_and_signin() {
        let dir = setup();
        let app = test_app(dir.path()).await;
        let credentials = json!({ "username": "asha@example.com", "password": "masala" });

        let response = app
            .clone()
            .oneshot(json_request("/signup", credentials.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "message": "Signup successful" })
        );

        let response = app
            .clone()
            .oneshot(json_request("/signup", credentials.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Username already exists or error occurred" })
        );

        let response = app
            .clone()
            .oneshot(json_request("/signin", credentials))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "message": "Signin successful" })
        );

        let response = app
            .oneshot(json_request(
                "/signin",
                json!({ "username": "asha@example.com", "password": "chai" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Invalid username or password" })
        );
    }

    #[tokio::test]
    async fn bad_credentials_payloads() {
        let dir = setup();
        let app = test_app(dir.path()).await;

        for body in [
            json!({ "username": "asha@example.com" }),
            json!({ "username": "", "password": "masala" }),
            json!("asha@example.com"),
        ] {
            let response = app
                .clone()
                .oneshot(json_request("/signin", body))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(
                body_json(response).await,
                json!({ "error": "Invalid request" })
            );
        }
    }

    #[tokio::test]
    async fn email_is_required() {
        let dir = setup();
        let app = test_app(dir.path()).await;

        for uri in [
            "/userDetails",
            "/userBasicInfo",
            "/userBMI?email=",
            "/userHealthScore",
            "/firstlogin",
            "/dm",
        ] {
            let response = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(
                body_json(response).await,
                json!({ "error": "Email is required" })
            );
        }
    }

    #[tokio::test]
    async fn diet_plan_needs_an_email() {
        let dir = setup();
        let response = test_app(dir.path())
            .await
            .oneshot(json_request("/genDietPlan", json!({ "name": "Asha" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "email is missing or invalid" })
        );
    }

    #[tokio::test]
    async fn track_meal_needs_every_slot() {
        let dir = setup();
        let response = test_app(dir.path())
            .await
            .oneshot(multipart_request(&[
                ("email", "asha@example.com"),
                ("breakfast", "poha"),
                ("dinner", "dal rice"),
                ("weight", "60"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Lunch value empty." })
        );
    }

    #[tokio::test]
    async fn track_meal_needs_an_email() {
        let dir = setup();
        let response = test_app(dir.path())
            .await
            .oneshot(multipart_request(&[
                ("breakfast", "poha"),
                ("lunch", "roti"),
                ("dinner", "dal rice"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn contact_needs_a_message() {
        let dir = setup();
        let response = test_app(dir.path())
            .await
            .oneshot(
                Request::post("/contactUs")
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("name=Asha&email=asha%40example.com&message=+"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Message is required" })
        );
    }

    #[tokio::test]
    async fn database_failures_are_generic() {
        let dir = setup();
        let response = test_app(dir.path())
            .await
            .oneshot(
                Request::get("/userBMI?email=asha%40example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Internal server error" })
        );
    }

    #[tokio::test]
    async fn meal_form_keeps_slot_photos_only() {
        let request = multipart_parts(&[
            ("email", None, b"asha@example.com"),
            ("breakfast", None, b"poha"),
            ("breakfast_img", Some("poha.png"), PNG),
            ("dinner_img", Some("empty.png"), b""),
            ("snack_img", Some("samosa.png"), PNG),
        ]);
        let multipart = Multipart::from_request(request, &()).await.unwrap();

        let form = read_meal_form(multipart).await.unwrap();

        assert_eq!(form.text.len(), 2);
        assert_eq!(form.text["breakfast"], "poha");
        assert_eq!(form.uploads.len(), 1);
        assert_eq!(form.uploads[0].slot, MealSlot::Breakfast);
        assert_eq!(form.uploads[0].file_name, "poha.png");
        assert_eq!(form.uploads[0].bytes, PNG);
    }

    #[tokio::test]
    async fn photos_wait_for_the_user_lookup() {
        let dir = setup();
        let nutritionist = Arc::new(Scripted::default());

        let response = test_app_with(dir.path(), nutritionist.clone())
            .await
            .oneshot(multipart_parts(&[
                ("email", None, b"asha@example.com"),
                ("breakfast_img", Some("poha.png"), PNG),
                ("lunch", None, b"roti"),
                ("dinner", None, b"dal rice"),
            ]))
            .await
            .unwrap();

        // the photo got past slot validation and stopped at the (unreachable) user lookup
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(nutritionist.vision_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn json_auth_user_can_save_a_profile_and_track_meals() {
        let dir = setup();
        let nutritionist = Arc::new(Scripted::default());
        let Some(app) = live_app(dir.path(), nutritionist.clone()).await else {
            return;
        };

        let email = format!("asha-{}@example.com", chrono::Utc::now().timestamp_micros());
        let encoded = email.replace('@', "%40");

        let response = app
            .clone()
            .oneshot(json_request(
                "/signup",
                json!({ "username": email, "password": "masala" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(form_request(
                "/userFormDetails",
                format!(
                    "email={encoded}&name=Asha&gender=female&age=31&activityLevel=moderate\
                     &goals=lose&height=165&weight=68&tweight=62&disease=thyroid&healthscore=5"
                ),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "/dashboard");

        // the vision call fails, so breakfast falls back to its description
        let response = app
            .clone()
            .oneshot(multipart_parts(&[
                ("email", None, email.as_bytes()),
                ("date", None, b"2025-03-01"),
                ("breakfast", None, b"poha"),
                ("breakfast_img", Some("poha.png"), PNG),
                ("lunch", None, b"roti"),
                ("dinner", None, b"dal rice"),
                ("weight", None, b"68"),
            ]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(nutritionist.vision_calls.load(Ordering::SeqCst), 1);

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/userDetails?email={encoded}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let details = body_json(response).await;
        assert_eq!(details["track"][0]["breakfast"], "poha");
        // 100 - 5 (moderate) - 5 (one condition) - 5 (6kg gap)
        assert_eq!(details["healthscore"], 8);

        let score = |app: Router| {
            let uri = format!("/userHealthScore?email={encoded}");
            async move {
                let response = app
                    .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                    .await
                    .unwrap();
                body_json(response).await["healthscore"].clone()
            }
        };

        let response = app
            .clone()
            .oneshot(form_request(
                "/updateDiet",
                format!("email={encoded}&diet_plan=more+greens&healthscore=0"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(score(app.clone()).await, 8);

        app.clone()
            .oneshot(form_request(
                "/updateDiet",
                format!("email={encoded}&diet_plan=more+greens&healthscore=7"),
            ))
            .await
            .unwrap();
        assert_eq!(score(app.clone()).await, 7);

        let response = app
            .oneshot(multipart_parts(&[
                ("email", None, b"nobody@example.com"),
                ("breakfast_img", Some("poha.png"), PNG),
                ("lunch", None, b"roti"),
                ("dinner", None, b"dal rice"),
            ]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(nutritionist.vision_calls.load(Ordering::SeqCst), 1);
    }
}
