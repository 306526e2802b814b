use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use reqwest::{
    Client, Response,
    multipart::{Form, Part},
    redirect::Policy,
};
use serde_json::{Value, json};

/// Walks a running server through signup, profile, and meal tracking.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    base_url: String,

    #[arg(long, default_value = "tester@example.com")]
    email: String,

    #[arg(long, default_value = "tester-password")]
    password: String,

    /// Breakfast photo to send instead of a text description
    #[arg(long)]
    image: Option<PathBuf>,
}

async fn check(step: &str, response: Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await?;

    println!("{step}: {status} {body}");

    if status.is_client_error() || status.is_server_error() {
        bail!("{step} failed with {status}");
    }

    Ok(body)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let base = args.base_url.trim_end_matches('/');

    // the profile form answers with a redirect that should be seen, not followed
    let client = Client::builder().redirect(Policy::none()).build()?;

    let credentials = json!({ "username": args.email, "password": args.password });

    let signup = client
        .post(format!("{base}/signup"))
        .json(&credentials)
        .send()
        .await?;
    if signup.status().as_u16() == 409 {
        println!("signup: account already exists");
    } else {
        check("signup", signup).await?;
    }

    let signin = client
        .post(format!("{base}/signin"))
        .json(&credentials)
        .send()
        .await?;
    check("signin", signin).await?;

    let profile = client
        .post(format!("{base}/userFormDetails"))
        .form(&[
            ("email", args.email.as_str()),
            ("name", "Tester"),
            ("gender", "female"),
            ("age", "31"),
            ("activityLevel", "moderate"),
            ("goals", "lose"),
            ("goals", "tone"),
            ("height", "165"),
            ("weight", "68"),
            ("tweight", "62"),
            ("disease", "thyroid"),
            ("healthscore", "0"),
        ])
        .send()
        .await?;
    check("profile", profile).await?;

    let mut meal = Form::new()
        .text("email", args.email.clone())
        .text("lunch", "roti, dal and salad")
        .text("dinner", "khichdi")
        .text("weight", "68");

    meal = match &args.image {
        Some(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "breakfast".to_string());

            meal.part("breakfast_img", Part::bytes(bytes).file_name(file_name))
        }
        None => meal.text("breakfast", "poha with peanuts"),
    };

    let track = client
        .post(format!("{base}/trackMeal"))
        .multipart(meal)
        .send()
        .await?;
    check("trackMeal", track).await?;

    let details = client
        .get(format!("{base}/userDetails"))
        .query(&[("email", args.email.as_str())])
        .send()
        .await?;
    let body = check("userDetails", details).await?;

    let details: Value = serde_json::from_str(&body)?;
    println!("\n{}", serde_json::to_string_pretty(&details)?);

    Ok(())
}
