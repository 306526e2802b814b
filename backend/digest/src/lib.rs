//! # Digest
//!
//! Writes a fresh short suggestion (the `dm` column) for every user with a profile.
//!
//! Meant to be run from cron once a day, after users have had a chance to track their meals.
//! One user failing never stops the run; failures are counted and reported at the end.
use indicatif::{ProgressBar, ProgressStyle};

use ai::{Nutritionist, nutritionist};
use server::{
    config::Config,
    database::init_pool,
    health::bmi,
    users::{UserDetails, all_users, update_dm},
    utils::profile_text_from_details,
};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub updated: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Users to write a suggestion for, in the order they are returned.
pub fn select(users: Vec<UserDetails>, only_missing: bool, limit: Option<usize>) -> Vec<UserDetails> {
    users
        .into_iter()
        .filter(|user| {
            !only_missing
                || user
                    .dm
                    .as_deref()
                    .is_none_or(|dm| dm.trim().is_empty())
        })
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

pub async fn run(config: &Config, only_missing: bool, limit: Option<usize>) -> anyhow::Result<Summary> {
    let pool = init_pool(&config.postgres).await?;
    let nutritionist = nutritionist(&config.ai);

    let users = all_users(&pool).await?;
    let total = users.len();
    let users = select(users, only_missing, limit);

    println!("Loaded Users: {total}");
    println!("Selected Users: {}\n", users.len());

    let mut summary = Summary {
        skipped: total - users.len(),
        ..Summary::default()
    };

    let pb = ProgressBar::new(users.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )?
        .progress_chars("=> "),
    );

    for user in users {
        let email = &user.profile.email;
        pb.set_message(format!("Writing {email}"));

        let profile = profile_text_from_details(&user, bmi(user.profile.height, user.profile.weight));

        let result = match nutritionist.quick_tip(&profile).await {
            Ok(tip) => update_dm(&pool, email, &tip).await.map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(true) => summary.updated += 1,
            Ok(false) => {
                pb.println(format!("{email} disappeared before the update"));
                summary.failed += 1;
            }
            Err(e) => {
                pb.println(format!("Failed for {email}: {e}"));
                summary.failed += 1;
            }
        }

        pb.inc(1);
    }

    pb.finish_with_message("Done");
    Ok(summary)
}
