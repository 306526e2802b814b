//! # Meal Tracking
//!
//! One tracked day per request: text descriptions and/or photos for breakfast, lunch and dinner,
//! plus the day's weight.
//!
//! ## Uploads
//! - Every photo gets its own task, so three photos cost one AI round trip of latency, not three
//! - Tasks report `(slot, result)` over a channel sized to the number of photos
//! - A photo that cannot be analyzed is logged and treated as if it was never sent
//!
//! ## Merging
//! Per slot, an analyzed photo wins over text, text wins over nothing, and nothing is a 400.
use std::{collections::HashMap, fmt, sync::Arc};

use ai::{ImageFormat, MealAnalysis, Nutritionist};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{error::AppError, utils::today};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Dinner,
}

impl MealSlot {
    pub const ALL: [MealSlot; 3] = [MealSlot::Breakfast, MealSlot::Lunch, MealSlot::Dinner];

    pub fn text_field(self) -> &'static str {
        match self {
            MealSlot::Breakfast => "breakfast",
            MealSlot::Lunch => "lunch",
            MealSlot::Dinner => "dinner",
        }
    }

    pub fn image_field(self) -> &'static str {
        match self {
            MealSlot::Breakfast => "breakfast_img",
            MealSlot::Lunch => "lunch_img",
            MealSlot::Dinner => "dinner_img",
        }
    }

    pub fn from_image_field(field: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|slot| slot.image_field() == field)
    }
}

impl fmt::Display for MealSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MealSlot::Breakfast => f.write_str("Breakfast"),
            MealSlot::Lunch => f.write_str("Lunch"),
            MealSlot::Dinner => f.write_str("Dinner"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MealValue {
    Described(String),
    Analyzed(MealAnalysis),
}

/// One element of the `track` array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MealEntry {
    pub date: String,
    pub breakfast: MealValue,
    pub lunch: MealValue,
    pub dinner: MealValue,
    pub weight: String,
}

pub struct Upload {
    pub slot: MealSlot,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Analyzes every upload concurrently. Slots whose photo failed are simply absent.
pub async fn analyze_uploads(
    nutritionist: Arc<dyn Nutritionist>,
    uploads: Vec<Upload>,
) -> HashMap<MealSlot, MealAnalysis> {
    let mut analyses = HashMap::new();
    if uploads.is_empty() {
        return analyses;
    }

    let (sender, mut receiver) = mpsc::channel(uploads.len());

    for upload in uploads {
        let sender = sender.clone();
        let nutritionist = nutritionist.clone();

        tokio::spawn(async move {
            let result = analyze_upload(nutritionist.as_ref(), &upload).await;
            // receiver outlives every sender
            let _ = sender.send((upload.slot, result)).await;
        });
    }
    drop(sender);

    while let Some((slot, result)) = receiver.recv().await {
        match result {
            Some(analysis) => {
                info!("Processed image for {}", slot.image_field());
                analyses.insert(slot, analysis);
            }
            None => debug!("No analysis for {}", slot.image_field()),
        }
    }

    analyses
}

async fn analyze_upload(nutritionist: &dyn Nutritionist, upload: &Upload) -> Option<MealAnalysis> {
    info!("Processing image: {}", upload.file_name);

    let Some(format) = ImageFormat::sniff(&upload.bytes) else {
        warn!("{} is not a PNG, JPEG, WEBP or GIF image", upload.file_name);
        return None;
    };
    debug!("Image type detected: {}", format.mime());

    nutritionist
        .analyze_meal(&upload.bytes, format)
        .await
        .map_err(|e| warn!("Meal analysis failed for {}: {e}", upload.file_name))
        .ok()
}

/// Rejects a body where some slot has neither a description nor a photo, before any photo is
/// sent to the model. Slots with a photo are settled later by [`assemble_entry`].
pub fn check_slots(text: &HashMap<String, String>, uploads: &[Upload]) -> Result<(), AppError> {
    for slot in MealSlot::ALL {
        let described = text
            .get(slot.text_field())
            .is_some_and(|description| !description.trim().is_empty());
        let photographed = uploads.iter().any(|upload| upload.slot == slot);

        if !described && !photographed {
            return Err(AppError::MalformedPayload(format!("{slot} value empty.")));
        }
    }

    Ok(())
}

pub fn assemble_entry(
    text: &HashMap<String, String>,
    mut analyses: HashMap<MealSlot, MealAnalysis>,
) -> Result<MealEntry, AppError> {
    let mut pick = |slot: MealSlot| -> Result<MealValue, AppError> {
        if let Some(analysis) = analyses.remove(&slot) {
            return Ok(MealValue::Analyzed(analysis));
        }

        match text.get(slot.text_field()).map(|s| s.trim()) {
            Some(description) if !description.is_empty() => {
                Ok(MealValue::Described(description.to_string()))
            }
            _ => Err(AppError::MalformedPayload(format!("{slot} value empty."))),
        }
    };

    let breakfast = pick(MealSlot::Breakfast)?;
    let lunch = pick(MealSlot::Lunch)?;
    let dinner = pick(MealSlot::Dinner)?;

    let date = match text.get("date").map(|s| s.trim()) {
        Some(date) if !date.is_empty() => date.to_string(),
        _ => today(),
    };

    Ok(MealEntry {
        date,
        breakfast,
        lunch,
        dinner,
        weight: text
            .get("weight")
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    })
}
