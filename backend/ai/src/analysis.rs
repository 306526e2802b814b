//! Turning a vision model's free text reply into a calorie map.
//!
//! Models are asked for bare JSON but routinely wrap it in markdown fences or
//! add a sentence before it, so the first JSON object in the reply wins.
use std::sync::LazyLock;

use anyhow::{Result, anyhow, bail};
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

pub const TOTAL_CALORIES: &str = "Total calories";

/// Food item name to calories, always carrying [`TOTAL_CALORIES`].
pub type MealAnalysis = Map<String, Value>;

static FENCED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").unwrap());

pub fn parse_meal_analysis(reply: &str) -> Result<MealAnalysis> {
    let object = extract_object(reply).ok_or_else(|| anyhow!("no JSON object in model reply"))?;
    let raw: Map<String, Value> = serde_json::from_str(object)?;

    let mut analysis = MealAnalysis::new();
    let mut total = None;

    for (item, value) in raw {
        let Some(calories) = calories(&value) else {
            debug!("Dropping {item}: {value} is not a calorie count");
            continue;
        };

        if is_total(&item) {
            total = Some(calories);
        } else {
            analysis.insert(item, calories.into());
        }
    }

    if analysis.is_empty() && total.is_none() {
        bail!("model reply had no calorie values");
    }

    let total = total.unwrap_or_else(|| analysis.values().filter_map(Value::as_i64).sum());
    analysis.insert(TOTAL_CALORIES.to_string(), total.into());

    Ok(analysis)
}

fn extract_object(reply: &str) -> Option<&str> {
    if let Some(captures) = FENCED.captures(reply) {
        return captures.get(1).map(|m| m.as_str());
    }

    let start = reply.find('{')?;
    let end = reply.rfind('}')?;

    (start < end).then(|| &reply[start..=end])
}

fn is_total(key: &str) -> bool {
    let key = key.trim().replace('_', " ");
    key.eq_ignore_ascii_case(TOTAL_CALORIES) || key.eq_ignore_ascii_case("total")
}

fn calories(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|f| f.round() as i64)),
        Value::String(text) => text
            .trim()
            .trim_end_matches("kcal")
            .trim_end_matches("calories")
            .trim()
            .parse::<f64>()
            .ok()
            .map(|f| f.round() as i64),
        _ => None,
    }
}
