//! BMI and the 0-10 health score shown on the dashboard.
use crate::users::UserProfile;

/// Body mass index rounded to two decimals. `None` when the height makes no sense.
pub fn bmi(height_cm: f64, weight_kg: f64) -> Option<f64> {
    if !height_cm.is_finite() || height_cm <= 0.0 || !weight_kg.is_finite() {
        return None;
    }

    let meters = height_cm / 100.0;
    let bmi = weight_kg / (meters * meters);

    Some((bmi * 100.0).round() / 100.0)
}

pub fn health_score(profile: &UserProfile, bmi: Option<f64>) -> i32 {
    let mut score = 100;

    match bmi {
        Some(bmi) if bmi < 18.5 => score -= 10,
        Some(bmi) if bmi >= 30.0 => score -= 20,
        Some(bmi) if bmi >= 25.0 => score -= 10,
        _ => {}
    }

    if profile.age > 60 {
        score -= 10;
    } else if profile.age < 18 {
        score -= 5;
    }

    match profile.activity_level.trim().to_lowercase().as_str() {
        "little" => score -= 15,
        "moderate" => score -= 5,
        _ => {}
    }

    score -= 5 * condition_count(&profile.diseases) as i32;

    let gap = (profile.weight - profile.target_weight).abs();
    if gap > 20.0 {
        score -= 15;
    } else if gap > 10.0 {
        score -= 10;
    } else if gap > 5.0 {
        score -= 5;
    }

    score.clamp(0, 100) / 10
}

/// Every comma separated entry counts, so an empty list still costs one condition.
fn condition_count(diseases: &str) -> usize {
    diseases.split(',').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> UserProfile {
        UserProfile {
            email: "asha@example.com".to_string(),
            name: "Asha".to_string(),
            gender: "female".to_string(),
            age: 30,
            activity_level: "active".to_string(),
            goals: "maintain".to_string(),
            height: 165.0,
            weight: 60.0,
            target_weight: 60.0,
            diseases: String::new(),
            healthscore: 0,
        }
    }

    #[test]
    fn bmi_rounds_to_two_places() {
        assert_eq!(bmi(165.0, 60.0), Some(22.04));
        assert_eq!(bmi(180.0, 81.0), Some(25.0));
    }

    #[test]
    fn bmi_needs_a_height() {
        assert_eq!(bmi(0.0, 60.0), None);
        assert_eq!(bmi(-170.0, 60.0), None);
        assert_eq!(bmi(f64::NAN, 60.0), None);
        assert_eq!(bmi(f64::INFINITY, 60.0), None);
    }

    #[test]
    fn empty_condition_list_tops_out_at_nine() {
        let profile = profile();
        assert_eq!(health_score(&profile, bmi(profile.height, profile.weight)), 9);
    }

    #[test]
    fn penalties_add_up() {
        let profile = UserProfile {
            age: 65,
            activity_level: "Little".to_string(),
            diseases: "diabetes, hypertension".to_string(),
            weight: 95.0,
            target_weight: 70.0,
            ..profile()
        };

        // 100 - 20 (obese) - 10 (age) - 15 (little) - 10 (two conditions) - 15 (25kg gap)
        assert_eq!(health_score(&profile, Some(34.9)), 3);
    }

    #[test]
    fn bmi_bands() {
        let profile = profile();

        // the empty condition list costs 5 in every case
        assert_eq!(health_score(&profile, Some(18.4)), 8);
        assert_eq!(health_score(&profile, Some(24.9)), 9);
        assert_eq!(health_score(&profile, Some(25.0)), 8);
        assert_eq!(health_score(&profile, Some(30.0)), 7);
        assert_eq!(health_score(&profile, None), 9);
    }

    #[test]
    fn teenagers_and_moderate_activity() {
        let profile = UserProfile {
            age: 16,
            activity_level: "moderate".to_string(),
            ..profile()
        };

        // 100 - 5 (age) - 5 (moderate) - 5 (empty list) = 85
        assert_eq!(health_score(&profile, Some(21.0)), 8);
    }

    #[test]
    fn weight_gap_bands() {
        let at = |target: f64| {
            let profile = UserProfile {
                target_weight: target,
                ..profile()
            };
            health_score(&profile, Some(22.0))
        };

        // 95 before the gap penalty
        assert_eq!(at(55.0), 9);
        assert_eq!(at(54.0), 9);
        assert_eq!(at(49.0), 8);
        assert_eq!(at(39.0), 8);
    }

    #[test]
    fn every_entry_counts() {
        assert_eq!(condition_count(""), 1);
        assert_eq!(condition_count(" , "), 2);
        assert_eq!(condition_count("asthma"), 1);
        assert_eq!(condition_count("asthma,,thyroid"), 3);
    }

    #[test]
    fn score_never_goes_negative() {
        let profile = UserProfile {
            age: 80,
            activity_level: "little".to_string(),
            diseases: "a,b,c,d,e,f,g,h,i,j".to_string(),
            weight: 150.0,
            target_weight: 60.0,
            ..profile()
        };

        assert_eq!(health_score(&profile, Some(45.0)), 0);
    }
}
