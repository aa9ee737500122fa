//! Daily calorie and protein targets derived from bodyweight.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::Profile;

pub const LB_TO_KG: f64 = 0.453_592_37;
pub const ACTIVITY_FACTOR: f64 = 1.725;
pub const PROTEIN_PER_LB: f64 = 0.8;

pub const DEFAULT_CALORIE_GOAL: i64 = 2000;
pub const DEFAULT_PROTEIN_GOAL: i64 = 150;
pub const DEFAULT_WATER_GOAL_ML: i64 = 2500;
pub const DEFAULT_SLEEP_GOAL_HOURS: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "male" | "m" => Ok(Gender::Male),
            "female" | "f" => Ok(Gender::Female),
            other => bail!("Unknown gender '{other}' (expected male or female)"),
        }
    }
}

/// Whole years between `birth_date` and `on`.
#[must_use]
pub fn age_on(birth_date: NaiveDate, on: NaiveDate) -> i32 {
    let mut age = on.year() - birth_date.year();
    if (on.month(), on.day()) < (birth_date.month(), birth_date.day()) {
        age -= 1;
    }
    age
}

/// Harris-Benedict basal metabolic rate (revised coefficients), kcal/day.
#[must_use]
pub fn bmr(gender: Gender, weight_kg: f64, height_cm: f64, age_years: i32) -> f64 {
    let age = f64::from(age_years);
    match gender {
        Gender::Male => 88.362 + 13.397 * weight_kg + 4.799 * height_cm - 5.677 * age,
        Gender::Female => 447.593 + 9.247 * weight_kg + 3.098 * height_cm - 4.330 * age,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Goals {
    pub calorie_goal: i64,
    pub protein_goal: i64,
}

/// Goals for a new day on `date`, given the bodyweight recorded the day
/// before. `None` means keep the defaults.
#[must_use]
pub fn daily_goals(
    profile: Option<&Profile>,
    prior_bodyweight_lb: Option<f64>,
    date: NaiveDate,
) -> Option<Goals> {
    let profile = profile?;
    let bodyweight_lb = prior_bodyweight_lb.filter(|w| *w > 0.0)?;
    let weight_kg = bodyweight_lb * LB_TO_KG;
    let age = age_on(profile.birth_date, date);
    let calories = bmr(profile.gender, weight_kg, profile.height_cm, age) * ACTIVITY_FACTOR;
    Some(Goals {
        calorie_goal: calories.round() as i64,
        protein_goal: (bodyweight_lb * PROTEIN_PER_LB).round() as i64,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MacroGoals {
    pub calories: i64,
    pub protein_g: f64,
    pub fat_g: f64,
    pub carbs_g: f64,
}

/// Split the calories left after protein 30/70 between fat and carbs.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn macro_goals(calorie_goal: i64, protein_goal: i64) -> MacroGoals {
    let remaining = (calorie_goal - protein_goal * 4) as f64;
    MacroGoals {
        calories: calorie_goal,
        protein_g: protein_goal as f64,
        fat_g: remaining * 0.3 / 9.0,
        carbs_g: remaining * 0.7 / 4.0,
    }
}

/// Consumed over goal; 0 for a zero goal.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn calorie_ratio(consumed: f64, goal: i64) -> f64 {
    if goal == 0 {
        return 0.0;
    }
    consumed / goal as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn profile(gender: Gender, height_cm: f64, birth: &str) -> Profile {
        Profile {
            user_id: 1,
            gender,
            height_cm,
            birth_date: d(birth),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_male_goals() {
        let p = profile(Gender::Male, 180.0, "1994-01-15");
        let goals = daily_goals(Some(&p), Some(200.0), d("2024-06-01")).unwrap();
        assert_eq!(goals.calorie_goal, 3445);
        assert_eq!(goals.protein_goal, 160);
    }

    #[test]
    fn test_female_goals() {
        let p = profile(Gender::Female, 165.0, "1984-03-10");
        let goals = daily_goals(Some(&p), Some(150.0), d("2024-03-10")).unwrap();
        assert_eq!(goals.calorie_goal, 2440);
        assert_eq!(goals.protein_goal, 120);
    }

    #[test]
    fn test_no_prior_bodyweight_keeps_defaults() {
        let p = profile(Gender::Male, 180.0, "1994-01-15");
        assert!(daily_goals(Some(&p), None, d("2024-06-01")).is_none());
        assert!(daily_goals(None, Some(180.0), d("2024-06-01")).is_none());
    }

    #[test]
    fn test_age_on_birthday_boundary() {
        let birth = d("1990-06-15");
        assert_eq!(age_on(birth, d("2024-06-14")), 33);
        assert_eq!(age_on(birth, d("2024-06-15")), 34);
    }

    #[test]
    fn test_macro_goals() {
        let m = macro_goals(2000, 150);
        // 1400 kcal after protein
        assert!((m.fat_g - 1400.0 * 0.3 / 9.0).abs() < 1e-9);
        assert!((m.carbs_g - 245.0).abs() < 1e-9);
    }

    #[test]
    fn test_calorie_ratio() {
        assert!((calorie_ratio(1500.0, 2000) - 0.75).abs() < 1e-12);
        assert!(calorie_ratio(1500.0, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_gender_parse() {
        assert_eq!("Female".parse::<Gender>().unwrap(), Gender::Female);
        assert_eq!("m".parse::<Gender>().unwrap(), Gender::Male);
        assert!("other".parse::<Gender>().is_err());
    }
}
