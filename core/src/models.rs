use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::goals::{Gender, MacroGoals};
use crate::nutrients::{NutrientBreakdown, NutrientVector};
use crate::stats::{Point, SeriesSummary};
use crate::training::VolumeSummary;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub user_id: i64,
    pub gender: Gender,
    pub height_cm: f64,
    pub birth_date: NaiveDate,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewProfile {
    pub gender: Gender,
    pub height_cm: f64,
    pub birth_date: NaiveDate,
}

// --- Foods ---

#[derive(Debug, Clone, Serialize)]
pub struct Food {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fdc_id: Option<i64>,
    /// `None` for foods shared by every user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<i64>,
    pub is_active: bool,
    pub is_composite: bool,
    /// Per 100 g.
    pub nutrients: NutrientVector,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewFood {
    pub name: String,
    pub fdc_id: Option<i64>,
    pub owner_id: Option<i64>,
    pub nutrients: NutrientVector,
}

#[derive(Debug, Clone, Serialize)]
pub struct FoodUnit {
    pub id: i64,
    pub food_id: i64,
    pub name: String,
    pub gram_weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Ingredient {
    pub id: i64,
    pub composite_food_id: i64,
    pub ingredient_food_id: i64,
    pub amount: f64,
    pub unit_id: i64,
}

/// One ingredient of a composite, with what it contributes to the batch.
#[derive(Debug, Clone, Serialize)]
pub struct IngredientLine {
    pub ingredient_id: i64,
    pub food_id: i64,
    pub food_name: String,
    pub amount: f64,
    pub unit: String,
    pub grams: f64,
    pub contribution: NutrientVector,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompositeDetail {
    pub food: Food,
    pub ingredients: Vec<IngredientLine>,
    pub total_grams: f64,
    pub units: Vec<FoodUnit>,
    pub breakdown: NutrientBreakdown,
}

// --- Meals ---

#[derive(Debug, Clone, Serialize)]
pub struct Meal {
    pub id: i64,
    pub uuid: String,
    pub user_id: i64,
    pub date: NaiveDate,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MealConsumption {
    pub id: i64,
    pub uuid: String,
    pub meal_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub food_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Literal amounts, manual entries only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nutrients: Option<NutrientVector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<String>,
    pub created_at: String,
}

/// A consumption entry as shown to the user, with its contribution.
#[derive(Debug, Clone, Serialize)]
pub struct ConsumptionLine {
    pub id: i64,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grams: Option<f64>,
    pub nutrients: NutrientVector,
}

#[derive(Debug, Clone, Serialize)]
pub struct MealSummary {
    pub id: i64,
    pub name: String,
    pub entries: Vec<ConsumptionLine>,
    pub totals: NutrientVector,
}

// --- Days ---

#[derive(Debug, Clone, Serialize)]
pub struct Day {
    pub id: i64,
    pub user_id: i64,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub calories_consumed: f64,
    pub protein_consumed: f64,
    pub calorie_goal: i64,
    pub protein_goal: i64,
    pub water_goal_ml: i64,
    pub sleep_goal_hours: f64,
    pub bodyweight_lb: Option<f64>,
    pub sleep_hours: Option<f64>,
    pub water_ml: Option<i64>,
    pub did_workout: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Day facts to change; `Some(None)` clears a value.
#[derive(Debug, Clone, Default)]
pub struct UpdateDay {
    pub note: Option<Option<String>>,
    pub bodyweight_lb: Option<Option<f64>>,
    pub sleep_hours: Option<Option<f64>>,
    pub water_ml: Option<Option<i64>>,
    pub calorie_goal: Option<i64>,
    pub protein_goal: Option<i64>,
    pub water_goal_ml: Option<i64>,
    pub sleep_goal_hours: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayTotals {
    pub day: Day,
    pub meals: Vec<MealSummary>,
    pub totals: NutrientVector,
    pub breakdown: NutrientBreakdown,
    pub macro_goals: MacroGoals,
    pub calorie_ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub calories_consumed: f64,
    pub calorie_goal: i64,
    pub calorie_ratio: f64,
    pub did_workout: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bodyweight_lb: Option<f64>,
}

// --- Training ---

#[derive(Debug, Clone, Serialize)]
pub struct WorkoutType {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

pub const DEFAULT_WORKOUT_TYPES: &[(&str, &str)] =
    &[("Push", "#66ff66"), ("Pull", "#ff6666"), ("Legs", "#66ccff")];

#[derive(Debug, Clone, Serialize)]
pub struct Movement {
    pub id: i64,
    pub name: String,
    pub bodypart: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Workout {
    pub id: i64,
    pub uuid: String,
    pub user_id: i64,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workout_type_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workout_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    pub notes: String,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Lift {
    pub id: i64,
    pub workout_id: i64,
    pub movement_id: i64,
    pub movement: String,
    pub bodypart: String,
    pub position: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkoutSet {
    pub id: i64,
    pub lift_id: i64,
    pub reps: i64,
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rir: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rest_seconds: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewSet {
    pub reps: i64,
    pub weight: f64,
    pub rir: Option<i64>,
    pub rest_seconds: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiftDetail {
    pub lift: Lift,
    pub sets: Vec<WorkoutSet>,
    pub total_volume: f64,
    pub estimated_1rm: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkoutDetail {
    pub workout: Workout,
    pub lifts: Vec<LiftDetail>,
    pub total_volume: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyVolume {
    pub user_id: i64,
    pub week_start: NaiveDate,
    pub bodypart: String,
    pub set_count: i64,
}

// --- Stats view models ---

#[derive(Debug, Clone, Serialize)]
pub struct BodyweightStats {
    pub as_of: NaiveDate,
    pub window_days: i64,
    pub summary: SeriesSummary,
    pub moving_average: Vec<Point>,
    pub weekly: Vec<Point>,
    pub monthly: Vec<Point>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopMeal {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalorieStats {
    pub as_of: NaiveDate,
    pub window_days: i64,
    pub days_logged: usize,
    pub summary: SeriesSummary,
    /// Protein grams over the same logged days.
    pub protein: SeriesSummary,
    pub mean_calorie_ratio: Option<f64>,
    /// Most eaten food or manual entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_meal: Option<TopMeal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeStats {
    pub as_of: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workout_type: Option<String>,
    pub summary: VolumeSummary,
    pub weekly_volume: Vec<Point>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiftHistoryPoint {
    pub date: NaiveDate,
    pub workout_id: i64,
    pub top_weight: f64,
    pub top_reps: i64,
    pub volume: f64,
    pub estimated_1rm: f64,
}

// --- Validation ---

pub fn validate_new_food(food: &NewFood) -> Result<()> {
    if food.name.trim().is_empty() {
        bail!("Food name must not be empty");
    }
    for (nutrient, value) in food.nutrients.iter() {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                bail!("{} must be a non-negative number", nutrient.key());
            }
        }
    }
    Ok(())
}

pub fn validate_unit(name: &str, gram_weight: f64) -> Result<()> {
    if name.trim().is_empty() {
        bail!("Unit name must not be empty");
    }
    if !gram_weight.is_finite() || gram_weight <= 0.0 {
        bail!("Unit gram weight must be greater than 0");
    }
    Ok(())
}

pub fn validate_set(set: &NewSet) -> Result<()> {
    if set.reps <= 0 {
        bail!("Reps must be greater than 0");
    }
    if !set.weight.is_finite() || set.weight < 0.0 {
        bail!("Weight must not be negative");
    }
    if set.rir.is_some_and(|r| !(0..=10).contains(&r)) {
        bail!("RIR must be between 0 and 10");
    }
    if set.rest_seconds.is_some_and(|r| r < 0) {
        bail!("Rest must not be negative");
    }
    Ok(())
}

pub fn validate_profile(profile: &NewProfile, today: NaiveDate) -> Result<()> {
    if !profile.height_cm.is_finite() || profile.height_cm <= 0.0 {
        bail!("Height must be greater than 0 cm");
    }
    if profile.birth_date >= today {
        bail!("Birth date must be in the past");
    }
    Ok(())
}

pub fn validate_update_day(update: &UpdateDay) -> Result<()> {
    if let Some(Some(w)) = update.bodyweight_lb {
        if !w.is_finite() || w <= 0.0 {
            bail!("Bodyweight must be greater than 0");
        }
    }
    if let Some(Some(h)) = update.sleep_hours {
        if !(0.0..=24.0).contains(&h) {
            bail!("Sleep must be between 0 and 24 hours");
        }
    }
    if update.water_ml.is_some_and(|w| w.is_some_and(|ml| ml < 0)) {
        bail!("Water must not be negative");
    }
    if update.calorie_goal.is_some_and(|g| g < 0) || update.protein_goal.is_some_and(|g| g < 0) {
        bail!("Goals must not be negative");
    }
    if update.water_goal_ml.is_some_and(|g| g < 0)
        || update.sleep_goal_hours.is_some_and(|g| !(0.0..=24.0).contains(&g))
    {
        bail!("Water and sleep goals must be within range");
    }
    Ok(())
}

/// Accepts `#rgb` or `#rrggbb`.
pub fn validate_color(color: &str) -> Result<()> {
    let hex = color.strip_prefix('#').unwrap_or("");
    if !matches!(hex.len(), 3 | 6) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("Invalid color '{color}'. Expected a hex color like #66ccff");
    }
    Ok(())
}
