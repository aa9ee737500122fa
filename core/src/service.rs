use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{Duration, NaiveDate};
use tracing::warn;

use crate::catalog::CatalogFood;
use crate::db::Database;
use crate::goals;
use crate::meals;
use crate::models::{
    BodyweightStats, CalendarDay, CalorieStats, CompositeDetail, DayTotals, Food,
    LiftHistoryPoint, VolumeStats, WeeklyVolume,
};
use crate::nutrients::Nutrient;
use crate::stats::{self, Aggregation, Period, Series};
use crate::training;

/// Nutrient catalog used to seed global foods.
///
/// The CLI implements this over the FoodData Central HTTP API. Called
/// synchronously; only atomic foods ever come from here.
pub trait FoodLookupProvider: Send + Sync {
    fn search(&self, query: &str) -> Result<Vec<CatalogFood>>;
    fn lookup(&self, fdc_id: i64) -> Result<Option<CatalogFood>>;
}

pub struct VitalsService {
    db: Database,
}

/// Inclusive date range of `window_days` days ending at `as_of`.
fn trailing_window(as_of: NaiveDate, window_days: i64) -> Result<NaiveDate> {
    if window_days < 1 {
        bail!("Window must be at least 1 day");
    }
    Ok(as_of - Duration::days(window_days - 1))
}

impl VitalsService {
    pub fn new(db_path: &Path) -> Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    // --- Nutrition views ---

    /// Meals, totals, and goal progress for one day. Viewing a day never
    /// creates it; an unrecorded day shows the goals it would start with.
    pub fn get_day_totals(&self, user_id: i64, date: NaiveDate) -> Result<DayTotals> {
        let day = self.db.get_day_or_default(user_id, date)?;
        let meals = self.db.get_meals_for_date(user_id, date)?;
        let totals = meals::day_total(meals.iter().map(|m| m.totals));
        Ok(DayTotals {
            breakdown: totals.breakdown(),
            macro_goals: goals::macro_goals(day.calorie_goal, day.protein_goal),
            calorie_ratio: goals::calorie_ratio(
                totals.amount(Nutrient::Calories),
                day.calorie_goal,
            ),
            day,
            meals,
            totals,
        })
    }

    pub fn get_composite_detail(&self, food_id: i64) -> Result<CompositeDetail> {
        let food = self.db.get_food_by_id(food_id)?;
        let ingredients = self.db.get_ingredient_lines(food_id)?;
        let total_grams = ingredients.iter().map(|i| i.grams).sum();
        let units = self.db.get_food_units(food_id)?;
        Ok(CompositeDetail {
            breakdown: food.nutrients.breakdown(),
            food,
            ingredients,
            total_grams,
            units,
        })
    }

    pub fn get_calendar(&self, user_id: i64, year: i32, month: u32) -> Result<Vec<CalendarDay>> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .with_context(|| format!("Invalid month {year}-{month}"))?;
        let last = Period::Monthly.bucket_end(first);
        let days = self.db.get_days_between(user_id, first, last)?;
        Ok(days
            .into_iter()
            .map(|d| CalendarDay {
                date: d.date,
                calories_consumed: d.calories_consumed,
                calorie_goal: d.calorie_goal,
                calorie_ratio: goals::calorie_ratio(d.calories_consumed, d.calorie_goal),
                did_workout: d.did_workout,
                bodyweight_lb: d.bodyweight_lb,
            })
            .collect())
    }

    // --- Longitudinal stats ---

    pub fn get_bodyweight_stats(
        &self,
        user_id: i64,
        as_of: NaiveDate,
        window_days: i64,
    ) -> Result<BodyweightStats> {
        let start = trailing_window(as_of, window_days)?;
        let days = self.db.get_days_between(user_id, start, as_of)?;
        let series = Series::new(days.iter().map(|d| (d.date, d.bodyweight_lb)));
        Ok(BodyweightStats {
            as_of,
            window_days,
            summary: series.summary(),
            moving_average: series.moving_average(7),
            weekly: series.resample(Period::Weekly, Aggregation::Mean),
            monthly: series.resample(Period::Monthly, Aggregation::Mean),
        })
    }

    /// Calorie statistics over logged days. Days with nothing eaten are
    /// treated as not logged.
    pub fn get_calorie_stats(
        &self,
        user_id: i64,
        as_of: NaiveDate,
        window_days: i64,
    ) -> Result<CalorieStats> {
        let start = trailing_window(as_of, window_days)?;
        let days = self.db.get_days_between(user_id, start, as_of)?;
        let logged: Vec<_> = days.iter().filter(|d| d.calories_consumed > 0.0).collect();

        let series = Series::from_values(logged.iter().map(|d| (d.date, d.calories_consumed)));
        let protein = Series::from_values(logged.iter().map(|d| (d.date, d.protein_consumed)));
        let ratios: Vec<f64> = logged
            .iter()
            .map(|d| goals::calorie_ratio(d.calories_consumed, d.calorie_goal))
            .collect();

        Ok(CalorieStats {
            as_of,
            window_days,
            days_logged: logged.len(),
            summary: series.summary(),
            protein: protein.summary(),
            mean_calorie_ratio: stats::mean(&ratios),
            top_meal: self.db.top_meal(user_id, start, as_of)?,
        })
    }

    /// Training volume statistics for workouts up to `as_of`, optionally
    /// limited to one workout type.
    pub fn get_volume_stats(
        &self,
        user_id: i64,
        as_of: NaiveDate,
        workout_type: Option<&str>,
    ) -> Result<VolumeStats> {
        let workout_type = workout_type
            .map(|name| self.db.find_workout_type(user_id, name))
            .transpose()?;
        let volumes: Vec<_> = self
            .db
            .workout_volumes(user_id, workout_type.as_ref().map(|t| t.id))?
            .into_iter()
            .filter(|w| w.date <= as_of)
            .collect();

        Ok(VolumeStats {
            as_of,
            workout_type: workout_type.map(|t| t.name),
            summary: training::volume_summary(&volumes, as_of),
            weekly_volume: training::daily_volume(&volumes)
                .resample(Period::Weekly, Aggregation::Sum),
        })
    }

    /// Set counts per body part for the `weeks` weeks ending with the week
    /// containing `as_of`.
    pub fn get_weekly_volume(
        &self,
        user_id: i64,
        as_of: NaiveDate,
        weeks: i64,
    ) -> Result<Vec<WeeklyVolume>> {
        if weeks < 1 {
            bail!("Weeks must be at least 1");
        }
        let last = training::week_start(as_of);
        let first = last - Duration::weeks(weeks - 1);
        self.db.get_weekly_volume(user_id, first, last)
    }

    pub fn get_lift_history(&self, user_id: i64, movement: &str) -> Result<Vec<LiftHistoryPoint>> {
        let movement = self
            .db
            .find_movement(movement)?
            .with_context(|| format!("Movement '{movement}' not found"))?;
        self.db.lift_history(user_id, movement.id)
    }

    // --- Catalog lookups (local first, then the provider, caching results) ---

    /// Search local foods, then the catalog; catalog hits are cached as
    /// global foods and merged without duplicates.
    pub fn search_and_cache(
        &self,
        provider: &dyn FoodLookupProvider,
        user_id: i64,
        query: &str,
    ) -> Result<Vec<Food>> {
        let local = self.db.search_foods_local(user_id, query)?;
        let remote = provider.search(query)?;

        let mut all = local;
        let mut seen: HashSet<i64> = all.iter().map(|f| f.id).collect();
        for item in &remote {
            match self.db.upsert_catalog_food(item) {
                Ok(food) => {
                    if seen.insert(food.id) {
                        all.push(food);
                    }
                }
                Err(e) => warn!(
                    fdc_id = item.food.fdc_id,
                    name = %item.food.name,
                    error = %e,
                    "skipped catalog food"
                ),
            }
        }

        Ok(all)
    }

    pub fn catalog_lookup(
        &self,
        provider: &dyn FoodLookupProvider,
        fdc_id: i64,
    ) -> Result<Option<Food>> {
        if let Some(cached) = self.db.get_food_by_fdc_id(fdc_id)? {
            return Ok(Some(cached));
        }
        match provider.lookup(fdc_id)? {
            Some(item) => Ok(Some(self.db.upsert_catalog_food(&item)?)),
            None => Ok(None),
        }
    }
}
