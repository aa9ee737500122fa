mod composite;
mod day;
mod food;
mod helpers;
mod meal;
mod profile;
mod stats;
mod workout;

use anyhow::{Result, bail};

use crate::fooddata::FoodDataClient;
use vitals_core::models::{Food, FoodUnit};
use vitals_core::service::VitalsService;

use helpers::{print_food_table, prompt_choice};

pub(crate) use composite::{
    cmd_composite_add_ingredient, cmd_composite_create, cmd_composite_list,
    cmd_composite_remove_ingredient, cmd_composite_show,
};
pub(crate) use day::{DayArgs, cmd_day_calendar, cmd_day_set, cmd_day_show};
pub(crate) use food::{
    cmd_food_add, cmd_food_add_unit, cmd_food_fetch, cmd_food_list, cmd_food_search,
    cmd_food_set_active, cmd_food_units,
};
pub(crate) use meal::{
    cmd_meal_delete, cmd_meal_log, cmd_meal_manual, cmd_meal_restore, cmd_meal_undo,
};
pub(crate) use profile::{cmd_profile_set, cmd_profile_show};
pub(crate) use stats::{
    cmd_stats_bodyweight, cmd_stats_calories, cmd_stats_lift, cmd_stats_volume, cmd_stats_weekly,
};
pub(crate) use workout::{
    cmd_workout_add_type, cmd_workout_delete, cmd_workout_delete_set, cmd_workout_end,
    cmd_workout_lift, cmd_workout_list, cmd_workout_movements, cmd_workout_set,
    cmd_workout_show, cmd_workout_start,
};

/// Local foods plus FoodData Central hits, cached as shared foods.
///
/// The client drives its own requests on the runtime, so the blocking call
/// is moved off the async worker.
pub(super) fn search_and_cache(
    svc: &VitalsService,
    fdc: &FoodDataClient,
    user_id: i64,
    query: &str,
) -> Result<Vec<Food>> {
    tokio::task::block_in_place(|| svc.search_and_cache(fdc, user_id, query))
}

/// Resolve a food by id or exact name, falling back to a search with an
/// interactive pick when there are several candidates.
pub(super) fn resolve_food(
    svc: &VitalsService,
    fdc: &FoodDataClient,
    user_id: i64,
    food_query: &str,
) -> Result<Food> {
    if let Ok(food) = svc.db().resolve_food(user_id, food_query) {
        return Ok(food);
    }

    let mut all = svc.db().search_foods_local(user_id, food_query)?;
    if all.is_empty() {
        all = search_and_cache(svc, fdc, user_id, food_query)?;
    }

    match all.len() {
        0 => bail!("No food found for '{food_query}'"),
        1 => Ok(all.swap_remove(0)),
        n => {
            let refs: Vec<&Food> = all.iter().collect();
            print_food_table(&refs);
            let idx = prompt_choice(n)?;
            Ok(all.swap_remove(idx))
        }
    }
}

/// A food's serving unit by name; grams when none is given.
pub(super) fn resolve_unit(
    svc: &VitalsService,
    food: &Food,
    unit: Option<&str>,
) -> Result<FoodUnit> {
    let name = unit.unwrap_or("grams");
    match svc.db().find_unit(food.id, name) {
        Ok(unit) => Ok(unit),
        Err(_) => {
            let known: Vec<String> = svc
                .db()
                .get_food_units(food.id)?
                .into_iter()
                .map(|u| u.name)
                .collect();
            bail!(
                "'{}' has no unit named '{name}'. Available: {}",
                food.name,
                known.join(", ")
            )
        }
    }
}
