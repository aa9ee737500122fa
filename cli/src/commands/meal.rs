use anyhow::{Context, Result};
use std::process;

use crate::fooddata::FoodDataClient;
use vitals_core::meals::ConsumptionDraft;
use vitals_core::models::MealConsumption;
use vitals_core::nutrients::Nutrient;
use vitals_core::service::VitalsService;

use super::helpers::{build_nutrients, json_error, parse_date};
use super::{resolve_food, resolve_unit};

fn print_nothing_logged(json: bool) -> ! {
    if json {
        println!("{}", json_error("Nothing to log"));
    } else {
        eprintln!("Nothing to log: the entry was empty");
    }
    process::exit(2);
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_meal_log(
    svc: &VitalsService,
    fdc: &FoodDataClient,
    user_id: i64,
    food: &str,
    amount: f64,
    unit: Option<&str>,
    meal: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let food = resolve_food(svc, fdc, user_id, food)?;
    let unit = resolve_unit(svc, &food, unit)?;

    let draft = ConsumptionDraft {
        food_id: Some(food.id),
        amount: Some(amount),
        unit_id: Some(unit.id),
        ..Default::default()
    };
    let Some(entry) = svc.db().add_consumption(user_id, date, meal, draft)? else {
        print_nothing_logged(json);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        let grams = amount * unit.gram_weight;
        let cal = food
            .nutrients
            .scale_to_grams(grams)?
            .amount(Nutrient::Calories);
        let id = entry.id;
        let name = &food.name;
        let unit_name = &unit.name;
        println!(
            "Logged {amount} {unit_name} of {name} ({grams:.0}g) to {meal} on {date}: {cal:.0} kcal (entry {id})"
        );
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_meal_manual(
    svc: &VitalsService,
    user_id: i64,
    description: &str,
    calories: Option<f64>,
    protein: Option<f64>,
    fat: Option<f64>,
    carbs: Option<f64>,
    nutrients: &[String],
    meal: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let draft = ConsumptionDraft {
        description: Some(description.to_string()),
        nutrients: build_nutrients(calories, protein, fat, carbs, nutrients)?,
        ..Default::default()
    };
    let Some(entry) = svc.db().add_consumption(user_id, date, meal, draft)? else {
        print_nothing_logged(json);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        let cal = entry
            .nutrients
            .map_or(0.0, |n| n.amount(Nutrient::Calories));
        let id = entry.id;
        println!("Logged '{description}' to {meal} on {date}: {cal:.0} kcal (entry {id})");
    }

    Ok(())
}

fn print_entry_change(entry: &MealConsumption, verb: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(entry)?);
    } else {
        let label = entry.description.as_deref().unwrap_or("food entry");
        println!("{verb} entry {} ({label})", entry.id);
    }
    Ok(())
}

/// Archive the most recently logged entry of the day.
pub(crate) fn cmd_meal_undo(
    svc: &VitalsService,
    user_id: i64,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let Some(latest) = svc.db().latest_consumption(user_id, date, false)? else {
        if json {
            println!("{}", json_error(&format!("Nothing to undo on {date}")));
        } else {
            eprintln!("Nothing to undo on {date}");
        }
        process::exit(2);
    };

    let entry = svc.db().archive_consumption(user_id, latest.id)?;
    print_entry_change(&entry, "Archived", json)
}

/// Bring back an archived entry, by id or the most recently archived one.
pub(crate) fn cmd_meal_restore(
    svc: &VitalsService,
    user_id: i64,
    entry_id: Option<i64>,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let id = match entry_id {
        Some(id) => id,
        None => {
            let date = parse_date(date)?;
            svc.db()
                .latest_consumption(user_id, date, true)?
                .with_context(|| format!("No archived entries on {date}"))?
                .id
        }
    };

    let entry = svc.db().restore_consumption(user_id, id)?;
    print_entry_change(&entry, "Restored", json)
}

pub(crate) fn cmd_meal_delete(
    svc: &VitalsService,
    user_id: i64,
    entry_id: i64,
    json: bool,
) -> Result<()> {
    if svc.db().delete_consumption(user_id, entry_id)? {
        if json {
            println!("{}", serde_json::json!({ "deleted": entry_id }));
        } else {
            println!("Deleted entry {entry_id}");
        }
        Ok(())
    } else {
        if json {
            println!("{}", json_error(&format!("Entry {entry_id} not found")));
        } else {
            eprintln!("Entry {entry_id} not found");
        }
        process::exit(2);
    }
}
