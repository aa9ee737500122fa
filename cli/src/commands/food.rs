use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use crate::fooddata::FoodDataClient;
use vitals_core::models::{Food, NewFood};
use vitals_core::service::VitalsService;

use super::helpers::{build_nutrients, json_error, print_breakdown, print_food_table};
use super::{resolve_food, search_and_cache};

pub(crate) fn cmd_food_search(
    svc: &VitalsService,
    fdc: &FoodDataClient,
    user_id: i64,
    query: &str,
    json: bool,
) -> Result<()> {
    let all = search_and_cache(svc, fdc, user_id, query)?;

    if all.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No results found for '{query}'");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&all)?);
    } else {
        let refs: Vec<&Food> = all.iter().collect();
        print_food_table(&refs);
    }

    Ok(())
}

/// Fetch one FoodData Central entry by id and cache it.
pub(crate) fn cmd_food_fetch(
    svc: &VitalsService,
    fdc: &FoodDataClient,
    fdc_id: i64,
    json: bool,
) -> Result<()> {
    let Some(food) = tokio::task::block_in_place(|| svc.catalog_lookup(fdc, fdc_id))? else {
        if json {
            println!("{}", json_error(&format!("FDC id {fdc_id} not found")));
        } else {
            eprintln!("FDC id {fdc_id} not found");
        }
        process::exit(2);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&food)?);
    } else {
        print_food_table(&[&food]);
        print_breakdown(&food.nutrients.breakdown());
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_food_add(
    svc: &VitalsService,
    user_id: i64,
    name: &str,
    calories: Option<f64>,
    protein: Option<f64>,
    fat: Option<f64>,
    carbs: Option<f64>,
    nutrients: &[String],
    json: bool,
) -> Result<()> {
    let food = svc.db().insert_food(&NewFood {
        name: name.to_string(),
        fdc_id: None,
        owner_id: Some(user_id),
        nutrients: build_nutrients(calories, protein, fat, carbs, nutrients)?,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&food)?);
    } else {
        let name = &food.name;
        let id = food.id;
        println!("Added food: {name} (id: {id})");
    }

    Ok(())
}

pub(crate) fn cmd_food_list(
    svc: &VitalsService,
    user_id: i64,
    search: Option<&str>,
    json: bool,
) -> Result<()> {
    let foods = svc.db().list_foods(user_id, search)?;

    if foods.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No foods found");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&foods)?);
    } else {
        let refs: Vec<&Food> = foods.iter().collect();
        print_food_table(&refs);
    }

    Ok(())
}

pub(crate) fn cmd_food_units(
    svc: &VitalsService,
    fdc: &FoodDataClient,
    user_id: i64,
    food: &str,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct UnitRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Unit")]
        name: String,
        #[tabled(rename = "Grams")]
        grams: String,
    }

    let food = resolve_food(svc, fdc, user_id, food)?;
    let units = svc.db().get_food_units(food.id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&units)?);
        return Ok(());
    }

    println!("Units for {} (id: {})", food.name, food.id);
    let rows: Vec<UnitRow> = units
        .into_iter()
        .map(|u| UnitRow {
            id: u.id,
            name: u.name,
            grams: format!("{:.1}", u.gram_weight),
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_food_add_unit(
    svc: &VitalsService,
    fdc: &FoodDataClient,
    user_id: i64,
    food: &str,
    name: &str,
    grams: f64,
    json: bool,
) -> Result<()> {
    let food = resolve_food(svc, fdc, user_id, food)?;
    let unit = svc.db().add_food_unit(food.id, name, grams)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&unit)?);
    } else {
        println!(
            "Added unit '{}' ({:.1} g) to {}",
            unit.name, unit.gram_weight, food.name
        );
    }

    Ok(())
}

/// Inactive foods stay valid for past entries but drop out of search.
pub(crate) fn cmd_food_set_active(
    svc: &VitalsService,
    food_id: i64,
    active: bool,
    json: bool,
) -> Result<()> {
    let food = svc.db().set_food_active(food_id, active)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&food)?);
    } else {
        let state = if food.is_active { "active" } else { "inactive" };
        println!("{} (id: {}) is now {state}", food.name, food.id);
    }

    Ok(())
}
