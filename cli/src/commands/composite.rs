use anyhow::{Result, bail};
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use crate::fooddata::FoodDataClient;
use vitals_core::models::Food;
use vitals_core::service::VitalsService;

use super::helpers::{fmt_opt, json_error, print_breakdown, print_food_table, truncate};
use super::{resolve_food, resolve_unit};

fn resolve_composite(svc: &VitalsService, user_id: i64, name: &str) -> Result<Food> {
    let food = svc.db().resolve_food(user_id, name)?;
    if !food.is_composite {
        bail!("'{}' is not a composite food", food.name);
    }
    Ok(food)
}

pub(crate) fn cmd_composite_create(
    svc: &VitalsService,
    user_id: i64,
    name: &str,
    json: bool,
) -> Result<()> {
    let food = svc.db().create_composite(user_id, name)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&food)?);
    } else {
        let id = food.id;
        println!("Created composite: {name} (id: {id})");
        println!(
            "Add ingredients with: vitals composite add-ingredient \"{name}\" <food> <amount> [--unit <unit>]"
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_composite_add_ingredient(
    svc: &VitalsService,
    fdc: &FoodDataClient,
    user_id: i64,
    composite_name: &str,
    ingredient_name: &str,
    amount: f64,
    unit: Option<&str>,
    json: bool,
) -> Result<()> {
    let composite = resolve_composite(svc, user_id, composite_name)?;
    let food = resolve_food(svc, fdc, user_id, ingredient_name)?;
    let unit = resolve_unit(svc, &food, unit)?;

    let ingredient = svc
        .db()
        .add_ingredient(user_id, composite.id, food.id, amount, unit.id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ingredient)?);
    } else {
        let food_name = &food.name;
        let unit_name = &unit.name;
        let composite_name = &composite.name;
        println!("Added {amount} {unit_name} of {food_name} to {composite_name}");
    }

    Ok(())
}

pub(crate) fn cmd_composite_remove_ingredient(
    svc: &VitalsService,
    user_id: i64,
    composite_name: &str,
    ingredient_name: &str,
    json: bool,
) -> Result<()> {
    let composite = resolve_composite(svc, user_id, composite_name)?;
    let food = svc.db().resolve_food(user_id, ingredient_name)?;

    if svc.db().remove_ingredient(user_id, composite.id, food.id)? {
        if json {
            println!("{}", serde_json::json!({ "removed": food.id }));
        } else {
            println!("Removed {} from {}", food.name, composite.name);
        }
    } else {
        if json {
            println!(
                "{}",
                json_error(&format!("'{}' is not an ingredient of '{}'", food.name, composite.name))
            );
        } else {
            eprintln!("'{}' is not an ingredient of '{}'", food.name, composite.name);
        }
        process::exit(2);
    }
    Ok(())
}

pub(crate) fn cmd_composite_show(
    svc: &VitalsService,
    user_id: i64,
    composite_name: &str,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct IngredientRow {
        #[tabled(rename = "Ingredient")]
        name: String,
        #[tabled(rename = "Amount")]
        amount: String,
        #[tabled(rename = "Grams")]
        grams: String,
        #[tabled(rename = "Cal")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
    }

    let composite = resolve_composite(svc, user_id, composite_name)?;
    let detail = svc.get_composite_detail(composite.id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let name = &detail.food.name;
    let total = detail.total_grams;
    println!("=== {name} ===");
    println!("  Total: {total:.0}g as prepared\n");

    if detail.ingredients.is_empty() {
        println!("  No ingredients yet.");
        return Ok(());
    }

    let rows: Vec<IngredientRow> = detail
        .ingredients
        .iter()
        .map(|line| IngredientRow {
            name: truncate(&line.food_name, 32),
            amount: format!("{} {}", line.amount, line.unit),
            grams: format!("{:.0}", line.grams),
            calories: fmt_opt(line.contribution.calories, 0),
            protein: fmt_opt(line.contribution.protein, 1),
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    println!("\n  PER 100 G:");
    print_breakdown(&detail.breakdown);

    Ok(())
}

pub(crate) fn cmd_composite_list(svc: &VitalsService, user_id: i64, json: bool) -> Result<()> {
    let composites = svc.db().list_composites(user_id)?;

    if composites.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No composites found");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&composites)?);
    } else {
        let refs: Vec<&Food> = composites.iter().collect();
        print_food_table(&refs);
    }

    Ok(())
}
