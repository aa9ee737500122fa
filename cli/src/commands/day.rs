use anyhow::{Result, bail};
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use vitals_core::models::UpdateDay;
use vitals_core::nutrients::Nutrient;
use vitals_core::service::VitalsService;

use super::helpers::{no_neg_zero, parse_date, parse_month, print_breakdown};

pub(crate) fn cmd_day_show(
    svc: &VitalsService,
    user_id: i64,
    date: Option<String>,
    full: bool,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let view = svc.get_day_totals(user_id, date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    let day = &view.day;
    println!("=== {date} ===\n");

    for meal in &view.meals {
        let meal_label = meal.name.to_uppercase();
        let sub_cal = no_neg_zero(meal.totals.amount(Nutrient::Calories));
        println!("  {meal_label} ({sub_cal:.0} kcal)");
        for e in &meal.entries {
            let id = e.id;
            let label = &e.label;
            let serving = match (e.amount, &e.unit, e.grams) {
                (_, Some(unit), Some(g)) if unit == "grams" => format!("{g:.0}g"),
                (Some(amount), Some(unit), Some(g)) => format!("{amount} {unit} ({g:.0}g)"),
                _ => "manual".to_string(),
            };
            let cal = e.nutrients.amount(Nutrient::Calories);
            let protein = e.nutrients.amount(Nutrient::Protein);
            let carbs = e.nutrients.amount(Nutrient::Carbs);
            let fat = e.nutrients.amount(Nutrient::Fat);
            println!(
                "    [{id}] {label} - {serving} - {cal:.0} kcal | P:{protein:.0}g C:{carbs:.0}g F:{fat:.0}g"
            );
        }
        println!();
    }
    if view.meals.is_empty() {
        println!("  Nothing logged yet.\n");
    }

    let total_cal = no_neg_zero(view.totals.amount(Nutrient::Calories));
    let total_p = no_neg_zero(view.totals.amount(Nutrient::Protein));
    let total_c = no_neg_zero(view.totals.amount(Nutrient::Carbs));
    let total_f = no_neg_zero(view.totals.amount(Nutrient::Fat));
    println!("  TOTAL: {total_cal:.0} kcal | P:{total_p:.0}g C:{total_c:.0}g F:{total_f:.0}g");

    let goals = &view.macro_goals;
    let tcal = goals.calories;
    let (pg, cg, fg) = (goals.protein_g, goals.carbs_g, goals.fat_g);
    println!("  GOAL:  {tcal} kcal | P:{pg:.0}g C:{cg:.0}g F:{fg:.0}g");
    let pct = view.calorie_ratio * 100.0;
    println!("  PROGRESS: {pct:.0}% of calorie goal\n");

    let weight = day
        .bodyweight_lb
        .map_or("-".into(), |w| format!("{w:.1} lb"));
    let sleep = day.sleep_hours.map_or("-".into(), |h| format!("{h:.1} h"));
    let water = day.water_ml.map_or("-".into(), |w| format!("{w} ml"));
    println!(
        "  Weight: {weight} | Sleep: {sleep} (goal {:.1} h) | Water: {water} (goal {} ml) | Workout: {}",
        day.sleep_goal_hours,
        day.water_goal_ml,
        if day.did_workout { "yes" } else { "no" }
    );
    if let Some(note) = &day.note {
        println!("  Note: {note}");
    }

    if full {
        println!();
        print_breakdown(&view.breakdown);
    }

    Ok(())
}

/// Values to write, and the names of fields to clear.
#[derive(Default)]
pub(crate) struct DayArgs {
    pub note: Option<String>,
    pub bodyweight: Option<f64>,
    pub sleep: Option<f64>,
    pub water: Option<i64>,
    pub calorie_goal: Option<i64>,
    pub protein_goal: Option<i64>,
    pub water_goal: Option<i64>,
    pub sleep_goal: Option<f64>,
    pub clear: Vec<String>,
}

fn build_update(args: DayArgs) -> Result<UpdateDay> {
    let mut update = UpdateDay {
        note: args.note.map(Some),
        bodyweight_lb: args.bodyweight.map(Some),
        sleep_hours: args.sleep.map(Some),
        water_ml: args.water.map(Some),
        calorie_goal: args.calorie_goal,
        protein_goal: args.protein_goal,
        water_goal_ml: args.water_goal,
        sleep_goal_hours: args.sleep_goal,
    };
    for field in &args.clear {
        match field.as_str() {
            "note" => update.note = Some(None),
            "bodyweight" => update.bodyweight_lb = Some(None),
            "sleep" => update.sleep_hours = Some(None),
            "water" => update.water_ml = Some(None),
            other => bail!("Cannot clear '{other}'. Use note, bodyweight, sleep, or water"),
        }
    }
    Ok(update)
}

pub(crate) fn cmd_day_set(
    svc: &VitalsService,
    user_id: i64,
    date: Option<String>,
    args: DayArgs,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let update = build_update(args)?;
    let day = svc.db().update_day(user_id, date, &update)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&day)?);
    } else {
        println!("Updated {date}");
    }
    Ok(())
}

pub(crate) fn cmd_day_calendar(
    svc: &VitalsService,
    user_id: i64,
    month: Option<&str>,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct CalendarRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Goal")]
        goal: i64,
        #[tabled(rename = "%")]
        ratio: String,
        #[tabled(rename = "Weight")]
        weight: String,
        #[tabled(rename = "Workout")]
        workout: &'static str,
    }

    let (year, month) = parse_month(month)?;
    let days = svc.get_calendar(user_id, year, month)?;

    if days.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No days recorded in {year}-{month:02}");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&days)?);
        return Ok(());
    }

    let rows: Vec<CalendarRow> = days
        .iter()
        .map(|d| CalendarRow {
            date: d.date.to_string(),
            calories: format!("{:.0}", no_neg_zero(d.calories_consumed)),
            goal: d.calorie_goal,
            ratio: format!("{:.0}", d.calorie_ratio * 100.0),
            weight: d.bodyweight_lb.map_or("-".into(), |w| format!("{w:.1}")),
            workout: if d.did_workout { "yes" } else { "" },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..5)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_update_sets_and_clears() {
        let update = build_update(DayArgs {
            bodyweight: Some(180.5),
            calorie_goal: Some(2200),
            clear: vec!["note".to_string(), "water".to_string()],
            ..Default::default()
        })
        .unwrap();
        assert_eq!(update.bodyweight_lb, Some(Some(180.5)));
        assert_eq!(update.calorie_goal, Some(2200));
        assert_eq!(update.note, Some(None));
        assert_eq!(update.water_ml, Some(None));
        assert!(update.sleep_hours.is_none());
    }

    #[test]
    fn test_build_update_rejects_unknown_field() {
        let args = DayArgs {
            clear: vec!["mood".to_string()],
            ..Default::default()
        };
        assert!(build_update(args).is_err());
    }
}
