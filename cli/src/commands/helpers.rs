use anyhow::{Context, Result, bail};
use chrono::{Datelike, Local, NaiveDate};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use vitals_core::models::Food;
use vitals_core::nutrients::{Nutrient, NutrientBreakdown, NutrientVector};

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Parse "YYYY-MM"; defaults to the current month.
pub(crate) fn parse_month(month: Option<&str>) -> Result<(i32, u32)> {
    let Some(s) = month else {
        let today = Local::now().date_naive();
        return Ok((today.year(), today.month()));
    };
    let first = NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d")
        .with_context(|| format!("Invalid month '{s}'. Use YYYY-MM"))?;
    Ok((first.year(), first.month()))
}

/// Parse `key=value` where key is a nutrient key such as `sodium` or
/// `vitamin_c`.
pub(crate) fn parse_nutrient_arg(s: &str) -> Result<(Nutrient, f64)> {
    let (key, value) = s
        .split_once('=')
        .with_context(|| format!("Invalid nutrient '{s}'. Use key=value (e.g. sodium=120)"))?;
    let nutrient = Nutrient::from_key(key.trim()).with_context(|| {
        let keys: Vec<&str> = Nutrient::ALL.iter().map(|n| n.key()).collect();
        format!("Unknown nutrient '{}'. Known: {}", key.trim(), keys.join(", "))
    })?;
    let value: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("Invalid amount in '{s}'"))?;
    if !value.is_finite() || value < 0.0 {
        bail!("{} must not be negative", nutrient.key());
    }
    Ok((nutrient, value))
}

/// Build a vector from the macro flags plus any `key=value` extras.
pub(crate) fn build_nutrients(
    calories: Option<f64>,
    protein: Option<f64>,
    fat: Option<f64>,
    carbs: Option<f64>,
    extra: &[String],
) -> Result<NutrientVector> {
    let mut v = NutrientVector::default();
    v.set(Nutrient::Calories, calories);
    v.set(Nutrient::Protein, protein);
    v.set(Nutrient::Fat, fat);
    v.set(Nutrient::Carbs, carbs);
    for arg in extra {
        let (nutrient, value) = parse_nutrient_arg(arg)?;
        v.set(nutrient, Some(value));
    }
    Ok(v)
}

pub(crate) fn prompt_choice(count: usize) -> Result<usize> {
    eprint!("\nSelect a food (1-{count}): ");
    io::stderr().flush()?;
    let stdin = io::stdin();
    let line = stdin.lock().lines().next().context("No input")??;
    let n: usize = line.trim().parse().context("Invalid number")?;
    if n < 1 || n > count {
        bail!("Selection out of range");
    }
    Ok(n - 1)
}

fn source_label(food: &Food) -> &'static str {
    if food.is_composite {
        "composite"
    } else if food.fdc_id.is_some() {
        "fdc"
    } else if food.owner_id.is_some() {
        "custom"
    } else {
        "shared"
    }
}

pub(crate) fn fmt_opt(v: Option<f64>, decimals: usize) -> String {
    v.map_or("-".into(), |v| format!("{:.*}", decimals, no_neg_zero(v)))
}

pub(crate) fn print_food_table(foods: &[&Food]) {
    #[derive(Tabled)]
    struct FoodRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Cal/100g")]
        calories: String,
        #[tabled(rename = "P/100g")]
        protein: String,
        #[tabled(rename = "C/100g")]
        carbs: String,
        #[tabled(rename = "F/100g")]
        fat: String,
        #[tabled(rename = "Source")]
        source: String,
    }

    let rows: Vec<FoodRow> = foods
        .iter()
        .enumerate()
        .map(|(i, f)| FoodRow {
            idx: i + 1,
            id: f.id,
            name: if f.is_active {
                truncate(&f.name, 40)
            } else {
                format!("{} (inactive)", truncate(&f.name, 29))
            },
            calories: fmt_opt(f.nutrients.calories, 0),
            protein: fmt_opt(f.nutrients.protein, 1),
            carbs: fmt_opt(f.nutrients.carbs, 1),
            fat: fmt_opt(f.nutrients.fat, 1),
            source: source_label(f).to_string(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..7)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_breakdown(breakdown: &NutrientBreakdown) {
    #[derive(Tabled)]
    struct NutrientRow {
        #[tabled(rename = "Group")]
        group: &'static str,
        #[tabled(rename = "Nutrient")]
        label: &'static str,
        #[tabled(rename = "Amount")]
        amount: String,
    }

    let groups = [
        ("Macros", &breakdown.macros),
        ("Minerals", &breakdown.minerals),
        ("Vitamins", &breakdown.vitamins),
    ];
    let rows: Vec<NutrientRow> = groups
        .iter()
        .flat_map(|&(group, amounts)| {
            amounts.iter().map(move |a| NutrientRow {
                group,
                label: a.label,
                amount: format!("{:.1} {}", no_neg_zero(a.value), a.unit),
            })
        })
        .collect();

    if rows.is_empty() {
        return;
    }
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_none() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(None).unwrap(), today);
    }

    #[test]
    fn test_parse_date_keywords() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(Some("today".to_string())).unwrap(), today);
        assert_eq!(
            parse_date(Some("yesterday".to_string())).unwrap(),
            today - chrono::Duration::days(1)
        );
        assert_eq!(
            parse_date(Some("tomorrow".to_string())).unwrap(),
            today + chrono::Duration::days(1)
        );
    }

    #[test]
    fn test_parse_date_iso() {
        let date = parse_date(Some("2024-01-15".to_string())).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn test_parse_date_invalid() {
        assert!(parse_date(Some("nope".to_string())).is_err());
    }

    #[test]
    fn test_parse_month() {
        assert_eq!(parse_month(Some("2024-02")).unwrap(), (2024, 2));
        assert!(parse_month(Some("2024-13")).is_err());
        assert!(parse_month(Some("feb")).is_err());
        let today = Local::now().date_naive();
        assert_eq!(parse_month(None).unwrap(), (today.year(), today.month()));
    }

    #[test]
    fn test_parse_nutrient_arg() {
        let (n, v) = parse_nutrient_arg("sodium=120").unwrap();
        assert_eq!(n, Nutrient::Sodium);
        assert!((v - 120.0).abs() < f64::EPSILON);
        let (n, _) = parse_nutrient_arg(" vitamin_c = 4.5").unwrap();
        assert_eq!(n, Nutrient::VitaminC);
        assert!(parse_nutrient_arg("sodium").is_err());
        assert!(parse_nutrient_arg("salt=1").is_err());
        assert!(parse_nutrient_arg("sodium=-1").is_err());
    }

    #[test]
    fn test_build_nutrients() {
        let v = build_nutrients(Some(200.0), None, Some(5.0), None, &["iron=2".to_string()])
            .unwrap();
        assert_eq!(v.calories, Some(200.0));
        assert!(v.protein.is_none());
        assert_eq!(v.fat, Some(5.0));
        assert_eq!(v.iron, Some(2.0));
    }

    #[test]
    fn test_fmt_opt() {
        assert_eq!(fmt_opt(None, 1), "-");
        assert_eq!(fmt_opt(Some(3.456), 1), "3.5");
        assert_eq!(fmt_opt(Some(-0.0), 0), "0");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world this is long", 10), "hello w...");
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
        assert_eq!(truncate("Müsli", 10), "Müsli");
    }

    #[test]
    fn test_no_neg_zero() {
        assert_eq!(no_neg_zero(-0.0).to_bits(), 0.0_f64.to_bits());
        assert_eq!(no_neg_zero(5.0), 5.0);
    }
}
