use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use vitals_core::service::VitalsService;
use vitals_core::stats::SeriesSummary;

use super::helpers::{fmt_opt, parse_date};

fn print_summary(summary: &SeriesSummary, unit: &str) {
    let latest = fmt_opt(summary.latest, 1);
    let mean = fmt_opt(summary.mean, 1);
    let min = fmt_opt(summary.min, 1);
    let max = fmt_opt(summary.max, 1);
    println!("  Samples:      {}", summary.count);
    println!("  Latest:       {latest} {unit}");
    println!("  Mean:         {mean} {unit}  (min {min}, max {max})");
    println!("  Fluctuation:  {}", fmt_opt(summary.fluctuation, 2));
    println!("  Trend:        {} per day", fmt_opt(summary.trend_slope, 3));
    println!("  Total change: {}", fmt_opt(summary.total_change, 1));
    println!(
        "  Largest drop: {}  |  largest gain: {}",
        fmt_opt(summary.max_drawdown, 1),
        fmt_opt(summary.max_runup, 1)
    );
}

pub(crate) fn cmd_stats_bodyweight(
    svc: &VitalsService,
    user_id: i64,
    as_of: Option<String>,
    days: i64,
    json: bool,
) -> Result<()> {
    let as_of = parse_date(as_of)?;
    let stats = svc.get_bodyweight_stats(user_id, as_of, days)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    if stats.summary.count == 0 {
        eprintln!("No bodyweight recorded in the {days} days to {as_of}");
        process::exit(2);
    }

    println!("=== Bodyweight, {days} days to {as_of} ===");
    print_summary(&stats.summary, "lb");
    println!("  7-day change: {}", fmt_opt(stats.summary.change_7d, 1));
    if !stats.weekly.is_empty() {
        println!("\n  WEEKLY AVERAGE:");
        for p in &stats.weekly {
            println!("    {}  {:.1}", p.date, p.value);
        }
    }
    Ok(())
}

pub(crate) fn cmd_stats_calories(
    svc: &VitalsService,
    user_id: i64,
    as_of: Option<String>,
    days: i64,
    json: bool,
) -> Result<()> {
    let as_of = parse_date(as_of)?;
    let stats = svc.get_calorie_stats(user_id, as_of, days)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    if stats.days_logged == 0 {
        eprintln!("No meals logged in the {days} days to {as_of}");
        process::exit(2);
    }

    println!("=== Calories, {days} days to {as_of} ===");
    println!("  Days logged:  {}", stats.days_logged);
    print_summary(&stats.summary, "kcal");
    if let Some(ratio) = stats.mean_calorie_ratio {
        println!("  Mean of goal: {:.0}%", ratio * 100.0);
    }
    if let Some(top) = &stats.top_meal {
        println!("  Most eaten:   {} ({} times)", top.name, top.count);
    }
    println!("--- Protein ---");
    print_summary(&stats.protein, "g");
    Ok(())
}

pub(crate) fn cmd_stats_volume(
    svc: &VitalsService,
    user_id: i64,
    as_of: Option<String>,
    workout_type: Option<&str>,
    json: bool,
) -> Result<()> {
    let as_of = parse_date(as_of)?;
    let stats = svc.get_volume_stats(user_id, as_of, workout_type)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    let s = &stats.summary;
    if s.workout_count == 0 {
        eprintln!("No workouts recorded up to {as_of}");
        process::exit(2);
    }

    let scope = stats.workout_type.as_deref().unwrap_or("All workouts");
    println!("=== {scope} up to {as_of} ===");
    println!("  Workouts:        {}", s.workout_count);
    println!("  Per week:        {:.1}", s.workouts_per_week);
    println!("  Mean volume:     {}", fmt_opt(s.mean_volume, 0));
    println!("  Weekly CV:       {}", fmt_opt(s.weekly_volume_cv, 2));
    println!(
        "  Streak:          {} days (longest {})",
        s.current_streak, s.longest_streak
    );
    if let Some(h) = &s.heaviest_workout {
        println!("  Heaviest:        {:.0} on {} (id: {})", h.volume, h.date, h.workout_id);
    }
    if let Some(load) = &s.load {
        println!(
            "  Acute / chronic: {:.0} / {:.0} (anchored {})",
            load.acute, load.chronic, load.anchor
        );
        match (load.acwr, load.status) {
            (Some(acwr), Some(status)) => println!("  ACWR:            {acwr:.2} ({})", status.label()),
            _ => println!("  ACWR:            -"),
        }
    }
    Ok(())
}

pub(crate) fn cmd_stats_weekly(
    svc: &VitalsService,
    user_id: i64,
    as_of: Option<String>,
    weeks: i64,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct WeeklyRow {
        #[tabled(rename = "Week of")]
        week: String,
        #[tabled(rename = "Body part")]
        bodypart: String,
        #[tabled(rename = "Sets")]
        sets: i64,
    }

    let as_of = parse_date(as_of)?;
    let volume = svc.get_weekly_volume(user_id, as_of, weeks)?;

    if volume.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No sets recorded in the {weeks} weeks to {as_of}");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&volume)?);
        return Ok(());
    }

    let rows: Vec<WeeklyRow> = volume
        .into_iter()
        .map(|v| WeeklyRow {
            week: v.week_start.to_string(),
            bodypart: v.bodypart,
            sets: v.set_count,
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_stats_lift(
    svc: &VitalsService,
    user_id: i64,
    movement: &str,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct LiftRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Top set")]
        top: String,
        #[tabled(rename = "Volume")]
        volume: String,
        #[tabled(rename = "Est. 1RM")]
        one_rm: String,
    }

    let history = svc.get_lift_history(user_id, movement)?;

    if history.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No sets recorded for {movement}");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    let rows: Vec<LiftRow> = history
        .iter()
        .map(|p| LiftRow {
            date: p.date.to_string(),
            top: format!("{} x {:.1}", p.top_reps, p.top_weight),
            volume: format!("{:.0}", p.volume),
            one_rm: format!("{:.1}", p.estimated_1rm),
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}
