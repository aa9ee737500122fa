use anyhow::{Context, Result};
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use vitals_core::models::{NewSet, Workout};
use vitals_core::service::VitalsService;

use super::helpers::{json_error, parse_date};

fn active_workout(svc: &VitalsService, user_id: i64) -> Result<Workout> {
    svc.db()
        .get_active_workout(user_id)?
        .context("No active workout. Start one with: vitals workout start")
}

fn not_found(what: &str, id: i64, json: bool) -> ! {
    if json {
        println!("{}", json_error(&format!("{what} {id} not found")));
    } else {
        eprintln!("{what} {id} not found");
    }
    process::exit(2);
}

pub(crate) fn cmd_workout_start(
    svc: &VitalsService,
    user_id: i64,
    workout_type: Option<&str>,
    notes: Option<&str>,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let type_id = workout_type
        .map(|name| svc.db().find_workout_type(user_id, name))
        .transpose()?
        .map(|t| t.id);
    let workout = svc.db().start_workout(user_id, date, type_id, notes)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&workout)?);
    } else {
        let kind = workout.workout_type.as_deref().unwrap_or("Workout");
        println!("Started {kind} on {date} (id: {})", workout.id);
    }
    Ok(())
}

pub(crate) fn cmd_workout_end(svc: &VitalsService, user_id: i64, json: bool) -> Result<()> {
    let workout = svc.db().end_workout(user_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&workout)?);
    } else {
        let detail = svc.db().get_workout_detail(workout.id)?;
        println!(
            "Ended workout {} - {} lifts, {:.0} total volume",
            workout.id,
            detail.lifts.len(),
            detail.total_volume
        );
    }
    Ok(())
}

/// Add a movement to the active workout.
pub(crate) fn cmd_workout_lift(
    svc: &VitalsService,
    user_id: i64,
    movement: &str,
    bodypart: Option<&str>,
    json: bool,
) -> Result<()> {
    let workout = active_workout(svc, user_id)?;
    let movement = svc.db().get_or_create_movement(movement, bodypart)?;
    let lift = svc.db().add_lift(workout.id, movement.id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&lift)?);
    } else {
        println!(
            "Added {} ({}) as lift {} (id: {})",
            lift.movement, lift.bodypart, lift.position, lift.id
        );
    }
    Ok(())
}

/// Record a set on `lift_id`, or on the last lift of the active workout.
pub(crate) fn cmd_workout_set(
    svc: &VitalsService,
    user_id: i64,
    lift_id: Option<i64>,
    set: &NewSet,
    json: bool,
) -> Result<()> {
    let lift_id = match lift_id {
        Some(id) => id,
        None => {
            let workout = active_workout(svc, user_id)?;
            svc.db()
                .get_workout_detail(workout.id)?
                .lifts
                .last()
                .map(|l| l.lift.id)
                .context("The active workout has no lifts. Add one with: vitals workout lift <movement>")?
        }
    };
    let lift = svc.db().get_lift(lift_id)?;
    let saved = svc.db().add_set(lift.id, set)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&saved)?);
    } else {
        println!(
            "{}: {} x {} (set id: {})",
            lift.movement, saved.reps, saved.weight, saved.id
        );
    }
    Ok(())
}

pub(crate) fn cmd_workout_delete_set(svc: &VitalsService, set_id: i64, json: bool) -> Result<()> {
    if !svc.db().delete_set(set_id)? {
        not_found("Set", set_id, json);
    }
    if json {
        println!("{}", serde_json::json!({ "deleted": set_id }));
    } else {
        println!("Deleted set {set_id}");
    }
    Ok(())
}

pub(crate) fn cmd_workout_delete(svc: &VitalsService, workout_id: i64, json: bool) -> Result<()> {
    if !svc.db().delete_workout(workout_id)? {
        not_found("Workout", workout_id, json);
    }
    if json {
        println!("{}", serde_json::json!({ "deleted": workout_id }));
    } else {
        println!("Deleted workout {workout_id}");
    }
    Ok(())
}

/// Show a workout; defaults to the active one, then the most recent.
pub(crate) fn cmd_workout_show(
    svc: &VitalsService,
    user_id: i64,
    workout_id: Option<i64>,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct SetRow {
        #[tabled(rename = "Lift")]
        movement: String,
        #[tabled(rename = "Set ID")]
        id: i64,
        #[tabled(rename = "Reps")]
        reps: i64,
        #[tabled(rename = "Weight")]
        weight: String,
        #[tabled(rename = "RIR")]
        rir: String,
    }

    let id = match workout_id {
        Some(id) => id,
        None => match svc.db().get_active_workout(user_id)? {
            Some(w) => w.id,
            None => svc
                .db()
                .list_workouts(user_id, 1)?
                .first()
                .map(|w| w.id)
                .context("No workouts recorded")?,
        },
    };
    let detail = svc.db().get_workout_detail(id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let w = &detail.workout;
    let kind = w.workout_type.as_deref().unwrap_or("Workout");
    let status = if w.is_active { " (active)" } else { "" };
    println!("=== {kind} on {}{status} ===", w.date);
    if !w.notes.is_empty() {
        println!("  {}", w.notes);
    }

    let rows: Vec<SetRow> = detail
        .lifts
        .iter()
        .flat_map(|l| {
            l.sets.iter().map(move |s| SetRow {
                movement: l.lift.movement.clone(),
                id: s.id,
                reps: s.reps,
                weight: format!("{:.1}", s.weight),
                rir: s.rir.map_or(String::new(), |r| r.to_string()),
            })
        })
        .collect();
    if rows.is_empty() {
        println!("  No sets yet.");
    } else {
        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
            .to_string();
        println!("{table}");
    }

    for lift in &detail.lifts {
        println!(
            "  {}: volume {:.0}, est. 1RM {:.1}",
            lift.lift.movement, lift.total_volume, lift.estimated_1rm
        );
    }
    println!("  TOTAL VOLUME: {:.0}", detail.total_volume);
    Ok(())
}

pub(crate) fn cmd_workout_list(
    svc: &VitalsService,
    user_id: i64,
    limit: i64,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct WorkoutRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Type")]
        kind: String,
        #[tabled(rename = "Status")]
        status: &'static str,
    }

    let workouts = svc.db().list_workouts(user_id, limit)?;

    if workouts.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No workouts recorded");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&workouts)?);
        return Ok(());
    }

    let rows: Vec<WorkoutRow> = workouts
        .into_iter()
        .map(|w| WorkoutRow {
            id: w.id,
            date: w.date.to_string(),
            kind: w.workout_type.unwrap_or_else(|| "-".to_string()),
            status: if w.is_active { "active" } else { "done" },
        })
        .collect();
    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_workout_movements(svc: &VitalsService, json: bool) -> Result<()> {
    let movements = svc.db().list_movements()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&movements)?);
        return Ok(());
    }
    if movements.is_empty() {
        eprintln!("No movements yet. They are created by: vitals workout lift <name> --bodypart <part>");
        process::exit(2);
    }
    for m in &movements {
        println!("  {:<12} {}", m.bodypart, m.name);
    }
    Ok(())
}

pub(crate) fn cmd_workout_add_type(
    svc: &VitalsService,
    user_id: i64,
    name: &str,
    color: Option<&str>,
    json: bool,
) -> Result<()> {
    let kind = svc.db().add_workout_type(user_id, name, color)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&kind)?);
    } else {
        println!("Added workout type {} (id: {})", kind.name, kind.id);
    }
    Ok(())
}
