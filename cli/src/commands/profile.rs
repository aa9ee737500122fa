use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::process;

use vitals_core::goals::{self, Gender};
use vitals_core::models::NewProfile;
use vitals_core::service::VitalsService;

use super::helpers::json_error;

pub(crate) fn cmd_profile_set(
    svc: &VitalsService,
    user_id: i64,
    gender: &str,
    height_cm: f64,
    birth_date: &str,
    json: bool,
) -> Result<()> {
    let gender: Gender = gender.parse()?;
    let birth_date = NaiveDate::parse_from_str(birth_date, "%Y-%m-%d")
        .with_context(|| format!("Invalid birth date '{birth_date}'. Use YYYY-MM-DD"))?;

    let profile = svc.db().set_profile(
        user_id,
        &NewProfile {
            gender,
            height_cm,
            birth_date,
        },
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        println!("Profile saved. Goals for new days will use it once a bodyweight is logged.");
    }
    Ok(())
}

pub(crate) fn cmd_profile_show(svc: &VitalsService, user_id: i64, json: bool) -> Result<()> {
    let Some(profile) = svc.db().get_profile(user_id)? else {
        if json {
            println!("{}", json_error("No profile set"));
        } else {
            eprintln!("No profile set. Use: vitals profile set --gender <male|female> --height-cm <cm> --birth-date <YYYY-MM-DD>");
        }
        process::exit(2);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
        return Ok(());
    }

    let age = goals::age_on(profile.birth_date, Local::now().date_naive());
    println!("  Gender:     {}", profile.gender);
    println!("  Height:     {:.1} cm", profile.height_cm);
    println!("  Birth date: {} (age {age})", profile.birth_date);
    Ok(())
}
