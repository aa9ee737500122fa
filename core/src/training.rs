//! Training volume, estimated maxes, and acute:chronic workload.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::stats::{self, Aggregation, Period, Series};

/// Window lengths in days for the workload ratio.
pub const ACUTE_DAYS: i64 = 7;
pub const CHRONIC_DAYS: i64 = 28;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetLoad {
    pub reps: i64,
    pub weight: f64,
}

impl SetLoad {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn volume(&self) -> f64 {
        self.reps as f64 * self.weight
    }
}

#[must_use]
pub fn lift_volume(sets: &[SetLoad]) -> f64 {
    sets.iter().map(SetLoad::volume).sum()
}

#[must_use]
pub fn workout_volume<'a>(lifts: impl IntoIterator<Item = &'a [SetLoad]>) -> f64 {
    lifts.into_iter().map(lift_volume).sum()
}

/// Brzycki one-rep max for a single set. Past 36 reps the formula breaks
/// down, so the set weight itself is returned.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn brzycki(weight: f64, reps: i64) -> f64 {
    let denominator = 1.0278 - 0.0278 * reps as f64;
    if denominator <= 0.0 {
        return weight;
    }
    weight / denominator
}

/// Estimated 1RM from the heaviest set (ties broken by more reps); 0 with no
/// sets.
#[must_use]
pub fn estimated_one_rep_max(sets: &[SetLoad]) -> f64 {
    sets.iter()
        .max_by(|a, b| a.weight.total_cmp(&b.weight).then(a.reps.cmp(&b.reps)))
        .map_or(0.0, |top| brzycki(top.weight, top.reps))
}

/// The Sunday on or before `date`.
#[must_use]
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let back = (i64::from(date.weekday().num_days_from_monday()) + 1) % 7;
    date - Duration::days(back)
}

/// Sunday through Saturday containing `date`.
#[must_use]
pub fn week_range(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = week_start(date);
    (start, start + Duration::days(6))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcwrStatus {
    Undertrained,
    Optimal,
    Caution,
    HighRisk,
}

impl AcwrStatus {
    #[must_use]
    pub fn classify(ratio: f64) -> Self {
        if ratio < 0.8 {
            AcwrStatus::Undertrained
        } else if ratio <= 1.3 {
            AcwrStatus::Optimal
        } else if ratio <= 1.5 {
            AcwrStatus::Caution
        } else {
            AcwrStatus::HighRisk
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            AcwrStatus::Undertrained => "undertrained",
            AcwrStatus::Optimal => "optimal",
            AcwrStatus::Caution => "caution",
            AcwrStatus::HighRisk => "high risk",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrainingLoad {
    pub anchor: NaiveDate,
    pub acute: f64,
    pub chronic: f64,
    pub acwr: Option<f64>,
    pub status: Option<AcwrStatus>,
}

/// Workload ratio over a per-day volume series, anchored at its latest day.
///
/// Acute load is the 7-day sum. Chronic load is the mean of the recorded days
/// in the last 28, times 4. `None` for an empty series.
#[must_use]
pub fn training_load(daily_volume: &Series) -> Option<TrainingLoad> {
    let anchor = daily_volume.latest()?.date;
    let trailing = |days: i64| {
        daily_volume.window(anchor - Duration::days(days - 1), anchor)
    };

    let acute: f64 = trailing(ACUTE_DAYS).values().iter().sum();
    let chronic = trailing(CHRONIC_DAYS).mean().unwrap_or(0.0) * 4.0;
    let acwr = (chronic > 0.0).then(|| acute / chronic);

    Some(TrainingLoad {
        anchor,
        acute,
        chronic,
        acwr,
        status: acwr.map(AcwrStatus::classify),
    })
}

/// One completed workout, reduced to what volume stats need.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkoutVolume {
    pub workout_id: i64,
    pub date: NaiveDate,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeaviestWorkout {
    pub workout_id: i64,
    pub date: NaiveDate,
    pub volume: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeSummary {
    pub workout_count: usize,
    pub mean_volume: Option<f64>,
    pub weekly_volume_cv: Option<f64>,
    pub heaviest_workout: Option<HeaviestWorkout>,
    pub workouts_last_4_weeks: usize,
    pub workouts_per_week: f64,
    pub current_streak: usize,
    pub longest_streak: usize,
    pub load: Option<TrainingLoad>,
}

/// Sum workout volumes into one value per day.
#[must_use]
pub fn daily_volume(workouts: &[WorkoutVolume]) -> Series {
    let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for w in workouts {
        *by_day.entry(w.date).or_default() += w.volume;
    }
    Series::from_values(by_day)
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn volume_summary(workouts: &[WorkoutVolume], as_of: NaiveDate) -> VolumeSummary {
    let daily = daily_volume(workouts);
    let volumes: Vec<f64> = workouts.iter().map(|w| w.volume).collect();

    let weekly: Vec<f64> = daily
        .resample(Period::Weekly, Aggregation::Sum)
        .into_iter()
        .map(|p| p.value)
        .collect();

    let heaviest_workout = workouts
        .iter()
        .max_by(|a, b| a.volume.total_cmp(&b.volume))
        .map(|w| HeaviestWorkout {
            workout_id: w.workout_id,
            date: w.date,
            volume: w.volume,
        });

    let four_weeks_ago = as_of - Duration::days(CHRONIC_DAYS);
    let workouts_last_4_weeks = workouts
        .iter()
        .filter(|w| w.date > four_weeks_ago && w.date <= as_of)
        .count();

    let present = stats::presence_by_day(&daily.dates());

    VolumeSummary {
        workout_count: workouts.len(),
        mean_volume: stats::mean(&volumes),
        weekly_volume_cv: stats::coefficient_of_variation(&weekly),
        heaviest_workout,
        workouts_last_4_weeks,
        workouts_per_week: workouts_last_4_weeks as f64 / 4.0,
        current_streak: stats::streak_current(&present),
        longest_streak: stats::streak_longest(&present),
        load: training_load(&daily),
    }
}
