mod commands;
mod config;
mod fooddata;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    DayArgs, cmd_composite_add_ingredient, cmd_composite_create, cmd_composite_list,
    cmd_composite_remove_ingredient, cmd_composite_show, cmd_day_calendar, cmd_day_set,
    cmd_day_show, cmd_food_add, cmd_food_add_unit, cmd_food_fetch, cmd_food_list,
    cmd_food_search, cmd_food_set_active, cmd_food_units, cmd_meal_delete, cmd_meal_log,
    cmd_meal_manual, cmd_meal_restore, cmd_meal_undo, cmd_profile_set, cmd_profile_show,
    cmd_stats_bodyweight, cmd_stats_calories, cmd_stats_lift, cmd_stats_volume,
    cmd_stats_weekly, cmd_workout_add_type, cmd_workout_delete, cmd_workout_delete_set,
    cmd_workout_end, cmd_workout_lift, cmd_workout_list, cmd_workout_movements,
    cmd_workout_set, cmd_workout_show, cmd_workout_start,
};
use crate::config::Config;
use crate::fooddata::FoodDataClient;
use vitals_core::models::NewSet;
use vitals_core::service::VitalsService;

#[derive(Parser)]
#[command(
    name = "vitals",
    version,
    about = "Track food, bodyweight, and training from the terminal"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage foods and their serving units
    Food {
        #[command(subcommand)]
        command: FoodCommands,
    },
    /// Build foods out of other foods
    Composite {
        #[command(subcommand)]
        command: CompositeCommands,
    },
    /// Log what you ate
    Meal {
        #[command(subcommand)]
        command: MealCommands,
    },
    /// View and edit a day: totals, goals, weight, sleep, water
    Day {
        #[command(subcommand)]
        command: DayCommands,
    },
    /// Body facts used to derive daily goals
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Record lifting sessions
    Workout {
        #[command(subcommand)]
        command: WorkoutCommands,
    },
    /// Trends over bodyweight, calories, and training
    Stats {
        #[command(subcommand)]
        command: StatsCommands,
    },
}

#[derive(Subcommand)]
enum FoodCommands {
    /// Add a custom food (nutrients per 100 g)
    Add {
        /// Food name
        name: String,
        /// Calories per 100 g
        #[arg(long)]
        calories: Option<f64>,
        /// Protein per 100 g
        #[arg(long)]
        protein: Option<f64>,
        /// Fat per 100 g
        #[arg(long)]
        fat: Option<f64>,
        /// Carbs per 100 g
        #[arg(long)]
        carbs: Option<f64>,
        /// Any other nutrient as key=value (e.g. sodium=120, vitamin_c=4)
        #[arg(short, long = "nutrient")]
        nutrients: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List foods
    List {
        /// Filter by name
        #[arg(short, long)]
        search: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search local foods and FoodData Central
    Search {
        /// Search query
        query: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fetch a FoodData Central food by its FDC id
    Fetch {
        /// FDC id
        fdc_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the serving units of a food
    Units {
        /// Food name or ID
        food: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a serving unit to a food
    AddUnit {
        /// Food name or ID
        food: String,
        /// Unit name (e.g. "slice", "cup")
        name: String,
        /// Grams in one unit
        grams: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Hide a food from search; past entries keep it
    Deactivate {
        /// Food ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Make a food searchable again
    Activate {
        /// Food ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CompositeCommands {
    /// Create an empty composite
    Create {
        /// Composite name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add an ingredient
    AddIngredient {
        /// Composite name or ID
        composite: String,
        /// Ingredient food name or ID
        food: String,
        /// Amount in the chosen unit
        amount: f64,
        /// Unit name (default: grams)
        #[arg(short, long)]
        unit: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove an ingredient
    RemoveIngredient {
        /// Composite name or ID
        composite: String,
        /// Ingredient food name or ID
        food: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show ingredients and the per-100 g profile
    Show {
        /// Composite name or ID
        composite: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List composites
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum MealCommands {
    /// Log a food by name or ID
    Log {
        /// Food name or ID
        food: String,
        /// Amount in the chosen unit
        amount: f64,
        /// Unit name (default: grams)
        #[arg(short, long)]
        unit: Option<String>,
        /// Meal name (e.g. Breakfast, Lunch, Dinner)
        #[arg(short, long, default_value = "Snack")]
        meal: String,
        /// Date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log a description with hand-entered nutrients
    Manual {
        /// What you ate
        description: String,
        /// Calories
        #[arg(long)]
        calories: Option<f64>,
        /// Protein in grams
        #[arg(long)]
        protein: Option<f64>,
        /// Fat in grams
        #[arg(long)]
        fat: Option<f64>,
        /// Carbs in grams
        #[arg(long)]
        carbs: Option<f64>,
        /// Any other nutrient as key=value
        #[arg(short, long = "nutrient")]
        nutrients: Vec<String>,
        /// Meal name
        #[arg(short, long, default_value = "Snack")]
        meal: String,
        /// Date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Archive the latest entry of a day
    Undo {
        /// Date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Restore an archived entry (default: the latest archived that day)
    Restore {
        /// Entry ID
        id: Option<i64>,
        /// Date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an entry permanently
    Delete {
        /// Entry ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum DayCommands {
    /// Meals, totals, and goal progress
    Show {
        /// Date (YYYY-MM-DD, default: today)
        date: Option<String>,
        /// Include every nutrient
        #[arg(long)]
        full: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record day facts or override goals
    Set {
        /// Date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Free-form note
        #[arg(long)]
        note: Option<String>,
        /// Bodyweight in pounds
        #[arg(long)]
        bodyweight: Option<f64>,
        /// Hours slept
        #[arg(long)]
        sleep: Option<f64>,
        /// Water drunk in ml
        #[arg(long)]
        water: Option<i64>,
        /// Calorie goal
        #[arg(long)]
        calorie_goal: Option<i64>,
        /// Protein goal in grams
        #[arg(long)]
        protein_goal: Option<i64>,
        /// Water goal in ml
        #[arg(long)]
        water_goal: Option<i64>,
        /// Sleep goal in hours
        #[arg(long)]
        sleep_goal: Option<f64>,
        /// Clear a field: note, bodyweight, sleep, water
        #[arg(long)]
        clear: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// One row per recorded day of a month
    Calendar {
        /// Month (YYYY-MM, default: this month)
        month: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Save gender, height, and birth date
    Set {
        /// male or female
        #[arg(long)]
        gender: String,
        /// Height in centimetres
        #[arg(long)]
        height_cm: f64,
        /// Birth date (YYYY-MM-DD)
        #[arg(long)]
        birth_date: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the profile
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WorkoutCommands {
    /// Start a workout
    Start {
        /// Workout type (e.g. Push, Pull, Legs)
        #[arg(short = 't', long = "type")]
        workout_type: Option<String>,
        /// Notes
        #[arg(long)]
        notes: Option<String>,
        /// Date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// End the active workout
    End {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a movement to the active workout
    Lift {
        /// Movement name (e.g. "Bench Press")
        movement: String,
        /// Body part; creates the movement if it is new
        #[arg(short, long)]
        bodypart: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record a set (default: on the last lift of the active workout)
    Set {
        /// Repetitions
        reps: i64,
        /// Weight lifted
        weight: f64,
        /// Lift ID
        #[arg(long)]
        lift: Option<i64>,
        /// Reps in reserve
        #[arg(long)]
        rir: Option<i64>,
        /// Rest before the set, in seconds
        #[arg(long)]
        rest: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a set
    DeleteSet {
        /// Set ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a workout with its lifts and sets
    Delete {
        /// Workout ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a workout (default: active, then most recent)
    Show {
        /// Workout ID
        id: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recent workouts
    List {
        /// How many to show
        #[arg(short, long, default_value = "10")]
        limit: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List known movements
    Movements {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a workout type
    AddType {
        /// Type name
        name: String,
        /// Display color (#rrggbb)
        #[arg(long)]
        color: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum StatsCommands {
    /// Bodyweight trend and fluctuation
    Bodyweight {
        /// Window length in days
        #[arg(short, long, default_value = "90")]
        days: i64,
        /// Last day of the window (default: today)
        #[arg(long)]
        as_of: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Calorie intake against goals
    Calories {
        /// Window length in days
        #[arg(short, long, default_value = "30")]
        days: i64,
        /// Last day of the window (default: today)
        #[arg(long)]
        as_of: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Training volume, streaks, and acute:chronic load
    Volume {
        /// Limit to one workout type
        #[arg(short = 't', long = "type")]
        workout_type: Option<String>,
        /// Count workouts up to this day (default: today)
        #[arg(long)]
        as_of: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sets per body part per week
    Weekly {
        /// Number of weeks
        #[arg(short, long, default_value = "4")]
        weeks: i64,
        /// A day in the last week (default: today)
        #[arg(long)]
        as_of: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Per-workout history of one movement
    Lift {
        /// Movement name
        movement: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Log to stderr. `VITALS_LOG` takes an env-filter directive and wins over
/// the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_env("VITALS_LOG").unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.log_level);

    let svc = VitalsService::new(&config.db_path)?;
    let user = svc.db().get_or_create_user(&config.user)?;
    let uid = user.id;
    let fdc = FoodDataClient::new(&config.fdc_api_key)?;

    match cli.command {
        Commands::Food { command } => match command {
            FoodCommands::Add {
                name,
                calories,
                protein,
                fat,
                carbs,
                nutrients,
                json,
            } => cmd_food_add(
                &svc, uid, &name, calories, protein, fat, carbs, &nutrients, json,
            ),
            FoodCommands::List { search, json } => {
                cmd_food_list(&svc, uid, search.as_deref(), json)
            }
            FoodCommands::Search { query, json } => cmd_food_search(&svc, &fdc, uid, &query, json),
            FoodCommands::Fetch { fdc_id, json } => cmd_food_fetch(&svc, &fdc, fdc_id, json),
            FoodCommands::Units { food, json } => cmd_food_units(&svc, &fdc, uid, &food, json),
            FoodCommands::AddUnit {
                food,
                name,
                grams,
                json,
            } => cmd_food_add_unit(&svc, &fdc, uid, &food, &name, grams, json),
            FoodCommands::Deactivate { id, json } => cmd_food_set_active(&svc, id, false, json),
            FoodCommands::Activate { id, json } => cmd_food_set_active(&svc, id, true, json),
        },
        Commands::Composite { command } => match command {
            CompositeCommands::Create { name, json } => {
                cmd_composite_create(&svc, uid, &name, json)
            }
            CompositeCommands::AddIngredient {
                composite,
                food,
                amount,
                unit,
                json,
            } => cmd_composite_add_ingredient(
                &svc,
                &fdc,
                uid,
                &composite,
                &food,
                amount,
                unit.as_deref(),
                json,
            ),
            CompositeCommands::RemoveIngredient {
                composite,
                food,
                json,
            } => cmd_composite_remove_ingredient(&svc, uid, &composite, &food, json),
            CompositeCommands::Show { composite, json } => {
                cmd_composite_show(&svc, uid, &composite, json)
            }
            CompositeCommands::List { json } => cmd_composite_list(&svc, uid, json),
        },
        Commands::Meal { command } => match command {
            MealCommands::Log {
                food,
                amount,
                unit,
                meal,
                date,
                json,
            } => cmd_meal_log(
                &svc,
                &fdc,
                uid,
                &food,
                amount,
                unit.as_deref(),
                &meal,
                date,
                json,
            ),
            MealCommands::Manual {
                description,
                calories,
                protein,
                fat,
                carbs,
                nutrients,
                meal,
                date,
                json,
            } => cmd_meal_manual(
                &svc,
                uid,
                &description,
                calories,
                protein,
                fat,
                carbs,
                &nutrients,
                &meal,
                date,
                json,
            ),
            MealCommands::Undo { date, json } => cmd_meal_undo(&svc, uid, date, json),
            MealCommands::Restore { id, date, json } => cmd_meal_restore(&svc, uid, id, date, json),
            MealCommands::Delete { id, json } => cmd_meal_delete(&svc, uid, id, json),
        },
        Commands::Day { command } => match command {
            DayCommands::Show { date, full, json } => cmd_day_show(&svc, uid, date, full, json),
            DayCommands::Set {
                date,
                note,
                bodyweight,
                sleep,
                water,
                calorie_goal,
                protein_goal,
                water_goal,
                sleep_goal,
                clear,
                json,
            } => cmd_day_set(
                &svc,
                uid,
                date,
                DayArgs {
                    note,
                    bodyweight,
                    sleep,
                    water,
                    calorie_goal,
                    protein_goal,
                    water_goal,
                    sleep_goal,
                    clear,
                },
                json,
            ),
            DayCommands::Calendar { month, json } => {
                cmd_day_calendar(&svc, uid, month.as_deref(), json)
            }
        },
        Commands::Profile { command } => match command {
            ProfileCommands::Set {
                gender,
                height_cm,
                birth_date,
                json,
            } => cmd_profile_set(&svc, uid, &gender, height_cm, &birth_date, json),
            ProfileCommands::Show { json } => cmd_profile_show(&svc, uid, json),
        },
        Commands::Workout { command } => match command {
            WorkoutCommands::Start {
                workout_type,
                notes,
                date,
                json,
            } => cmd_workout_start(
                &svc,
                uid,
                workout_type.as_deref(),
                notes.as_deref(),
                date,
                json,
            ),
            WorkoutCommands::End { json } => cmd_workout_end(&svc, uid, json),
            WorkoutCommands::Lift {
                movement,
                bodypart,
                json,
            } => cmd_workout_lift(&svc, uid, &movement, bodypart.as_deref(), json),
            WorkoutCommands::Set {
                reps,
                weight,
                lift,
                rir,
                rest,
                json,
            } => cmd_workout_set(
                &svc,
                uid,
                lift,
                &NewSet {
                    reps,
                    weight,
                    rir,
                    rest_seconds: rest,
                },
                json,
            ),
            WorkoutCommands::DeleteSet { id, json } => cmd_workout_delete_set(&svc, id, json),
            WorkoutCommands::Delete { id, json } => cmd_workout_delete(&svc, id, json),
            WorkoutCommands::Show { id, json } => cmd_workout_show(&svc, uid, id, json),
            WorkoutCommands::List { limit, json } => cmd_workout_list(&svc, uid, limit, json),
            WorkoutCommands::Movements { json } => cmd_workout_movements(&svc, json),
            WorkoutCommands::AddType { name, color, json } => {
                cmd_workout_add_type(&svc, uid, &name, color.as_deref(), json)
            }
        },
        Commands::Stats { command } => match command {
            StatsCommands::Bodyweight { days, as_of, json } => {
                cmd_stats_bodyweight(&svc, uid, as_of, days, json)
            }
            StatsCommands::Calories { days, as_of, json } => {
                cmd_stats_calories(&svc, uid, as_of, days, json)
            }
            StatsCommands::Volume {
                workout_type,
                as_of,
                json,
            } => cmd_stats_volume(&svc, uid, as_of, workout_type.as_deref(), json),
            StatsCommands::Weekly { weeks, as_of, json } => {
                cmd_stats_weekly(&svc, uid, as_of, weeks, json)
            }
            StatsCommands::Lift { movement, json } => cmd_stats_lift(&svc, uid, &movement, json),
        },
    }
}
