use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, ToSql, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::composite::{self, CompositeProfile, GRAMS_UNIT, IngredientGraph, IngredientPortion};
use crate::error::CoreError;
use crate::goals::{self, DEFAULT_CALORIE_GOAL, DEFAULT_PROTEIN_GOAL};
use crate::meals::{self, ConsumptionDraft, ConsumptionItem, NewConsumption};
use crate::models::{
    ConsumptionLine, DEFAULT_WORKOUT_TYPES, Day, Food, FoodUnit, Ingredient, IngredientLine,
    Lift, LiftDetail, LiftHistoryPoint, Meal, MealConsumption, MealSummary, Movement, NewFood,
    NewProfile, NewSet, Profile, TopMeal, UpdateDay, User, WeeklyVolume, Workout, WorkoutDetail,
    WorkoutSet, WorkoutType, validate_color, validate_new_food, validate_profile, validate_set,
    validate_unit, validate_update_day,
};
use crate::catalog::CatalogFood;
use crate::nutrients::{Nutrient, NutrientVector};
use crate::training::{self, SetLoad, WorkoutVolume};

pub struct Database {
    conn: Connection,
}

// A composite is a food carrying the derived "as prepared" unit, with or
// without ingredients yet.
const FOOD_COLUMNS: &str = "f.id, f.uuid, f.name, f.fdc_id, f.owner_id, f.is_active,
    EXISTS(SELECT 1 FROM food_units cu WHERE cu.food_id = f.id AND cu.name = 'as prepared'),
    f.created_at, f.updated_at";
const FOOD_NUTRIENTS_AT: usize = 9;

const CONSUMPTION_COLUMNS: &str = "c.id, c.uuid, c.meal_id, c.food_id, c.amount, c.unit_id,
    c.description, c.archived_at, c.created_at";
const CONSUMPTION_NUTRIENTS_AT: usize = 9;

const DAY_COLUMNS: &str = "id, user_id, date, note, calories_consumed, protein_consumed,
    calorie_goal, protein_goal, water_goal_ml, sleep_goal_hours, bodyweight_lb, sleep_hours,
    water_ml, did_workout, created_at, updated_at";

const WORKOUT_SELECT: &str = "SELECT w.id, w.uuid, w.user_id, w.date, w.workout_type_id, t.name,
    w.started_at, w.ended_at, w.notes, w.is_active, w.created_at
    FROM workouts w LEFT JOIN workout_types t ON w.workout_type_id = t.id";

const LIFT_SELECT: &str = "SELECT l.id, l.workout_id, l.movement_id, m.name, m.bodypart, l.position
    FROM lifts l JOIN movements m ON l.movement_id = m.id";

const SET_COLUMNS: &str = "id, lift_id, reps, weight, rir, rest_seconds, created_at";

fn now() -> String {
    Local::now().to_rfc3339()
}

fn date_str(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn escape_like(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// `prefix` + every nutrient column, in schema order.
fn nutrient_columns(prefix: &str) -> String {
    Nutrient::ALL
        .iter()
        .map(|n| format!("{prefix}{}", n.key()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn nutrient_column_defs() -> String {
    Nutrient::ALL
        .iter()
        .map(|n| format!("{} REAL", n.key()))
        .collect::<Vec<_>>()
        .join(",\n")
}

fn date_at(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn nutrients_at(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<NutrientVector> {
    let mut v = NutrientVector::default();
    for (i, n) in Nutrient::ALL.into_iter().enumerate() {
        v.set(n, row.get(offset + i)?);
    }
    Ok(v)
}

/// Intermediate row for aggregation; contributions are computed afterwards.
struct ConsumptionRow {
    id: i64,
    label: String,
    amount: Option<f64>,
    unit: Option<String>,
    item: ConsumptionItem,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            let nutrients = nutrient_column_defs();
            self.conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS profiles (
                    user_id INTEGER PRIMARY KEY REFERENCES users(id),
                    gender TEXT NOT NULL CHECK (gender IN ('male', 'female')),
                    height_cm REAL NOT NULL,
                    birth_date TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS foods (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    fdc_id INTEGER,
                    owner_id INTEGER REFERENCES users(id),
                    is_active INTEGER NOT NULL DEFAULT 1,
                    {nutrients},
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS food_units (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    food_id INTEGER NOT NULL REFERENCES foods(id),
                    name TEXT NOT NULL COLLATE NOCASE,
                    gram_weight REAL NOT NULL,
                    UNIQUE (food_id, name)
                );

                CREATE TABLE IF NOT EXISTS ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    composite_food_id INTEGER NOT NULL REFERENCES foods(id),
                    ingredient_food_id INTEGER NOT NULL REFERENCES foods(id),
                    amount REAL NOT NULL,
                    unit_id INTEGER NOT NULL REFERENCES food_units(id),
                    UNIQUE (composite_food_id, ingredient_food_id)
                );

                CREATE TABLE IF NOT EXISTS meals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    date TEXT NOT NULL,
                    name TEXT NOT NULL COLLATE NOCASE,
                    created_at TEXT NOT NULL,
                    UNIQUE (user_id, date, name)
                );

                CREATE TABLE IF NOT EXISTS meal_consumptions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    meal_id INTEGER NOT NULL REFERENCES meals(id),
                    food_id INTEGER REFERENCES foods(id),
                    amount REAL,
                    unit_id INTEGER REFERENCES food_units(id),
                    description TEXT,
                    {nutrients},
                    archived_at TEXT,
                    created_at TEXT NOT NULL,
                    CHECK (
                        (food_id IS NOT NULL AND amount IS NOT NULL AND unit_id IS NOT NULL
                            AND description IS NULL)
                        OR (food_id IS NULL AND amount IS NULL AND unit_id IS NULL
                            AND description IS NOT NULL)
                    )
                );

                CREATE TABLE IF NOT EXISTS days (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    date TEXT NOT NULL,
                    note TEXT,
                    calories_consumed REAL NOT NULL DEFAULT 0,
                    protein_consumed REAL NOT NULL DEFAULT 0,
                    calorie_goal INTEGER NOT NULL DEFAULT 2000,
                    protein_goal INTEGER NOT NULL DEFAULT 150,
                    water_goal_ml INTEGER NOT NULL DEFAULT 2500,
                    sleep_goal_hours REAL NOT NULL DEFAULT 8,
                    bodyweight_lb REAL,
                    sleep_hours REAL,
                    water_ml INTEGER,
                    did_workout INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (user_id, date)
                );

                CREATE TABLE IF NOT EXISTS workout_types (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    name TEXT NOT NULL COLLATE NOCASE,
                    color TEXT,
                    UNIQUE (user_id, name)
                );

                CREATE TABLE IF NOT EXISTS movements (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    bodypart TEXT NOT NULL COLLATE NOCASE
                );

                CREATE TABLE IF NOT EXISTS workouts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    date TEXT NOT NULL,
                    workout_type_id INTEGER REFERENCES workout_types(id),
                    started_at TEXT,
                    ended_at TEXT,
                    notes TEXT NOT NULL DEFAULT '',
                    is_active INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS lifts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    workout_id INTEGER NOT NULL REFERENCES workouts(id),
                    movement_id INTEGER NOT NULL REFERENCES movements(id),
                    position INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS sets (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    lift_id INTEGER NOT NULL REFERENCES lifts(id),
                    reps INTEGER NOT NULL,
                    weight REAL NOT NULL,
                    rir INTEGER,
                    rest_seconds INTEGER,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS weekly_volume (
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    week_start TEXT NOT NULL,
                    bodypart TEXT NOT NULL COLLATE NOCASE,
                    set_count INTEGER NOT NULL,
                    PRIMARY KEY (user_id, week_start, bodypart)
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_foods_fdc_id ON foods(fdc_id)
                    WHERE fdc_id IS NOT NULL;
                CREATE INDEX IF NOT EXISTS idx_foods_name ON foods(name);
                CREATE INDEX IF NOT EXISTS idx_ingredients_ingredient
                    ON ingredients(ingredient_food_id);
                CREATE INDEX IF NOT EXISTS idx_meals_user_date ON meals(user_id, date);
                CREATE INDEX IF NOT EXISTS idx_consumptions_meal ON meal_consumptions(meal_id);
                CREATE INDEX IF NOT EXISTS idx_consumptions_food ON meal_consumptions(food_id);
                CREATE INDEX IF NOT EXISTS idx_workouts_user_date ON workouts(user_id, date);
                CREATE UNIQUE INDEX IF NOT EXISTS idx_workouts_one_active
                    ON workouts(user_id) WHERE is_active = 1;
                CREATE INDEX IF NOT EXISTS idx_lifts_workout ON lifts(workout_id);
                CREATE INDEX IF NOT EXISTS idx_sets_lift ON sets(lift_id);

                PRAGMA user_version = 1;"
            ))?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn food_from_row(row: &rusqlite::Row) -> rusqlite::Result<Food> {
        Ok(Food {
            id: row.get(0)?,
            uuid: row.get(1)?,
            name: row.get(2)?,
            fdc_id: row.get(3)?,
            owner_id: row.get(4)?,
            is_active: row.get(5)?,
            is_composite: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
            nutrients: nutrients_at(row, FOOD_NUTRIENTS_AT)?,
        })
    }

    fn unit_from_row(row: &rusqlite::Row) -> rusqlite::Result<FoodUnit> {
        Ok(FoodUnit {
            id: row.get(0)?,
            food_id: row.get(1)?,
            name: row.get(2)?,
            gram_weight: row.get(3)?,
        })
    }

    fn meal_from_row(row: &rusqlite::Row) -> rusqlite::Result<Meal> {
        Ok(Meal {
            id: row.get(0)?,
            uuid: row.get(1)?,
            user_id: row.get(2)?,
            date: date_at(row, 3)?,
            name: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn consumption_from_row(row: &rusqlite::Row) -> rusqlite::Result<MealConsumption> {
        let description: Option<String> = row.get(6)?;
        let nutrients = if description.is_some() {
            Some(nutrients_at(row, CONSUMPTION_NUTRIENTS_AT)?)
        } else {
            None
        };
        Ok(MealConsumption {
            id: row.get(0)?,
            uuid: row.get(1)?,
            meal_id: row.get(2)?,
            food_id: row.get(3)?,
            amount: row.get(4)?,
            unit_id: row.get(5)?,
            description,
            nutrients,
            archived_at: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn day_from_row(row: &rusqlite::Row) -> rusqlite::Result<Day> {
        Ok(Day {
            id: row.get(0)?,
            user_id: row.get(1)?,
            date: date_at(row, 2)?,
            note: row.get(3)?,
            calories_consumed: row.get(4)?,
            protein_consumed: row.get(5)?,
            calorie_goal: row.get(6)?,
            protein_goal: row.get(7)?,
            water_goal_ml: row.get(8)?,
            sleep_goal_hours: row.get(9)?,
            bodyweight_lb: row.get(10)?,
            sleep_hours: row.get(11)?,
            water_ml: row.get(12)?,
            did_workout: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    fn workout_from_row(row: &rusqlite::Row) -> rusqlite::Result<Workout> {
        Ok(Workout {
            id: row.get(0)?,
            uuid: row.get(1)?,
            user_id: row.get(2)?,
            date: date_at(row, 3)?,
            workout_type_id: row.get(4)?,
            workout_type: row.get(5)?,
            started_at: row.get(6)?,
            ended_at: row.get(7)?,
            notes: row.get(8)?,
            is_active: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn lift_from_row(row: &rusqlite::Row) -> rusqlite::Result<Lift> {
        Ok(Lift {
            id: row.get(0)?,
            workout_id: row.get(1)?,
            movement_id: row.get(2)?,
            movement: row.get(3)?,
            bodypart: row.get(4)?,
            position: row.get(5)?,
        })
    }

    fn set_from_row(row: &rusqlite::Row) -> rusqlite::Result<WorkoutSet> {
        Ok(WorkoutSet {
            id: row.get(0)?,
            lift_id: row.get(1)?,
            reps: row.get(2)?,
            weight: row.get(3)?,
            rir: row.get(4)?,
            rest_seconds: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn write_nutrients(&self, table: &str, id: i64, nutrients: &NutrientVector) -> Result<()> {
        let assignments = Nutrient::ALL
            .iter()
            .enumerate()
            .map(|(i, n)| format!("{} = ?{}", n.key(), i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE {table} SET {assignments} WHERE id = ?1");
        let amounts: Vec<Option<f64>> = nutrients.iter().map(|(_, v)| v).collect();
        let mut args: Vec<&dyn ToSql> = vec![&id];
        args.extend(amounts.iter().map(|a| a as &dyn ToSql));
        self.conn.execute(&sql, args.as_slice())?;
        Ok(())
    }

    // --- Users & profiles ---

    pub fn get_or_create_user(&self, name: &str) -> Result<User> {
        let name = name.trim();
        if name.is_empty() {
            bail!("User name must not be empty");
        }
        if let Some(user) = self.find_user(name)? {
            return Ok(user);
        }
        let tx = self.conn.unchecked_transaction()?;
        self.conn.execute(
            "INSERT INTO users (name, created_at) VALUES (?1, ?2)",
            params![name, now()],
        )?;
        let user_id = self.conn.last_insert_rowid();
        for (type_name, color) in DEFAULT_WORKOUT_TYPES {
            self.conn.execute(
                "INSERT INTO workout_types (user_id, name, color) VALUES (?1, ?2, ?3)",
                params![user_id, type_name, color],
            )?;
        }
        tx.commit()?;
        info!(user_id, name, "created user");
        self.find_user(name)?.context("User not found after insert")
    }

    pub fn find_user(&self, name: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, name, created_at FROM users WHERE name = ?1",
                params![name],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    pub fn set_profile(&self, user_id: i64, profile: &NewProfile) -> Result<Profile> {
        validate_profile(profile, Local::now().date_naive())?;
        self.conn.execute(
            "INSERT INTO profiles (user_id, gender, height_cm, birth_date, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                gender = excluded.gender,
                height_cm = excluded.height_cm,
                birth_date = excluded.birth_date,
                updated_at = excluded.updated_at",
            params![
                user_id,
                profile.gender.as_str(),
                profile.height_cm,
                date_str(profile.birth_date),
                now(),
            ],
        )?;
        self.get_profile(user_id)?
            .context("Profile not found after upsert")
    }

    pub fn get_profile(&self, user_id: i64) -> Result<Option<Profile>> {
        let row = self
            .conn
            .query_row(
                "SELECT user_id, gender, height_cm, birth_date, updated_at
                 FROM profiles WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f64>(2)?,
                        date_at(row, 3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        let Some((user_id, gender, height_cm, birth_date, updated_at)) = row else {
            return Ok(None);
        };
        Ok(Some(Profile {
            user_id,
            gender: gender.parse()?,
            height_cm,
            birth_date,
            updated_at,
        }))
    }

    // --- Foods ---

    pub fn insert_food(&self, food: &NewFood) -> Result<Food> {
        validate_new_food(food)?;
        let tx = self.conn.unchecked_transaction()?;
        let id = self.insert_food_row(food)?;
        tx.commit()?;
        self.get_food_by_id(id)
    }

    fn insert_food_row(&self, food: &NewFood) -> Result<i64> {
        let now = now();
        self.conn.execute(
            "INSERT INTO foods (uuid, name, fdc_id, owner_id, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6)",
            params![
                Uuid::new_v4().to_string(),
                food.name.trim(),
                food.fdc_id,
                food.owner_id,
                now,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.write_nutrients("foods", id, &food.nutrients)?;
        self.upsert_unit(id, GRAMS_UNIT, 1.0)?;
        Ok(id)
    }

    /// Store a catalog food once per FDC id, with its suggested unit.
    pub fn upsert_catalog_food(&self, item: &CatalogFood) -> Result<Food> {
        if let Some(fdc_id) = item.food.fdc_id {
            if let Some(existing) = self.get_food_by_fdc_id(fdc_id)? {
                return Ok(existing);
            }
        }
        validate_new_food(&item.food)?;
        let tx = self.conn.unchecked_transaction()?;
        let id = self.insert_food_row(&item.food)?;
        if let Some(unit) = &item.default_unit {
            if !unit.name.eq_ignore_ascii_case(GRAMS_UNIT)
                && !unit.name.eq_ignore_ascii_case(composite::AS_PREPARED_UNIT)
                && validate_unit(&unit.name, unit.gram_weight).is_ok()
            {
                self.upsert_unit(id, &unit.name, unit.gram_weight)?;
            }
        }
        tx.commit()?;
        self.get_food_by_id(id)
    }

    pub fn get_food_by_id(&self, id: i64) -> Result<Food> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {FOOD_COLUMNS}, {} FROM foods f WHERE f.id = ?1",
                    nutrient_columns("f.")
                ),
                params![id],
                Self::food_from_row,
            )
            .context("Food not found")
    }

    pub fn get_food_by_fdc_id(&self, fdc_id: i64) -> Result<Option<Food>> {
        let food = self
            .conn
            .query_row(
                &format!(
                    "SELECT {FOOD_COLUMNS}, {} FROM foods f WHERE f.fdc_id = ?1",
                    nutrient_columns("f.")
                ),
                params![fdc_id],
                Self::food_from_row,
            )
            .optional()?;
        Ok(food)
    }

    /// A shared food or one of the user's own.
    pub fn get_visible_food(&self, user_id: i64, id: i64) -> Result<Food> {
        let food = self.get_food_by_id(id)?;
        if food.owner_id.is_some_and(|owner| owner != user_id) {
            bail!("Food not found");
        }
        Ok(food)
    }

    /// Look a food up by id or by exact (case-insensitive) name. The user's
    /// own foods win over shared ones.
    pub fn resolve_food(&self, user_id: i64, key: &str) -> Result<Food> {
        if let Ok(id) = key.trim().parse::<i64>() {
            return self
                .get_visible_food(user_id, id)
                .with_context(|| format!("Food '{key}' not found"));
        }
        self.conn
            .query_row(
                &format!(
                    "SELECT {FOOD_COLUMNS}, {} FROM foods f
                     WHERE LOWER(f.name) = LOWER(?2)
                       AND (f.owner_id IS NULL OR f.owner_id = ?1)
                     ORDER BY f.owner_id IS NULL, f.is_active DESC, f.id
                     LIMIT 1",
                    nutrient_columns("f.")
                ),
                params![user_id, key.trim()],
                Self::food_from_row,
            )
            .context(format!("Food '{key}' not found"))
    }

    pub fn search_foods_local(&self, user_id: i64, query: &str) -> Result<Vec<Food>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FOOD_COLUMNS}, {} FROM foods f
             WHERE f.is_active = 1
               AND (f.owner_id IS NULL OR f.owner_id = ?1)
               AND f.name LIKE ?2 ESCAPE '\\'
             ORDER BY f.name LIMIT 20",
            nutrient_columns("f.")
        ))?;
        let foods = stmt
            .query_map(params![user_id, escape_like(query)], Self::food_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(foods)
    }

    pub fn list_foods(&self, user_id: i64, search: Option<&str>) -> Result<Vec<Food>> {
        if let Some(query) = search {
            return self.search_foods_local(user_id, query);
        }
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FOOD_COLUMNS}, {} FROM foods f
             WHERE f.owner_id IS NULL OR f.owner_id = ?1
             ORDER BY f.name LIMIT 100",
            nutrient_columns("f.")
        ))?;
        let foods = stmt
            .query_map(params![user_id], Self::food_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(foods)
    }

    pub fn set_food_active(&self, food_id: i64, active: bool) -> Result<Food> {
        let rows = self.conn.execute(
            "UPDATE foods SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
            params![active, now(), food_id],
        )?;
        if rows == 0 {
            bail!("Food not found");
        }
        self.get_food_by_id(food_id)
    }

    // --- Units ---

    fn upsert_unit(&self, food_id: i64, name: &str, gram_weight: f64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO food_units (food_id, name, gram_weight) VALUES (?1, ?2, ?3)
             ON CONFLICT(food_id, name) DO UPDATE SET gram_weight = excluded.gram_weight",
            params![food_id, name, gram_weight],
        )?;
        Ok(())
    }

    pub fn add_food_unit(&self, food_id: i64, name: &str, gram_weight: f64) -> Result<FoodUnit> {
        validate_unit(name, gram_weight)?;
        let food = self.get_food_by_id(food_id)?;
        let name = name.trim();
        if name.eq_ignore_ascii_case(GRAMS_UNIT) {
            bail!("The '{GRAMS_UNIT}' unit is fixed at 1 g");
        }
        if name.eq_ignore_ascii_case(composite::AS_PREPARED_UNIT) {
            bail!(
                "The '{}' unit is derived from the ingredients",
                composite::AS_PREPARED_UNIT
            );
        }
        if self.find_unit(food.id, name).is_ok() {
            bail!("'{}' already has a unit named '{name}'", food.name);
        }
        self.conn.execute(
            "INSERT INTO food_units (food_id, name, gram_weight) VALUES (?1, ?2, ?3)",
            params![food.id, name, gram_weight],
        )?;
        self.get_unit(self.conn.last_insert_rowid())
    }

    pub fn get_unit(&self, unit_id: i64) -> Result<FoodUnit> {
        self.conn
            .query_row(
                "SELECT id, food_id, name, gram_weight FROM food_units WHERE id = ?1",
                params![unit_id],
                Self::unit_from_row,
            )
            .context("Unit not found")
    }

    pub fn find_unit(&self, food_id: i64, name: &str) -> Result<FoodUnit> {
        self.conn
            .query_row(
                "SELECT id, food_id, name, gram_weight FROM food_units
                 WHERE food_id = ?1 AND name = ?2",
                params![food_id, name.trim()],
                Self::unit_from_row,
            )
            .context(format!("Food has no unit named '{name}'"))
    }

    pub fn get_food_units(&self, food_id: i64) -> Result<Vec<FoodUnit>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, food_id, name, gram_weight FROM food_units
             WHERE food_id = ?1 ORDER BY id",
        )?;
        let units = stmt
            .query_map(params![food_id], Self::unit_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(units)
    }

    // --- Composites ---

    /// Create an empty composite owned by `user_id`.
    pub fn create_composite(&self, user_id: i64, name: &str) -> Result<Food> {
        let food = NewFood {
            name: name.to_string(),
            owner_id: Some(user_id),
            nutrients: NutrientVector::zero(),
            ..Default::default()
        };
        validate_new_food(&food)?;
        let tx = self.conn.unchecked_transaction()?;
        let id = self.insert_food_row(&food)?;
        self.recompute_composite(id)?;
        tx.commit()?;
        self.get_food_by_id(id)
    }

    pub fn list_composites(&self, user_id: i64) -> Result<Vec<Food>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FOOD_COLUMNS}, {} FROM foods f
             WHERE f.owner_id IS NULL OR f.owner_id = ?1
             ORDER BY f.name",
            nutrient_columns("f.")
        ))?;
        let foods = stmt
            .query_map(params![user_id], Self::food_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(foods.into_iter().filter(|f| f.is_composite).collect())
    }

    /// A composite the user may edit.
    fn owned_composite(&self, user_id: i64, composite_id: i64) -> Result<Food> {
        let composite = self.get_food_by_id(composite_id)?;
        if composite.owner_id != Some(user_id) {
            bail!("Composite not found");
        }
        if !composite.is_composite {
            bail!("'{}' is not a composite", composite.name);
        }
        Ok(composite)
    }

    fn ingredient_graph(&self) -> Result<IngredientGraph> {
        let mut stmt = self
            .conn
            .prepare("SELECT composite_food_id, ingredient_food_id FROM ingredients")?;
        let edges = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<(i64, i64)>, _>>()?;
        Ok(IngredientGraph::from_edges(edges))
    }

    pub fn add_ingredient(
        &self,
        user_id: i64,
        composite_id: i64,
        ingredient_food_id: i64,
        amount: f64,
        unit_id: i64,
    ) -> Result<Ingredient> {
        let tx = self.conn.unchecked_transaction()?;
        let composite = self.owned_composite(user_id, composite_id)?;
        let ingredient = self.get_visible_food(user_id, ingredient_food_id)?;
        let unit = self.get_unit(unit_id)?;
        if unit.food_id != ingredient.id {
            bail!(
                "Unit '{}' does not belong to '{}'",
                unit.name,
                ingredient.name
            );
        }
        let grams = amount * unit.gram_weight;
        if !grams.is_finite() || grams <= 0.0 {
            return Err(CoreError::InvalidServing { grams }.into());
        }

        self.ingredient_graph()?
            .check_edge(composite_id, ingredient_food_id)?;

        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM ingredients
                           WHERE composite_food_id = ?1 AND ingredient_food_id = ?2)",
            params![composite_id, ingredient_food_id],
            |row| row.get(0),
        )?;
        if exists {
            bail!(
                "'{}' is already an ingredient of '{}'",
                ingredient.name,
                composite.name
            );
        }

        self.conn.execute(
            "INSERT INTO ingredients (composite_food_id, ingredient_food_id, amount, unit_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![composite_id, ingredient_food_id, amount, unit_id],
        )?;
        let id = self.conn.last_insert_rowid();

        self.recompute_cascade(composite_id)?;
        tx.commit()?;

        Ok(Ingredient {
            id,
            composite_food_id: composite_id,
            ingredient_food_id,
            amount,
            unit_id,
        })
    }

    pub fn remove_ingredient(
        &self,
        user_id: i64,
        composite_id: i64,
        ingredient_food_id: i64,
    ) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        self.owned_composite(user_id, composite_id)?;
        let rows = self.conn.execute(
            "DELETE FROM ingredients WHERE composite_food_id = ?1 AND ingredient_food_id = ?2",
            params![composite_id, ingredient_food_id],
        )?;
        if rows > 0 {
            self.recompute_cascade(composite_id)?;
        }
        tx.commit()?;
        Ok(rows > 0)
    }

    pub fn get_ingredient_lines(&self, composite_id: i64) -> Result<Vec<IngredientLine>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT i.id, f.id, f.name, i.amount, u.name, u.gram_weight, {}
             FROM ingredients i
             JOIN foods f ON i.ingredient_food_id = f.id
             JOIN food_units u ON i.unit_id = u.id
             WHERE i.composite_food_id = ?1
             ORDER BY i.id",
            nutrient_columns("f.")
        ))?;
        let rows = stmt
            .query_map(params![composite_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, f64>(5)?,
                    nutrients_at(row, 6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut lines = Vec::with_capacity(rows.len());
        for (ingredient_id, food_id, food_name, amount, unit, gram_weight, per_100g) in rows {
            let grams = amount * gram_weight;
            let contribution = if grams > 0.0 {
                per_100g.scale_to_grams(grams)?
            } else {
                NutrientVector::zero()
            };
            lines.push(IngredientLine {
                ingredient_id,
                food_id,
                food_name,
                amount,
                unit,
                grams,
                contribution,
            });
        }
        Ok(lines)
    }

    fn ingredient_portions(&self, composite_id: i64) -> Result<Vec<IngredientPortion>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT i.amount, u.gram_weight, {}
             FROM ingredients i
             JOIN foods f ON i.ingredient_food_id = f.id
             JOIN food_units u ON i.unit_id = u.id
             WHERE i.composite_food_id = ?1
             ORDER BY i.id",
            nutrient_columns("f.")
        ))?;
        let portions = stmt
            .query_map(params![composite_id], |row| {
                let amount: f64 = row.get(0)?;
                let gram_weight: f64 = row.get(1)?;
                Ok(IngredientPortion {
                    grams: amount * gram_weight,
                    per_100g: nutrients_at(row, 2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(portions)
    }

    /// Re-derive one composite's profile and its derived units. Runs inside
    /// the caller's transaction.
    fn recompute_composite(&self, food_id: i64) -> Result<CompositeProfile> {
        let portions = self.ingredient_portions(food_id)?;
        let profile = composite::resolve(&portions)?;
        self.write_nutrients("foods", food_id, &profile.per_100g)?;
        self.conn.execute(
            "UPDATE foods SET updated_at = ?1 WHERE id = ?2",
            params![now(), food_id],
        )?;
        for (name, gram_weight) in profile.units() {
            self.upsert_unit(food_id, name, gram_weight)?;
        }
        debug!(
            food_id,
            ingredients = portions.len(),
            total_grams = profile.total_grams,
            calories_per_100g = profile.per_100g.amount(Nutrient::Calories),
            "recomputed composite"
        );
        Ok(profile)
    }

    /// Recompute a composite, every composite containing it, and the day
    /// totals of days that ate any of them.
    fn recompute_cascade(&self, composite_id: i64) -> Result<()> {
        let order = self.ingredient_graph()?.recompute_order(composite_id);
        for &food_id in &order {
            self.recompute_composite(food_id)?;
        }
        self.refresh_days_eating(&order)
    }

    fn refresh_days_eating(&self, food_ids: &[i64]) -> Result<()> {
        let mut days: BTreeSet<(i64, String)> = BTreeSet::new();
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT m.user_id, m.date
             FROM meal_consumptions c JOIN meals m ON c.meal_id = m.id
             WHERE c.food_id = ?1 AND c.archived_at IS NULL",
        )?;
        for food_id in food_ids {
            let rows = stmt
                .query_map(params![food_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<(i64, String)>, _>>()?;
            days.extend(rows);
        }
        for (user_id, date) in days {
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .with_context(|| format!("Invalid meal date '{date}'"))?;
            self.refresh_day_totals(user_id, date)?;
        }
        Ok(())
    }

    // --- Meals ---

    fn get_or_create_meal(&self, user_id: i64, date: NaiveDate, name: &str) -> Result<Meal> {
        self.conn.execute(
            "INSERT INTO meals (uuid, user_id, date, name, created_at) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id, date, name) DO NOTHING",
            params![
                Uuid::new_v4().to_string(),
                user_id,
                date_str(date),
                name,
                now()
            ],
        )?;
        self.conn
            .query_row(
                "SELECT id, uuid, user_id, date, name, created_at FROM meals
                 WHERE user_id = ?1 AND date = ?2 AND name = ?3",
                params![user_id, date_str(date), name],
                Self::meal_from_row,
            )
            .context("Meal not found")
    }

    /// Validate and record a consumption entry. A blank draft records
    /// nothing and returns `None`.
    pub fn add_consumption(
        &self,
        user_id: i64,
        date: NaiveDate,
        meal_name: &str,
        draft: ConsumptionDraft,
    ) -> Result<Option<MealConsumption>> {
        let Some(entry) = draft.validate()? else {
            return Ok(None);
        };
        let meal_name = meal_name.trim();
        if meal_name.is_empty() {
            bail!("Meal name must not be empty");
        }

        let tx = self.conn.unchecked_transaction()?;
        self.get_or_create_day_inner(user_id, date)?;
        let meal = self.get_or_create_meal(user_id, date, meal_name)?;

        let id = match &entry {
            NewConsumption::FoodLinked {
                food_id,
                amount,
                unit_id,
            } => {
                let food = self.get_visible_food(user_id, *food_id)?;
                if !food.is_active {
                    bail!("'{}' is inactive", food.name);
                }
                let unit = self.get_unit(*unit_id)?;
                if unit.food_id != food.id {
                    bail!("Unit '{}' does not belong to '{}'", unit.name, food.name);
                }
                let grams = amount * unit.gram_weight;
                if !grams.is_finite() || grams <= 0.0 {
                    return Err(CoreError::InvalidServing { grams }.into());
                }
                self.conn.execute(
                    "INSERT INTO meal_consumptions (uuid, meal_id, food_id, amount, unit_id, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        Uuid::new_v4().to_string(),
                        meal.id,
                        food.id,
                        amount,
                        unit.id,
                        now()
                    ],
                )?;
                self.conn.last_insert_rowid()
            }
            NewConsumption::Manual {
                description,
                nutrients,
            } => {
                if nutrients
                    .iter()
                    .any(|(_, v)| v.is_some_and(|v| !v.is_finite() || v < 0.0))
                {
                    bail!("Nutrient amounts must be non-negative numbers");
                }
                self.conn.execute(
                    "INSERT INTO meal_consumptions (uuid, meal_id, description, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![Uuid::new_v4().to_string(), meal.id, description, now()],
                )?;
                let id = self.conn.last_insert_rowid();
                self.write_nutrients("meal_consumptions", id, nutrients)?;
                id
            }
        };

        self.refresh_day_totals(user_id, date)?;
        tx.commit()?;
        self.get_consumption(id).map(Some)
    }

    pub fn get_consumption(&self, id: i64) -> Result<MealConsumption> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {CONSUMPTION_COLUMNS}, {} FROM meal_consumptions c WHERE c.id = ?1",
                    nutrient_columns("c.")
                ),
                params![id],
                Self::consumption_from_row,
            )
            .context("Meal entry not found")
    }

    /// Most recent entry on `date`, either live or archived.
    pub fn latest_consumption(
        &self,
        user_id: i64,
        date: NaiveDate,
        archived: bool,
    ) -> Result<Option<MealConsumption>> {
        let filter = if archived {
            "c.archived_at IS NOT NULL"
        } else {
            "c.archived_at IS NULL"
        };
        let entry = self
            .conn
            .query_row(
                &format!(
                    "SELECT {CONSUMPTION_COLUMNS}, {} FROM meal_consumptions c
                     JOIN meals m ON c.meal_id = m.id
                     WHERE m.user_id = ?1 AND m.date = ?2 AND {filter}
                     ORDER BY COALESCE(c.archived_at, c.created_at) DESC, c.id DESC
                     LIMIT 1",
                    nutrient_columns("c.")
                ),
                params![user_id, date_str(date)],
                Self::consumption_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// The date of one of the user's entries.
    fn consumption_day(&self, user_id: i64, id: i64) -> Result<Option<NaiveDate>> {
        let day = self
            .conn
            .query_row(
                "SELECT m.date FROM meal_consumptions c
                 JOIN meals m ON c.meal_id = m.id WHERE c.id = ?1 AND m.user_id = ?2",
                params![id, user_id],
                |row| date_at(row, 0),
            )
            .optional()?;
        Ok(day)
    }

    /// Hide an entry from every aggregate without deleting it.
    pub fn archive_consumption(&self, user_id: i64, id: i64) -> Result<MealConsumption> {
        self.set_archived(user_id, id, true)
    }

    pub fn restore_consumption(&self, user_id: i64, id: i64) -> Result<MealConsumption> {
        self.set_archived(user_id, id, false)
    }

    fn set_archived(&self, user_id: i64, id: i64, archived: bool) -> Result<MealConsumption> {
        let tx = self.conn.unchecked_transaction()?;
        let date = self
            .consumption_day(user_id, id)?
            .context("Meal entry not found")?;
        let rows = if archived {
            self.conn.execute(
                "UPDATE meal_consumptions SET archived_at = ?1
                 WHERE id = ?2 AND archived_at IS NULL",
                params![now(), id],
            )?
        } else {
            self.conn.execute(
                "UPDATE meal_consumptions SET archived_at = NULL
                 WHERE id = ?1 AND archived_at IS NOT NULL",
                params![id],
            )?
        };
        if rows == 0 {
            bail!(
                "Meal entry {id} is already {}",
                if archived { "archived" } else { "active" }
            );
        }
        self.refresh_day_totals(user_id, date)?;
        tx.commit()?;
        self.get_consumption(id)
    }

    pub fn delete_consumption(&self, user_id: i64, id: i64) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let Some(date) = self.consumption_day(user_id, id)? else {
            return Ok(false);
        };
        self.conn
            .execute("DELETE FROM meal_consumptions WHERE id = ?1", params![id])?;
        self.refresh_day_totals(user_id, date)?;
        tx.commit()?;
        Ok(true)
    }

    fn meals_on(&self, user_id: i64, date: NaiveDate) -> Result<Vec<Meal>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, user_id, date, name, created_at FROM meals
             WHERE user_id = ?1 AND date = ?2 ORDER BY id",
        )?;
        let meals = stmt
            .query_map(params![user_id, date_str(date)], Self::meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(meals)
    }

    // Columns: 0 id, 1 food_id, 2 amount, 3 description, 4 food name,
    // 5 unit name, 6 unit gram weight, then entry nutrients, then food nutrients
    fn consumption_rows(&self, meal_id: i64) -> Result<Vec<ConsumptionRow>> {
        let food_nutrients_at = 7 + Nutrient::ALL.len();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT c.id, c.food_id, c.amount, c.description, f.name, u.name, u.gram_weight,
                    {}, {}
             FROM meal_consumptions c
             LEFT JOIN foods f ON c.food_id = f.id
             LEFT JOIN food_units u ON c.unit_id = u.id
             WHERE c.meal_id = ?1 AND c.archived_at IS NULL
             ORDER BY c.id",
            nutrient_columns("c."),
            nutrient_columns("f.")
        ))?;
        let rows = stmt
            .query_map(params![meal_id], |row| {
                let food_id: Option<i64> = row.get(1)?;
                let amount: Option<f64> = row.get(2)?;
                let description: Option<String> = row.get(3)?;
                let unit: Option<String> = row.get(5)?;
                if food_id.is_some() {
                    let gram_weight: Option<f64> = row.get(6)?;
                    Ok(ConsumptionRow {
                        id: row.get(0)?,
                        label: row.get(4)?,
                        amount,
                        unit,
                        item: ConsumptionItem::FoodLinked {
                            per_100g: nutrients_at(row, food_nutrients_at)?,
                            amount: amount.unwrap_or(0.0),
                            gram_weight: gram_weight.unwrap_or(0.0),
                        },
                    })
                } else {
                    Ok(ConsumptionRow {
                        id: row.get(0)?,
                        label: description.unwrap_or_default(),
                        amount: None,
                        unit: None,
                        item: ConsumptionItem::Manual {
                            nutrients: nutrients_at(row, 7)?,
                        },
                    })
                }
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_meals_for_date(&self, user_id: i64, date: NaiveDate) -> Result<Vec<MealSummary>> {
        let mut summaries = Vec::new();
        for meal in self.meals_on(user_id, date)? {
            let rows = self.consumption_rows(meal.id)?;
            let items: Vec<ConsumptionItem> = rows.iter().map(|r| r.item).collect();
            let totals = meals::meal_total(&items)?;
            let mut entries = Vec::with_capacity(rows.len());
            for row in rows {
                entries.push(ConsumptionLine {
                    id: row.id,
                    label: row.label,
                    amount: row.amount,
                    unit: row.unit,
                    grams: row.item.grams(),
                    nutrients: row.item.contribution()?,
                });
            }
            summaries.push(MealSummary {
                id: meal.id,
                name: meal.name,
                entries,
                totals,
            });
        }
        Ok(summaries)
    }

    /// Sum of every live entry on `date`.
    pub fn compute_day_totals(&self, user_id: i64, date: NaiveDate) -> Result<NutrientVector> {
        let mut meal_totals = Vec::new();
        for meal in self.meals_on(user_id, date)? {
            let items: Vec<ConsumptionItem> = self
                .consumption_rows(meal.id)?
                .into_iter()
                .map(|r| r.item)
                .collect();
            meal_totals.push(meals::meal_total(&items)?);
        }
        Ok(meals::day_total(meal_totals))
    }

    fn refresh_day_totals(&self, user_id: i64, date: NaiveDate) -> Result<()> {
        let totals = self.compute_day_totals(user_id, date)?;
        let calories = totals.amount(Nutrient::Calories);
        let protein = totals.amount(Nutrient::Protein);
        self.conn.execute(
            "UPDATE days SET calories_consumed = ?1, protein_consumed = ?2, updated_at = ?3
             WHERE user_id = ?4 AND date = ?5",
            params![calories, protein, now(), user_id, date_str(date)],
        )?;
        debug!(user_id, %date, calories, protein, "refreshed day totals");
        Ok(())
    }

    /// Most frequently eaten item in a date range: the food for linked
    /// entries, the description for manual ones.
    pub fn top_meal(&self, user_id: i64, start: NaiveDate, end: NaiveDate) -> Result<Option<TopMeal>> {
        let top = self
            .conn
            .query_row(
                "SELECT COALESCE(f.name, c.description) AS item, COUNT(*) AS n
                 FROM meal_consumptions c
                 JOIN meals m ON c.meal_id = m.id
                 LEFT JOIN foods f ON c.food_id = f.id
                 WHERE m.user_id = ?1 AND m.date >= ?2 AND m.date <= ?3
                   AND c.archived_at IS NULL
                   AND COALESCE(f.name, c.description) IS NOT NULL
                 GROUP BY item
                 ORDER BY n DESC, item
                 LIMIT 1",
                params![user_id, date_str(start), date_str(end)],
                |row| {
                    Ok(TopMeal {
                        name: row.get(0)?,
                        count: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(top)
    }

    // --- Days ---

    pub fn get_day(&self, user_id: i64, date: NaiveDate) -> Result<Option<Day>> {
        let day = self
            .conn
            .query_row(
                &format!("SELECT {DAY_COLUMNS} FROM days WHERE user_id = ?1 AND date = ?2"),
                params![user_id, date_str(date)],
                Self::day_from_row,
            )
            .optional()?;
        Ok(day)
    }

    pub fn get_or_create_day(&self, user_id: i64, date: NaiveDate) -> Result<Day> {
        let tx = self.conn.unchecked_transaction()?;
        let day = self.get_or_create_day_inner(user_id, date)?;
        tx.commit()?;
        Ok(day)
    }

    /// The stored day, or the day as it would start if something were
    /// recorded on it now. Nothing is written.
    pub fn get_day_or_default(&self, user_id: i64, date: NaiveDate) -> Result<Day> {
        if let Some(day) = self.get_day(user_id, date)? {
            return Ok(day);
        }
        let (calorie_goal, protein_goal, _) = self.starting_goals(user_id, date)?;
        let now = now();
        Ok(Day {
            id: 0,
            user_id,
            date,
            note: None,
            calories_consumed: 0.0,
            protein_consumed: 0.0,
            calorie_goal,
            protein_goal,
            water_goal_ml: goals::DEFAULT_WATER_GOAL_ML,
            sleep_goal_hours: goals::DEFAULT_SLEEP_GOAL_HOURS,
            bodyweight_lb: None,
            sleep_hours: None,
            water_ml: None,
            did_workout: false,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Calorie and protein goals for a new day, from the previous day's
    /// bodyweight. The flag tells whether they were derived.
    fn starting_goals(&self, user_id: i64, date: NaiveDate) -> Result<(i64, i64, bool)> {
        let prior_bodyweight = match date.pred_opt() {
            Some(prev) => self.get_day(user_id, prev)?.and_then(|d| d.bodyweight_lb),
            None => None,
        };
        let profile = self.get_profile(user_id)?;
        let goals = goals::daily_goals(profile.as_ref(), prior_bodyweight, date);
        Ok(goals.map_or(
            (DEFAULT_CALORIE_GOAL, DEFAULT_PROTEIN_GOAL, false),
            |g| (g.calorie_goal, g.protein_goal, true),
        ))
    }

    /// Goals are derived only here, when the row is first created.
    fn get_or_create_day_inner(&self, user_id: i64, date: NaiveDate) -> Result<Day> {
        if let Some(day) = self.get_day(user_id, date)? {
            return Ok(day);
        }

        let (calorie_goal, protein_goal, derived) = self.starting_goals(user_id, date)?;

        let now = now();
        self.conn.execute(
            "INSERT INTO days (user_id, date, calorie_goal, protein_goal, water_goal_ml,
                               sleep_goal_hours, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user_id,
                date_str(date),
                calorie_goal,
                protein_goal,
                goals::DEFAULT_WATER_GOAL_ML,
                goals::DEFAULT_SLEEP_GOAL_HOURS,
                now,
                now,
            ],
        )?;
        info!(
            user_id,
            %date,
            calorie_goal,
            protein_goal,
            derived,
            "created day"
        );
        self.get_day(user_id, date)?
            .context("Day not found after insert")
    }

    pub fn update_day(&self, user_id: i64, date: NaiveDate, update: &UpdateDay) -> Result<Day> {
        validate_update_day(update)?;
        let tx = self.conn.unchecked_transaction()?;
        let day = self.get_or_create_day_inner(user_id, date)?;

        let now = now();
        if let Some(ref note) = update.note {
            self.conn.execute(
                "UPDATE days SET note = ?1, updated_at = ?2 WHERE id = ?3",
                params![note, now, day.id],
            )?;
        }
        if let Some(bodyweight) = update.bodyweight_lb {
            self.conn.execute(
                "UPDATE days SET bodyweight_lb = ?1, updated_at = ?2 WHERE id = ?3",
                params![bodyweight, now, day.id],
            )?;
        }
        if let Some(sleep) = update.sleep_hours {
            self.conn.execute(
                "UPDATE days SET sleep_hours = ?1, updated_at = ?2 WHERE id = ?3",
                params![sleep, now, day.id],
            )?;
        }
        if let Some(water) = update.water_ml {
            self.conn.execute(
                "UPDATE days SET water_ml = ?1, updated_at = ?2 WHERE id = ?3",
                params![water, now, day.id],
            )?;
        }
        if let Some(goal) = update.calorie_goal {
            self.conn.execute(
                "UPDATE days SET calorie_goal = ?1, updated_at = ?2 WHERE id = ?3",
                params![goal, now, day.id],
            )?;
        }
        if let Some(goal) = update.protein_goal {
            self.conn.execute(
                "UPDATE days SET protein_goal = ?1, updated_at = ?2 WHERE id = ?3",
                params![goal, now, day.id],
            )?;
        }
        if let Some(goal) = update.water_goal_ml {
            self.conn.execute(
                "UPDATE days SET water_goal_ml = ?1, updated_at = ?2 WHERE id = ?3",
                params![goal, now, day.id],
            )?;
        }
        if let Some(goal) = update.sleep_goal_hours {
            self.conn.execute(
                "UPDATE days SET sleep_goal_hours = ?1, updated_at = ?2 WHERE id = ?3",
                params![goal, now, day.id],
            )?;
        }

        tx.commit()?;
        self.get_day(user_id, date)?.context("Day not found")
    }

    pub fn get_days_between(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Day>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DAY_COLUMNS} FROM days
             WHERE user_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date"
        ))?;
        let days = stmt
            .query_map(
                params![user_id, date_str(start), date_str(end)],
                Self::day_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(days)
    }

    fn refresh_did_workout(&self, user_id: i64, date: NaiveDate) -> Result<()> {
        self.conn.execute(
            "UPDATE days SET did_workout = EXISTS(
                SELECT 1 FROM workouts WHERE user_id = ?1 AND date = ?2
             ), updated_at = ?3
             WHERE user_id = ?1 AND date = ?2",
            params![user_id, date_str(date), now()],
        )?;
        Ok(())
    }

    // --- Workout types & movements ---

    pub fn get_workout_types(&self, user_id: i64) -> Result<Vec<WorkoutType>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, name, color FROM workout_types WHERE user_id = ?1 ORDER BY id",
        )?;
        let types = stmt
            .query_map(params![user_id], |row| {
                Ok(WorkoutType {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    name: row.get(2)?,
                    color: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(types)
    }

    pub fn find_workout_type(&self, user_id: i64, name: &str) -> Result<WorkoutType> {
        self.get_workout_types(user_id)?
            .into_iter()
            .find(|t| t.name.eq_ignore_ascii_case(name.trim()))
            .context(format!("Workout type '{name}' not found"))
    }

    pub fn add_workout_type(
        &self,
        user_id: i64,
        name: &str,
        color: Option<&str>,
    ) -> Result<WorkoutType> {
        let name = name.trim();
        if name.is_empty() {
            bail!("Workout type name must not be empty");
        }
        if let Some(color) = color {
            validate_color(color)?;
        }
        if self.find_workout_type(user_id, name).is_ok() {
            bail!("Workout type '{name}' already exists");
        }
        self.conn.execute(
            "INSERT INTO workout_types (user_id, name, color) VALUES (?1, ?2, ?3)",
            params![user_id, name, color],
        )?;
        self.find_workout_type(user_id, name)
    }

    pub fn find_movement(&self, name: &str) -> Result<Option<Movement>> {
        let movement = self
            .conn
            .query_row(
                "SELECT id, name, bodypart FROM movements WHERE name = ?1",
                params![name.trim()],
                |row| {
                    Ok(Movement {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        bodypart: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(movement)
    }

    /// Look up a movement, creating it when a body part is given.
    pub fn get_or_create_movement(&self, name: &str, bodypart: Option<&str>) -> Result<Movement> {
        if let Some(movement) = self.find_movement(name)? {
            return Ok(movement);
        }
        let Some(bodypart) = bodypart.map(str::trim).filter(|b| !b.is_empty()) else {
            bail!("Unknown movement '{name}'. Pass a body part to create it");
        };
        if name.trim().is_empty() {
            bail!("Movement name must not be empty");
        }
        self.conn.execute(
            "INSERT INTO movements (name, bodypart) VALUES (?1, ?2)",
            params![name.trim(), bodypart.to_lowercase()],
        )?;
        self.find_movement(name)?
            .context("Movement not found after insert")
    }

    pub fn list_movements(&self) -> Result<Vec<Movement>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, bodypart FROM movements ORDER BY bodypart, name")?;
        let movements = stmt
            .query_map([], |row| {
                Ok(Movement {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    bodypart: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(movements)
    }

    // --- Workouts ---

    pub fn start_workout(
        &self,
        user_id: i64,
        date: NaiveDate,
        workout_type_id: Option<i64>,
        notes: Option<&str>,
    ) -> Result<Workout> {
        let tx = self.conn.unchecked_transaction()?;
        if let Some(active) = self.get_active_workout(user_id)? {
            bail!(
                "Workout {} is still active. End it before starting another",
                active.id
            );
        }
        if let Some(type_id) = workout_type_id {
            if !self.get_workout_types(user_id)?.iter().any(|t| t.id == type_id) {
                bail!("Workout type not found");
            }
        }
        let now = now();
        self.conn.execute(
            "INSERT INTO workouts (uuid, user_id, date, workout_type_id, started_at, notes,
                                   is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
            params![
                Uuid::new_v4().to_string(),
                user_id,
                date_str(date),
                workout_type_id,
                now,
                notes.unwrap_or(""),
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_or_create_day_inner(user_id, date)?;
        self.refresh_did_workout(user_id, date)?;
        tx.commit()?;
        self.get_workout(id)
    }

    pub fn end_workout(&self, user_id: i64) -> Result<Workout> {
        let active = self
            .get_active_workout(user_id)?
            .context("No active workout")?;
        self.conn.execute(
            "UPDATE workouts SET ended_at = ?1, is_active = 0 WHERE id = ?2",
            params![now(), active.id],
        )?;
        self.get_workout(active.id)
    }

    pub fn get_active_workout(&self, user_id: i64) -> Result<Option<Workout>> {
        let workout = self
            .conn
            .query_row(
                &format!("{WORKOUT_SELECT} WHERE w.user_id = ?1 AND w.is_active = 1"),
                params![user_id],
                Self::workout_from_row,
            )
            .optional()?;
        Ok(workout)
    }

    pub fn get_workout(&self, id: i64) -> Result<Workout> {
        self.conn
            .query_row(
                &format!("{WORKOUT_SELECT} WHERE w.id = ?1"),
                params![id],
                Self::workout_from_row,
            )
            .context("Workout not found")
    }

    pub fn list_workouts(&self, user_id: i64, limit: i64) -> Result<Vec<Workout>> {
        let mut stmt = self.conn.prepare(&format!(
            "{WORKOUT_SELECT} WHERE w.user_id = ?1 ORDER BY w.date DESC, w.id DESC LIMIT ?2"
        ))?;
        let workouts = stmt
            .query_map(params![user_id, limit], Self::workout_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(workouts)
    }

    pub fn add_lift(&self, workout_id: i64, movement_id: i64) -> Result<Lift> {
        self.get_workout(workout_id)?;
        let position: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM lifts WHERE workout_id = ?1",
            params![workout_id],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO lifts (workout_id, movement_id, position) VALUES (?1, ?2, ?3)",
            params![workout_id, movement_id, position],
        )?;
        self.get_lift(self.conn.last_insert_rowid())
    }

    pub fn get_lift(&self, id: i64) -> Result<Lift> {
        self.conn
            .query_row(
                &format!("{LIFT_SELECT} WHERE l.id = ?1"),
                params![id],
                Self::lift_from_row,
            )
            .context("Lift not found")
    }

    fn lifts_for_workout(&self, workout_id: i64) -> Result<Vec<Lift>> {
        let mut stmt = self.conn.prepare(&format!(
            "{LIFT_SELECT} WHERE l.workout_id = ?1 ORDER BY l.position, l.id"
        ))?;
        let lifts = stmt
            .query_map(params![workout_id], Self::lift_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lifts)
    }

    pub fn get_sets(&self, lift_id: i64) -> Result<Vec<WorkoutSet>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SET_COLUMNS} FROM sets WHERE lift_id = ?1 ORDER BY id"
        ))?;
        let sets = stmt
            .query_map(params![lift_id], Self::set_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sets)
    }

    pub fn add_set(&self, lift_id: i64, set: &NewSet) -> Result<WorkoutSet> {
        validate_set(set)?;
        let tx = self.conn.unchecked_transaction()?;
        let lift = self.get_lift(lift_id)?;
        let workout = self.get_workout(lift.workout_id)?;
        self.conn.execute(
            "INSERT INTO sets (lift_id, reps, weight, rir, rest_seconds, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![lift_id, set.reps, set.weight, set.rir, set.rest_seconds, now()],
        )?;
        let id = self.conn.last_insert_rowid();
        self.recompute_weekly_volume(
            workout.user_id,
            training::week_start(workout.date),
            &lift.bodypart,
        )?;
        tx.commit()?;
        self.conn
            .query_row(
                &format!("SELECT {SET_COLUMNS} FROM sets WHERE id = ?1"),
                params![id],
                Self::set_from_row,
            )
            .context("Set not found")
    }

    pub fn delete_set(&self, set_id: i64) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let bucket = self
            .conn
            .query_row(
                "SELECT w.user_id, w.date, m.bodypart
                 FROM sets s
                 JOIN lifts l ON s.lift_id = l.id
                 JOIN workouts w ON l.workout_id = w.id
                 JOIN movements m ON l.movement_id = m.id
                 WHERE s.id = ?1",
                params![set_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        date_at(row, 1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((user_id, date, bodypart)) = bucket else {
            return Ok(false);
        };
        self.conn
            .execute("DELETE FROM sets WHERE id = ?1", params![set_id])?;
        self.recompute_weekly_volume(user_id, training::week_start(date), &bodypart)?;
        tx.commit()?;
        Ok(true)
    }

    pub fn delete_workout(&self, workout_id: i64) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let workout = self
            .conn
            .query_row(
                &format!("{WORKOUT_SELECT} WHERE w.id = ?1"),
                params![workout_id],
                Self::workout_from_row,
            )
            .optional()?;
        let Some(workout) = workout else {
            return Ok(false);
        };
        let bodyparts: Vec<String> = {
            let mut stmt = self.conn.prepare(
                "SELECT DISTINCT m.bodypart FROM lifts l
                 JOIN movements m ON l.movement_id = m.id
                 WHERE l.workout_id = ?1",
            )?;
            stmt.query_map(params![workout_id], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?
        };

        self.conn.execute(
            "DELETE FROM sets WHERE lift_id IN (SELECT id FROM lifts WHERE workout_id = ?1)",
            params![workout_id],
        )?;
        self.conn
            .execute("DELETE FROM lifts WHERE workout_id = ?1", params![workout_id])?;
        self.conn
            .execute("DELETE FROM workouts WHERE id = ?1", params![workout_id])?;

        let week = training::week_start(workout.date);
        for bodypart in &bodyparts {
            self.recompute_weekly_volume(workout.user_id, week, bodypart)?;
        }
        self.refresh_did_workout(workout.user_id, workout.date)?;
        tx.commit()?;
        Ok(true)
    }

    pub fn get_workout_detail(&self, workout_id: i64) -> Result<WorkoutDetail> {
        let workout = self.get_workout(workout_id)?;
        let mut lifts = Vec::new();
        for lift in self.lifts_for_workout(workout_id)? {
            let sets = self.get_sets(lift.id)?;
            let loads: Vec<SetLoad> = sets
                .iter()
                .map(|s| SetLoad {
                    reps: s.reps,
                    weight: s.weight,
                })
                .collect();
            lifts.push((lift, sets, loads));
        }
        let total_volume = training::workout_volume(lifts.iter().map(|(_, _, l)| l.as_slice()));
        let lifts = lifts
            .into_iter()
            .map(|(lift, sets, loads)| LiftDetail {
                lift,
                sets,
                total_volume: training::lift_volume(&loads),
                estimated_1rm: training::estimated_one_rep_max(&loads),
            })
            .collect();
        Ok(WorkoutDetail {
            workout,
            lifts,
            total_volume,
        })
    }

    /// Total volume of every workout, oldest first.
    pub fn workout_volumes(
        &self,
        user_id: i64,
        workout_type_id: Option<i64>,
    ) -> Result<Vec<WorkoutVolume>> {
        let mut stmt = self.conn.prepare(
            "SELECT w.id, w.date, COALESCE(SUM(s.reps * s.weight), 0)
             FROM workouts w
             LEFT JOIN lifts l ON l.workout_id = w.id
             LEFT JOIN sets s ON s.lift_id = l.id
             WHERE w.user_id = ?1 AND (?2 IS NULL OR w.workout_type_id = ?2)
             GROUP BY w.id
             ORDER BY w.date, w.id",
        )?;
        let volumes = stmt
            .query_map(params![user_id, workout_type_id], |row| {
                Ok(WorkoutVolume {
                    workout_id: row.get(0)?,
                    date: date_at(row, 1)?,
                    volume: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(volumes)
    }

    /// Estimated 1RM per lift of one movement, oldest first.
    pub fn lift_history(&self, user_id: i64, movement_id: i64) -> Result<Vec<LiftHistoryPoint>> {
        let lifts: Vec<(i64, i64, NaiveDate)> = {
            let mut stmt = self.conn.prepare(
                "SELECT l.id, w.id, w.date FROM lifts l
                 JOIN workouts w ON l.workout_id = w.id
                 WHERE w.user_id = ?1 AND l.movement_id = ?2
                 ORDER BY w.date, l.id",
            )?;
            stmt.query_map(params![user_id, movement_id], |row| {
                Ok((row.get(0)?, row.get(1)?, date_at(row, 2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?
        };

        let mut history = Vec::new();
        for (lift_id, workout_id, date) in lifts {
            let loads: Vec<SetLoad> = self
                .get_sets(lift_id)?
                .iter()
                .map(|s| SetLoad {
                    reps: s.reps,
                    weight: s.weight,
                })
                .collect();
            let Some(top) = loads
                .iter()
                .max_by(|a, b| a.weight.total_cmp(&b.weight).then(a.reps.cmp(&b.reps)))
            else {
                continue;
            };
            history.push(LiftHistoryPoint {
                date,
                workout_id,
                top_weight: top.weight,
                top_reps: top.reps,
                volume: training::lift_volume(&loads),
                estimated_1rm: training::estimated_one_rep_max(&loads),
            });
        }
        Ok(history)
    }

    // --- Weekly volume ---

    /// Full recount of sets for one (user, week, body part) bucket.
    fn recompute_weekly_volume(
        &self,
        user_id: i64,
        week_start: NaiveDate,
        bodypart: &str,
    ) -> Result<i64> {
        let (start, end) = training::week_range(week_start);
        let set_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sets s
             JOIN lifts l ON s.lift_id = l.id
             JOIN workouts w ON l.workout_id = w.id
             JOIN movements m ON l.movement_id = m.id
             WHERE w.user_id = ?1 AND w.date >= ?2 AND w.date <= ?3 AND m.bodypart = ?4",
            params![user_id, date_str(start), date_str(end), bodypart],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO weekly_volume (user_id, week_start, bodypart, set_count)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, week_start, bodypart) DO UPDATE SET
                set_count = excluded.set_count",
            params![user_id, date_str(start), bodypart, set_count],
        )?;
        debug!(user_id, week_start = %start, bodypart, set_count, "recounted weekly volume");
        Ok(set_count)
    }

    pub fn get_weekly_volume(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<WeeklyVolume>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, week_start, bodypart, set_count FROM weekly_volume
             WHERE user_id = ?1 AND week_start >= ?2 AND week_start <= ?3 AND set_count > 0
             ORDER BY week_start, bodypart",
        )?;
        let rows = stmt
            .query_map(
                params![user_id, date_str(start), date_str(end)],
                |row| {
                    Ok(WeeklyVolume {
                        user_id: row.get(0)?,
                        week_start: date_at(row, 1)?,
                        bodypart: row.get(2)?,
                        set_count: row.get(3)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SuggestedUnit;
    use crate::goals::Gender;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn setup() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let user = db.get_or_create_user("me").unwrap();
        (db, user.id)
    }

    fn food(db: &Database, name: &str, calories: f64, protein: f64) -> Food {
        db.insert_food(&NewFood {
            name: name.to_string(),
            nutrients: NutrientVector::default()
                .with(Nutrient::Calories, calories)
                .with(Nutrient::Protein, protein),
            ..Default::default()
        })
        .unwrap()
    }

    fn grams(db: &Database, food_id: i64) -> i64 {
        db.find_unit(food_id, GRAMS_UNIT).unwrap().id
    }

    fn log_food(db: &Database, user_id: i64, date: NaiveDate, food_id: i64, amount: f64) -> i64 {
        db.add_consumption(
            user_id,
            date,
            "Lunch",
            ConsumptionDraft {
                food_id: Some(food_id),
                amount: Some(amount),
                unit_id: Some(grams(db, food_id)),
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap()
        .id
    }

    #[test]
    fn test_new_user_gets_default_workout_types() {
        let (db, user_id) = setup();
        let names: Vec<String> = db
            .get_workout_types(user_id)
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["Push", "Pull", "Legs"]);

        let again = db.get_or_create_user("me").unwrap();
        assert_eq!(again.id, user_id);
        assert_eq!(db.get_workout_types(user_id).unwrap().len(), 3);
    }

    #[test]
    fn test_insert_food_has_grams_unit() {
        let (db, _) = setup();
        let oats = food(&db, "Oats", 389.0, 16.9);
        assert_eq!(oats.nutrients.calories, Some(389.0));
        assert!(oats.nutrients.fat.is_none());
        assert!(!oats.is_composite);
        let units = db.get_food_units(oats.id).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "grams");
        assert!((units[0].gram_weight - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_upsert_catalog_food_dedups_by_fdc_id() {
        let (db, _) = setup();
        let item = CatalogFood {
            food: NewFood {
                name: "Apples, raw".to_string(),
                fdc_id: Some(171_688),
                nutrients: NutrientVector::default().with(Nutrient::Calories, 52.0),
                ..Default::default()
            },
            default_unit: Some(SuggestedUnit {
                name: "1 medium".to_string(),
                gram_weight: 182.0,
            }),
        };
        let a = db.upsert_catalog_food(&item).unwrap();
        let b = db.upsert_catalog_food(&item).unwrap();
        assert_eq!(a.id, b.id);
        assert!(a.owner_id.is_none());
        let unit = db.find_unit(a.id, "1 medium").unwrap();
        assert!((unit.gram_weight - 182.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_search_hides_other_users_foods() {
        let (db, me) = setup();
        let other = db.get_or_create_user("other").unwrap().id;
        db.insert_food(&NewFood {
            name: "Secret Chili".to_string(),
            owner_id: Some(other),
            ..Default::default()
        })
        .unwrap();
        food(&db, "Chili Powder", 282.0, 13.5);

        let mine = db.search_foods_local(me, "chili").unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].name, "Chili Powder");
        assert_eq!(db.search_foods_local(other, "chili").unwrap().len(), 2);
    }

    #[test]
    fn test_resolve_food_by_name_or_id() {
        let (db, me) = setup();
        let oats = food(&db, "Oats", 389.0, 16.9);
        assert_eq!(db.resolve_food(me, "oats").unwrap().id, oats.id);
        assert_eq!(db.resolve_food(me, &oats.id.to_string()).unwrap().id, oats.id);
        assert!(db.resolve_food(me, "pizza").is_err());
    }

    #[test]
    fn test_add_unit_rejects_reserved_and_duplicates() {
        let (db, _) = setup();
        let bread = food(&db, "Bread", 265.0, 9.0);
        let slice = db.add_food_unit(bread.id, "slice", 28.0).unwrap();
        assert_eq!(slice.name, "slice");
        assert!(db.add_food_unit(bread.id, "Slice", 30.0).is_err());
        assert!(db.add_food_unit(bread.id, "grams", 2.0).is_err());
        assert!(db.add_food_unit(bread.id, "as prepared", 2.0).is_err());
        assert!(db.add_food_unit(bread.id, "loaf", 0.0).is_err());
    }

    #[test]
    fn test_composite_resolves_per_100g() {
        let (db, me) = setup();
        let a = food(&db, "A", 200.0, 10.0);
        let b = food(&db, "B", 100.0, 0.0);
        let mix = db.create_composite(me, "Mix").unwrap();
        assert_eq!(mix.nutrients.calories, Some(0.0));

        db.add_ingredient(me, mix.id, a.id, 50.0, grams(&db, a.id))
            .unwrap();
        db.add_ingredient(me, mix.id, b.id, 50.0, grams(&db, b.id))
            .unwrap();

        let mix = db.get_food_by_id(mix.id).unwrap();
        assert!(mix.is_composite);
        assert!((mix.nutrients.amount(Nutrient::Calories) - 150.0).abs() < 1e-9);
        assert!((mix.nutrients.amount(Nutrient::Protein) - 5.0).abs() < 1e-9);
        let batch = db.find_unit(mix.id, "as prepared").unwrap();
        assert!((batch.gram_weight - 100.0).abs() < 1e-9);

        let lines = db.get_ingredient_lines(mix.id).unwrap();
        assert_eq!(lines.len(), 2);
        assert!((lines[0].contribution.amount(Nutrient::Calories) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_composite_uses_unit_weight() {
        let (db, me) = setup();
        let bread = food(&db, "Bread", 250.0, 8.0);
        let slice = db.add_food_unit(bread.id, "slice", 40.0).unwrap();
        let toast = db.create_composite(me, "Toast").unwrap();
        db.add_ingredient(me, toast.id, bread.id, 2.0, slice.id).unwrap();
        let batch = db.find_unit(toast.id, "as prepared").unwrap();
        assert!((batch.gram_weight - 80.0).abs() < 1e-9);
        let toast = db.get_food_by_id(toast.id).unwrap();
        assert!((toast.nutrients.amount(Nutrient::Calories) - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_removing_last_ingredient_zeroes_composite() {
        let (db, me) = setup();
        let a = food(&db, "A", 200.0, 10.0);
        let mix = db.create_composite(me, "Mix").unwrap();
        db.add_ingredient(me, mix.id, a.id, 50.0, grams(&db, a.id))
            .unwrap();
        assert!(db.remove_ingredient(me, mix.id, a.id).unwrap());
        assert!(!db.remove_ingredient(me, mix.id, a.id).unwrap());

        let mix = db.get_food_by_id(mix.id).unwrap();
        assert_eq!(mix.nutrients, NutrientVector::zero());
        let batch = db.find_unit(mix.id, "as prepared").unwrap();
        assert!(batch.gram_weight.abs() < f64::EPSILON);
    }

    #[test]
    fn test_cycle_is_rejected_without_persisting() {
        let (db, me) = setup();
        let a = db.create_composite(me, "A").unwrap();
        let b = db.create_composite(me, "B").unwrap();
        let c = db.create_composite(me, "C").unwrap();
        let salt = food(&db, "Salt", 0.0, 0.0);
        db.add_ingredient(me, c.id, salt.id, 1.0, grams(&db, salt.id))
            .unwrap();
        // A contains B, B contains C
        db.add_ingredient(me, a.id, b.id, 10.0, grams(&db, b.id))
            .unwrap();
        db.add_ingredient(me, b.id, c.id, 10.0, grams(&db, c.id))
            .unwrap();

        let err = db
            .add_ingredient(me, c.id, a.id, 10.0, grams(&db, a.id))
            .unwrap_err();
        let core = err.downcast_ref::<CoreError>().unwrap();
        assert!(core.is_cycle());
        assert!(
            !db.get_ingredient_lines(c.id)
                .unwrap()
                .iter()
                .any(|l| l.food_id == a.id)
        );

        let self_edge = db.add_ingredient(me, a.id, a.id, 10.0, grams(&db, a.id));
        assert!(self_edge.is_err());
    }

    #[test]
    fn test_ingredient_unit_must_belong_to_ingredient() {
        let (db, me) = setup();
        let a = food(&db, "A", 200.0, 10.0);
        let b = food(&db, "B", 100.0, 0.0);
        let mix = db.create_composite(me, "Mix").unwrap();
        let err = db
            .add_ingredient(me, mix.id, a.id, 50.0, grams(&db, b.id))
            .unwrap_err();
        assert!(err.to_string().contains("does not belong"));
        let err = db
            .add_ingredient(me, mix.id, a.id, 0.0, grams(&db, a.id))
            .unwrap_err();
        assert!(err.downcast_ref::<CoreError>().is_some());
    }

    #[test]
    fn test_nested_composite_cascades() {
        let (db, me) = setup();
        let rice = food(&db, "Rice", 130.0, 2.7);
        let beans = food(&db, "Beans", 120.0, 8.0);
        let base = db.create_composite(me, "Base").unwrap();
        db.add_ingredient(me, base.id, rice.id, 100.0, grams(&db, rice.id))
            .unwrap();
        let bowl = db.create_composite(me, "Bowl").unwrap();
        db.add_ingredient(me, bowl.id, base.id, 100.0, grams(&db, base.id))
            .unwrap();
        let bowl_before = db.get_food_by_id(bowl.id).unwrap();
        assert!((bowl_before.nutrients.amount(Nutrient::Calories) - 130.0).abs() < 1e-9);

        // Changing the inner composite re-derives the outer one
        db.add_ingredient(me, base.id, beans.id, 100.0, grams(&db, beans.id))
            .unwrap();
        let bowl_after = db.get_food_by_id(bowl.id).unwrap();
        assert!((bowl_after.nutrients.amount(Nutrient::Calories) - 125.0).abs() < 1e-9);
    }

    #[test]
    fn test_meal_totals_mix_food_and_manual() {
        let (db, me) = setup();
        let date = d("2024-05-01");
        let f = food(&db, "Pasta", 200.0, 7.0);
        log_food(&db, me, date, f.id, 100.0);
        db.add_consumption(
            me,
            date,
            "Lunch",
            ConsumptionDraft {
                description: Some("Cookie".to_string()),
                nutrients: NutrientVector::default().with(Nutrient::Calories, 150.0),
                ..Default::default()
            },
        )
        .unwrap();

        let meals = db.get_meals_for_date(me, date).unwrap();
        assert_eq!(meals.len(), 1);
        assert_eq!(meals[0].entries.len(), 2);
        assert!((meals[0].totals.amount(Nutrient::Calories) - 350.0).abs() < 1e-9);

        let day = db.get_day(me, date).unwrap().unwrap();
        assert!((day.calories_consumed - 350.0).abs() < 1e-9);
        assert!((day.protein_consumed - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_blank_draft_records_nothing() {
        let (db, me) = setup();
        let date = d("2024-05-01");
        let result = db
            .add_consumption(me, date, "Lunch", ConsumptionDraft::default())
            .unwrap();
        assert!(result.is_none());
        assert!(db.get_day(me, date).unwrap().is_none());
    }

    #[test]
    fn test_invalid_drafts_are_rejected() {
        let (db, me) = setup();
        let date = d("2024-05-01");
        let f = food(&db, "Pasta", 200.0, 7.0);
        let err = db
            .add_consumption(
                me,
                date,
                "Lunch",
                ConsumptionDraft {
                    food_id: Some(f.id),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::MissingVariant { .. })
        ));

        let err = db
            .add_consumption(
                me,
                date,
                "Lunch",
                ConsumptionDraft {
                    food_id: Some(f.id),
                    amount: Some(-1.0),
                    unit_id: Some(grams(&db, f.id)),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::InvalidServing { .. })
        ));
        // the failed write rolled back the day it created
        assert!(db.get_day(me, date).unwrap().is_none());
    }

    #[test]
    fn test_archive_and_restore_update_totals() {
        let (db, me) = setup();
        let date = d("2024-05-01");
        let f = food(&db, "Pasta", 200.0, 7.0);
        let id = log_food(&db, me, date, f.id, 150.0);
        assert!((db.get_day(me, date).unwrap().unwrap().calories_consumed - 300.0).abs() < 1e-9);

        let latest = db.latest_consumption(me, date, false).unwrap().unwrap();
        assert_eq!(latest.id, id);
        let archived = db.archive_consumption(me, id).unwrap();
        assert!(archived.archived_at.is_some());
        assert!(db.get_day(me, date).unwrap().unwrap().calories_consumed.abs() < 1e-9);
        assert!(db.get_meals_for_date(me, date).unwrap()[0].entries.is_empty());
        assert!(db.archive_consumption(me, id).is_err());

        db.restore_consumption(me, id).unwrap();
        assert!((db.get_day(me, date).unwrap().unwrap().calories_consumed - 300.0).abs() < 1e-9);

        assert!(db.delete_consumption(me, id).unwrap());
        assert!(!db.delete_consumption(me, id).unwrap());
        assert!(db.get_day(me, date).unwrap().unwrap().calories_consumed.abs() < 1e-9);
    }

    #[test]
    fn test_composite_change_refreshes_day_totals() {
        let (db, me) = setup();
        let date = d("2024-05-01");
        let a = food(&db, "A", 200.0, 0.0);
        let b = food(&db, "B", 100.0, 0.0);
        let mix = db.create_composite(me, "Mix").unwrap();
        db.add_ingredient(me, mix.id, a.id, 100.0, grams(&db, a.id))
            .unwrap();
        log_food(&db, me, date, mix.id, 100.0);
        assert!((db.get_day(me, date).unwrap().unwrap().calories_consumed - 200.0).abs() < 1e-9);

        db.add_ingredient(me, mix.id, b.id, 100.0, grams(&db, b.id))
            .unwrap();
        assert!((db.get_day(me, date).unwrap().unwrap().calories_consumed - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_emptying_a_logged_composite_is_allowed() {
        let (db, me) = setup();
        let date = d("2024-05-01");
        let a = food(&db, "A", 200.0, 10.0);
        let mix = db.create_composite(me, "Mix").unwrap();
        db.add_ingredient(me, mix.id, a.id, 50.0, grams(&db, a.id))
            .unwrap();
        let batch = db.find_unit(mix.id, "as prepared").unwrap();
        db.add_consumption(
            me,
            date,
            "Dinner",
            ConsumptionDraft {
                food_id: Some(mix.id),
                amount: Some(1.0),
                unit_id: Some(batch.id),
                ..Default::default()
            },
        )
        .unwrap();
        assert!((db.get_day(me, date).unwrap().unwrap().calories_consumed - 100.0).abs() < 1e-9);

        assert!(db.remove_ingredient(me, mix.id, a.id).unwrap());
        assert!(db.get_ingredient_lines(mix.id).unwrap().is_empty());
        assert!(db.get_day(me, date).unwrap().unwrap().calories_consumed.abs() < 1e-9);
        let meals = db.get_meals_for_date(me, date).unwrap();
        assert_eq!(meals[0].entries.len(), 1);
        assert!(meals[0].totals.amount(Nutrient::Calories).abs() < 1e-9);

        // a new serving of the empty composite is still rejected
        let err = db
            .add_consumption(
                me,
                date,
                "Dinner",
                ConsumptionDraft {
                    food_id: Some(mix.id),
                    amount: Some(1.0),
                    unit_id: Some(batch.id),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::InvalidServing { .. })
        ));
    }

    #[test]
    fn test_private_foods_stay_with_their_owner() {
        let (db, alice) = setup();
        let bob = db.get_or_create_user("bob").unwrap().id;
        let salt = db
            .insert_food(&NewFood {
                name: "Salt".to_string(),
                owner_id: Some(bob),
                ..Default::default()
            })
            .unwrap();
        let rice = food(&db, "Rice", 130.0, 2.7);
        let soup = db.create_composite(alice, "Soup").unwrap();

        let err = db
            .add_ingredient(alice, soup.id, salt.id, 5.0, grams(&db, salt.id))
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
        assert!(db.get_ingredient_lines(soup.id).unwrap().is_empty());

        // bob may not edit alice's composite, even with a shared food
        assert!(
            db.add_ingredient(bob, soup.id, rice.id, 100.0, grams(&db, rice.id))
                .is_err()
        );
        db.add_ingredient(alice, soup.id, rice.id, 100.0, grams(&db, rice.id))
            .unwrap();
        assert!(db.remove_ingredient(bob, soup.id, rice.id).is_err());
        assert_eq!(db.get_ingredient_lines(soup.id).unwrap().len(), 1);

        assert!(db.resolve_food(alice, &salt.id.to_string()).is_err());
        assert_eq!(db.resolve_food(bob, &salt.id.to_string()).unwrap().id, salt.id);

        let date = d("2024-05-01");
        let logged = db.add_consumption(
            alice,
            date,
            "Lunch",
            ConsumptionDraft {
                food_id: Some(salt.id),
                amount: Some(5.0),
                unit_id: Some(grams(&db, salt.id)),
                ..Default::default()
            },
        );
        assert!(logged.is_err());
        assert!(db.get_day(alice, date).unwrap().is_none());
    }

    #[test]
    fn test_entries_change_only_for_their_owner() {
        let (db, alice) = setup();
        let bob = db.get_or_create_user("bob").unwrap().id;
        let date = d("2024-05-01");
        let pasta = food(&db, "Pasta", 200.0, 7.0);
        let id = log_food(&db, alice, date, pasta.id, 100.0);

        assert!(db.archive_consumption(bob, id).is_err());
        assert!(!db.delete_consumption(bob, id).unwrap());
        assert!(db.get_consumption(id).unwrap().archived_at.is_none());
        assert!((db.get_day(alice, date).unwrap().unwrap().calories_consumed - 200.0).abs() < 1e-9);

        db.archive_consumption(alice, id).unwrap();
        assert!(db.restore_consumption(bob, id).is_err());
        db.restore_consumption(alice, id).unwrap();
        assert!(db.delete_consumption(alice, id).unwrap());
    }

    #[test]
    fn test_empty_composite_is_listed_and_flagged() {
        let (db, me) = setup();
        let plain = food(&db, "Bread", 265.0, 9.0);
        let stew = db.create_composite(me, "Stew").unwrap();
        assert!(stew.is_composite);
        assert!(!plain.is_composite);

        let listed: Vec<i64> = db
            .list_composites(me)
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(listed, vec![stew.id]);

        // a plain food cannot be given ingredients
        assert!(
            db.add_ingredient(me, plain.id, stew.id, 10.0, grams(&db, stew.id))
                .is_err()
        );
    }

    #[test]
    fn test_new_day_keeps_default_goals_without_prior_bodyweight() {
        let (db, me) = setup();
        db.set_profile(
            me,
            &NewProfile {
                gender: Gender::Male,
                height_cm: 180.0,
                birth_date: d("1994-01-15"),
            },
        )
        .unwrap();
        db.get_or_create_day(me, d("2024-05-31")).unwrap();
        let day = db.get_or_create_day(me, d("2024-06-01")).unwrap();
        assert_eq!(day.calorie_goal, 2000);
        assert_eq!(day.protein_goal, 150);
        assert_eq!(day.water_goal_ml, 2500);
    }

    #[test]
    fn test_new_day_derives_goals_from_prior_bodyweight() {
        let (db, me) = setup();
        db.set_profile(
            me,
            &NewProfile {
                gender: Gender::Male,
                height_cm: 180.0,
                birth_date: d("1994-01-15"),
            },
        )
        .unwrap();
        db.update_day(
            me,
            d("2024-05-31"),
            &UpdateDay {
                bodyweight_lb: Some(Some(200.0)),
                ..Default::default()
            },
        )
        .unwrap();

        let day = db.get_or_create_day(me, d("2024-06-01")).unwrap();
        assert_eq!(day.calorie_goal, 3445);
        assert_eq!(day.protein_goal, 160);

        // goals are never recomputed for an existing day
        db.update_day(
            me,
            d("2024-05-31"),
            &UpdateDay {
                bodyweight_lb: Some(Some(150.0)),
                ..Default::default()
            },
        )
        .unwrap();
        let day = db.get_day(me, d("2024-06-01")).unwrap().unwrap();
        assert_eq!(day.calorie_goal, 3445);
        let prior = db.get_day(me, d("2024-05-31")).unwrap().unwrap();
        assert_eq!(prior.calorie_goal, 2000);
    }

    #[test]
    fn test_update_day_clears_values() {
        let (db, me) = setup();
        let date = d("2024-05-01");
        db.update_day(
            me,
            date,
            &UpdateDay {
                bodyweight_lb: Some(Some(181.2)),
                note: Some(Some("tired".to_string())),
                water_ml: Some(Some(1800)),
                ..Default::default()
            },
        )
        .unwrap();
        let day = db
            .update_day(
                me,
                date,
                &UpdateDay {
                    bodyweight_lb: Some(None),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(day.bodyweight_lb.is_none());
        assert_eq!(day.note.as_deref(), Some("tired"));
        assert_eq!(day.water_ml, Some(1800));
    }

    fn workout_with_bench(db: &Database, me: i64, date: NaiveDate) -> (Workout, Lift) {
        let w = db.start_workout(me, date, None, None).unwrap();
        let bench = db
            .get_or_create_movement("Bench Press", Some("Chest"))
            .unwrap();
        let lift = db.add_lift(w.id, bench.id).unwrap();
        (w, lift)
    }

    #[test]
    fn test_only_one_active_workout() {
        let (db, me) = setup();
        let date = d("2024-05-01");
        db.start_workout(me, date, None, None).unwrap();
        assert!(db.start_workout(me, date, None, None).is_err());
        let ended = db.end_workout(me).unwrap();
        assert!(!ended.is_active);
        assert!(ended.ended_at.is_some());
        assert!(db.end_workout(me).is_err());
        assert!(db.start_workout(me, date, None, None).is_ok());
        assert!(db.get_day(me, date).unwrap().unwrap().did_workout);
    }

    #[test]
    fn test_weekly_volume_full_recount() {
        let (db, me) = setup();
        // Wednesday; its week starts Sunday 2024-05-05
        let date = d("2024-05-08");
        let (w, lift) = workout_with_bench(&db, me, date);
        let set = NewSet {
            reps: 5,
            weight: 185.0,
            rir: None,
            rest_seconds: None,
        };
        let s1 = db.add_set(lift.id, &set).unwrap();
        db.add_set(lift.id, &set).unwrap();
        db.add_set(lift.id, &set).unwrap();

        let week = db.get_weekly_volume(me, d("2024-05-05"), d("2024-05-05")).unwrap();
        assert_eq!(week.len(), 1);
        assert_eq!(week[0].bodypart, "chest");
        assert_eq!(week[0].set_count, 3);

        assert!(db.delete_set(s1.id).unwrap());
        assert!(!db.delete_set(s1.id).unwrap());
        let week = db.get_weekly_volume(me, d("2024-05-05"), d("2024-05-05")).unwrap();
        assert_eq!(week[0].set_count, 2);

        assert!(db.delete_workout(w.id).unwrap());
        assert!(!db.delete_workout(w.id).unwrap());
        assert!(db.get_weekly_volume(me, d("2024-05-05"), d("2024-05-05")).unwrap().is_empty());
        assert!(!db.get_day(me, date).unwrap().unwrap().did_workout);
    }

    #[test]
    fn test_workout_detail_volume_and_max() {
        let (db, me) = setup();
        let (w, lift) = workout_with_bench(&db, me, d("2024-05-08"));
        for (reps, weight) in [(5, 185.0), (3, 205.0), (8, 135.0)] {
            db.add_set(
                lift.id,
                &NewSet {
                    reps,
                    weight,
                    rir: Some(1),
                    rest_seconds: Some(120),
                },
            )
            .unwrap();
        }
        let detail = db.get_workout_detail(w.id).unwrap();
        assert_eq!(detail.lifts.len(), 1);
        assert!((detail.total_volume - 2620.0).abs() < 1e-9);
        let expected = 205.0 / (1.0278 - 0.0278 * 3.0);
        assert!((detail.lifts[0].estimated_1rm - expected).abs() < 1e-9);

        let volumes = db.workout_volumes(me, None).unwrap();
        assert_eq!(volumes.len(), 1);
        assert!((volumes[0].volume - 2620.0).abs() < 1e-9);

        let history = db.lift_history(me, lift.movement_id).unwrap();
        assert_eq!(history.len(), 1);
        assert!((history[0].top_weight - 205.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_movement_needs_bodypart() {
        let (db, _) = setup();
        assert!(db.get_or_create_movement("Zercher Squat", None).is_err());
        let m = db
            .get_or_create_movement("Zercher Squat", Some("Legs"))
            .unwrap();
        assert_eq!(m.bodypart, "legs");
        let again = db.get_or_create_movement("zercher squat", None).unwrap();
        assert_eq!(again.id, m.id);
    }
}
