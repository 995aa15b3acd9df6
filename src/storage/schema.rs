//! SQLite schema definitions.
//!
//! Tables:
//! - teams: racing teams and their budgets
//! - cars: cars, each owned by one team
//! - race_events: one row per completed race
//! - race_results: one row per car per race (audit trail)
//!
//! Money columns are decimal strings so budgets round-trip exactly.

use sqlx::SqlitePool;

/// Every table the application needs.
pub const TABLES: [&str; 4] = ["teams", "cars", "race_events", "race_results"];

const CREATE_STATEMENTS: [&str; 6] = [
    r#"
    CREATE TABLE IF NOT EXISTS teams (
        team_id INTEGER PRIMARY KEY AUTOINCREMENT,
        team_name TEXT NOT NULL UNIQUE,
        budget TEXT NOT NULL,
        created_at TEXT DEFAULT (datetime('now'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cars (
        car_id INTEGER PRIMARY KEY AUTOINCREMENT,
        car_name TEXT NOT NULL UNIQUE,
        team_id INTEGER NOT NULL REFERENCES teams(team_id),
        speed REAL NOT NULL,
        pit_stop_interval REAL NOT NULL,
        pit_stop_duration REAL NOT NULL DEFAULT 0,
        created_at TEXT DEFAULT (datetime('now'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS race_events (
        race_id INTEGER PRIMARY KEY AUTOINCREMENT,
        distance_km REAL NOT NULL,
        entry_fee TEXT NOT NULL,
        started_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS race_results (
        result_id INTEGER PRIMARY KEY AUTOINCREMENT,
        race_id INTEGER NOT NULL REFERENCES race_events(race_id),
        car_id INTEGER NOT NULL REFERENCES cars(car_id),
        team_id INTEGER NOT NULL REFERENCES teams(team_id),
        finish_time_secs REAL NOT NULL,
        position INTEGER NOT NULL,
        entry_fee TEXT NOT NULL,
        prize_money TEXT NOT NULL,
        UNIQUE(race_id, car_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_cars_team ON cars(team_id)",
    "CREATE INDEX IF NOT EXISTS idx_results_race ON race_results(race_id, position)",
];

/// Create all tables and indexes. Safe to run repeatedly.
pub async fn create_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in CREATE_STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

/// Whether any of the application tables is missing.
pub async fn is_setup_needed(pool: &SqlitePool) -> Result<bool, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN (?, ?, ?, ?)",
    )
    .bind(TABLES[0])
    .bind(TABLES[1])
    .bind(TABLES[2])
    .bind(TABLES[3])
    .fetch_one(pool)
    .await?;

    Ok(count < TABLES.len() as i64)
}
