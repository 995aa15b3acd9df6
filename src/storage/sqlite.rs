//! SQLite repository for teams, cars and race results.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, info};

use super::{schema, seed, RallyRepository};
use crate::types::{
    Car, CommittedRace, NewCar, Placement, RaceEvent, RaceId, RaceResult, RaceSheet, RallyError,
    ResultView, Team, TeamId,
};

/// `RallyRepository` backed by a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Open (creating if missing) the database at `url`.
    pub async fn connect(url: &SecretString, max_connections: u32) -> Result<Self, RallyError> {
        let options = SqliteConnectOptions::from_str(url.expose_secret())?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        debug!(max_connections, "SQLite pool opened");
        Ok(Self { pool })
    }

    /// A private in-memory database with the schema already created.
    ///
    /// Limited to one connection that is never recycled: every SQLite
    /// memory connection is its own database.
    pub async fn in_memory() -> Result<Self, RallyError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        schema::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create missing tables and optionally seed sample data.
    pub async fn bootstrap(&self, seed_sample_data: bool) -> Result<(), RallyError> {
        if schema::is_setup_needed(&self.pool).await? {
            schema::create_tables(&self.pool).await?;
            info!("Database schema created");
        }

        if seed_sample_data {
            let inserted = seed::seed_sample_data(self).await?;
            if inserted > 0 {
                info!(teams = inserted, "Sample data seeded");
            }
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

fn position_column(row: &SqliteRow, column: &str) -> Result<u32, sqlx::Error> {
    let raw: i64 = row.try_get(column)?;
    u32::try_from(raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

fn team_from_row(row: &SqliteRow) -> Result<Team, sqlx::Error> {
    Ok(Team {
        id: row.try_get("team_id")?,
        name: row.try_get("team_name")?,
        budget: decimal_column(row, "budget")?,
    })
}

fn car_from_row(row: &SqliteRow) -> Result<Car, sqlx::Error> {
    Ok(Car {
        id: row.try_get("car_id")?,
        name: row.try_get("car_name")?,
        team_id: row.try_get("team_id")?,
        speed: row.try_get("speed")?,
        pit_stop_interval: row.try_get("pit_stop_interval")?,
        pit_stop_duration: row.try_get("pit_stop_duration")?,
    })
}

fn race_from_row(row: &SqliteRow) -> Result<RaceEvent, sqlx::Error> {
    Ok(RaceEvent {
        id: row.try_get("race_id")?,
        distance_km: row.try_get("distance_km")?,
        entry_fee: decimal_column(row, "entry_fee")?,
        started_at: row.try_get("started_at")?,
    })
}

fn result_view_from_row(row: &SqliteRow) -> Result<ResultView, sqlx::Error> {
    Ok(ResultView {
        race_id: row.try_get("race_id")?,
        team_name: row.try_get("team_name")?,
        car_name: row.try_get("car_name")?,
        position: position_column(row, "position")?,
        finish_time_secs: row.try_get("finish_time_secs")?,
        entry_fee: decimal_column(row, "entry_fee")?,
        prize_money: decimal_column(row, "prize_money")?,
    })
}

// ---------------------------------------------------------------------------
// Statements shared by standalone calls and transactions
// ---------------------------------------------------------------------------

async fn insert_race(
    conn: &mut SqliteConnection,
    distance_km: f64,
    entry_fee: Decimal,
) -> Result<RaceEvent, sqlx::Error> {
    let started_at: DateTime<Utc> = Utc::now();
    let id = sqlx::query(
        "INSERT INTO race_events (distance_km, entry_fee, started_at) VALUES (?, ?, ?)",
    )
    .bind(distance_km)
    .bind(entry_fee.to_string())
    .bind(started_at)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(RaceEvent {
        id,
        distance_km,
        entry_fee,
        started_at,
    })
}

async fn insert_result(
    conn: &mut SqliteConnection,
    race_id: RaceId,
    placement: &Placement,
) -> Result<RaceResult, sqlx::Error> {
    let id = sqlx::query(
        r#"
        INSERT INTO race_results
            (race_id, car_id, team_id, finish_time_secs, position, entry_fee, prize_money)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(race_id)
    .bind(placement.car_id)
    .bind(placement.team_id)
    .bind(placement.finish_time_secs)
    .bind(i64::from(placement.position))
    .bind(placement.entry_fee.to_string())
    .bind(placement.prize_money.to_string())
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(RaceResult {
        id,
        race_id,
        car_id: placement.car_id,
        team_id: placement.team_id,
        finish_time_secs: placement.finish_time_secs,
        position: placement.position,
        entry_fee: placement.entry_fee,
        prize_money: placement.prize_money,
    })
}

async fn set_budget(
    conn: &mut SqliteConnection,
    team_id: TeamId,
    budget: Decimal,
) -> Result<(), sqlx::Error> {
    let updated = sqlx::query("UPDATE teams SET budget = ? WHERE team_id = ?")
        .bind(budget.to_string())
        .bind(team_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    if updated == 0 {
        return Err(sqlx::Error::RowNotFound);
    }
    Ok(())
}

/// Add `delta` to the stored budget and return the new value.
async fn adjust_budget(
    conn: &mut SqliteConnection,
    team_id: TeamId,
    delta: Decimal,
) -> Result<Decimal, RallyError> {
    let row = sqlx::query("SELECT budget FROM teams WHERE team_id = ?")
        .bind(team_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;

    let budget = decimal_column(&row, "budget")?
        .checked_add(delta)
        .ok_or_else(|| RallyError::validation(format!("budget of team #{team_id} out of range")))?;

    set_budget(conn, team_id, budget).await?;
    Ok(budget)
}

// ---------------------------------------------------------------------------
// RallyRepository
// ---------------------------------------------------------------------------

#[async_trait]
impl RallyRepository for SqliteRepository {
    async fn list_teams(&self) -> Result<Vec<Team>, RallyError> {
        let rows = sqlx::query("SELECT team_id, team_name, budget FROM teams ORDER BY team_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(team_from_row).collect::<Result<_, _>>()?)
    }

    async fn get_team(&self, team_id: TeamId) -> Result<Option<Team>, RallyError> {
        let row = sqlx::query("SELECT team_id, team_name, budget FROM teams WHERE team_id = ?")
            .bind(team_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(team_from_row).transpose()?)
    }

    async fn create_team(&self, name: &str, budget: Decimal) -> Result<Team, RallyError> {
        let id = sqlx::query("INSERT INTO teams (team_name, budget) VALUES (?, ?)")
            .bind(name)
            .bind(budget.to_string())
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        debug!(team_id = id, name, budget = %budget, "Team created");
        Ok(Team {
            id,
            name: name.to_string(),
            budget,
        })
    }

    async fn list_cars(&self, team_id: Option<TeamId>) -> Result<Vec<Car>, RallyError> {
        const COLUMNS: &str =
            "SELECT car_id, car_name, team_id, speed, pit_stop_interval, pit_stop_duration FROM cars";

        let rows = match team_id {
            Some(team_id) => {
                let sql = format!("{COLUMNS} WHERE team_id = ? ORDER BY car_id");
                sqlx::query(&sql).bind(team_id).fetch_all(&self.pool).await?
            }
            None => {
                let sql = format!("{COLUMNS} ORDER BY car_id");
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };
        Ok(rows.iter().map(car_from_row).collect::<Result<_, _>>()?)
    }

    async fn create_car(&self, car: &NewCar) -> Result<Car, RallyError> {
        let id = sqlx::query(
            r#"
            INSERT INTO cars (car_name, team_id, speed, pit_stop_interval, pit_stop_duration)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&car.name)
        .bind(car.team_id)
        .bind(car.speed)
        .bind(car.pit_stop_interval)
        .bind(car.pit_stop_duration)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        debug!(car_id = id, name = %car.name, team_id = car.team_id, "Car created");
        Ok(Car {
            id,
            name: car.name.clone(),
            team_id: car.team_id,
            speed: car.speed,
            pit_stop_interval: car.pit_stop_interval,
            pit_stop_duration: car.pit_stop_duration,
        })
    }

    async fn update_team_budget(&self, team_id: TeamId, budget: Decimal) -> Result<(), RallyError> {
        let mut conn = self.pool.acquire().await?;
        set_budget(&mut conn, team_id, budget).await?;
        Ok(())
    }

    async fn create_race(&self, distance_km: f64, entry_fee: Decimal) -> Result<RaceEvent, RallyError> {
        let mut conn = self.pool.acquire().await?;
        Ok(insert_race(&mut conn, distance_km, entry_fee).await?)
    }

    async fn list_races(&self) -> Result<Vec<RaceEvent>, RallyError> {
        let rows = sqlx::query(
            "SELECT race_id, distance_km, entry_fee, started_at FROM race_events ORDER BY race_id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(race_from_row).collect::<Result<_, _>>()?)
    }

    async fn record_race_results(
        &self,
        race_id: RaceId,
        placements: &[Placement],
    ) -> Result<Vec<RaceResult>, RallyError> {
        let mut tx = self.pool.begin().await?;
        let mut results = Vec::with_capacity(placements.len());
        for placement in placements {
            results.push(insert_result(&mut tx, race_id, placement).await?);
        }
        tx.commit().await?;
        Ok(results)
    }

    async fn list_race_results(&self, race_id: Option<RaceId>) -> Result<Vec<ResultView>, RallyError> {
        const JOINED: &str = r#"
            SELECT r.race_id, t.team_name, c.car_name, r.position,
                   r.finish_time_secs, r.entry_fee, r.prize_money
            FROM race_results r
            JOIN teams t ON r.team_id = t.team_id
            JOIN cars c ON r.car_id = c.car_id
        "#;
        const ORDER: &str = "ORDER BY r.race_id DESC, r.position ASC";

        let rows = match race_id {
            Some(race_id) => {
                let sql = format!("{JOINED} WHERE r.race_id = ? {ORDER}");
                sqlx::query(&sql).bind(race_id).fetch_all(&self.pool).await?
            }
            None => {
                let sql = format!("{JOINED} {ORDER}");
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };
        Ok(rows.iter().map(result_view_from_row).collect::<Result<_, _>>()?)
    }

    async fn commit_race(&self, sheet: &RaceSheet) -> Result<CommittedRace, RallyError> {
        let mut tx = self.pool.begin().await?;

        // The event insert takes the write lock before any budget is read.
        let race = insert_race(&mut tx, sheet.distance_km, sheet.entry_fee).await?;

        let mut results = Vec::with_capacity(sheet.placements.len());
        for placement in &sheet.placements {
            results.push(insert_result(&mut tx, race.id, placement).await?);
        }

        let mut budgets = BTreeMap::new();
        for (&team_id, &delta) in &sheet.budget_deltas {
            budgets.insert(team_id, adjust_budget(&mut tx, team_id, delta).await?);
        }

        // Dropping `tx` on any early return above rolls everything back.
        tx.commit().await?;

        debug!(race_id = race.id, results = results.len(), "Race committed");
        Ok(CommittedRace {
            race,
            results,
            budgets,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
