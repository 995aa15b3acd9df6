//! Shared types for RALLY.
//!
//! These types form the data model used across all modules. Storage maps
//! them to rows, the engine computes over them, and the dashboard
//! serialises them as JSON.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type TeamId = i64;
pub type CarId = i64;
pub type RaceId = i64;
pub type ResultId = i64;

// ---------------------------------------------------------------------------
// Teams & cars
// ---------------------------------------------------------------------------

/// A racing team. The budget is a ledger value and may go negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub budget: Decimal,
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} (budget: ${:.2})", self.id, self.name, self.budget)
    }
}

impl Team {
    /// Whether the team can cover `amount` without going negative.
    pub fn can_afford(&self, amount: Decimal) -> bool {
        self.budget >= amount
    }
}

/// A car owned by exactly one team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Car {
    pub id: CarId,
    pub name: String,
    pub team_id: TeamId,
    /// Base speed in km/h.
    pub speed: f64,
    /// Distance between mandatory pit stops, in km.
    pub pit_stop_interval: f64,
    /// Time lost per pit stop, in seconds.
    pub pit_stop_duration: f64,
}

impl fmt::Display for Car {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} (team #{}) {:.0} km/h, pit every {:.0} km for {:.1}s",
            self.id,
            self.name,
            self.team_id,
            self.speed,
            self.pit_stop_interval,
            self.pit_stop_duration,
        )
    }
}

/// Fields needed to register a car.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCar {
    pub name: String,
    pub team_id: TeamId,
    pub speed: f64,
    pub pit_stop_interval: f64,
    #[serde(default)]
    pub pit_stop_duration: f64,
}

// ---------------------------------------------------------------------------
// Races
// ---------------------------------------------------------------------------

/// A completed race run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceEvent {
    pub id: RaceId,
    pub distance_km: f64,
    pub entry_fee: Decimal,
    pub started_at: DateTime<Utc>,
}

impl fmt::Display for RaceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Race #{} {:.0} km fee=${:.2} @ {}",
            self.id,
            self.distance_km,
            self.entry_fee,
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
        )
    }
}

/// One entrant's simulated outcome, before it is written to storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub car_id: CarId,
    pub team_id: TeamId,
    pub finish_time_secs: f64,
    pub position: u32,
    pub entry_fee: Decimal,
    pub prize_money: Decimal,
}

impl Placement {
    /// Prize minus fee: what this entry did to its team's budget.
    pub fn net_amount(&self) -> Decimal {
        self.prize_money - self.entry_fee
    }
}

/// A persisted race result row. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceResult {
    pub id: ResultId,
    pub race_id: RaceId,
    pub car_id: CarId,
    pub team_id: TeamId,
    pub finish_time_secs: f64,
    pub position: u32,
    pub entry_fee: Decimal,
    pub prize_money: Decimal,
}

impl fmt::Display for RaceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "P{} car #{} (team #{}) {:.2} min | fee ${:.2} prize ${:.2}",
            self.position,
            self.car_id,
            self.team_id,
            self.finish_time_mins(),
            self.entry_fee,
            self.prize_money,
        )
    }
}

impl RaceResult {
    pub fn net_amount(&self) -> Decimal {
        self.prize_money - self.entry_fee
    }

    pub fn finish_time_mins(&self) -> f64 {
        self.finish_time_secs / 60.0
    }
}

/// Result row joined with team and car names, for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultView {
    pub race_id: RaceId,
    pub team_name: String,
    pub car_name: String,
    pub position: u32,
    pub finish_time_secs: f64,
    pub entry_fee: Decimal,
    pub prize_money: Decimal,
}

/// Everything a settled race writes, committed as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceSheet {
    pub distance_km: f64,
    pub entry_fee: Decimal,
    pub placements: Vec<Placement>,
    /// Net change per participating team, added to the stored budget.
    pub budget_deltas: BTreeMap<TeamId, Decimal>,
}

/// What a committed race left in storage.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedRace {
    pub race: RaceEvent,
    pub results: Vec<RaceResult>,
    /// Budget of each participating team after the race.
    pub budgets: BTreeMap<TeamId, Decimal>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for RALLY.
#[derive(Debug, thiserror::Error)]
pub enum RallyError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RallyError {
    pub fn validation(msg: impl Into<String>) -> Self {
        RallyError::Validation(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, RallyError::Validation(_))
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, RallyError::Storage(_))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
