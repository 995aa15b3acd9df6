//! Persistence layer.
//!
//! `RallyRepository` is the data-access contract: row-level create/read
//! operations for teams, cars, race events and race results. It carries no
//! business logic. `SqliteRepository` implements it on top of `sqlx`.
//!
//! Every failure of the underlying store surfaces as
//! `RallyError::Storage` with the original `sqlx::Error` inside. Nothing
//! is retried.

pub mod schema;
pub mod seed;
pub mod sqlite;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{
    Car, CommittedRace, NewCar, Placement, RaceEvent, RaceId, RaceResult, RaceSheet, RallyError,
    ResultView, Team, TeamId,
};

pub use sqlite::SqliteRepository;

/// Data-access contract used by the race engine and the dashboard.
///
/// Each call is an independent unit of work, except `commit_race`, which
/// writes a whole settled race in one transaction.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RallyRepository: Send + Sync {
    /// All teams, ordered by id.
    async fn list_teams(&self) -> Result<Vec<Team>, RallyError>;

    async fn get_team(&self, team_id: TeamId) -> Result<Option<Team>, RallyError>;

    async fn create_team(&self, name: &str, budget: Decimal) -> Result<Team, RallyError>;

    /// All cars, or only those owned by `team_id`.
    async fn list_cars(&self, team_id: Option<TeamId>) -> Result<Vec<Car>, RallyError>;

    async fn create_car(&self, car: &NewCar) -> Result<Car, RallyError>;

    async fn update_team_budget(&self, team_id: TeamId, budget: Decimal) -> Result<(), RallyError>;

    async fn create_race(&self, distance_km: f64, entry_fee: Decimal) -> Result<RaceEvent, RallyError>;

    /// Most recent first.
    async fn list_races(&self) -> Result<Vec<RaceEvent>, RallyError>;

    async fn record_race_results(
        &self,
        race_id: RaceId,
        placements: &[Placement],
    ) -> Result<Vec<RaceResult>, RallyError>;

    /// Results joined with team and car names, newest race first, then by
    /// finishing position.
    async fn list_race_results(&self, race_id: Option<RaceId>) -> Result<Vec<ResultView>, RallyError>;

    /// Write the race event and its results, and add each budget delta to
    /// the team's stored budget, atomically. Either all of it lands or none
    /// of it does.
    async fn commit_race(&self, sheet: &RaceSheet) -> Result<CommittedRace, RallyError>;
}
