//! In-memory repository for integration testing.
//!
//! Implements `RallyRepository` over plain vectors. Unlike SQLite it does
//! not enforce foreign keys, so tests can register cars for teams that do
//! not exist. A forced error makes every call fail like a dead pool.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use rally::storage::RallyRepository;
use rally::types::*;

#[derive(Default)]
struct Tables {
    teams: Vec<Team>,
    cars: Vec<Car>,
    races: Vec<RaceEvent>,
    results: Vec<RaceResult>,
}

/// A mock repository whose contents are fully controllable from tests.
#[derive(Clone, Default)]
pub struct MockRepository {
    tables: Arc<Mutex<Tables>>,
    /// If set, all operations fail with a storage error.
    force_error: Arc<Mutex<bool>>,
    commits: Arc<Mutex<usize>>,
}

impl MockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force all subsequent operations to return a storage error.
    pub fn set_error(&self) {
        *self.force_error.lock().unwrap() = true;
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = false;
    }

    /// Number of successful `commit_race` calls.
    pub fn commit_count(&self) -> usize {
        *self.commits.lock().unwrap()
    }

    pub fn result_count(&self) -> usize {
        self.tables.lock().unwrap().results.len()
    }

    fn check(&self) -> Result<(), RallyError> {
        if *self.force_error.lock().unwrap() {
            return Err(RallyError::Storage(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

fn insert_results(tables: &mut Tables, race_id: RaceId, placements: &[Placement]) -> Vec<RaceResult> {
    placements
        .iter()
        .map(|p| {
            let result = RaceResult {
                id: tables.results.len() as ResultId + 1,
                race_id,
                car_id: p.car_id,
                team_id: p.team_id,
                finish_time_secs: p.finish_time_secs,
                position: p.position,
                entry_fee: p.entry_fee,
                prize_money: p.prize_money,
            };
            tables.results.push(result.clone());
            result
        })
        .collect()
}

fn insert_race(tables: &mut Tables, distance_km: f64, entry_fee: Decimal) -> RaceEvent {
    let race = RaceEvent {
        id: tables.races.len() as RaceId + 1,
        distance_km,
        entry_fee,
        started_at: Utc::now(),
    };
    tables.races.push(race.clone());
    race
}

#[async_trait]
impl RallyRepository for MockRepository {
    async fn list_teams(&self) -> Result<Vec<Team>, RallyError> {
        self.check()?;
        Ok(self.tables.lock().unwrap().teams.clone())
    }

    async fn get_team(&self, team_id: TeamId) -> Result<Option<Team>, RallyError> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables.teams.iter().find(|t| t.id == team_id).cloned())
    }

    async fn create_team(&self, name: &str, budget: Decimal) -> Result<Team, RallyError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let team = Team {
            id: tables.teams.len() as TeamId + 1,
            name: name.to_string(),
            budget,
        };
        tables.teams.push(team.clone());
        Ok(team)
    }

    async fn list_cars(&self, team_id: Option<TeamId>) -> Result<Vec<Car>, RallyError> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .cars
            .iter()
            .filter(|c| team_id.map_or(true, |id| c.team_id == id))
            .cloned()
            .collect())
    }

    async fn create_car(&self, car: &NewCar) -> Result<Car, RallyError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let car = Car {
            id: tables.cars.len() as CarId + 1,
            name: car.name.clone(),
            team_id: car.team_id,
            speed: car.speed,
            pit_stop_interval: car.pit_stop_interval,
            pit_stop_duration: car.pit_stop_duration,
        };
        tables.cars.push(car.clone());
        Ok(car)
    }

    async fn update_team_budget(&self, team_id: TeamId, budget: Decimal) -> Result<(), RallyError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        match tables.teams.iter_mut().find(|t| t.id == team_id) {
            Some(team) => {
                team.budget = budget;
                Ok(())
            }
            None => Err(RallyError::Storage(sqlx::Error::RowNotFound)),
        }
    }

    async fn create_race(&self, distance_km: f64, entry_fee: Decimal) -> Result<RaceEvent, RallyError> {
        self.check()?;
        Ok(insert_race(&mut self.tables.lock().unwrap(), distance_km, entry_fee))
    }

    async fn list_races(&self) -> Result<Vec<RaceEvent>, RallyError> {
        self.check()?;
        let mut races = self.tables.lock().unwrap().races.clone();
        races.reverse();
        Ok(races)
    }

    async fn record_race_results(
        &self,
        race_id: RaceId,
        placements: &[Placement],
    ) -> Result<Vec<RaceResult>, RallyError> {
        self.check()?;
        Ok(insert_results(&mut self.tables.lock().unwrap(), race_id, placements))
    }

    async fn list_race_results(&self, race_id: Option<RaceId>) -> Result<Vec<ResultView>, RallyError> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        let name_of_team = |id: TeamId| tables.teams.iter().find(|t| t.id == id).map(|t| t.name.clone());
        let name_of_car = |id: CarId| tables.cars.iter().find(|c| c.id == id).map(|c| c.name.clone());

        let mut views: Vec<ResultView> = tables
            .results
            .iter()
            .filter(|r| race_id.map_or(true, |id| r.race_id == id))
            .map(|r| ResultView {
                race_id: r.race_id,
                team_name: name_of_team(r.team_id).unwrap_or_default(),
                car_name: name_of_car(r.car_id).unwrap_or_default(),
                position: r.position,
                finish_time_secs: r.finish_time_secs,
                entry_fee: r.entry_fee,
                prize_money: r.prize_money,
            })
            .collect();
        views.sort_by(|a, b| b.race_id.cmp(&a.race_id).then(a.position.cmp(&b.position)));
        Ok(views)
    }

    async fn commit_race(&self, sheet: &RaceSheet) -> Result<CommittedRace, RallyError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();

        let mut budgets = BTreeMap::new();
        for (team_id, delta) in &sheet.budget_deltas {
            let team = tables
                .teams
                .iter()
                .find(|t| t.id == *team_id)
                .ok_or(RallyError::Storage(sqlx::Error::RowNotFound))?;
            let budget = team
                .budget
                .checked_add(*delta)
                .ok_or_else(|| RallyError::validation("budget out of range"))?;
            budgets.insert(*team_id, budget);
        }

        let race = insert_race(&mut tables, sheet.distance_km, sheet.entry_fee);
        let results = insert_results(&mut tables, race.id, &sheet.placements);
        for team in tables.teams.iter_mut() {
            if let Some(budget) = budgets.get(&team.id) {
                team.budget = *budget;
            }
        }
        *self.commits.lock().unwrap() += 1;
        Ok(CommittedRace {
            race,
            results,
            budgets,
        })
    }
}
