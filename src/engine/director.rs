//! Race director — runs a race end to end.
//!
//! Loads the field from storage, simulates and settles it, then commits
//! the event, results and budget changes in one transaction. A race either
//! lands completely or leaves storage untouched. Races run by one director
//! are serialized.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::noise::NoiseSource;
use super::simulation::{self, RaceSettings};
use crate::storage::RallyRepository;
use crate::types::{Car, CarId, RaceEvent, RaceResult, RaceSheet, RallyError, Team, TeamId};

// ---------------------------------------------------------------------------
// Request & report
// ---------------------------------------------------------------------------

/// What the caller asks for. Unset fields fall back to the director's
/// configured settings; no `car_ids` means every registered car.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaceRequest {
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(default)]
    pub entry_fee: Option<Decimal>,
    #[serde(default)]
    pub car_ids: Option<Vec<CarId>>,
}

/// Everything a finished race produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceReport {
    pub race: RaceEvent,
    /// In finishing order.
    pub results: Vec<RaceResult>,
    pub budget_deltas: BTreeMap<TeamId, Decimal>,
    /// Budget of each participating team after the race.
    pub budgets: BTreeMap<TeamId, Decimal>,
    pub fees_collected: Decimal,
    pub prizes_paid: Decimal,
}

impl RaceReport {
    /// Top three finishers (fewer if the field was smaller).
    pub fn podium(&self) -> &[RaceResult] {
        &self.results[..self.results.len().min(3)]
    }

    pub fn winner(&self) -> Option<&RaceResult> {
        self.results.first()
    }
}

// ---------------------------------------------------------------------------
// Director
// ---------------------------------------------------------------------------

pub struct RaceDirector {
    repository: Arc<dyn RallyRepository>,
    settings: RaceSettings,
    /// Held from loading the field until the race is committed.
    race_lock: Mutex<()>,
}

impl RaceDirector {
    pub fn new(repository: Arc<dyn RallyRepository>, settings: RaceSettings) -> Self {
        Self {
            repository,
            settings,
            race_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &RaceSettings {
        &self.settings
    }

    pub fn repository(&self) -> &Arc<dyn RallyRepository> {
        &self.repository
    }

    /// Configured settings with the request's overrides applied.
    pub fn settings_for(&self, request: &RaceRequest) -> RaceSettings {
        let mut settings = self.settings.clone();
        if let Some(distance) = request.distance_km {
            settings.distance_km = distance;
        }
        if let Some(fee) = request.entry_fee {
            settings.entry_fee = fee;
        }
        settings
    }

    /// Run, settle and persist one race.
    ///
    /// Validation failures and storage failures are returned as-is; in
    /// both cases nothing has been written.
    pub async fn run_race(
        &self,
        request: &RaceRequest,
        noise: &mut (dyn NoiseSource + Send),
    ) -> Result<RaceReport, RallyError> {
        let settings = self.settings_for(request);
        settings.validate()?;

        let _race = self.race_lock.lock().await;

        let teams = self.repository.list_teams().await?;
        let cars = self.repository.list_cars(None).await?;
        let entrants = select_entrants(&cars, &teams, request.car_ids.as_deref(), &settings)?;

        info!(
            entrants = entrants.len(),
            distance_km = settings.distance_km,
            entry_fee = %settings.entry_fee,
            "Race starting"
        );

        let outcome = simulation::simulate(&entrants, &teams, &settings, noise)?;

        let sheet = RaceSheet {
            distance_km: settings.distance_km,
            entry_fee: settings.entry_fee,
            placements: outcome.placements,
            budget_deltas: outcome.settlement.budget_deltas,
        };
        let committed = self.repository.commit_race(&sheet).await?;

        for (team_id, budget) in &committed.budgets {
            if *budget < Decimal::ZERO {
                warn!(team_id, budget = %budget, "Team budget is negative after race");
            }
        }

        let report = RaceReport {
            race: committed.race,
            results: committed.results,
            budget_deltas: sheet.budget_deltas,
            budgets: committed.budgets,
            fees_collected: outcome.settlement.fees_collected,
            prizes_paid: outcome.settlement.prizes_paid,
        };

        info!(
            race_id = report.race.id,
            winner_car = ?report.winner().map(|r| r.car_id),
            fees = format!("${:.2}", report.fees_collected),
            prizes = format!("${:.2}", report.prizes_paid),
            "Race completed"
        );

        Ok(report)
    }
}

/// Pick the cars that start the race.
///
/// Requested ids must all exist. With `require_entry_fee`, cars whose team
/// cannot pay the fee stay in the garage.
fn select_entrants(
    cars: &[Car],
    teams: &[Team],
    requested: Option<&[CarId]>,
    settings: &RaceSettings,
) -> Result<Vec<Car>, RallyError> {
    let candidates: Vec<Car> = match requested {
        Some(ids) => {
            let by_id: HashMap<CarId, &Car> = cars.iter().map(|c| (c.id, c)).collect();
            ids.iter()
                .map(|id| {
                    by_id
                        .get(id)
                        .map(|car| (*car).clone())
                        .ok_or_else(|| RallyError::validation(format!("unknown car #{id}")))
                })
                .collect::<Result<_, _>>()?
        }
        None => cars.to_vec(),
    };

    if !settings.require_entry_fee {
        return Ok(candidates);
    }

    let team_index: HashMap<TeamId, &Team> = teams.iter().map(|t| (t.id, t)).collect();
    let eligible: Vec<Car> = candidates
        .into_iter()
        .filter(|car| match team_index.get(&car.team_id) {
            Some(team) => team.can_afford(settings.entry_fee),
            // Unknown teams are kept so the simulation rejects them.
            None => true,
        })
        .collect();

    if eligible.is_empty() {
        return Err(RallyError::validation(
            "no teams with enough budget to join this race",
        ));
    }
    Ok(eligible)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
