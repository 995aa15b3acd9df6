//! Race simulation.
//!
//! Computes finish times for a field of entrant cars, ranks them, and hands
//! the ranked field to settlement. Pure and synchronous: nothing here
//! touches storage.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::noise::NoiseSource;
use super::settlement::{self, PrizePool, Settlement};
use crate::types::{Car, Placement, RallyError, Team, TeamId};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Parameters of a single race run.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceSettings {
    pub distance_km: f64,
    pub entry_fee: Decimal,
    pub prize_pool: PrizePool,
    /// How many top finishers are paid (top-N).
    pub prize_positions: usize,
    /// Bound of the uniform finish-time noise, in seconds.
    pub noise_secs: f64,
    /// Leave out cars whose team cannot pay the entry fee.
    pub require_entry_fee: bool,
}

impl Default for RaceSettings {
    fn default() -> Self {
        Self {
            distance_km: 100.0,
            entry_fee: dec!(1000),
            prize_pool: PrizePool::default(),
            prize_positions: 3,
            noise_secs: 30.0,
            require_entry_fee: false,
        }
    }
}

impl RaceSettings {
    /// Every failure is a `Validation` error; configuration loading
    /// re-labels them as `Config`.
    pub fn validate(&self) -> Result<(), RallyError> {
        if !(self.distance_km.is_finite() && self.distance_km > 0.0) {
            return Err(RallyError::validation(format!(
                "race distance must be positive, got {}",
                self.distance_km
            )));
        }
        if self.entry_fee < Decimal::ZERO {
            return Err(RallyError::validation(format!(
                "entry fee must not be negative, got {}",
                self.entry_fee
            )));
        }
        if self.prize_positions == 0 {
            return Err(RallyError::validation("prize_positions must be at least 1"));
        }
        self.prize_pool.validate().map_err(|e| match e {
            RallyError::Config(msg) => RallyError::Validation(msg),
            other => other,
        })
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Ranked placements plus the money they move.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceOutcome {
    pub placements: Vec<Placement>,
    pub settlement: Settlement,
}

/// Elapsed seconds for `car` over `distance_km`.
///
/// Driving time at base speed, plus `noise`, plus one pit stop per
/// completed pit interval. Never negative.
pub fn finish_time(car: &Car, distance_km: f64, noise: f64) -> f64 {
    let driving = distance_km / car.speed * 3600.0;
    let stops = (distance_km / car.pit_stop_interval).floor();
    (driving + noise + stops * car.pit_stop_duration).max(0.0)
}

fn validate_entrants(entrants: &[Car], teams: &HashMap<TeamId, &Team>) -> Result<(), RallyError> {
    if entrants.is_empty() {
        return Err(RallyError::validation("race needs at least one entrant"));
    }

    let mut seen = HashSet::with_capacity(entrants.len());
    for car in entrants {
        if !seen.insert(car.id) {
            return Err(RallyError::validation(format!(
                "car #{} is entered more than once",
                car.id
            )));
        }
        if !teams.contains_key(&car.team_id) {
            return Err(RallyError::validation(format!(
                "car #{} ({}) references unknown team #{}",
                car.id, car.name, car.team_id
            )));
        }
        if !(car.speed.is_finite() && car.speed > 0.0) {
            return Err(RallyError::validation(format!(
                "car #{} has invalid speed {}",
                car.id, car.speed
            )));
        }
        if !(car.pit_stop_interval.is_finite() && car.pit_stop_interval > 0.0) {
            return Err(RallyError::validation(format!(
                "car #{} has invalid pit stop interval {}",
                car.id, car.pit_stop_interval
            )));
        }
        if !(car.pit_stop_duration.is_finite() && car.pit_stop_duration >= 0.0) {
            return Err(RallyError::validation(format!(
                "car #{} has invalid pit stop duration {}",
                car.id, car.pit_stop_duration
            )));
        }
    }
    Ok(())
}

/// Run one race over `entrants` and settle it.
///
/// Every entrant is validated before any time is computed, so a failure
/// produces no output at all. Equal finish times keep entrant order.
pub fn simulate<N>(
    entrants: &[Car],
    teams: &[Team],
    settings: &RaceSettings,
    noise: &mut N,
) -> Result<RaceOutcome, RallyError>
where
    N: NoiseSource + ?Sized,
{
    settings.validate()?;

    let team_index: HashMap<TeamId, &Team> = teams.iter().map(|t| (t.id, t)).collect();
    validate_entrants(entrants, &team_index)?;

    let mut timed: Vec<(&Car, f64)> = entrants
        .iter()
        .map(|car| (car, finish_time(car, settings.distance_km, noise.perturbation())))
        .collect();

    // Vec::sort_by is stable.
    timed.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut placements: Vec<Placement> = timed
        .iter()
        .enumerate()
        .map(|(idx, (car, time))| Placement {
            car_id: car.id,
            team_id: car.team_id,
            finish_time_secs: *time,
            position: idx as u32 + 1,
            entry_fee: Decimal::ZERO,
            prize_money: Decimal::ZERO,
        })
        .collect();

    for p in &placements {
        debug!(
            car_id = p.car_id,
            team_id = p.team_id,
            position = p.position,
            finish_secs = format!("{:.2}", p.finish_time_secs),
            "Placement"
        );
    }

    let settlement = settlement::settle(
        &mut placements,
        settings.entry_fee,
        &settings.prize_pool,
        settings.prize_positions,
    )?;

    Ok(RaceOutcome {
        placements,
        settlement,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
