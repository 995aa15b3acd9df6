//! Settlement — entry fees, prize money, and budget deltas.
//!
//! Reconciles a ranked race: every entered team pays the entry fee once,
//! the top finishers are credited from the prize pool, and each team ends
//! up with a single net budget delta.

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use crate::types::{Placement, RallyError, TeamId};

// ---------------------------------------------------------------------------
// Prize pool
// ---------------------------------------------------------------------------

/// How prize money is funded and split across finishing positions.
///
/// Both schedules are indexed by position (index 0 = winner) and must be
/// non-increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PrizePool {
    /// Fixed amounts per position, e.g. 300 / 150 / 50.
    Fixed { amounts: Vec<Decimal> },
    /// Fractions of the entry fees collected for this race.
    FeeShare { shares: Vec<Decimal> },
}

impl Default for PrizePool {
    fn default() -> Self {
        PrizePool::FeeShare {
            shares: vec![dec!(0.5), dec!(0.3), dec!(0.2)],
        }
    }
}

impl PrizePool {
    fn schedule(&self) -> &[Decimal] {
        match self {
            PrizePool::Fixed { amounts } => amounts,
            PrizePool::FeeShare { shares } => shares,
        }
    }

    /// Reject schedules that are negative, increase with rank, or (for
    /// fee shares) hand out more than the fees collected.
    pub fn validate(&self) -> Result<(), RallyError> {
        let schedule = self.schedule();

        if let Some(neg) = schedule.iter().find(|v| **v < Decimal::ZERO) {
            return Err(RallyError::Config(format!(
                "prize schedule contains a negative entry: {neg}"
            )));
        }

        if schedule.windows(2).any(|w| w[1] > w[0]) {
            return Err(RallyError::Config(
                "prize schedule must not increase with rank".to_string(),
            ));
        }

        if let PrizePool::FeeShare { shares } = self {
            let total: Decimal = shares.iter().sum();
            if total > Decimal::ONE {
                return Err(RallyError::Config(format!(
                    "prize shares sum to {total}, more than the fees collected"
                )));
            }
        }

        Ok(())
    }

    /// Total money available for prizes in a race.
    pub fn total(&self, fees_collected: Decimal) -> Decimal {
        match self {
            PrizePool::Fixed { amounts } => amounts.iter().sum(),
            PrizePool::FeeShare { .. } => fees_collected,
        }
    }

    /// Prize per position for the first `prize_positions` finishers.
    ///
    /// Fee shares are truncated to cents so rounding never pays out more
    /// than was collected.
    pub fn payouts(&self, fees_collected: Decimal, prize_positions: usize) -> Vec<Decimal> {
        let schedule = self.schedule().iter().take(prize_positions);
        match self {
            PrizePool::Fixed { .. } => schedule.copied().collect(),
            PrizePool::FeeShare { .. } => schedule
                .map(|share| {
                    (fees_collected * share)
                        .round_dp_with_strategy(2, RoundingStrategy::ToZero)
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

/// Money movements produced by one race.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settlement {
    pub fees_collected: Decimal,
    pub prizes_paid: Decimal,
    /// Net change per team: prizes won minus fees paid.
    pub budget_deltas: BTreeMap<TeamId, Decimal>,
}

/// Apply fees and prizes to ranked placements.
///
/// `placements` must already be in finishing order. Each team pays
/// `entry_fee` once per race however many cars it fields; the fee is
/// booked on the team's best-placed car. Prizes go to the first
/// `prize_positions` entries.
///
/// Amounts too large for `Decimal` are a validation error.
pub fn settle(
    placements: &mut [Placement],
    entry_fee: Decimal,
    pool: &PrizePool,
    prize_positions: usize,
) -> Result<Settlement, RallyError> {
    let paying_teams: BTreeSet<TeamId> = placements.iter().map(|p| p.team_id).collect();
    let fees_collected = entry_fee
        .checked_mul(Decimal::from(paying_teams.len()))
        .ok_or_else(|| overflow("entry fees"))?;
    let payouts = pool.payouts(fees_collected, prize_positions);

    let mut budget_deltas: BTreeMap<TeamId, Decimal> = BTreeMap::new();
    let mut prizes_paid = Decimal::ZERO;

    for (idx, placement) in placements.iter_mut().enumerate() {
        let first_for_team = !budget_deltas.contains_key(&placement.team_id);
        placement.entry_fee = if first_for_team { entry_fee } else { Decimal::ZERO };
        placement.prize_money = payouts.get(idx).copied().unwrap_or(Decimal::ZERO);
        prizes_paid = prizes_paid
            .checked_add(placement.prize_money)
            .ok_or_else(|| overflow("prize money"))?;

        let delta = budget_deltas.entry(placement.team_id).or_insert(Decimal::ZERO);
        *delta = delta
            .checked_add(placement.net_amount())
            .ok_or_else(|| overflow("budget delta"))?;
    }

    info!(
        entrants = placements.len(),
        fees = format!("${:.2}", fees_collected),
        prizes = format!("${:.2}", prizes_paid),
        teams = budget_deltas.len(),
        "Race settled"
    );

    Ok(Settlement {
        fees_collected,
        prizes_paid,
        budget_deltas,
    })
}

fn overflow(what: &str) -> RallyError {
    RallyError::validation(format!("{what} out of range"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
