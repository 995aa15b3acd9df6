//! Sample teams and cars for a fresh database.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use super::RallyRepository;
use crate::types::{NewCar, RallyError};

struct SampleCar {
    name: &'static str,
    speed: f64,
    pit_stop_interval: f64,
    pit_stop_duration: f64,
}

fn sample(name: &'static str, speed: f64, interval: f64, duration: f64) -> SampleCar {
    SampleCar {
        name,
        speed,
        pit_stop_interval: interval,
        pit_stop_duration: duration,
    }
}

fn sample_teams() -> Vec<(&'static str, Decimal, Vec<SampleCar>)> {
    vec![
        (
            "Thunder Rally",
            dec!(50000),
            vec![sample("Storm Chaser", 190.0, 50.0, 12.0), sample("Red Comet", 180.0, 40.0, 10.0)],
        ),
        (
            "Desert Foxes",
            dec!(40000),
            vec![sample("Sand Viper", 175.0, 55.0, 14.0), sample("Mirage", 185.0, 45.0, 11.0)],
        ),
        (
            "Alpine Racers",
            dec!(35000),
            vec![sample("Glacier", 170.0, 60.0, 9.5)],
        ),
        (
            "Turbo Titans",
            dec!(45000),
            vec![sample("Nitro Beast", 205.0, 46.0, 11.5)],
        ),
    ]
}

/// Insert the sample teams and their cars if no team exists yet.
///
/// Returns the number of teams inserted (0 when the store already had
/// data).
pub async fn seed_sample_data(repo: &dyn RallyRepository) -> Result<usize, RallyError> {
    if !repo.list_teams().await?.is_empty() {
        debug!("Teams present, skipping sample data");
        return Ok(0);
    }

    let teams = sample_teams();
    let count = teams.len();
    for (name, budget, cars) in teams {
        let team = repo.create_team(name, budget).await?;
        for car in cars {
            repo.create_car(&NewCar {
                name: car.name.to_string(),
                team_id: team.id,
                speed: car.speed,
                pit_stop_interval: car.pit_stop_interval,
                pit_stop_duration: car.pit_stop_duration,
            })
            .await?;
        }
    }
    Ok(count)
}
