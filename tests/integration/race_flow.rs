//! End-to-end race flows through the public API.
//!
//! Runs full races against a file-backed SQLite database and against the
//! in-memory mock, checking budgets, persisted results and failure modes.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use std::collections::HashSet;
use std::sync::Arc;

use rally::engine::{NoNoise, PrizePool, RaceDirector, RaceRequest, RaceSettings, UniformNoise};
use rally::storage::{seed, RallyRepository, SqliteRepository};
use rally::types::{NewCar, RallyError};

use super::mock_repository::MockRepository;

fn settings() -> RaceSettings {
    RaceSettings {
        distance_km: 100.0,
        entry_fee: dec!(1000),
        prize_pool: PrizePool::default(),
        prize_positions: 3,
        noise_secs: 0.0,
        require_entry_fee: false,
    }
}

fn temp_db_url() -> (String, SecretString) {
    let path = std::env::temp_dir().join(format!("rally_test_{}.db", uuid::Uuid::new_v4()));
    let path = path.to_string_lossy().to_string();
    let url = SecretString::new(format!("sqlite://{path}"));
    (path, url)
}

async fn add_car(repo: &dyn RallyRepository, name: &str, team_id: i64, speed: f64) -> i64 {
    repo.create_car(&NewCar {
        name: name.to_string(),
        team_id,
        speed,
        pit_stop_interval: 40.0,
        pit_stop_duration: 10.0,
    })
    .await
    .unwrap()
    .id
}

#[tokio::test]
async fn test_seeded_club_race_settles_budgets() {
    let repo = Arc::new(SqliteRepository::in_memory().await.unwrap());
    assert_eq!(seed::seed_sample_data(&*repo).await.unwrap(), 4);

    let before = repo.list_teams().await.unwrap();
    let total_before: Decimal = before.iter().map(|t| t.budget).sum();
    let cars = repo.list_cars(None).await.unwrap();
    let car_count = cars.len();
    let team_count = cars.iter().map(|c| c.team_id).collect::<HashSet<_>>().len();
    assert!(team_count < car_count);

    let director = RaceDirector::new(repo.clone(), settings());
    let report = director
        .run_race(&RaceRequest::default(), &mut UniformNoise::seeded(30.0, 7))
        .await
        .unwrap();

    assert_eq!(report.results.len(), car_count);
    // One fee per team, however many cars it fields.
    assert_eq!(report.fees_collected, dec!(1000) * Decimal::from(team_count));
    // Fee-share pool pays out everything collected.
    assert_eq!(report.prizes_paid, report.fees_collected);

    let positions: Vec<u32> = report.results.iter().map(|r| r.position).collect();
    assert_eq!(positions, (1..=car_count as u32).collect::<Vec<_>>());
    assert!(report
        .results
        .windows(2)
        .all(|w| w[0].finish_time_secs <= w[1].finish_time_secs));

    let after = repo.list_teams().await.unwrap();
    let total_after: Decimal = after.iter().map(|t| t.budget).sum();
    assert_eq!(total_after, total_before);

    for team in &after {
        let prior = before.iter().find(|t| t.id == team.id).unwrap();
        let delta = report.budget_deltas.get(&team.id).copied().unwrap_or_default();
        assert_eq!(team.budget, prior.budget + delta);
        if let Some(budget) = report.budgets.get(&team.id) {
            assert_eq!(*budget, team.budget);
        }
    }

    let views = repo.list_race_results(Some(report.race.id)).await.unwrap();
    assert_eq!(views.len(), car_count);
    assert_eq!(views[0].position, 1);
}

#[tokio::test]
async fn test_results_accumulate_across_races() {
    let repo = Arc::new(SqliteRepository::in_memory().await.unwrap());
    let a = repo.create_team("Thunder Rally", dec!(5000)).await.unwrap();
    let b = repo.create_team("Desert Foxes", dec!(5000)).await.unwrap();
    add_car(&*repo, "Storm Chaser", a.id, 180.0).await;
    add_car(&*repo, "Sand Viper", b.id, 170.0).await;

    let director = RaceDirector::new(repo.clone(), settings());
    let first = director.run_race(&RaceRequest::default(), &mut NoNoise).await.unwrap();
    let second = director.run_race(&RaceRequest::default(), &mut NoNoise).await.unwrap();
    assert!(second.race.id > first.race.id);

    let races = repo.list_races().await.unwrap();
    assert_eq!(races.len(), 2);
    assert_eq!(races[0].id, second.race.id);

    let views = repo.list_race_results(None).await.unwrap();
    assert_eq!(views.len(), 4);
    assert_eq!(views[0].race_id, second.race.id);
    assert_eq!(views[0].car_name, "Storm Chaser");
    assert_eq!(views[3].race_id, first.race.id);

    // Of each 2000 pot the winner takes 1000 and the runner-up 600.
    let teams = repo.list_teams().await.unwrap();
    assert_eq!(teams[0].budget, dec!(5000));
    let winner_delta = first.budget_deltas[&a.id];
    assert_eq!(winner_delta, dec!(0));
    assert_eq!(first.budget_deltas[&b.id], dec!(-400));
    assert_eq!(teams[1].budget, dec!(4200));
}

#[tokio::test]
async fn test_orphan_car_rejected_before_anything_is_written() {
    let repo = Arc::new(MockRepository::new());
    let team = repo.create_team("Alpine Racers", dec!(35000)).await.unwrap();
    add_car(&*repo, "Glacier", team.id, 185.0).await;
    add_car(&*repo, "Orphan", 999, 210.0).await;

    let director = RaceDirector::new(repo.clone(), settings());
    let err = director
        .run_race(&RaceRequest::default(), &mut NoNoise)
        .await
        .unwrap_err();

    assert!(matches!(err, RallyError::Validation(_)));
    assert_eq!(repo.commit_count(), 0);
    assert_eq!(repo.result_count(), 0);
    assert_eq!(repo.list_teams().await.unwrap()[0].budget, dec!(35000));
}

#[tokio::test]
async fn test_storage_failure_propagates() {
    let repo = Arc::new(MockRepository::new());
    let team = repo.create_team("Turbo Titans", dec!(45000)).await.unwrap();
    add_car(&*repo, "Nitro Beast", team.id, 205.0).await;
    repo.set_error();

    let director = RaceDirector::new(repo.clone(), settings());
    let err = director
        .run_race(&RaceRequest::default(), &mut NoNoise)
        .await
        .unwrap_err();
    assert!(matches!(err, RallyError::Storage(sqlx::Error::PoolClosed)));

    repo.clear_error();
    let report = director.run_race(&RaceRequest::default(), &mut NoNoise).await.unwrap();
    assert_eq!(report.results.len(), 1);
    assert_eq!(repo.commit_count(), 1);
}

#[tokio::test]
async fn test_empty_club_cannot_race() {
    let repo = Arc::new(SqliteRepository::in_memory().await.unwrap());
    let director = RaceDirector::new(repo.clone(), settings());
    let err = director
        .run_race(&RaceRequest::default(), &mut NoNoise)
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(repo.list_races().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_race_survives_reconnect() {
    let (path, url) = temp_db_url();

    let race_id = {
        let repo = SqliteRepository::connect(&url, 2).await.unwrap();
        repo.bootstrap(true).await.unwrap();
        let director = RaceDirector::new(Arc::new(repo.clone()), settings());
        let report = director
            .run_race(&RaceRequest::default(), &mut UniformNoise::seeded(30.0, 1))
            .await
            .unwrap();
        repo.close().await;
        report.race.id
    };

    let repo = SqliteRepository::connect(&url, 2).await.unwrap();
    // A second bootstrap must not reseed a populated club.
    repo.bootstrap(true).await.unwrap();
    assert_eq!(repo.list_teams().await.unwrap().len(), 4);
    assert_eq!(repo.list_races().await.unwrap()[0].id, race_id);
    assert!(!repo.list_race_results(Some(race_id)).await.unwrap().is_empty());
    repo.close().await;

    let _ = std::fs::remove_file(&path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_races_keep_every_fee() {
    let (path, url) = temp_db_url();
    let repo = SqliteRepository::connect(&url, 4).await.unwrap();
    repo.bootstrap(false).await.unwrap();
    let team = repo.create_team("Lone Wolves", dec!(1000)).await.unwrap();
    add_car(&repo, "Lone Car", team.id, 150.0).await;

    let s = RaceSettings {
        entry_fee: dec!(100),
        prize_pool: PrizePool::Fixed { amounts: vec![] },
        ..settings()
    };
    let director = Arc::new(RaceDirector::new(Arc::new(repo.clone()), s));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let director = director.clone();
            tokio::spawn(async move {
                director.run_race(&RaceRequest::default(), &mut NoNoise).await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(repo.list_races().await.unwrap().len(), 8);
    assert_eq!(repo.get_team(team.id).await.unwrap().unwrap().budget, dec!(200));
    repo.close().await;

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_separate_directors_do_not_lose_fees() {
    let (path, url) = temp_db_url();
    let repo = SqliteRepository::connect(&url, 4).await.unwrap();
    repo.bootstrap(false).await.unwrap();
    let team = repo.create_team("Twin Pits", dec!(1000)).await.unwrap();
    add_car(&repo, "Twin", team.id, 150.0).await;

    let s = RaceSettings {
        entry_fee: dec!(100),
        prize_pool: PrizePool::Fixed { amounts: vec![] },
        ..settings()
    };
    let a = RaceDirector::new(Arc::new(repo.clone()), s.clone());
    let b = RaceDirector::new(Arc::new(repo.clone()), s);

    let (req_a, req_b) = (RaceRequest::default(), RaceRequest::default());
    let (mut noise_a, mut noise_b) = (NoNoise, NoNoise);
    let (ra, rb) = tokio::join!(
        a.run_race(&req_a, &mut noise_a),
        b.run_race(&req_b, &mut noise_b),
    );
    ra.unwrap();
    rb.unwrap();

    assert_eq!(repo.get_team(team.id).await.unwrap().unwrap().budget, dec!(800));
    repo.close().await;

    let _ = std::fs::remove_file(&path);
}
