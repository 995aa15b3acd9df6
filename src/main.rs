//! RALLY — racing-club manager
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens (and if needed seeds) the database, then either serves the
//! dashboard until Ctrl-C or runs a single race and prints the podium.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use rally::config;
use rally::dashboard::{self, DashboardState};
use rally::engine::{RaceDirector, RaceReport, RaceRequest, UniformNoise};
use rally::storage::{RallyRepository, SqliteRepository};

const BANNER: &str = r#"
 ____      _    _     _  __   __
|  _ \    / \  | |   | | \ \ / /
| |_) |  / _ \ | |   | |  \ V /
|  _ <  / ___ \| |___| |___| |
|_| \_\/_/   \_\_____|_____|_|

  Racing-club manager
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        club = %cfg.app.name,
        currency = %cfg.app.currency,
        distance_km = cfg.race.distance_km,
        entry_fee = %cfg.race.entry_fee,
        "RALLY starting up"
    );

    // -- Storage ---------------------------------------------------------

    let sqlite = SqliteRepository::connect(&cfg.database_url(), cfg.database.max_connections)
        .await
        .context("Failed to open database")?;
    sqlite
        .bootstrap(cfg.database.seed_sample_data)
        .await
        .context("Failed to prepare database")?;

    let repository: Arc<dyn RallyRepository> = Arc::new(sqlite.clone());
    let director = RaceDirector::new(repository, cfg.race.settings());

    // -- Run -------------------------------------------------------------

    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new(
            director,
            cfg.app.name.clone(),
            cfg.app.currency.clone(),
        ));
        dashboard::serve(state, cfg.dashboard.port, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
            }
            info!("Shutdown signal received");
        })
        .await?;
    } else {
        let mut noise = UniformNoise::from_os_rng(cfg.race.noise_secs);
        let report = director.run_race(&RaceRequest::default(), &mut noise).await?;
        print_podium(&report, &cfg.app.currency);
    }

    sqlite.close().await;
    info!("RALLY shut down cleanly");
    Ok(())
}

fn print_podium(report: &RaceReport, currency: &str) {
    println!("Race #{} ({} km)", report.race.id, report.race.distance_km);
    for result in report.podium() {
        println!(
            "  P{}  car #{:<4} team #{:<4} {:>8.2} min  prize {} {:.2}",
            result.position,
            result.car_id,
            result.team_id,
            result.finish_time_mins(),
            currency,
            result.prize_money,
        );
    }
    println!(
        "  fees collected {currency} {:.2}, prizes paid {currency} {:.2}",
        report.fees_collected, report.prizes_paid
    );
}

/// Set up the tracing subscriber. JSON output when `RALLY_LOG_JSON` is set.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rally=info"));

    if std::env::var("RALLY_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
