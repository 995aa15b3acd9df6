//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::engine::{RaceDirector, RaceReport, RaceRequest, UniformNoise};
use crate::types::{Car, NewCar, RaceEvent, RaceId, RallyError, ResultView, Team, TeamId};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub director: RaceDirector,
    pub app_name: String,
    pub currency: String,
}

impl DashboardState {
    pub fn new(director: RaceDirector, app_name: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            director,
            app_name: app_name.into(),
            currency: currency.into(),
        }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// `RallyError` rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub RallyError);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl From<RallyError> for ApiError {
    fn from(e: RallyError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RallyError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RallyError::Storage(_) | RallyError::Config(_) => {
                error!(error = %self.0, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    pub budget: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CarsQuery {
    pub team_id: Option<TeamId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultsQuery {
    pub race_id: Option<RaceId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResponse {
    pub name: String,
    pub currency: String,
    pub distance_km: f64,
    pub entry_fee: Decimal,
    pub prize_positions: usize,
}

fn validate_team(req: &CreateTeamRequest) -> Result<(), RallyError> {
    if req.name.trim().is_empty() {
        return Err(RallyError::validation("team name must not be empty"));
    }
    if req.budget < Decimal::ZERO {
        return Err(RallyError::validation("starting budget must not be negative"));
    }
    Ok(())
}

fn validate_car(car: &NewCar) -> Result<(), RallyError> {
    if car.name.trim().is_empty() {
        return Err(RallyError::validation("car name must not be empty"));
    }
    let positive = |v: f64| v.is_finite() && v > 0.0;
    if !positive(car.speed) {
        return Err(RallyError::validation("speed must be positive"));
    }
    if !positive(car.pit_stop_interval) {
        return Err(RallyError::validation("pit stop interval must be positive"));
    }
    if !(car.pit_stop_duration.is_finite() && car.pit_stop_duration >= 0.0) {
        return Err(RallyError::validation("pit stop duration must not be negative"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/info
pub async fn get_info(State(state): State<AppState>) -> Json<InfoResponse> {
    let settings = state.director.settings();
    Json(InfoResponse {
        name: state.app_name.clone(),
        currency: state.currency.clone(),
        distance_km: settings.distance_km,
        entry_fee: settings.entry_fee,
        prize_positions: settings.prize_positions,
    })
}

/// GET /api/teams
pub async fn list_teams(State(state): State<AppState>) -> ApiResult<Json<Vec<Team>>> {
    Ok(Json(state.director.repository().list_teams().await?))
}

/// POST /api/teams
pub async fn create_team(
    State(state): State<AppState>,
    Json(req): Json<CreateTeamRequest>,
) -> ApiResult<(StatusCode, Json<Team>)> {
    validate_team(&req)?;
    let team = state
        .director
        .repository()
        .create_team(req.name.trim(), req.budget)
        .await?;
    info!(team_id = team.id, name = %team.name, "Team added");
    Ok((StatusCode::CREATED, Json(team)))
}

/// GET /api/cars
pub async fn list_cars(
    State(state): State<AppState>,
    Query(query): Query<CarsQuery>,
) -> ApiResult<Json<Vec<Car>>> {
    Ok(Json(state.director.repository().list_cars(query.team_id).await?))
}

/// POST /api/cars
pub async fn create_car(
    State(state): State<AppState>,
    Json(req): Json<NewCar>,
) -> ApiResult<(StatusCode, Json<Car>)> {
    validate_car(&req)?;
    let car = state.director.repository().create_car(&req).await?;
    info!(car_id = car.id, name = %car.name, team_id = car.team_id, "Car added");
    Ok((StatusCode::CREATED, Json(car)))
}

/// POST /api/races
pub async fn start_race(
    State(state): State<AppState>,
    Json(req): Json<RaceRequest>,
) -> ApiResult<Json<RaceReport>> {
    let mut noise = UniformNoise::from_os_rng(state.director.settings().noise_secs);
    let report = state.director.run_race(&req, &mut noise).await?;
    Ok(Json(report))
}

/// GET /api/races
pub async fn list_races(State(state): State<AppState>) -> ApiResult<Json<Vec<RaceEvent>>> {
    Ok(Json(state.director.repository().list_races().await?))
}

/// GET /api/results
pub async fn list_results(
    State(state): State<AppState>,
    Query(query): Query<ResultsQuery>,
) -> ApiResult<Json<Vec<ResultView>>> {
    Ok(Json(
        state
            .director
            .repository()
            .list_race_results(query.race_id)
            .await?,
    ))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
