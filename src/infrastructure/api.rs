//! Control API (Cold Path)
//!
//! JSON view of the market state and feed status, plus the same control
//! operations the terminal exposes. Handlers only schedule work on the
//! engine; none of them wait on the network except analysis.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::Level;

use crate::analysis::AnalysisReport;
use crate::core::{Instrument, TickerSnapshot};
use crate::engine::{AppEngine, EngineStatus};
use crate::rest::CandleSource;
use crate::ws::ConnectionState;
use crate::WatchError;

/// One market row
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketRowDto {
    pub instrument: Instrument,
    pub pair: String,
    pub last_price: f64,
    pub change_pct_24h: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub quote_volume_24h: f64,
    pub event_time_ms: u64,
    pub direction: i8,
}

/// Market response: rows plus the feed state they were read under
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDto {
    pub state: ConnectionState,
    pub rows: Vec<MarketRowDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlDto {
    pub changed: bool,
    pub state: ConnectionState,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddInstrumentDto {
    pub added: bool,
    pub subscriptions: Vec<Instrument>,
}

#[derive(Debug, Serialize)]
struct ErrorDto {
    error: String,
}

/// Handler errors mapped onto status codes
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl From<WatchError> for ApiError {
    fn from(e: WatchError) -> Self {
        match e {
            WatchError::Config(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(e) => (StatusCode::BAD_REQUEST, e),
            ApiError::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, e),
        };
        (status, Json(ErrorDto { error })).into_response()
    }
}

/// Shared application state
pub struct AppState<S: CandleSource> {
    pub engine: Arc<AppEngine<S>>,
}

impl<S: CandleSource> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

pub fn router<S: CandleSource>(engine: Arc<AppEngine<S>>) -> Router {
    Router::new()
        .route("/api/market", get(get_market::<S>))
        .route("/api/status", get(get_status::<S>))
        .route("/api/feed/pause", post(pause_feed::<S>))
        .route("/api/feed/resume", post(resume_feed::<S>))
        .route("/api/instruments/:id", post(add_instrument::<S>))
        .route("/api/analysis/:id", get(get_analysis::<S>))
        .layer(CorsLayer::permissive())
        .with_state(AppState { engine })
}

/// Start the API server
pub async fn start_server<S: CandleSource>(
    engine: Arc<AppEngine<S>>,
    port: u16,
) -> Result<(), WatchError> {
    let app = router(engine);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    crate::log_api!(Level::INFO, %addr, "API server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn get_market<S: CandleSource>(State(state): State<AppState<S>>) -> Json<MarketDto> {
    let engine = &state.engine;
    let rows = engine
        .snapshot()
        .into_iter()
        .map(|(instrument, snapshot)| market_row(engine, instrument, snapshot))
        .collect();
    Json(MarketDto {
        state: engine.state(),
        rows,
    })
}

fn market_row<S: CandleSource>(
    engine: &AppEngine<S>,
    instrument: Instrument,
    snapshot: TickerSnapshot,
) -> MarketRowDto {
    MarketRowDto {
        pair: engine.registry().resolve(&instrument).as_str().to_string(),
        instrument,
        last_price: snapshot.last_price,
        change_pct_24h: snapshot.change_pct_24h,
        high_24h: snapshot.high_24h,
        low_24h: snapshot.low_24h,
        quote_volume_24h: snapshot.quote_volume_24h,
        event_time_ms: snapshot.event_time_ms,
        direction: snapshot.direction(),
    }
}

async fn get_status<S: CandleSource>(State(state): State<AppState<S>>) -> Json<EngineStatus> {
    Json(state.engine.status())
}

async fn pause_feed<S: CandleSource>(State(state): State<AppState<S>>) -> Json<ControlDto> {
    let changed = state.engine.pause();
    crate::log_api!(Level::INFO, changed, "pause requested");
    Json(ControlDto {
        changed,
        state: state.engine.state(),
    })
}

async fn resume_feed<S: CandleSource>(
    State(state): State<AppState<S>>,
) -> Result<Json<ControlDto>, ApiError> {
    let changed = state.engine.resume()?;
    crate::log_api!(Level::INFO, changed, "resume requested");
    Ok(Json(ControlDto {
        changed,
        state: state.engine.state(),
    }))
}

async fn add_instrument<S: CandleSource>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<Json<AddInstrumentDto>, ApiError> {
    let added = state.engine.add_instrument(&id)?;
    crate::log_api!(Level::INFO, id = %id, added, "add instrument requested");
    Ok(Json(AddInstrumentDto {
        added,
        subscriptions: state.engine.subscriptions(),
    }))
}

async fn get_analysis<S: CandleSource>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisReport>, ApiError> {
    let instrument = Instrument::new(&id).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(Json(state.engine.analyze(&instrument).await))
}
