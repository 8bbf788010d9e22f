use std::fmt;
use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, Request, State};
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::Method;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use contracts::{
    Actor, AmmoStack, ApiError, AttackAlert, Bounty, ClaimReport, CombatReport, ErrorCode, Event,
    WeaponProfile, SCHEMA_VERSION_V1,
};
use racket_core::bounty::BountyError;
use racket_core::combat::{AttackRequest, CombatError};
use racket_core::detention::{DetentionError, RescueOutcome};
use racket_core::engine::EngineError;
use racket_core::production::ProductionError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};

use crate::{EngineApi, PersistenceError};

const DEFAULT_PAGE_SIZE: usize = 500;
const MAX_PAGE_SIZE: usize = 5000;

include!("error.rs");
include!("state.rs");
include!("routes/actors.rs");
include!("routes/actions.rs");
include!("routes/bounties.rs");
include!("routes/production.rs");
include!("routes/events.rs");
include!("routes/stream.rs");
include!("util.rs");

/// Serve one world over HTTP. The caller builds the [`EngineApi`] (and
/// attaches sqlite persistence if wanted) before handing it over.
pub async fn serve(addr: SocketAddr, api: EngineApi) -> Result<(), ServerError> {
    let state = AppState::new(api);
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/actors", post(create_actor).get(list_actors))
        .route("/api/v1/actors/{actor_id}", get(get_actor))
        .route("/api/v1/actors/{actor_id}/alerts", get(get_alerts))
        .route("/api/v1/actors/{actor_id}/weapon", post(equip_weapon))
        .route("/api/v1/actors/{actor_id}/ammo", post(add_ammo))
        .route("/api/v1/actors/{actor_id}/cash", post(grant_cash))
        .route("/api/v1/actors/{actor_id}/attack", post(attack))
        .route("/api/v1/actors/{actor_id}/arrest", post(arrest))
        .route("/api/v1/actors/{actor_id}/release", post(release))
        .route("/api/v1/actors/{actor_id}/bribe", post(bribe))
        .route("/api/v1/actors/{actor_id}/breakout", post(breakout))
        .route(
            "/api/v1/actors/{actor_id}/production",
            get(get_production_progress),
        )
        .route(
            "/api/v1/actors/{actor_id}/production/selection",
            post(set_production_selection),
        )
        .route(
            "/api/v1/actors/{actor_id}/production/start",
            post(start_production),
        )
        .route(
            "/api/v1/actors/{actor_id}/production/claim",
            post(claim_production),
        )
        .route("/api/v1/bounties", post(post_bounty).get(list_bounties))
        .route("/api/v1/bounties/{bounty_id}/cancel", post(cancel_bounty))
        .route("/api/v1/events", get(get_events))
        .route("/api/v1/clock/sync", post(sync_clock))
        .route("/api/v1/stream", get(stream_world))
        .layer(middleware::from_fn(cors_middleware))
        .with_state(state)
}

async fn cors_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = Response::new(axum::body::Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests;
