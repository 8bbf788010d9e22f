#[derive(Debug, Deserialize)]
struct AttackBody {
    target_name: String,
    ammo_id: Option<String>,
    shots: Option<u32>,
}

#[derive(Debug, Serialize)]
struct AttackResponse {
    schema_version: String,
    report: CombatReport,
}

#[derive(Debug, Serialize)]
struct ArrestResponse {
    schema_version: String,
    actor_id: String,
    release_at_ms: i64,
}

#[derive(Debug, Serialize)]
struct ReleaseResponse {
    schema_version: String,
    actor_id: String,
    released: bool,
}

#[derive(Debug, Deserialize)]
struct RescueBody {
    target_id: String,
}

#[derive(Debug, Serialize)]
struct RescueResponse {
    schema_version: String,
    outcome: Value,
}

#[derive(Debug, Serialize)]
struct ClockSyncResponse {
    schema_version: String,
    offset_ms: i64,
}

async fn attack(
    Path(actor_id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<AttackBody>,
) -> Result<Json<AttackResponse>, HttpApiError> {
    let request = AttackRequest {
        attacker_id: actor_id,
        target_name: body.target_name,
        ammo_id: body.ammo_id,
        shots: body.shots.unwrap_or(1),
    };

    let (report, messages) = {
        let mut inner = state.inner.lock().await;
        let report = inner
            .api
            .engine()
            .attack(&request)
            .map_err(HttpApiError::from_engine)?;
        (report, collect_delta_messages(&mut inner))
    };
    broadcast_messages(&state, messages);

    Ok(Json(AttackResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        report,
    }))
}

async fn arrest(
    Path(actor_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ArrestResponse>, HttpApiError> {
    let (release_at, messages) = {
        let mut inner = state.inner.lock().await;
        let release_at = inner
            .api
            .engine()
            .arrest(&actor_id)
            .map_err(HttpApiError::from_engine)?;
        (release_at, collect_delta_messages(&mut inner))
    };
    broadcast_messages(&state, messages);

    Ok(Json(ArrestResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        actor_id,
        release_at_ms: release_at.millis(),
    }))
}

async fn release(
    Path(actor_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ReleaseResponse>, HttpApiError> {
    let (released, messages) = {
        let mut inner = state.inner.lock().await;
        let released = inner
            .api
            .engine()
            .release_if_expired(&actor_id)
            .map_err(HttpApiError::from_engine)?;
        (released, collect_delta_messages(&mut inner))
    };
    broadcast_messages(&state, messages);

    Ok(Json(ReleaseResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        actor_id,
        released,
    }))
}

async fn bribe(
    Path(actor_id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<RescueBody>,
) -> Result<Json<RescueResponse>, HttpApiError> {
    let (outcome, messages) = {
        let mut inner = state.inner.lock().await;
        let outcome = inner
            .api
            .engine()
            .bribe(&actor_id, &body.target_id)
            .map_err(HttpApiError::from_engine)?;
        (outcome, collect_delta_messages(&mut inner))
    };
    broadcast_messages(&state, messages);

    Ok(Json(RescueResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        outcome: rescue_outcome_json(&outcome),
    }))
}

async fn breakout(
    Path(actor_id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<RescueBody>,
) -> Result<Json<RescueResponse>, HttpApiError> {
    let (outcome, messages) = {
        let mut inner = state.inner.lock().await;
        let outcome = inner
            .api
            .engine()
            .breakout(&actor_id, &body.target_id)
            .map_err(HttpApiError::from_engine)?;
        (outcome, collect_delta_messages(&mut inner))
    };
    broadcast_messages(&state, messages);

    Ok(Json(RescueResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        outcome: rescue_outcome_json(&outcome),
    }))
}

async fn sync_clock(
    State(state): State<AppState>,
) -> Result<Json<ClockSyncResponse>, HttpApiError> {
    let (offset_ms, messages) = {
        let mut inner = state.inner.lock().await;
        let offset_ms = inner
            .api
            .engine()
            .synchronize_clock()
            .map_err(HttpApiError::from_engine)?;
        (offset_ms, collect_delta_messages(&mut inner))
    };
    broadcast_messages(&state, messages);

    Ok(Json(ClockSyncResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        offset_ms,
    }))
}
