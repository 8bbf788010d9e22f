#[derive(Debug, Deserialize)]
struct SelectionRequest {
    slot: usize,
    /// None clears the slot.
    recipe_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ProgressResponse {
    schema_version: String,
    actor_id: String,
    running: bool,
    slots: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct ClaimResponse {
    schema_version: String,
    actor_id: String,
    report: ClaimReport,
}

async fn set_production_selection(
    Path(actor_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<SelectionRequest>,
) -> Result<StatusCode, HttpApiError> {
    let messages = {
        let mut inner = state.inner.lock().await;
        inner
            .api
            .engine()
            .set_production_selection(&actor_id, request.slot, request.recipe_id)
            .map_err(HttpApiError::from_engine)?;
        collect_delta_messages(&mut inner)
    };
    broadcast_messages(&state, messages);

    Ok(StatusCode::NO_CONTENT)
}

async fn start_production(
    Path(actor_id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, HttpApiError> {
    let messages = {
        let mut inner = state.inner.lock().await;
        inner
            .api
            .engine()
            .start_production(&actor_id)
            .map_err(HttpApiError::from_engine)?;
        collect_delta_messages(&mut inner)
    };
    broadcast_messages(&state, messages);

    Ok(StatusCode::NO_CONTENT)
}

async fn get_production_progress(
    Path(actor_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ProgressResponse>, HttpApiError> {
    let inner = state.inner.lock().await;
    let progress = inner
        .api
        .engine()
        .production_progress(&actor_id)
        .map_err(HttpApiError::from_engine)?;
    let running = inner
        .api
        .engine()
        .actor(&actor_id)
        .map_err(HttpApiError::from_engine)?
        .production
        .is_running();

    let slots = progress
        .iter()
        .map(|slot| {
            json!({
                "slot": slot.slot,
                "recipe_id": slot.recipe_id,
                "progress": slot.progress,
                "complete": slot.is_complete(),
            })
        })
        .collect();

    Ok(Json(ProgressResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        actor_id,
        running,
        slots,
    }))
}

async fn claim_production(
    Path(actor_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ClaimResponse>, HttpApiError> {
    let (report, messages) = {
        let mut inner = state.inner.lock().await;
        let report = inner
            .api
            .engine()
            .claim_production(&actor_id)
            .map_err(HttpApiError::from_engine)?;
        (report, collect_delta_messages(&mut inner))
    };
    broadcast_messages(&state, messages);

    Ok(Json(ClaimResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        actor_id,
        report,
    }))
}
