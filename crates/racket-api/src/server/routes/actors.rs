#[derive(Debug, Deserialize)]
struct CreateActorRequest {
    name: String,
    location_id: String,
}

#[derive(Debug, Serialize)]
struct ActorResponse {
    schema_version: String,
    actor: Actor,
}

#[derive(Debug, Deserialize)]
struct ListActorsQuery {
    cursor: Option<usize>,
    page_size: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ListActorsResponse {
    schema_version: String,
    actors: Vec<Actor>,
    next_cursor: Option<usize>,
}

#[derive(Debug, Serialize)]
struct AlertsResponse {
    schema_version: String,
    alerts: Vec<AttackAlert>,
}

#[derive(Debug, Deserialize)]
struct GrantCashRequest {
    amount: i64,
}

#[derive(Debug, Serialize)]
struct BalanceResponse {
    schema_version: String,
    actor_id: String,
    balance: i64,
}

async fn create_actor(
    State(state): State<AppState>,
    Json(request): Json<CreateActorRequest>,
) -> Result<Json<ActorResponse>, HttpApiError> {
    let (actor, messages) = {
        let mut inner = state.inner.lock().await;
        let actor = inner
            .api
            .engine()
            .create_actor(&request.name, &request.location_id)
            .map_err(HttpApiError::from_engine)?;
        (actor, collect_delta_messages(&mut inner))
    };
    broadcast_messages(&state, messages);

    Ok(Json(ActorResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        actor,
    }))
}

async fn get_actor(
    Path(actor_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ActorResponse>, HttpApiError> {
    let inner = state.inner.lock().await;
    let actor = inner
        .api
        .engine()
        .actor(&actor_id)
        .map_err(HttpApiError::from_engine)?;

    Ok(Json(ActorResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        actor,
    }))
}

async fn list_actors(
    State(state): State<AppState>,
    Query(query): Query<ListActorsQuery>,
) -> Result<Json<ListActorsResponse>, HttpApiError> {
    let inner = state.inner.lock().await;
    let all = inner
        .api
        .engine()
        .actors()
        .map_err(HttpApiError::from_engine)?;

    let (start, end, next_cursor) = paginate(all.len(), query.cursor, query.page_size)?;
    Ok(Json(ListActorsResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        actors: all[start..end].to_vec(),
        next_cursor,
    }))
}

async fn get_alerts(
    Path(actor_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AlertsResponse>, HttpApiError> {
    let inner = state.inner.lock().await;
    // Alerts exist for the victim even after death; an unknown id still 404s.
    inner
        .api
        .engine()
        .actor(&actor_id)
        .map_err(HttpApiError::from_engine)?;
    let alerts = inner
        .api
        .engine()
        .alerts_for(&actor_id)
        .map_err(HttpApiError::from_engine)?;

    Ok(Json(AlertsResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        alerts,
    }))
}

async fn equip_weapon(
    Path(actor_id): Path<String>,
    State(state): State<AppState>,
    Json(weapon): Json<WeaponProfile>,
) -> Result<Json<ActorResponse>, HttpApiError> {
    let (actor, messages) = {
        let mut inner = state.inner.lock().await;
        inner
            .api
            .engine()
            .equip_weapon(&actor_id, weapon)
            .map_err(HttpApiError::from_engine)?;
        let actor = inner
            .api
            .engine()
            .actor(&actor_id)
            .map_err(HttpApiError::from_engine)?;
        (actor, collect_delta_messages(&mut inner))
    };
    broadcast_messages(&state, messages);

    Ok(Json(ActorResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        actor,
    }))
}

async fn add_ammo(
    Path(actor_id): Path<String>,
    State(state): State<AppState>,
    Json(stack): Json<AmmoStack>,
) -> Result<StatusCode, HttpApiError> {
    let messages = {
        let mut inner = state.inner.lock().await;
        inner
            .api
            .engine()
            .add_ammo(&actor_id, stack)
            .map_err(HttpApiError::from_engine)?;
        collect_delta_messages(&mut inner)
    };
    broadcast_messages(&state, messages);

    Ok(StatusCode::NO_CONTENT)
}

async fn grant_cash(
    Path(actor_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<GrantCashRequest>,
) -> Result<Json<BalanceResponse>, HttpApiError> {
    let (balance, messages) = {
        let mut inner = state.inner.lock().await;
        let balance = inner
            .api
            .engine()
            .grant_cash(&actor_id, request.amount)
            .map_err(HttpApiError::from_engine)?;
        (balance, collect_delta_messages(&mut inner))
    };
    broadcast_messages(&state, messages);

    Ok(Json(BalanceResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        actor_id,
        balance,
    }))
}
