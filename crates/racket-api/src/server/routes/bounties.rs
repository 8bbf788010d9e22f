#[derive(Debug, Deserialize)]
struct PostBountyRequest {
    poster_id: String,
    target_id: String,
    reward: i64,
}

#[derive(Debug, Serialize)]
struct BountyResponse {
    schema_version: String,
    bounty: Bounty,
}

#[derive(Debug, Serialize)]
struct ListBountiesResponse {
    schema_version: String,
    bounties: Vec<Bounty>,
}

#[derive(Debug, Deserialize)]
struct CancelBountyRequest {
    poster_id: String,
}

async fn post_bounty(
    State(state): State<AppState>,
    Json(request): Json<PostBountyRequest>,
) -> Result<Json<BountyResponse>, HttpApiError> {
    let (bounty, messages) = {
        let mut inner = state.inner.lock().await;
        let bounty = inner
            .api
            .engine()
            .post_bounty(&request.poster_id, &request.target_id, request.reward)
            .map_err(HttpApiError::from_engine)?;
        (bounty, collect_delta_messages(&mut inner))
    };
    broadcast_messages(&state, messages);

    Ok(Json(BountyResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        bounty,
    }))
}

async fn list_bounties(
    State(state): State<AppState>,
) -> Result<Json<ListBountiesResponse>, HttpApiError> {
    let inner = state.inner.lock().await;
    let bounties = inner
        .api
        .engine()
        .bounties()
        .map_err(HttpApiError::from_engine)?;

    Ok(Json(ListBountiesResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        bounties,
    }))
}

async fn cancel_bounty(
    Path(bounty_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<CancelBountyRequest>,
) -> Result<Json<BountyResponse>, HttpApiError> {
    let (bounty, messages) = {
        let mut inner = state.inner.lock().await;
        let bounty = inner
            .api
            .engine()
            .cancel_bounty(&bounty_id, &request.poster_id)
            .map_err(HttpApiError::from_engine)?;
        (bounty, collect_delta_messages(&mut inner))
    };
    broadcast_messages(&state, messages);

    Ok(Json(BountyResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        bounty,
    }))
}
