#[derive(Debug, Deserialize)]
struct EventsQuery {
    after_seq: Option<u64>,
    page_size: Option<usize>,
    /// Read from the sqlite spool instead of the live log. Useful for
    /// history that predates the current process.
    persisted: Option<bool>,
}

#[derive(Debug, Serialize)]
struct EventsResponse {
    schema_version: String,
    events: Vec<Event>,
    /// Sequence number to pass as after_seq on the next page.
    last_seq: Option<u64>,
}

async fn get_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, HttpApiError> {
    let after_seq = query.after_seq.unwrap_or(0);
    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .max(1)
        .min(MAX_PAGE_SIZE);

    let inner = state.inner.lock().await;
    let mut events = if query.persisted.unwrap_or(false) {
        inner
            .api
            .load_events_range(after_seq.saturating_add(1), u64::MAX)
            .map_err(HttpApiError::from_persistence)?
    } else {
        inner
            .api
            .engine()
            .events_since(after_seq)
            .map_err(HttpApiError::from_engine)?
    };
    events.truncate(page_size);

    let last_seq = events.last().map(|event| event.seq);
    Ok(Json(EventsResponse {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        events,
        last_seq,
    }))
}
