use super::*;
use contracts::GameConfig;
use racket_core::chance::ForcedChance;
use racket_core::clock::ManualClock;
use racket_core::engine::GameEngine;
use std::sync::Arc;

fn deterministic_state() -> AppState {
    let engine = GameEngine::with_parts(
        GameConfig::default(),
        Arc::new(ManualClock::new(1_000_000)),
        Box::new(ForcedChance::always_succeed()),
    );
    AppState::new(EngineApi::from_engine(engine))
}

#[test]
fn pagination_enforces_max_bounds() {
    let (start, end, next_cursor) = paginate(100, Some(10), Some(20)).expect("page should work");
    assert_eq!(start, 10);
    assert_eq!(end, 30);
    assert_eq!(next_cursor, Some(30));

    let out_of_range = paginate(5, Some(10), Some(1));
    assert!(out_of_range.is_err());
}

#[test]
fn engine_errors_map_to_stable_codes() {
    let err = HttpApiError::from_engine(EngineError::NameTaken("Ana".to_string()));
    assert_eq!(err.status, StatusCode::CONFLICT);
    assert_eq!(err.error.error_code, ErrorCode::NameTaken);

    let err = HttpApiError::from_engine(EngineError::Combat(CombatError::CooldownActive {
        remaining_ms: 500,
    }));
    assert_eq!(err.status, StatusCode::CONFLICT);
    assert_eq!(err.error.error_code, ErrorCode::CooldownActive);

    let err = HttpApiError::from_engine(EngineError::ActorNotFound("ghost".to_string()));
    assert_eq!(err.status, StatusCode::NOT_FOUND);
    assert_eq!(err.error.error_code, ErrorCode::ActorNotFound);

    // Store internals never leak their own message as the client error.
    let err = HttpApiError::from_engine(EngineError::Store(
        racket_core::store::StoreError::Poisoned,
    ));
    assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(err.error.error_code, ErrorCode::InternalError);
}

#[tokio::test]
async fn delta_collection_advances_the_emitted_cursor() {
    let state = deterministic_state();
    let mut inner = state.inner.lock().await;

    inner
        .api
        .engine()
        .create_actor("Ana", "downtown")
        .expect("create");
    inner
        .api
        .engine()
        .create_actor("Bruno", "harbor")
        .expect("create");

    let messages = collect_delta_messages(&mut inner);
    assert_eq!(messages.len(), 2);
    assert!(messages
        .iter()
        .all(|message| message.message_type == "event.appended"));
    assert_eq!(inner.emitted_event_seq, 2);

    // Nothing new means nothing emitted.
    let messages = collect_delta_messages(&mut inner);
    assert!(messages.is_empty());
}

#[tokio::test]
async fn delta_collection_surfaces_persistence_failures_as_warnings() {
    let state = deterministic_state();
    let mut inner = state.inner.lock().await;

    inner
        .api
        .engine()
        .create_actor("Ana", "downtown")
        .expect("create");

    // No sqlite store attached, so the flush is a no-op and no warning
    // appears alongside the event message.
    let messages = collect_delta_messages(&mut inner);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_type, "event.appended");
}
