#[derive(Clone)]
struct AppState {
    inner: std::sync::Arc<Mutex<ServerInner>>,
    stream_tx: broadcast::Sender<StreamMessage>,
}

impl AppState {
    fn new(api: EngineApi) -> Self {
        let (stream_tx, _) = broadcast::channel(4096);
        Self {
            inner: std::sync::Arc::new(Mutex::new(ServerInner {
                api,
                emitted_event_seq: 0,
            })),
            stream_tx,
        }
    }
}

#[derive(Debug)]
struct ServerInner {
    api: EngineApi,
    /// Highest event sequence already pushed onto the stream.
    emitted_event_seq: u64,
}

/// Flush persistence and gather every event appended since the last call,
/// as stream messages. Called while holding the state lock, after any
/// mutating handler.
fn collect_delta_messages(inner: &mut ServerInner) -> Vec<StreamMessage> {
    let mut messages = Vec::new();

    match inner.api.engine().events_since(inner.emitted_event_seq) {
        Ok(new_events) => {
            for event in &new_events {
                messages.push(StreamMessage::event_appended(event));
            }
            if let Some(last) = new_events.last() {
                inner.emitted_event_seq = last.seq;
            }
        }
        Err(err) => {
            messages.push(StreamMessage::warning(format!(
                "event log read failed: {err}"
            )));
        }
    }

    inner.api.flush_persistence_if_enabled();
    if let Some(last_error) = inner.api.last_persistence_error() {
        messages.push(StreamMessage::warning(last_error.to_string()));
    }

    messages
}

fn broadcast_messages(state: &AppState, messages: Vec<StreamMessage>) {
    for message in messages {
        let _ = state.stream_tx.send(message);
    }
}
