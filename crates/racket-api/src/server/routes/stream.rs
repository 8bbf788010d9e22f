/// Live feed of appended events. The hello frame carries the last emitted
/// sequence so a client can backfill older events over `GET /api/v1/events`
/// before trusting the stream.
async fn stream_world(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let last_seq = { state.inner.lock().await.emitted_event_seq };
    ws.on_upgrade(move |socket| run_stream(socket, state, last_seq))
}

async fn run_stream(mut socket: WebSocket, state: AppState, last_seq: u64) {
    let mut rx = state.stream_tx.subscribe();

    if push_frame(&mut socket, &StreamMessage::hello(last_seq))
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            frame = rx.recv() => {
                let message = match frame {
                    Ok(message) => message,
                    Err(broadcast::error::RecvError::Lagged(missed)) => StreamMessage::warning(
                        format!("subscriber lagged, {missed} event(s) dropped from the feed"),
                    ),
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if push_frame(&mut socket, &message).await.is_err() {
                    break;
                }
            }
            received = socket.recv() => match received {
                Some(Ok(Message::Ping(body))) => {
                    if socket.send(Message::Pong(body)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn push_frame(socket: &mut WebSocket, message: &StreamMessage) -> Result<(), axum::Error> {
    let body = serde_json::to_string(message).map_err(axum::Error::new)?;
    socket.send(Message::Text(body.into())).await
}

#[derive(Debug, Clone, Serialize)]
struct StreamMessage {
    schema_version: String,
    #[serde(rename = "type")]
    message_type: String,
    /// Event sequence number, when the frame carries an event.
    seq: Option<u64>,
    payload: Value,
}

impl StreamMessage {
    fn event_appended(event: &Event) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            message_type: "event.appended".to_string(),
            seq: Some(event.seq),
            payload: json!(event),
        }
    }

    fn hello(last_seq: u64) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            message_type: "stream.hello".to_string(),
            seq: Some(last_seq),
            payload: json!({ "last_seq": last_seq }),
        }
    }

    fn warning(message: String) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            message_type: "warning".to_string(),
            seq: None,
            payload: json!({ "message": message }),
        }
    }
}
