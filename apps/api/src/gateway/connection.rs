//! Per-connection lifecycle: hello, identify/resume, heartbeats, teardown.

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use lodge_core::{AppError, AppResult};
use lodge_domain::{GatewayFrame, Opcode, SessionId, UserId};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::state::AppState;

use super::{CLOSE_INVALID_SESSION, ConnectionHandle, next_connection_id};

enum Handshake {
    Identified {
        session_id: SessionId,
        user_id: UserId,
    },
    Resumed {
        session_id: SessionId,
        user_id: UserId,
        replay: Vec<(u64, serde_json::Value)>,
    },
    Rejected,
}

/// Drives one WebSocket connection to completion.
pub(super) async fn run(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let hello = GatewayFrame::control(
        Opcode::Hello,
        json!({
            "heartbeat_interval_ms": state.gateway_config.heartbeat_interval.as_millis() as u64,
        }),
    );
    if send_frame(&mut sink, &hello).await.is_err() {
        return;
    }

    let handshake = tokio::time::timeout(
        state.gateway_config.identify_window,
        perform_handshake(&state, &mut sink, &mut stream),
    )
    .await;

    let handshake = match handshake {
        Ok(Ok(handshake)) => handshake,
        Ok(Err(error)) => {
            debug!(%error, "gateway handshake failed");
            let _ = sink.close().await;
            return;
        }
        Err(_) => {
            debug!("client did not identify within the window");
            let _ = sink.close().await;
            return;
        }
    };

    let (session_id, user_id, replay, resumed) = match handshake {
        Handshake::Identified {
            session_id,
            user_id,
        } => (session_id, user_id, Vec::new(), false),
        Handshake::Resumed {
            session_id,
            user_id,
            replay,
        } => (session_id, user_id, replay, true),
        Handshake::Rejected => {
            let _ = sink
                .send(WsMessage::Close(Some(CloseFrame {
                    code: CLOSE_INVALID_SESSION,
                    reason: "invalid session".into(),
                })))
                .await;
            return;
        }
    };

    let connection_id = next_connection_id();
    let cancel = CancellationToken::new();
    let (sender, receiver) = mpsc::channel::<WsMessage>(state.gateway_config.send_queue);

    state
        .gateway
        .register(
            &session_id,
            ConnectionHandle {
                connection_id,
                user_id,
                sender: sender.clone(),
                cancel: cancel.clone(),
            },
        )
        .await;

    // Replay before live delivery so ordering survives the resume.
    for (seq, payload) in replay {
        let frame = replay_frame(seq, &payload);
        if send_frame(&mut sink, &frame).await.is_err() {
            state.gateway.unregister(&session_id, connection_id).await;
            return;
        }
    }
    if resumed {
        let frame = GatewayFrame::control(Opcode::Resumed, serde_json::Value::Null);
        if send_frame(&mut sink, &frame).await.is_err() {
            state.gateway.unregister(&session_id, connection_id).await;
            return;
        }
    }

    let explicit_disconnect = serve(
        &state,
        &session_id,
        sink,
        stream,
        receiver,
        cancel.clone(),
    )
    .await;

    state.gateway.unregister(&session_id, connection_id).await;
    cancel.cancel();

    if explicit_disconnect {
        if let Err(error) = state.gateway_sessions.delete(&session_id).await {
            warn!(%session_id, %error, "failed to drop session after disconnect");
        }
    } else {
        // Keep the record alive for a resume within the TTL window.
        if let Err(error) = state
            .gateway_sessions
            .touch(&session_id, state.gateway_config.session_ttl)
            .await
        {
            debug!(%session_id, %error, "failed to refresh session on teardown");
        }
    }
}

async fn perform_handshake(
    state: &AppState,
    sink: &mut SplitSink<WebSocket, WsMessage>,
    stream: &mut SplitStream<WebSocket>,
) -> AppResult<Handshake> {
    loop {
        let message = stream
            .next()
            .await
            .ok_or_else(|| AppError::Unauthorized("connection closed before identify".to_owned()))?
            .map_err(|error| AppError::Internal(format!("websocket read failed: {error}")))?;

        let frame = match message {
            WsMessage::Text(text) => parse_frame(text.as_str())?,
            WsMessage::Close(_) => {
                return Err(AppError::Unauthorized(
                    "connection closed before identify".to_owned(),
                ));
            }
            // Pings are answered by axum; anything else waits for identify.
            _ => continue,
        };

        match frame.op {
            Opcode::Identify => return identify(state, sink, &frame).await,
            Opcode::Resume => return resume(state, &frame).await,
            _ => {
                return Err(AppError::Unauthorized(
                    "expected identify or resume".to_owned(),
                ));
            }
        }
    }
}

async fn identify(
    state: &AppState,
    sink: &mut SplitSink<WebSocket, WsMessage>,
    frame: &GatewayFrame,
) -> AppResult<Handshake> {
    let token = frame
        .d
        .get("token")
        .and_then(|value| value.as_str())
        .ok_or_else(|| AppError::Validation("identify frame is missing its token".to_owned()))?;

    let user_id = state.auth_service.validate_access_token(token)?;

    let session_id = lodge_application::mint_session_id()?;
    state
        .gateway_sessions
        .create(&session_id, user_id, state.gateway_config.session_ttl)
        .await?;

    let ready = ready_payload(state, &session_id, user_id).await?;
    send_frame(sink, &GatewayFrame::control(Opcode::Ready, ready)).await?;

    Ok(Handshake::Identified {
        session_id,
        user_id,
    })
}

async fn resume(state: &AppState, frame: &GatewayFrame) -> AppResult<Handshake> {
    let session_id = frame
        .d
        .get("session_id")
        .and_then(|value| value.as_str())
        .map(|raw| SessionId::from_string(raw.to_owned()));
    let last_seen = frame.d.get("seq").and_then(serde_json::Value::as_u64);

    let (Some(session_id), Some(last_seen)) = (session_id, last_seen) else {
        return Ok(Handshake::Rejected);
    };

    let Some(record) = state.gateway_sessions.load(&session_id).await? else {
        return Ok(Handshake::Rejected);
    };

    let replay = state
        .gateway_sessions
        .replay_after(&session_id, last_seen)
        .await?;

    // A gap in front of the buffer means events were evicted past the
    // client's cursor; it must re-bootstrap.
    if record.last_seq > last_seen {
        match replay.first() {
            Some((first_seq, _)) if *first_seq == last_seen + 1 => {}
            _ => return Ok(Handshake::Rejected),
        }
    }

    Ok(Handshake::Resumed {
        session_id,
        user_id: record.user_id,
        replay,
    })
}

/// Runs the read loop, write pump, and heartbeat clock until the peer
/// goes away. Returns whether the client disconnected explicitly.
async fn serve(
    state: &AppState,
    session_id: &SessionId,
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut stream: SplitStream<WebSocket>,
    mut receiver: mpsc::Receiver<WsMessage>,
    cancel: CancellationToken,
) -> bool {
    let heartbeat_interval = state.gateway_config.heartbeat_interval;
    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    heartbeat.tick().await;

    let mut last_ack = tokio::time::Instant::now();
    let mut explicit_disconnect = false;

    // The resumed/heartbeat frames below are small; a failed send means
    // the socket is gone and the loop ends on the next iteration.
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = sink.close().await;
                break;
            }

            outbound = receiver.recv() => {
                let Some(message) = outbound else { break };
                if sink.send(message).await.is_err() {
                    break;
                }
            }

            _ = heartbeat.tick() => {
                if last_ack.elapsed() > heartbeat_interval * 2 {
                    debug!(%session_id, "heartbeat grace expired");
                    let _ = sink.close().await;
                    break;
                }
                let frame = GatewayFrame::control(Opcode::Heartbeat, serde_json::Value::Null);
                if send_frame(&mut sink, &frame).await.is_err() {
                    break;
                }
            }

            inbound = stream.next() => {
                let Some(Ok(message)) = inbound else { break };
                match message {
                    WsMessage::Text(text) => {
                        let Ok(frame) = parse_frame(text.as_str()) else { continue };
                        match frame.op {
                            Opcode::HeartbeatAck => last_ack = tokio::time::Instant::now(),
                            Opcode::Heartbeat => {
                                // Client-initiated probe; answer and count
                                // it as liveness.
                                last_ack = tokio::time::Instant::now();
                                let ack = GatewayFrame::control(
                                    Opcode::HeartbeatAck,
                                    serde_json::Value::Null,
                                );
                                if send_frame(&mut sink, &ack).await.is_err() {
                                    break;
                                }
                            }
                            _ => debug!(%session_id, op = ?frame.op, "ignoring unexpected frame"),
                        }
                    }
                    WsMessage::Close(_) => {
                        explicit_disconnect = true;
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    explicit_disconnect
}

async fn ready_payload(
    state: &AppState,
    session_id: &SessionId,
    user_id: UserId,
) -> AppResult<serde_json::Value> {
    let user = state
        .auth_service
        .find_user(user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("account no longer exists".to_owned()))?;
    let channels = state.channel_service.list_visible(user_id).await?;
    let categories = state.channel_service.list_categories().await?;
    let members = state.member_service.list().await?;

    Ok(json!({
        "session_id": session_id.as_str(),
        "user": user,
        "channels": channels,
        "categories": categories,
        "members": members,
    }))
}

fn replay_frame(seq: u64, payload: &serde_json::Value) -> GatewayFrame {
    let name = payload
        .get("t")
        .and_then(|value| value.as_str())
        .unwrap_or_default();
    let data = payload.get("d").cloned().unwrap_or(serde_json::Value::Null);
    GatewayFrame::dispatch(seq, name, data)
}

fn parse_frame(raw: &str) -> AppResult<GatewayFrame> {
    serde_json::from_str(raw)
        .map_err(|error| AppError::Validation(format!("malformed gateway frame: {error}")))
}

async fn send_frame(
    sink: &mut SplitSink<WebSocket, WsMessage>,
    frame: &GatewayFrame,
) -> AppResult<()> {
    let encoded = serde_json::to_string(frame)
        .map_err(|error| AppError::Internal(format!("failed to encode frame: {error}")))?;
    sink.send(WsMessage::Text(encoded.into()))
        .await
        .map_err(|error| AppError::Internal(format!("websocket send failed: {error}")))
}

/// Encodes a dispatch frame for the write queue.
pub(super) fn encode_dispatch(seq: u64, name: &str, payload: &serde_json::Value) -> AppResult<WsMessage> {
    let frame = GatewayFrame::dispatch(seq, name, payload.clone());
    let encoded = serde_json::to_string(&frame)
        .map_err(|error| AppError::Internal(format!("failed to encode frame: {error}")))?;
    Ok(WsMessage::Text(encoded.into()))
}
