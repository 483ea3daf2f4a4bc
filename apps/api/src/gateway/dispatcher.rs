//! Event-bus subscriber delivering envelopes to local sessions.

use lodge_core::AppResult;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::state::AppState;

use super::connection::encode_dispatch;

/// Consumes the event bus and fans frames out to locally connected
/// sessions.
///
/// Runs under the supervisor; a transport failure propagates out and the
/// restart re-subscribes. Per-session writes go through each connection's
/// bounded queue: a slow consumer is disconnected instead of ever
/// blocking this loop.
pub async fn run_dispatcher(state: AppState, shutdown: CancellationToken) -> AppResult<()> {
    let mut receiver = state.event_bus.subscribe().await?;

    loop {
        let envelope = tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            envelope = receiver.recv() => envelope?,
        };

        let targets = state.gateway.sessions_for(&envelope.recipients).await;
        if targets.is_empty() {
            continue;
        }

        let buffered = json!({ "t": envelope.name, "d": envelope.payload });

        for (session_id, handle) in targets {
            let seq = match state
                .gateway_sessions
                .append_event(&session_id, &buffered, state.gateway_config.session_ttl)
                .await
            {
                Ok(seq) => seq,
                Err(error) => {
                    // Session expired between registry and store; the
                    // connection will fail its next heartbeat.
                    debug!(%session_id, %error, "skipping dead session");
                    continue;
                }
            };

            let message = match encode_dispatch(seq, &envelope.name, &envelope.payload) {
                Ok(message) => message,
                Err(error) => {
                    warn!(%error, "failed to encode dispatch frame");
                    continue;
                }
            };

            if handle.sender.try_send(message).is_err() {
                // Queue full or receiver gone: drop the connection rather
                // than stalling dispatch for everyone else.
                warn!(%session_id, "send queue saturated; dropping connection");
                handle.cancel.cancel();
            }
        }
    }
}
