//! Named trace channels.
//!
//! Each function below corresponds to one named trace point the hybrid
//! pipeline emits at. IDs are logged as an 8-char prefix only — never in
//! full, and never alongside key material.

fn short(id: &str) -> &str {
    if id.len() > 8 {
        &id[..8]
    } else {
        id
    }
}

pub fn live_mvp_route_trace(conversation_id: &str, message_id: &str, route: &str) {
    tracing::debug!(
        target: "engine",
        event = "liveMvpRouteTrace",
        conversation_id = short(conversation_id),
        message_id = short(message_id),
        route,
    );
}

pub fn live_mvp_result_trace(conversation_id: &str, message_id: &str, ok: bool, reason: &str) {
    tracing::info!(
        target: "engine",
        event = "liveMvpResultTrace",
        conversation_id = short(conversation_id),
        message_id = short(message_id),
        ok,
        reason,
    );
}

pub fn decision_trace(event_type: &str, action: &str, reason: &str) {
    tracing::debug!(
        target: "engine",
        event = "decisionTrace",
        event_type,
        action,
        reason,
    );
}

pub fn scroll_fetch_route_trace(conversation_id: &str, cursor_id: Option<&str>, fetched: usize) {
    tracing::debug!(
        target: "engine",
        event = "scrollFetchRouteTrace",
        conversation_id = short(conversation_id),
        cursor_id = cursor_id.map(short),
        fetched,
    );
}

pub fn max_counter_probe_trace(conversation_id: &str, sender_device_id: &str, max_counter: u64) {
    tracing::debug!(
        target: "engine",
        event = "maxCounterProbeTrace",
        conversation_id = short(conversation_id),
        sender_device_id = short(sender_device_id),
        max_counter,
    );
}

pub fn commit_notify_trace(conversation_id: &str, message_id: &str, counter: u64) {
    tracing::info!(
        target: "engine",
        event = "commitNotifyTrace",
        conversation_id = short(conversation_id),
        message_id = short(message_id),
        counter,
    );
}
