use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures_util::{Stream, StreamExt};
use std::convert::Infallible;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tourdesk_shared::DomainEvent;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/events/stream", get(stream_events))
}

fn to_sse(event: &DomainEvent) -> Option<Event> {
    match Event::default().event(event.name()).json_data(event) {
        Ok(sse) => Some(sse),
        Err(e) => {
            tracing::error!("Failed to encode {} event: {}", event.name(), e);
            None
        }
    }
}

async fn stream_events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.sse_tx.subscribe();
    tracing::debug!("Live event subscriber connected ({} total)", state.sse_tx.receiver_count());

    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => to_sse(&event).map(Ok),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!("Live event subscriber lagged, {} events dropped", skipped);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn every_event_encodes() {
        let event = DomainEvent::PaymentRefunded {
            payment_id: Uuid::new_v4(),
            booking_id: Uuid::new_v4(),
            amount_cents: 12_500,
            at: Utc::now(),
        };
        assert!(to_sse(&event).is_some());
    }
}
