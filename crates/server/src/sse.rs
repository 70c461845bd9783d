use std::convert::Infallible;

use axum::extract::State;
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures::stream;
use tracing::debug;

use crate::api::ApiState;

/// `GET /events` - the live stream behind the console. New subscribers get
/// one `connection-status` replay per known service, then live messages;
/// dropping the connection unregisters the subscription from the hub.
pub async fn events(State(state): State<ApiState>) -> impl IntoResponse {
    let subscription = state.core.hub.subscribe();
    debug!(subscribers = state.core.hub.subscriber_count(), "sse subscriber connected");

    let stream = stream::unfold(subscription, |mut subscription| async move {
        let message = subscription.recv().await?;
        Some((Ok::<Event, Infallible>(Event::default().data(message)), subscription))
    });

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Sse::new(stream).keep_alive(KeepAlive::default()),
    )
}
