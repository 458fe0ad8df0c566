use crate::{handlers::AppState, metrics, record::Record};
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

fn record_event(record: &Record) -> Result<Event, Infallible> {
    Ok(Event::default().data(record.to_json_row()))
}

/// Handle GET /dataevents
///
/// Replays the recent-sample ring oldest first, then forwards every new
/// sample as it is logged.
pub async fn handle_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let live = state.logger.live().clone();
    let subscription = live.attach();
    metrics::set_live_subscribers(live.subscriber_count());
    tracing::debug!(replay = subscription.replay.len(), "Live subscriber attached");

    let replay = stream::iter(subscription.replay.into_iter().map(|r| record_event(&r)));

    let updates = stream::unfold(subscription.receiver, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(record) => return Some((record_event(&record), rx)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Live subscriber lagging, rows skipped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    let mut shutdown = state.shutdown.subscribe();
    let stream = replay.chain(updates).take_until(async move {
        let _ = shutdown.recv().await;
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(state.live.keep_alive_secs)))
}
