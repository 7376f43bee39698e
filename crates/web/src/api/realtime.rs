use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use axum_extra::TypedHeader;
use futures::stream::Stream;
use parking::database::Database;
use tokio_stream::StreamExt as _;

use crate::WebState;

/// Name of the SSE event carrying `{ id, status }` of a changed spot.
pub const STATUS_UPDATE_EVENT: &str = "statusUpdate";

/// Streams every committed status change until the client disconnects.
/// Nothing published before the connection was opened is replayed.
pub(crate) async fn status_updates<D: Database>(
    user_agent: Option<TypedHeader<headers::UserAgent>>,
    State(WebState { parking_client }): State<WebState<D>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = parking_client.subscribe();
    log::info!(
        "[{}] `{}` connected to status updates as subscriber {}",
        parking_client.id(),
        user_agent
            .as_ref()
            .map(|TypedHeader(agent)| agent.as_str())
            .unwrap_or("unknown client"),
        subscription.id()
    );

    let stream = subscription.filter_map(|update| {
        match Event::default().event(STATUS_UPDATE_EVENT).json_data(&update) {
            Ok(event) => Some(Ok(event)),
            Err(why) => {
                log::error!("could not encode status update of spot {}: {}", update.id, why);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
