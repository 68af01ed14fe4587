//! Event stream responses.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::body::Body;
use axum::http::header::{self, HeaderName};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use textcast_core::{StreamSession, wire};
use tracing::warn;

use crate::server::AppState;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Counts one open stream response for as long as it is alive.
struct OpenStream(Arc<AtomicUsize>);

impl OpenStream {
    fn track(counter: &Arc<AtomicUsize>) -> Self {
        let _ = counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for OpenStream {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Open a stream session and wrap it in a never-ending response.
///
/// The session is torn down when the body is dropped, which is how hyper
/// reports a client disconnect.
pub fn event_stream(state: &AppState) -> Response {
    let session = StreamSession::open(&state.bus, &state.session, state.shutdown.stream_token());
    let session_id = session.id().clone();
    let framing = state.framing;
    let open = OpenStream::track(&state.open_streams);

    let body = session.into_stream().filter_map(move |frame| {
        // Owned by the body; the count drops with it.
        let _open = &open;
        let chunk = match wire::encode(&frame, framing) {
            Ok(bytes) => Some(Ok::<_, Infallible>(bytes)),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "failed to encode frame");
                None
            }
        };
        futures::future::ready(chunk)
    });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (header::CONNECTION, "keep-alive"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}
