//! Server-sent event subscription endpoint
//!
//! Each `GET /events` request gets an in-memory pipe. The write half becomes a
//! [`SubscriberStream`] owned by the hub; the read half is streamed back as the
//! response body. A keep-alive task owns the stream for the lifetime of the
//! request and closes it on the way out.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::Stream;
use tokio::io::DuplexStream;
use tokio_util::io::ReaderStream;

use crate::events::{EventHub, SubscriberStream};

use super::routes::AppState;

/// Pipe capacity between a subscriber stream and its response body
const PIPE_CAPACITY: usize = 64 * 1024;

/// Open a subscriber stream and stream its frames to the client
pub async fn events(State(state): State<AppState>) -> Response {
    let hub = Arc::clone(&state.hub);
    let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);

    let stream = hub.open_subscriber_stream(writer).await;
    if stream.is_active() {
        tokio::spawn(keep_alive(Arc::clone(&hub), Arc::clone(&stream)));
    }

    let body = SseBody {
        frames: ReaderStream::new(reader),
        _guard: DisconnectGuard { hub, stream },
    };

    (
        [(CONTENT_TYPE, "text/event-stream"), (CACHE_CONTROL, "no-cache")],
        Body::from_stream(body),
    )
        .into_response()
}

/// Heartbeat the stream until it closes or the hub stops
async fn keep_alive(hub: Arc<EventHub>, stream: Arc<SubscriberStream>) {
    let mut ticker = tokio::time::interval(hub.config().keepalive_interval);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stream.closed() => break,
            _ = hub.stopped() => break,
            _ = ticker.tick() => {
                if !stream.send_heartbeat().await.is_delivered() {
                    break;
                }
            }
        }
    }

    hub.close_subscriber_stream(&stream).await;
    tracing::debug!(stream_id = stream.id(), "Keep-alive loop finished");
}

/// Response body that closes its stream when dropped
struct SseBody {
    frames: ReaderStream<DuplexStream>,
    _guard: DisconnectGuard,
}

impl Stream for SseBody {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.frames).poll_next(cx)
    }
}

/// Closes the subscriber stream once the client has gone
struct DisconnectGuard {
    hub: Arc<EventHub>,
    stream: Arc<SubscriberStream>,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let hub = Arc::clone(&self.hub);
        let stream = Arc::clone(&self.stream);

        // Outside a runtime the heartbeat or idle reaping still removes it
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if stream.is_active() {
                    tracing::debug!(stream_id = stream.id(), "Subscriber disconnected");
                }
                hub.close_subscriber_stream(&stream).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::events::event::{drain_frames, CONNECTED};
    use crate::events::{BroadcastConfig, Event};
    use crate::server::routes::tests::test_state;
    use crate::server::routes::router;

    async fn next_events(body: &mut Body, count: usize) -> Vec<Event> {
        let mut events = Vec::new();
        let mut text = String::new();

        tokio::time::timeout(Duration::from_secs(5), async {
            while events.len() < count {
                let frame = body.frame().await.expect("body ended").unwrap();
                if let Ok(data) = frame.into_data() {
                    text.push_str(std::str::from_utf8(&data).unwrap());
                    events.extend(drain_frames(&mut text));
                }
            }
        })
        .await
        .expect("timed out waiting for events");

        events
    }

    async fn wait_for_size(hub: &EventHub, size: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while hub.registry_size().await != size {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("registry size never reached");
    }

    #[tokio::test]
    async fn test_events_streams_greeting_then_published() {
        let state = test_state(BroadcastConfig::default());
        let hub = Arc::clone(&state.hub);

        let response = router(state)
            .oneshot(Request::get("/events").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/event-stream");
        assert_eq!(response.headers()[CACHE_CONTROL], "no-cache");

        let mut body = response.into_body();
        let greeting = next_events(&mut body, 1).await;
        assert_eq!(greeting[0].kind, CONNECTED);
        assert_eq!(hub.registry_size().await, 1);

        hub.publish_event("connection_created", json!({"id": "c1"}));
        let events = next_events(&mut body, 1).await;
        assert_eq!(events[0].kind, "connection_created");

        hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_dropping_body_removes_subscriber() {
        let state = test_state(BroadcastConfig::default());
        let hub = Arc::clone(&state.hub);

        let response = router(state)
            .oneshot(Request::get("/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        wait_for_size(&hub, 1).await;

        drop(response);
        wait_for_size(&hub, 0).await;

        hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_keep_alive_heartbeats() {
        let config = BroadcastConfig::default().keepalive_interval(Duration::from_millis(50));
        let state = test_state(config);
        let hub = Arc::clone(&state.hub);

        let response = router(state)
            .oneshot(Request::get("/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let mut body = response.into_body();

        let events = next_events(&mut body, 2).await;
        assert_eq!(events[0].kind, CONNECTED);
        assert!(events[1].is_heartbeat());

        hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_body_ends_on_hub_shutdown() {
        let state = test_state(BroadcastConfig::default());
        let hub = Arc::clone(&state.hub);

        let response = router(state)
            .oneshot(Request::get("/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let mut body = response.into_body();
        next_events(&mut body, 1).await;

        hub.shutdown().await;

        let rest = tokio::time::timeout(Duration::from_secs(2), body.collect())
            .await
            .expect("body did not end")
            .unwrap()
            .to_bytes();
        let mut text = String::from_utf8(rest.to_vec()).unwrap();
        assert!(drain_frames(&mut text).iter().all(|e| e.is_heartbeat()));
    }
}
