//! Event dashboard: the page, the topic listing and the live socket.
//!
//! # Socket protocol
//!
//! `/topic/events` is the only topic a client may subscribe to; anything else
//! is answered with an `error` message.
//!
//! **Client → Server:**
//! ```json
//! { "type": "subscribe", "topics": ["/topic/events"] }
//! { "type": "unsubscribe", "topics": ["/topic/events"] }
//! { "type": "ping" }
//! ```
//!
//! **Server → Client:**
//! ```json
//! { "type": "subscribed", "topics": ["/topic/events"] }
//! { "type": "event", "topic": "/topic/events", "event": { "id": "...", "type": "CREATED", ... } }
//! ```

use super::pages::escape_html;
use crate::state::AppState;
use axum::{
    Json,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{Html, Response},
};
use catalog_core::event::DashboardEvent;
use catalog_core::event_bus::{EventBus, EventBusError};
use catalog_core::topics;
use catalog_runtime::TopicBroadcaster;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const PAGE: &str = include_str!("../../assets/kafka-ui.html");

/// Outbound messages buffered per connection.
const OUTBOUND_BUFFER: usize = 256;

/// Broadcaster topics a client may subscribe to.
const SUBSCRIBABLE: &[&str] = &[topics::DASHBOARD_EVENTS];

/// Message from a dashboard client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Start receiving `topics`
    Subscribe {
        /// Broadcaster topics
        topics: Vec<String>,
    },
    /// Stop receiving `topics`
    Unsubscribe {
        /// Broadcaster topics
        topics: Vec<String>,
    },
    /// Keep-alive
    Ping,
}

/// Message to a dashboard client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Subscription confirmed
    Subscribed {
        /// Topics now active
        topics: Vec<String>,
    },
    /// Unsubscription confirmed
    Unsubscribed {
        /// Topics removed
        topics: Vec<String>,
    },
    /// An event on a subscribed topic
    Event {
        /// Broadcaster topic
        topic: String,
        /// The consumed record
        event: DashboardEvent,
    },
    /// Reply to `ping`
    Pong,
    /// The client sent something unparseable or asked for an unknown topic
    Error {
        /// What went wrong
        message: String,
    },
}

/// Broker topics, excluding internal ones.
///
/// # Errors
///
/// Returns the broker error if the topic listing fails.
pub async fn visible_topics(bus: &dyn EventBus) -> Result<Vec<String>, EventBusError> {
    let mut names: Vec<String> = bus
        .list_topics()
        .await?
        .into_iter()
        .filter(|name| !topics::is_internal(name))
        .collect();
    names.sort();
    Ok(names)
}

async fn topics_or_empty(state: &AppState) -> Vec<String> {
    let Some(bus) = &state.bus else {
        return Vec::new();
    };
    match visible_topics(bus.as_ref()).await {
        Ok(names) => names,
        Err(e) => {
            tracing::error!(error = %e, "Error getting topics");
            Vec::new()
        },
    }
}

/// Dashboard page with the current topic list.
///
/// # Endpoint
///
/// ```text
/// GET /kafka-ui
/// ```
pub async fn page(State(state): State<AppState>) -> Html<String> {
    let mut items = String::new();
    for name in topics_or_empty(&state).await {
        let _ = write!(items, "<li>{}</li>", escape_html(&name));
    }
    Html(PAGE.replace("{{topics}}", &items))
}

/// Topic names as JSON. Broker errors yield an empty list.
///
/// # Endpoint
///
/// ```text
/// GET /kafka-ui/topics
/// ```
pub async fn list_topics(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(topics_or_empty(&state).await)
}

/// Upgrade to the dashboard socket.
///
/// # Endpoint
///
/// ```text
/// GET /ws/events
/// ```
#[allow(clippy::unused_async)]
pub async fn events_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    tracing::info!("Dashboard socket requested");
    let broadcaster = state.dashboard.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster))
}

/// Forward `topic` from `broadcaster` into `tx` until either side goes away.
///
/// The subscription is registered before this returns, so events published
/// afterwards are not missed.
pub async fn spawn_forwarder(
    broadcaster: &TopicBroadcaster<DashboardEvent>,
    topic: String,
    tx: mpsc::Sender<ServerMessage>,
) -> JoinHandle<()> {
    let mut events = broadcaster.stream(topic.clone()).await;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = tx.closed() => break,
                next = events.next() => {
                    let Some(event) = next else { break };
                    let message = ServerMessage::Event { topic: topic.clone(), event };
                    if tx.send(message).await.is_err() {
                        break;
                    }
                },
            }
        }
        tracing::debug!(topic = %topic, "Forwarder stopped");
    })
}

/// Per-connection subscription state.
struct Session {
    broadcaster: TopicBroadcaster<DashboardEvent>,
    tx: mpsc::Sender<ServerMessage>,
    forwarders: HashMap<String, JoinHandle<()>>,
}

impl Session {
    fn new(broadcaster: TopicBroadcaster<DashboardEvent>, tx: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            broadcaster,
            tx,
            forwarders: HashMap::new(),
        }
    }

    async fn apply(&mut self, message: ClientMessage) -> ServerMessage {
        match message {
            ClientMessage::Subscribe { topics } => {
                let unknown: Vec<&str> = topics
                    .iter()
                    .map(String::as_str)
                    .filter(|topic| !SUBSCRIBABLE.contains(topic))
                    .collect();
                if !unknown.is_empty() {
                    tracing::warn!(?unknown, "Dashboard client asked for unknown topics");
                    return ServerMessage::Error {
                        message: format!("Unknown topics: {}", unknown.join(", ")),
                    };
                }

                for topic in &topics {
                    if !self.forwarders.contains_key(topic) {
                        let handle = spawn_forwarder(&self.broadcaster, topic.clone(), self.tx.clone()).await;
                        self.forwarders.insert(topic.clone(), handle);
                    }
                }
                tracing::debug!(?topics, "Dashboard client subscribed");
                ServerMessage::Subscribed { topics }
            },
            ClientMessage::Unsubscribe { topics } => {
                for topic in &topics {
                    if let Some(handle) = self.forwarders.remove(topic) {
                        handle.abort();
                    }
                }
                tracing::debug!(?topics, "Dashboard client unsubscribed");
                ServerMessage::Unsubscribed { topics }
            },
            ClientMessage::Ping => ServerMessage::Pong,
        }
    }

    fn close(self) {
        for handle in self.forwarders.into_values() {
            handle.abort();
        }
    }
}

async fn handle_socket(socket: WebSocket, broadcaster: TopicBroadcaster<DashboardEvent>) {
    tracing::info!("Dashboard socket connected");
    let (mut sink, mut source) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(OUTBOUND_BUFFER);

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode dashboard message");
                    continue;
                },
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        let mut session = Session::new(broadcaster, tx.clone());

        while let Some(Ok(message)) = source.next().await {
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let reply = match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => session.apply(message).await,
                Err(e) => {
                    tracing::warn!(error = %e, "Unparseable dashboard message");
                    ServerMessage::Error { message: e.to_string() }
                },
            };

            if tx.send(reply).await.is_err() {
                break;
            }
        }

        session.close();
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    tracing::info!("Dashboard socket closed");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use catalog_core::environment::Clock;
    use catalog_core::event::ProductEventType;
    use catalog_core::topics::DASHBOARD_EVENTS;
    use catalog_testing::test_clock;

    fn event() -> DashboardEvent {
        DashboardEvent {
            id: "e-1".into(),
            topic: "product-events".into(),
            partition: 0,
            offset: 7,
            key: Some("3".into()),
            value: r#"{"productId":3}"#.into(),
            timestamp: test_clock().now(),
            event_type: ProductEventType::Updated,
        }
    }

    #[test]
    fn client_messages_use_type_tag() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","topics":["/topic/events"]}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Subscribe {
                topics: vec!["/topic/events".into()]
            }
        );
        assert_eq!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"ping"}"#).unwrap(),
            ClientMessage::Ping
        );
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"shout"}"#).is_err());
    }

    #[test]
    fn event_message_shape() {
        let json = serde_json::to_value(ServerMessage::Event {
            topic: DASHBOARD_EVENTS.into(),
            event: event(),
        })
        .unwrap();

        assert_eq!(json["type"], "event");
        assert_eq!(json["topic"], "/topic/events");
        assert_eq!(json["event"]["type"], "UPDATED");
        assert_eq!(json["event"]["offset"], 7);
    }

    #[tokio::test]
    async fn forwarder_relays_broadcast_events() {
        let broadcaster = TopicBroadcaster::new();
        let (tx, mut rx) = mpsc::channel(8);
        let handle = spawn_forwarder(&broadcaster, DASHBOARD_EVENTS.into(), tx).await;

        broadcaster.publish("other", event()).await;
        broadcaster.publish(DASHBOARD_EVENTS, event()).await;

        let message = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match message {
            ServerMessage::Event { topic, event } => {
                assert_eq!(topic, DASHBOARD_EVENTS);
                assert_eq!(event.offset, 7);
            },
            other => panic!("unexpected message: {other:?}"),
        }
        handle.abort();
    }

    #[tokio::test]
    async fn forwarder_stops_when_receiver_drops() {
        let broadcaster = TopicBroadcaster::<DashboardEvent>::new();
        let (tx, rx) = mpsc::channel(8);
        let handle = spawn_forwarder(&broadcaster, DASHBOARD_EVENTS.into(), tx).await;

        drop(rx);
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("forwarder should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_topics_do_not_allocate_channels() {
        let broadcaster = TopicBroadcaster::<DashboardEvent>::new();
        let (tx, _rx) = mpsc::channel(8);
        let mut session = Session::new(broadcaster.clone(), tx);

        for n in 0..5000 {
            let reply = session
                .apply(ClientMessage::Subscribe {
                    topics: vec![format!("junk-{n}")],
                })
                .await;
            assert!(matches!(reply, ServerMessage::Error { .. }));
        }

        let reply = session
            .apply(ClientMessage::Subscribe {
                topics: vec![DASHBOARD_EVENTS.into(), "junk".into()],
            })
            .await;
        assert!(matches!(reply, ServerMessage::Error { .. }));

        assert_eq!(broadcaster.topic_count().await, 0);
        session.close();
    }

    #[tokio::test]
    async fn session_subscribes_to_dashboard_topic_once() {
        let broadcaster = TopicBroadcaster::<DashboardEvent>::new();
        let (tx, _rx) = mpsc::channel(8);
        let mut session = Session::new(broadcaster.clone(), tx);

        for _ in 0..2 {
            let reply = session
                .apply(ClientMessage::Subscribe {
                    topics: vec![DASHBOARD_EVENTS.into()],
                })
                .await;
            assert!(matches!(reply, ServerMessage::Subscribed { .. }));
        }
        assert_eq!(broadcaster.topic_count().await, 1);
        assert_eq!(broadcaster.subscriber_count(DASHBOARD_EVENTS).await, 1);

        let reply = session
            .apply(ClientMessage::Unsubscribe {
                topics: vec![DASHBOARD_EVENTS.into()],
            })
            .await;
        assert!(matches!(reply, ServerMessage::Unsubscribed { .. }));
        assert!(matches!(session.apply(ClientMessage::Ping).await, ServerMessage::Pong));
        session.close();
    }
}
