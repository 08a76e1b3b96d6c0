use axum::extract::ws::Message;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// Server-allocated identifier of one WebSocket connection. Changes on every reconnect.
pub type ConnectionId = Uuid;

/// Handle used to push frames to a connected client.
#[derive(Clone)]
pub struct ClientConnection {
    pub id: ConnectionId,
    /// Routing hint taken from the `teamId` query parameter at connect time.
    pub team_id: Option<String>,
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Registry of open sockets keyed by connection id.
#[derive(Default)]
pub struct ConnectionHub {
    connections: DashMap<ConnectionId, ClientConnection>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection: ClientConnection) {
        self.connections.insert(connection.id, connection);
    }

    pub fn unregister(&self, id: ConnectionId) {
        self.connections.remove(&id);
    }

    pub fn team_hint(&self, id: ConnectionId) -> Option<String> {
        self.connections
            .get(&id)
            .and_then(|connection| connection.team_id.clone())
    }

    /// Serialize `value` and queue it for connection `id`.
    ///
    /// Returns `false` when the connection is unknown or its writer is gone;
    /// a closed writer is dropped from the hub.
    pub fn send<T>(&self, id: ConnectionId, value: &T) -> bool
    where
        T: ?Sized + Serialize,
    {
        let Some(tx) = self.connections.get(&id).map(|c| c.tx.clone()) else {
            return false;
        };

        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(connection_id = %id, error = %err, "failed to serialize outbound frame");
                return false;
            }
        };

        if tx.send(Message::Text(payload.into())).is_err() {
            self.connections.remove(&id);
            return false;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_reaches_registered_connection() {
        let hub = ConnectionHub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        hub.register(ClientConnection {
            id,
            team_id: Some("team-a".into()),
            tx,
        });

        assert!(hub.send(id, &serde_json::json!({"type": "ping"})));
        match rx.try_recv().unwrap() {
            Message::Text(text) => assert_eq!(text.as_str(), r#"{"type":"ping"}"#),
            other => panic!("unexpected frame {other:?}"),
        }
        assert_eq!(hub.team_hint(id).as_deref(), Some("team-a"));
    }

    #[test]
    fn closed_writer_is_dropped() {
        let hub = ConnectionHub::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        hub.register(ClientConnection {
            id,
            team_id: None,
            tx,
        });
        drop(rx);

        assert!(!hub.send(id, "hello"));
        assert!(hub.is_empty());
    }
}
