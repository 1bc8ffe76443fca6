//! Output fanout: one producer, every attached client.
//!
//! Each session owns a fanout holding the send half of every attached
//! client connection. Delivery order follows call order, which the
//! session pins to PTY production order. A client disconnecting only
//! drops its own registration.

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};

use crate::web::protocol::ServerMessage;
use termgate_types::ClientId;

/// A client connection attached to a session.
#[derive(Debug)]
pub struct ClientConnection {
    pub client_id: ClientId,
    pub identity: String,
    /// True when this connection authenticated as the session owner.
    pub is_owner: bool,
    pub ws_sender: mpsc::UnboundedSender<ServerMessage>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct OutputFanout {
    clients: RwLock<Vec<ClientConnection>>,
}

impl OutputFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_client(
        &self,
        client_id: ClientId,
        identity: String,
        is_owner: bool,
        ws_sender: mpsc::UnboundedSender<ServerMessage>,
    ) {
        let conn = ClientConnection {
            client_id,
            identity,
            is_owner,
            ws_sender,
            joined_at: Utc::now(),
        };
        self.clients.write().await.push(conn);
    }

    /// Remove one client's registration. Returns whether it was the
    /// owner connection, which the caller needs for the
    /// close-on-owner-disconnect policy.
    pub async fn remove_client(&self, client_id: ClientId) -> bool {
        let mut clients = self.clients.write().await;
        let was_owner = clients
            .iter()
            .any(|c| c.client_id == client_id && c.is_owner);
        clients.retain(|c| c.client_id != client_id);
        was_owner
    }

    pub async fn broadcast(&self, message: ServerMessage) {
        let clients = self.clients.read().await;
        for client in clients.iter() {
            // A dropped receiver just means that client is on its way out.
            let _ = client.ws_sender.send(message.clone());
        }
    }

    pub async fn send_to_client(&self, client_id: ClientId, message: ServerMessage) {
        let clients = self.clients.read().await;
        if let Some(client) = clients.iter().find(|c| c.client_id == client_id) {
            let _ = client.ws_sender.send(message);
        }
    }

    pub async fn is_owner(&self, client_id: ClientId) -> bool {
        self.clients
            .read()
            .await
            .iter()
            .any(|c| c.client_id == client_id && c.is_owner)
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn output(data: &str) -> ServerMessage {
        ServerMessage::Output {
            session_id: Uuid::new_v4(),
            data: data.to_string(),
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_client() {
        let fanout = OutputFanout::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        fanout.add_client(Uuid::new_v4(), "a".into(), true, tx1).await;
        fanout.add_client(Uuid::new_v4(), "b".into(), false, tx2).await;

        fanout.broadcast(output("hello")).await;

        assert!(matches!(rx1.recv().await, Some(ServerMessage::Output { .. })));
        assert!(matches!(rx2.recv().await, Some(ServerMessage::Output { .. })));
    }

    #[tokio::test]
    async fn test_remove_client_reports_ownership() {
        let fanout = OutputFanout::new();
        let owner_id = Uuid::new_v4();
        let observer_id = Uuid::new_v4();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        fanout.add_client(owner_id, "a".into(), true, tx1).await;
        fanout.add_client(observer_id, "b".into(), false, tx2).await;

        assert!(!fanout.remove_client(observer_id).await);
        assert_eq!(fanout.client_count().await, 1);
        assert!(fanout.remove_client(owner_id).await);
        assert_eq!(fanout.client_count().await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_order_per_client() {
        let fanout = OutputFanout::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        fanout.add_client(Uuid::new_v4(), "a".into(), true, tx).await;

        fanout.broadcast(output("one")).await;
        fanout.broadcast(output("two")).await;

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        match (first, second) {
            (ServerMessage::Output { data: a, .. }, ServerMessage::Output { data: b, .. }) => {
                assert_eq!(a, "one");
                assert_eq!(b, "two");
            }
            other => panic!("unexpected messages: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dead_client_does_not_break_broadcast() {
        let fanout = OutputFanout::new();
        let (tx1, rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        fanout.add_client(Uuid::new_v4(), "a".into(), true, tx1).await;
        fanout.add_client(Uuid::new_v4(), "b".into(), false, tx2).await;
        drop(rx1);

        fanout.broadcast(output("still delivered")).await;
        assert!(rx2.recv().await.is_some());
    }
}
