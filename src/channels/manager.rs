/**
 * Connection Manager
 *
 * Registry of every live WebSocket client, grouped by channel. A channel
 * comes into existence with its first subscriber and disappears with its
 * last.
 *
 * # Per-Client Queues
 *
 * Each client is backed by a `tokio::sync::broadcast` channel of bounded
 * depth. The socket writer task drains it; when a client falls behind,
 * the queue drops its oldest frames (the writer observes `Lagged` and
 * logs the skipped count). This keeps one stuck consumer from ever
 * blocking fan-out to the rest of the channel.
 *
 * # Thread Safety
 *
 * The registry is an `RwLock`-guarded map; broadcasts take a read lock
 * and only registration changes take the write lock.
 */

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::channels::envelope::Envelope;

/// Snapshot of fabric-wide connection statistics
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FabricStats {
    pub total_channels: usize,
    pub channels: HashMap<String, usize>,
    pub total_connections: usize,
}

/// Reasons a connection attempt is refused
#[derive(Debug, PartialEq, Eq)]
pub enum ConnectError {
    /// The requested channel is not in the allow-list (close code 1008)
    UnknownChannel(String),
}

struct ClientSlot {
    queue: broadcast::Sender<String>,
}

/// Registry of channels and their connected clients
pub struct ConnectionManager {
    channels: RwLock<HashMap<String, HashMap<String, ClientSlot>>>,
    allowed: HashSet<String>,
    queue_depth: usize,
}

impl ConnectionManager {
    /// Create a manager with the given channel allow-list and per-client
    /// queue depth.
    pub fn new(allowed: impl IntoIterator<Item = String>, queue_depth: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            allowed: allowed.into_iter().collect(),
            queue_depth: queue_depth.max(1),
        }
    }

    /// Whether `channel` is served by this fabric
    pub fn is_allowed(&self, channel: &str) -> bool {
        self.allowed.contains(channel)
    }

    /// Register a client on a channel.
    ///
    /// Generates a client id when none is supplied; a supplied id that
    /// collides with a live client on the same channel gets a
    /// disambiguating suffix. The welcome `connection` envelope is queued
    /// before this returns, so it is always the first frame the client
    /// receives.
    ///
    /// # Returns
    ///
    /// The (possibly adjusted) client id and the receiving end of the
    /// client's frame queue.
    pub async fn connect(
        &self,
        channel: &str,
        requested_id: Option<String>,
    ) -> Result<(String, broadcast::Receiver<String>), ConnectError> {
        if !self.is_allowed(channel) {
            return Err(ConnectError::UnknownChannel(channel.to_string()));
        }

        let mut channels = self.channels.write().await;
        let clients = channels.entry(channel.to_string()).or_default();

        let mut client_id = requested_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if clients.contains_key(&client_id) {
            let suffix = Uuid::new_v4().simple().to_string();
            client_id = format!("{}-{}", client_id, &suffix[..8]);
        }

        let (queue, receiver) = broadcast::channel(self.queue_depth);
        let welcome = Envelope::connection(channel, &client_id);
        if let Ok(frame) = serde_json::to_string(&welcome) {
            let _ = queue.send(frame);
        }
        clients.insert(client_id.clone(), ClientSlot { queue });

        tracing::info!(
            "[Channels] Client {} connected to channel '{}'. Total clients: {}",
            client_id,
            channel,
            clients.len()
        );

        Ok((client_id, receiver))
    }

    /// Remove a client; drops the channel itself when it empties
    pub async fn disconnect(&self, channel: &str, client_id: &str) {
        let mut channels = self.channels.write().await;
        if let Some(clients) = channels.get_mut(channel) {
            if clients.remove(client_id).is_some() {
                tracing::info!(
                    "[Channels] Client {} disconnected from channel '{}'. Remaining: {}",
                    client_id,
                    channel,
                    clients.len()
                );
            }
            if clients.is_empty() {
                channels.remove(channel);
            }
        }
    }

    /// Queue a frame for one specific client
    pub async fn send_to_client(&self, channel: &str, client_id: &str, envelope: &Envelope) {
        let frame = match serde_json::to_string(envelope) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(subsystem = "channels", channel, error = %e, "frame did not serialize");
                return;
            }
        };

        let channels = self.channels.read().await;
        if let Some(slot) = channels.get(channel).and_then(|c| c.get(client_id)) {
            let _ = slot.queue.send(frame);
        }
    }

    /// Broadcast an envelope to every client on a channel, optionally
    /// excluding one (origin suppression).
    ///
    /// The frame is serialized once and the channel name stamped before
    /// fan-out. Clients whose queues are gone are unregistered afterwards.
    ///
    /// # Returns
    ///
    /// The number of clients the frame was queued for.
    pub async fn broadcast_to_channel(
        &self,
        channel: &str,
        envelope: Envelope,
        exclude_client: Option<&str>,
    ) -> usize {
        let envelope = envelope.with_channel(channel);
        let frame = match serde_json::to_string(&envelope) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(subsystem = "channels", channel, error = %e, "frame did not serialize");
                return 0;
            }
        };

        let mut dead: Vec<String> = Vec::new();
        let mut delivered = 0;
        {
            let channels = self.channels.read().await;
            let Some(clients) = channels.get(channel) else {
                return 0;
            };

            for (client_id, slot) in clients {
                if exclude_client == Some(client_id.as_str()) {
                    continue;
                }
                match slot.queue.send(frame.clone()) {
                    Ok(_) => delivered += 1,
                    Err(_) => dead.push(client_id.clone()),
                }
            }
        }

        for client_id in dead {
            tracing::warn!(
                subsystem = "channels",
                channel,
                client_id = %client_id,
                "send failed, unregistering client"
            );
            self.disconnect(channel, &client_id).await;
        }

        delivered
    }

    /// Broadcast an envelope to every active channel (administrative
    /// notices: maintenance, shutdown).
    pub async fn broadcast_to_all_channels(&self, envelope: Envelope) -> usize {
        let names: Vec<String> = {
            let channels = self.channels.read().await;
            channels.keys().cloned().collect()
        };

        let mut delivered = 0;
        for name in names {
            delivered += self
                .broadcast_to_channel(&name, envelope.clone(), None)
                .await;
        }
        delivered
    }

    /// Connection statistics in O(channels)
    pub async fn stats(&self) -> FabricStats {
        let channels = self.channels.read().await;
        let per_channel: HashMap<String, usize> = channels
            .iter()
            .map(|(name, clients)| (name.clone(), clients.len()))
            .collect();
        FabricStats {
            total_channels: per_channel.len(),
            total_connections: per_channel.values().sum(),
            channels: per_channel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(vec!["users".to_string(), "media".to_string()], 16)
    }

    #[tokio::test]
    async fn test_unknown_channel_is_rejected() {
        let m = manager();
        let result = m.connect("posts", None).await;
        assert_eq!(
            result.err(),
            Some(ConnectError::UnknownChannel("posts".to_string()))
        );
    }

    #[tokio::test]
    async fn test_connect_sends_welcome_first() {
        let m = manager();
        let (client_id, mut rx) = m.connect("users", Some("c1".to_string())).await.unwrap();
        assert_eq!(client_id, "c1");

        let frame = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "connection");
        assert_eq!(value["channel"], "users");
        assert_eq!(value["client_id"], "c1");
    }

    #[tokio::test]
    async fn test_colliding_client_id_gets_suffix() {
        let m = manager();
        let (first, _rx1) = m.connect("users", Some("dup".to_string())).await.unwrap();
        let (second, _rx2) = m.connect("users", Some("dup".to_string())).await.unwrap();
        assert_eq!(first, "dup");
        assert_ne!(second, "dup");
        assert!(second.starts_with("dup-"));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_but_excluded() {
        let m = manager();
        let (_a, mut rx_a) = m.connect("users", Some("a".to_string())).await.unwrap();
        let (_b, mut rx_b) = m.connect("users", Some("b".to_string())).await.unwrap();

        // Drain welcome frames
        rx_a.recv().await.unwrap();
        rx_b.recv().await.unwrap();

        let delivered = m
            .broadcast_to_channel(
                "users",
                Envelope::model_event("created", "users", serde_json::json!({"id": 1})),
                Some("a"),
            )
            .await;
        assert_eq!(delivered, 1);

        let frame = rx_b.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "created");
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_frames_keep_emission_order() {
        let m = manager();
        let (_id, mut rx) = m.connect("users", Some("c".to_string())).await.unwrap();
        rx.recv().await.unwrap();

        for i in 0..5 {
            m.broadcast_to_channel(
                "users",
                Envelope::model_event("updated", "users", serde_json::json!({ "seq": i })),
                None,
            )
            .await;
        }

        for i in 0..5 {
            let frame = rx.recv().await.unwrap();
            let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
            assert_eq!(value["data"]["seq"], i);
        }
    }

    #[tokio::test]
    async fn test_stats_counts_channels_and_clients() {
        let m = manager();
        let (_a, _rx_a) = m.connect("users", None).await.unwrap();
        let (_b, _rx_b) = m.connect("users", None).await.unwrap();
        let (_c, _rx_c) = m.connect("media", None).await.unwrap();

        let stats = m.stats().await;
        assert_eq!(stats.total_channels, 2);
        assert_eq!(stats.total_connections, 3);
        assert_eq!(stats.channels["users"], 2);
        assert_eq!(stats.channels["media"], 1);
    }

    #[tokio::test]
    async fn test_disconnect_drops_empty_channel() {
        let m = manager();
        let (id, _rx) = m.connect("users", None).await.unwrap();
        m.disconnect("users", &id).await;
        let stats = m.stats().await;
        assert_eq!(stats.total_channels, 0);
        assert_eq!(stats.total_connections, 0);
    }
}
