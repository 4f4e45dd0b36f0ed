//! Registry of live device links
//!
//! Maps a device id to the handle of its open connection. Links insert
//! themselves once connected and remove themselves when the connection
//! ends; the coordinator reads the map during sweeps and status queries.
//! Each connection carries an epoch so a link that closes late cannot evict
//! the newer connection that replaced it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use punchsync_core::Command;

/// Request sent from the coordinator to a link task
#[derive(Debug)]
pub(crate) enum LinkCommand {
    /// Write a command; reply with whether it reached the socket
    Send(Command, oneshot::Sender<bool>),
}

/// Handle to a connected link
#[derive(Debug, Clone)]
pub struct LinkHandle {
    device_id: String,
    epoch: u64,
    peer: String,
    commands: mpsc::Sender<LinkCommand>,
}

impl LinkHandle {
    pub(crate) fn new(
        device_id: impl Into<String>,
        epoch: u64,
        peer: impl Into<String>,
        commands: mpsc::Sender<LinkCommand>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            epoch,
            peer: peer.into(),
            commands,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Remote address of the connection
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Ask the link to write `command`
    ///
    /// Returns `false` if the link is gone, already has a full command
    /// queue, or the write failed. Never waits for queue space.
    pub async fn request(&self, command: Command) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();

        if let Err(e) = self.commands.try_send(LinkCommand::Send(command, reply_tx)) {
            debug!("{} not queued for {}: {}", command, self.device_id, e);
            return false;
        }

        reply_rx.await.unwrap_or(false)
    }

    pub async fn request_sync(&self) -> bool {
        self.request(Command::Sync).await
    }
}

/// Concurrency-safe map of live links
#[derive(Debug, Clone, Default)]
pub struct LinkRegistry {
    links: Arc<RwLock<HashMap<String, LinkHandle>>>,
    epochs: Arc<AtomicU64>,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a connection epoch
    pub fn next_epoch(&self) -> u64 {
        self.epochs.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Register a live link, replacing any previous one for the device
    pub fn insert(&self, handle: LinkHandle) -> Option<LinkHandle> {
        self.links.write().insert(handle.device_id.clone(), handle)
    }

    /// Deregister a link if `epoch` is still the registered connection
    pub fn remove(&self, device_id: &str, epoch: u64) -> bool {
        let mut links = self.links.write();

        match links.get(device_id) {
            Some(handle) if handle.epoch == epoch => {
                links.remove(device_id);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, device_id: &str) -> Option<LinkHandle> {
        self.links.read().get(device_id).cloned()
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.links.read().contains_key(device_id)
    }

    /// Ids of connected devices, sorted
    pub fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.links.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.links.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.read().is_empty()
    }

    pub fn clear(&self) {
        self.links.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn handle(
        registry: &LinkRegistry,
        device_id: &str,
    ) -> (LinkHandle, mpsc::Receiver<LinkCommand>) {
        let (tx, rx) = mpsc::channel(1);
        (LinkHandle::new(device_id, registry.next_epoch(), "127.0.0.1:4370", tx), rx)
    }

    #[test]
    fn test_insert_and_ids() {
        let registry = LinkRegistry::new();
        let (d2, _rx2) = handle(&registry, "D2");
        let (d1, _rx1) = handle(&registry, "D1");

        registry.insert(d2);
        registry.insert(d1);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.device_ids(), vec!["D1", "D2"]);
        assert!(registry.contains("D1"));
        assert_eq!(registry.get("D2").unwrap().peer(), "127.0.0.1:4370");
    }

    #[test]
    fn test_stale_epoch_does_not_evict() {
        let registry = LinkRegistry::new();
        let (old, _rx_old) = handle(&registry, "D1");
        let (new, _rx_new) = handle(&registry, "D1");
        let old_epoch = old.epoch();
        let new_epoch = new.epoch();
        assert!(new_epoch > old_epoch);

        registry.insert(old);
        registry.insert(new);

        assert!(!registry.remove("D1", old_epoch));
        assert!(registry.contains("D1"));
        assert!(registry.remove("D1", new_epoch));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_clear() {
        let registry = LinkRegistry::new();
        let (d1, _rx) = handle(&registry, "D1");
        registry.insert(d1);
        registry.clear();
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_request_to_closed_link() {
        let registry = LinkRegistry::new();
        let (d1, rx) = handle(&registry, "D1");
        drop(rx);
        assert!(!d1.request_sync().await);
    }

    #[tokio::test]
    async fn test_request_with_full_queue() {
        let registry = LinkRegistry::new();
        let (d1, _rx) = handle(&registry, "D1");

        // Queue of one, never drained
        let (reply_tx, _reply_rx) = oneshot::channel();
        d1.commands.try_send(LinkCommand::Send(Command::Sync, reply_tx)).unwrap();

        assert!(!d1.request_sync().await);
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let registry = LinkRegistry::new();
        let (d1, mut rx) = handle(&registry, "D1");

        let link = tokio::spawn(async move {
            let Some(LinkCommand::Send(command, reply)) = rx.recv().await else {
                panic!("no command");
            };
            reply.send(true).unwrap();
            command
        });

        assert!(d1.request_sync().await);
        assert_eq!(link.await.unwrap(), Command::Sync);
    }
}
