//! Subscription pool and change polling
//!
//! ## Overview
//!
//! A subscription is a client's standing request to hear about changes to
//! one resource. The pool holds at most [`MAX_SUBSCRIPTIONS`] slots.
//! Unsubscribing or disconnecting only deactivates a slot; a later subscribe
//! reuses inactive slots before the pool grows.
//!
//! ## Change Detection
//!
//! Every poll re-reads each active subscription's resource and compares the
//! value with the one last sent to that client. Only differing values produce
//! a `resource.change` line. The first poll after subscribing always sends,
//! since nothing has been sent yet.
//!
//! Resource reads happen outside the pool lock so a slow telemetry lock
//! never blocks subscribe or unsubscribe.

use heapless::Vec;
use log::{debug, info};
use tokio::sync::Mutex;

use fieldnode_core::{TimeSource, Timestamp};

use crate::context::NodeContext;
use crate::error::RpcError;
use crate::rpc::protocol::change_notification;
use crate::rpc::registry::Registry;

/// Slot count of the subscription pool
pub const MAX_SUBSCRIPTIONS: usize = 5;

/// Connection identifier assigned by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u32);

#[derive(Debug, Clone)]
struct Subscription {
    client: ClientId,
    uri: &'static str,
    last_value: Option<String>,
    last_poll: Timestamp,
    active: bool,
}

/// A notification line addressed to one client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub client: ClientId,
    pub line: String,
}

/// Bounded subscription pool
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    slots: Mutex<Vec<Subscription, MAX_SUBSCRIPTIONS>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `client` to `uri`. Subscribing twice is a no-op.
    pub async fn subscribe(&self, client: ClientId, uri: &'static str) -> Result<(), RpcError> {
        let mut slots = self.slots.lock().await;

        if slots
            .iter()
            .any(|s| s.active && s.client == client && s.uri == uri)
        {
            return Ok(());
        }

        let fresh = Subscription {
            client,
            uri,
            last_value: None,
            last_poll: 0,
            active: true,
        };

        if let Some(slot) = slots.iter_mut().find(|s| !s.active) {
            *slot = fresh;
        } else if slots.push(fresh).is_err() {
            return Err(RpcError::limit_reached());
        }

        info!("client {} subscribed to {}", client.0, uri);
        Ok(())
    }

    /// Deactivate `client`'s subscription to `uri`, if any
    pub async fn unsubscribe(&self, client: ClientId, uri: &str) {
        let mut slots = self.slots.lock().await;
        for slot in slots
            .iter_mut()
            .filter(|s| s.active && s.client == client && s.uri == uri)
        {
            slot.active = false;
            info!("client {} unsubscribed from {}", client.0, uri);
        }
    }

    /// Deactivate every subscription owned by `client`
    pub async fn remove_client(&self, client: ClientId) {
        let mut slots = self.slots.lock().await;
        let mut removed = 0;
        for slot in slots.iter_mut().filter(|s| s.active && s.client == client) {
            slot.active = false;
            removed += 1;
        }
        if removed > 0 {
            debug!("dropped {} subscriptions of client {}", removed, client.0);
        }
    }

    /// Deactivate everything, e.g. when the server stops
    pub async fn clear(&self) {
        let mut slots = self.slots.lock().await;
        for slot in slots.iter_mut() {
            slot.active = false;
        }
    }

    pub async fn active_count(&self) -> usize {
        self.slots.lock().await.iter().filter(|s| s.active).count()
    }

    /// Total slots allocated, active or not
    pub async fn slot_count(&self) -> usize {
        self.slots.lock().await.len()
    }

    /// Re-read every subscribed resource and return a notification for each
    /// value that differs from the last one sent.
    pub async fn poll(
        &self,
        ctx: &NodeContext,
        registry: &Registry,
        clock: &dyn TimeSource,
    ) -> std::vec::Vec<ChangeEvent> {
        let targets: std::vec::Vec<(usize, ClientId, &'static str)> = {
            let slots = self.slots.lock().await;
            slots
                .iter()
                .enumerate()
                .filter(|(_, s)| s.active)
                .map(|(i, s)| (i, s.client, s.uri))
                .collect()
        };

        let mut readings = std::vec::Vec::with_capacity(targets.len());
        for (index, client, uri) in targets {
            let Some(resource) = registry.resource(uri) else {
                continue;
            };
            // A busy telemetry lock skips this resource until the next poll
            if let Ok(value) = resource.read(ctx).await {
                readings.push((index, client, uri, value));
            }
        }

        let now = clock.now();
        let mut events = std::vec::Vec::new();
        let mut slots = self.slots.lock().await;
        for (index, client, uri, value) in readings {
            let Some(slot) = slots.get_mut(index) else {
                continue;
            };
            // The slot may have been released or reused while reading
            if !slot.active || slot.client != client || slot.uri != uri {
                continue;
            }
            slot.last_poll = now;
            if slot.last_value.as_deref() == Some(value.as_str()) {
                continue;
            }
            events.push(ChangeEvent {
                client,
                line: change_notification(uri, &value),
            });
            slot.last_value = Some(value);
        }
        events
    }
}
