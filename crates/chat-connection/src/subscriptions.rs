//! Subscription bookkeeping.
//!
//! One broker subscription per destination. The registry maps each
//! destination to its STOMP subscription id and message handler;
//! [`Subscription`] is the caller's handle for undoing it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::manager::Shared;
use crate::types::OnMessage;

struct Entry {
    id: String,
    handler: OnMessage,
}

#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    entries: HashMap<String, Entry>,
    next_id: u64,
}

impl SubscriptionRegistry {
    /// Subscription id registered for `destination`, if any.
    pub(crate) fn id_for(&self, destination: &str) -> Option<&str> {
        self.entries.get(destination).map(|e| e.id.as_str())
    }

    /// Registers `destination` and returns its new subscription id.
    ///
    /// Ids are never reused, so handles from an earlier session cannot
    /// remove a newer entry for the same destination.
    pub(crate) fn insert(&mut self, destination: &str, handler: OnMessage) -> String {
        let id = format!("sub-{}", self.next_id);
        self.next_id += 1;
        self.entries.insert(
            destination.to_string(),
            Entry {
                id: id.clone(),
                handler,
            },
        );
        id
    }

    /// Removes `destination` if it is still registered under `id`.
    pub(crate) fn remove(&mut self, destination: &str, id: &str) -> bool {
        if self.id_for(destination) == Some(id) {
            self.entries.remove(destination);
            true
        } else {
            false
        }
    }

    /// Finds the handler for an inbound MESSAGE.
    ///
    /// Matches on the `subscription` header, falling back to `destination`
    /// for brokers that omit it.
    pub(crate) fn handler_for(
        &self,
        subscription: Option<&str>,
        destination: Option<&str>,
    ) -> Option<OnMessage> {
        if let Some(id) = subscription {
            return self
                .entries
                .values()
                .find(|e| e.id == id)
                .map(|e| Arc::clone(&e.handler));
        }
        destination
            .and_then(|d| self.entries.get(d))
            .map(|e| Arc::clone(&e.handler))
    }

    /// Empties the registry, returning the ids that were active.
    pub(crate) fn drain(&mut self) -> Vec<String> {
        self.entries.drain().map(|(_, e)| e.id).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Handle returned by [`ConnectionManager::subscribe`](crate::ConnectionManager::subscribe).
///
/// Cloning yields the same handle. Calling [`unsubscribe`](Self::unsubscribe)
/// on any clone removes the subscription once; later calls do nothing.
#[derive(Clone)]
pub struct Subscription {
    target: Option<Target>,
}

#[derive(Clone)]
struct Target {
    manager: Weak<Shared>,
    destination: String,
    id: String,
}

impl Subscription {
    /// A handle that subscribes to nothing.
    pub(crate) fn noop() -> Self {
        Self { target: None }
    }

    pub(crate) fn active(manager: &Arc<Shared>, destination: &str, id: &str) -> Self {
        Self {
            target: Some(Target {
                manager: Arc::downgrade(manager),
                destination: destination.to_string(),
                id: id.to_string(),
            }),
        }
    }

    /// Removes the subscription from the broker and the registry.
    pub fn unsubscribe(&self) {
        if let Some(target) = &self.target
            && let Some(shared) = target.manager.upgrade()
        {
            shared.unsubscribe(&target.destination, &target.id);
        }
    }

    /// `true` if this handle was returned while not connected.
    pub fn is_noop(&self) -> bool {
        self.target.is_none()
    }

    pub fn destination(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.destination.as_str())
    }

    /// STOMP subscription id.
    pub fn id(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.id.as_str())
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        match (&self.target, &other.target) {
            (Some(a), Some(b)) => {
                a.id == b.id && a.destination == b.destination && Weak::ptr_eq(&a.manager, &b.manager)
            }
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for Subscription {}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(t) => f
                .debug_struct("Subscription")
                .field("destination", &t.destination)
                .field("id", &t.id)
                .finish(),
            None => f.write_str("Subscription(noop)"),
        }
    }
}
