//! Presence contract - online/offline indicators
//!
//! Presence is a side channel. Message delivery never goes through it, and
//! the engine itself never publishes or subscribes; clients attach to a
//! [`PresenceChannel`] for the indicator and carry on without it if attaching
//! fails.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ChatResult;

/// Where presence is published: for everyone, or for one conversation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum PresenceScope {
    Global,
    Conversation(String),
}

/// Online state of one profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceState {
    pub profile_id: String,
    pub online: bool,
    pub last_seen: DateTime<Utc>,
}

pub type PresenceCallback = Arc<dyn Fn(&PresenceState) + Send + Sync>;

/// Publish/subscribe transport for presence
pub trait PresenceChannel: Send + Sync {
    fn publish(&self, scope: &PresenceScope, state: PresenceState) -> ChatResult<()>;

    fn subscribe(
        &self,
        scope: &PresenceScope,
        callback: PresenceCallback,
    ) -> ChatResult<PresenceSubscription>;
}

/// Handle returned by [`PresenceChannel::subscribe`]; dropping it unsubscribes
pub struct PresenceSubscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl PresenceSubscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for PresenceSubscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for PresenceSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceSubscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[derive(Default)]
struct HubState {
    next_id: u64,
    subscribers: HashMap<PresenceScope, Vec<(u64, PresenceCallback)>>,
    latest: HashMap<PresenceScope, HashMap<String, PresenceState>>,
}

/// In-process [`PresenceChannel`]
///
/// Keeps the latest state per profile and scope, so a new subscriber is
/// immediately told who is already online.
#[derive(Clone, Default)]
pub struct LocalPresenceHub {
    state: Arc<Mutex<HubState>>,
}

impl LocalPresenceHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Profiles currently online in `scope`
    pub fn online_profiles(&self, scope: &PresenceScope) -> Vec<String> {
        let state = self.state.lock();
        let mut online: Vec<String> = state
            .latest
            .get(scope)
            .map(|profiles| {
                profiles
                    .values()
                    .filter(|p| p.online)
                    .map(|p| p.profile_id.clone())
                    .collect()
            })
            .unwrap_or_default();
        online.sort();
        online
    }

    pub fn subscriber_count(&self, scope: &PresenceScope) -> usize {
        self.state
            .lock()
            .subscribers
            .get(scope)
            .map_or(0, |subs| subs.len())
    }
}

impl PresenceChannel for LocalPresenceHub {
    fn publish(&self, scope: &PresenceScope, presence: PresenceState) -> ChatResult<()> {
        // Callbacks run outside the lock so they may publish in turn
        let callbacks: Vec<PresenceCallback> = {
            let mut state = self.state.lock();
            state
                .latest
                .entry(scope.clone())
                .or_default()
                .insert(presence.profile_id.clone(), presence.clone());
            state
                .subscribers
                .get(scope)
                .map(|subs| subs.iter().map(|(_, cb)| cb.clone()).collect())
                .unwrap_or_default()
        };

        debug!(
            scope = ?scope,
            profile_id = %presence.profile_id,
            online = presence.online,
            subscribers = callbacks.len(),
            "Published presence"
        );
        for callback in callbacks {
            callback(&presence);
        }
        Ok(())
    }

    fn subscribe(
        &self,
        scope: &PresenceScope,
        callback: PresenceCallback,
    ) -> ChatResult<PresenceSubscription> {
        let (id, snapshot) = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            state
                .subscribers
                .entry(scope.clone())
                .or_default()
                .push((id, callback.clone()));
            let snapshot: Vec<PresenceState> = state
                .latest
                .get(scope)
                .map(|profiles| profiles.values().cloned().collect())
                .unwrap_or_default();
            (id, snapshot)
        };

        for presence in &snapshot {
            callback(presence);
        }

        let hub: Weak<Mutex<HubState>> = Arc::downgrade(&self.state);
        let scope = scope.clone();
        Ok(PresenceSubscription::new(move || {
            if let Some(hub) = hub.upgrade() {
                let mut state = hub.lock();
                if let Some(subs) = state.subscribers.get_mut(&scope) {
                    subs.retain(|(sub_id, _)| *sub_id != id);
                    if subs.is_empty() {
                        state.subscribers.remove(&scope);
                    }
                }
            }
        }))
    }
}
