//! Online indicator for an open conversation
//!
//! Attaching is best effort. If the presence channel refuses, the view keeps
//! working and simply shows no indicator.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gigi_chat::{PresenceChannel, PresenceScope, PresenceState, PresenceSubscription};
use parking_lot::Mutex;
use tracing::{debug, warn};

pub struct PresenceAttachment {
    scope: PresenceScope,
    online: Arc<Mutex<BTreeMap<String, bool>>>,
    _subscription: PresenceSubscription,
}

impl PresenceAttachment {
    /// Subscribe to `scope` and announce `me` as online
    ///
    /// Returns `None` when either step fails.
    pub fn attach(
        channel: &dyn PresenceChannel,
        scope: PresenceScope,
        me: &str,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let online: Arc<Mutex<BTreeMap<String, bool>>> = Arc::default();
        let sink = online.clone();
        let subscription = match channel.subscribe(
            &scope,
            Arc::new(move |state: &PresenceState| {
                sink.lock().insert(state.profile_id.clone(), state.online);
            }),
        ) {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(scope = ?scope, "Presence unavailable, continuing without it: {}", e);
                return None;
            }
        };

        let announce = PresenceState {
            profile_id: me.to_string(),
            online: true,
            last_seen: now,
        };
        if let Err(e) = channel.publish(&scope, announce) {
            warn!(scope = ?scope, "Failed to announce presence, continuing without it: {}", e);
            return None;
        }

        debug!(scope = ?scope, "Presence attached");
        Some(Self {
            scope,
            online,
            _subscription: subscription,
        })
    }

    pub fn scope(&self) -> &PresenceScope {
        &self.scope
    }

    pub fn is_online(&self, profile_id: &str) -> bool {
        self.online.lock().get(profile_id).copied().unwrap_or(false)
    }

    pub fn online_profiles(&self) -> Vec<String> {
        self.online
            .lock()
            .iter()
            .filter(|(_, online)| **online)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gigi_chat::{ChatError, ChatResult, LocalPresenceHub, PresenceCallback};

    struct BrokenChannel;

    impl PresenceChannel for BrokenChannel {
        fn publish(&self, _: &PresenceScope, _: PresenceState) -> ChatResult<()> {
            Err(ChatError::Internal("presence down".into()))
        }

        fn subscribe(
            &self,
            _: &PresenceScope,
            _: PresenceCallback,
        ) -> ChatResult<PresenceSubscription> {
            Err(ChatError::Internal("presence down".into()))
        }
    }

    #[test]
    fn test_attach_tracks_others() {
        let hub = LocalPresenceHub::new();
        let scope = PresenceScope::Conversation("c1".into());
        let attachment = PresenceAttachment::attach(&hub, scope.clone(), "me", Utc::now()).unwrap();

        hub.publish(
            &scope,
            PresenceState {
                profile_id: "friend".into(),
                online: true,
                last_seen: Utc::now(),
            },
        )
        .unwrap();

        assert!(attachment.is_online("friend"));
        assert!(attachment.is_online("me"));
        assert_eq!(attachment.online_profiles(), vec!["friend", "me"]);
    }

    #[test]
    fn test_failure_degrades_to_none() {
        let attachment =
            PresenceAttachment::attach(&BrokenChannel, PresenceScope::Global, "me", Utc::now());
        assert!(attachment.is_none());
    }
}
