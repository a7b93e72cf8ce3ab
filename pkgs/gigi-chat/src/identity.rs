//! Caller identity
//!
//! Core operations take an explicit [`Identity`]. Only the RPC facade asks an
//! [`IdentityProvider`] who is calling.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The authenticated profile performing an operation
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub profile_id: String,
    pub username: String,
}

impl Identity {
    pub fn new(profile_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            profile_id: profile_id.into(),
            username: username.into(),
        }
    }

    /// Identity whose username is its profile id
    pub fn with_profile_id(profile_id: impl Into<String>) -> Self {
        let profile_id = profile_id.into();
        Self {
            username: profile_id.clone(),
            profile_id,
        }
    }
}

/// Resolves the profile behind the current request
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_profile(&self) -> Option<Identity>;
}

/// Always answers with the same identity (or none)
#[derive(Clone, Debug, Default)]
pub struct StaticIdentityProvider {
    identity: Option<Identity>,
}

impl StaticIdentityProvider {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    pub fn anonymous() -> Self {
        Self { identity: None }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn current_profile(&self) -> Option<Identity> {
        self.identity.clone()
    }
}
