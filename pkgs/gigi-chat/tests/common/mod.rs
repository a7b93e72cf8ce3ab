//! Shared fixtures: a migrated SQLite file, a pinned clock, and one
//! `ChatApi` per user over the same store

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use gigi_chat::{
    ChatApi, ChatConfig, ChatStore, Clock, Identity, ManualClock, StaticIdentityProvider,
};
use tempfile::NamedTempFile;

pub struct Harness {
    _db_file: NamedTempFile,
    pub store: ChatStore,
    pub clock: Arc<ManualClock>,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).unwrap()
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(ChatConfig::default()).await
    }

    pub async fn with_config(config: ChatConfig) -> Self {
        let db_file = NamedTempFile::new().unwrap();
        let clock = Arc::new(ManualClock::new(start_time()));
        let store = ChatStore::open(ChatConfig {
            db_path: db_file.path().to_path_buf(),
            ..config
        })
        .await
        .expect("Failed to open chat store")
        .with_clock(clock.clone());

        Self {
            _db_file: db_file,
            store,
            clock,
        }
    }

    pub fn api(&self, user: &str) -> ChatApi {
        ChatApi::new(
            self.store.clone(),
            Arc::new(StaticIdentityProvider::new(Identity::with_profile_id(user))),
        )
    }

    pub fn anonymous(&self) -> ChatApi {
        ChatApi::new(
            self.store.clone(),
            Arc::new(StaticIdentityProvider::anonymous()),
        )
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.clock.advance(Duration::seconds(secs));
    }
}
