use std::sync::Arc;

use log::{error, warn};

use crate::{
    callbacks::{MemoryStore, PersistentStore},
    protocol::User,
};

const ACCESS_TOKEN_KEY: &str = "access_token";
const REFRESH_TOKEN_KEY: &str = "refresh_token";
const USER_KEY: &str = "user";

/// Snapshot of the persisted auth state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<User>,
}

/// Durable store for the three session entries: access token, refresh token
/// and the serialized user record.
///
/// The backing storage is shared and unsynchronized; concurrent writers are
/// last-write-wins. Reads never fail: anything unreadable is treated as
/// absent.
pub struct SessionStore {
    store: Arc<dyn PersistentStore>,
}

impl SessionStore {
    pub fn new(store: Option<Arc<dyn PersistentStore>>) -> Self {
        let store = store.unwrap_or_else(|| {
            warn!("No persistent store provided - session will not survive a restart");
            Arc::new(MemoryStore::default())
        });
        Self { store }
    }

    /// Writes all three entries, overwriting any prior values.
    pub fn save(&self, access_token: &str, refresh_token: &str, user: &User) {
        self.store.set(
            ACCESS_TOKEN_KEY.to_owned(),
            access_token.as_bytes().to_vec(),
        );
        self.store.set(
            REFRESH_TOKEN_KEY.to_owned(),
            refresh_token.as_bytes().to_vec(),
        );
        match serde_json::to_vec(user) {
            Ok(bytes) => self.store.set(USER_KEY.to_owned(), bytes),
            Err(e) => error!("Failed to serialize user record: {e}"),
        }
    }

    pub(crate) fn set_access_token(&self, token: &str) {
        self.store
            .set(ACCESS_TOKEN_KEY.to_owned(), token.as_bytes().to_vec());
    }

    pub(crate) fn set_refresh_token(&self, token: &str) {
        self.store
            .set(REFRESH_TOKEN_KEY.to_owned(), token.as_bytes().to_vec());
    }

    /// A corrupted or missing user record reads as `None` rather than an
    /// error.
    pub fn read(&self) -> Session {
        Session {
            access_token: self.get_string(ACCESS_TOKEN_KEY),
            refresh_token: self.get_string(REFRESH_TOKEN_KEY),
            user: self.store.get(USER_KEY.to_owned()).and_then(|bytes| {
                serde_json::from_slice(&bytes)
                    .inspect_err(|e| warn!("Stored user record is corrupted, treating as absent: {e}"))
                    .ok()
            }),
        }
    }

    /// Removes all three entries unconditionally. Clearing twice is
    /// harmless.
    pub fn clear(&self) {
        self.store.remove_entry(ACCESS_TOKEN_KEY.to_owned());
        self.store.remove_entry(REFRESH_TOKEN_KEY.to_owned());
        self.store.remove_entry(USER_KEY.to_owned());
    }

    /// True iff a non-empty access token is present.
    pub fn is_authenticated(&self) -> bool {
        self.read()
            .access_token
            .is_some_and(|token| !token.is_empty())
    }

    fn get_string(&self, key: &str) -> Option<String> {
        self.store
            .get(key.to_owned())
            .and_then(|bytes| String::from_utf8(bytes).ok())
    }
}
