use std::{collections::HashMap, sync::Mutex};

/// Provides durable persistent storage for session data like tokens.
/// Implementations should handle platform-specific storage (e.g. the
/// browser's local storage on web, a keychain on mobile) and ensure data is
/// stored securely as some of it may be session tokens.
pub trait PersistentStore: Send + Sync {
    /// Removes the entry for the given key
    fn remove_entry(&self, key: String);

    /// Gets the value for the given key, or None if not found
    fn get(&self, key: String) -> Option<Vec<u8>>;

    /// Sets the value for the given key
    fn set(&self, key: String, value: Vec<u8>);
}

/// Notified when the session can no longer be recovered.
pub trait SessionEventHandler: Send + Sync {
    /// Fires after a failed token refresh has cleared the session store.
    /// The embedder should route the user back to the login entry point.
    fn on_session_expired(&self);
}

/// Process-local [PersistentStore]. Entries do not survive a restart.
#[derive(Default, Debug)]
pub struct MemoryStore(Mutex<HashMap<String, Vec<u8>>>);

impl PersistentStore for MemoryStore {
    fn remove_entry(&self, key: String) {
        self.0.lock().unwrap().remove(&key);
    }

    fn get(&self, key: String) -> Option<Vec<u8>> {
        self.0.lock().unwrap().get(&key).cloned()
    }

    fn set(&self, key: String, value: Vec<u8>) {
        self.0.lock().unwrap().insert(key, value);
    }
}
