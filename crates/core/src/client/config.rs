use std::sync::Arc;

use crate::callbacks::{PersistentStore, SessionEventHandler};

#[derive(Debug, Clone, Default, Copy)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

const DEFAULT_TIMEOUT: u64 = 30_000;

/// Configuration for constructing an [ApiClient](crate::ApiClient). Options
/// on this object are used for every request made through the current
/// session.
#[derive(Clone)]
pub struct ClientConfiguration {
    /// Provides a way to store persistent state between sessions. Used for
    /// the auth tokens and the signed-in user record.
    pub persistence_provider: Option<Arc<dyn PersistentStore>>,
    /// Notified when a failed token refresh ends the session, so the
    /// embedder can route the user back to login.
    pub session_handler: Option<Arc<dyn SessionEventHandler>>,
    /// Initial log level - defaults to [LogLevel::Info]
    pub log_level: LogLevel,
    /// Overall ceiling for a single request in milliseconds, after which the
    /// call is treated as a connectivity failure. Defaults to 30 seconds.
    pub request_timeout: u64,
}

impl Default for ClientConfiguration {
    fn default() -> Self {
        Self {
            persistence_provider: None,
            session_handler: None,
            log_level: LogLevel::default(),
            request_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for ClientConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfiguration")
            .field(
                "persistence_provider",
                &self.persistence_provider.is_some().then_some("..."),
            )
            .field(
                "session_handler",
                &self.session_handler.is_some().then_some("..."),
            )
            .field("log_level", &self.log_level)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
