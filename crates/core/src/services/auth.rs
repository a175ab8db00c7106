use std::sync::Arc;

use log::debug;
use reqwest::Method;
use serde::Serialize;

use crate::{
    client::{ApiClient, RequestSpec, Session},
    error::ApiClientError,
    protocol::{TokenEnvelope, User},
};

const LOGIN_PATH: &str = "/autenticacao/login";

/// Login form contents.
#[derive(Clone, Debug, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Authentication operations plus read-through accessors for the persisted
/// session.
pub struct AuthService {
    client: Arc<ApiClient>,
}

impl AuthService {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    /// Authenticates and persists the session.
    ///
    /// Tokens are only stored when the envelope carries both, keeping the
    /// both-or-neither invariant. The stored user record is derived from the
    /// credentials; the backend does not return one here.
    pub async fn login(&self, credentials: &Credentials) -> Result<TokenEnvelope, ApiClientError> {
        let spec =
            RequestSpec::new(Method::POST, LOGIN_PATH).json(serde_json::to_value(credentials)?);
        let envelope: TokenEnvelope = self.client.request_json(spec).await?;

        match &envelope.refresh_token {
            Some(refresh_token) if !envelope.access_token.is_empty() => {
                let user = User {
                    id: "1".to_string(),
                    nome: credentials.username.clone(),
                    email: credentials.username.clone(),
                    perfil: None,
                };
                self.client
                    .session()
                    .save(&envelope.access_token, refresh_token, &user);
                debug!("Session persisted for {}", credentials.username);
            }
            _ => debug!("Login reply carried no usable token pair, session not persisted"),
        }

        Ok(envelope)
    }

    /// Exchange `refresh_token` for a fresh access token, persisting the new
    /// token (and the rotated refresh token when the backend sends one).
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenEnvelope, ApiClientError> {
        self.client.refresh_session(refresh_token).await
    }

    /// Removes all persisted session entries.
    pub fn logout(&self) {
        self.client.session().clear();
    }

    pub fn stored_user(&self) -> Option<User> {
        self.client.session().read().user
    }

    pub fn stored_tokens(&self) -> Session {
        self.client.session().read()
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.session().is_authenticated()
    }
}
