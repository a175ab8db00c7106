mod config;
mod logging;
mod request;
mod session_store;

use std::{sync::Arc, time::Duration};

use log::{debug, warn};
use reqwest::{
    header::{HeaderName, HeaderValue, AUTHORIZATION},
    multipart, Client, StatusCode, Url,
};
use serde::de::DeserializeOwned;

pub use config::{ClientConfiguration, LogLevel};
pub use logging::set_log_level;
pub use request::FileUpload;
pub(crate) use request::{RequestBody, RequestSpec};
pub use session_store::{Session, SessionStore};

use crate::{callbacks::SessionEventHandler, error::ApiClientError, protocol::TokenEnvelope};

const REFRESH_PATH: &str = "/autenticacao/refresh";
const FOTO_FIELD: &str = "foto";

/// Shared request pipeline for the pet-manager API.
///
/// Two cross-cutting behaviors are layered around every call: a bearer token
/// is attached on the way out whenever the session store holds one, and the
/// first `401` of a request triggers a single token refresh followed by one
/// retry of the original request. Session state is injected here at
/// construction; nothing reads ambient storage.
pub struct ApiClient {
    base_url: String,
    http: Client,
    session: SessionStore,
    session_handler: Option<Arc<dyn SessionEventHandler>>,
}

impl ApiClient {
    pub fn new(base_url: &str, config: ClientConfiguration) -> Result<Self, ApiClientError> {
        logging::init_log(config.log_level);
        debug!("Initializing ApiClient for {base_url}");
        debug!("Configuration: {config:?}");

        let base_url = base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|e| ApiClientError::InvalidUrl {
            error: e.to_string(),
        })?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout))
            .build()?;

        let session = SessionStore::new(config.persistence_provider.clone());

        Ok(Self {
            base_url,
            http,
            session,
            session_handler: config.session_handler,
        })
    }

    /// The session store backing this client.
    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub(crate) async fn request_json<T: DeserializeOwned>(
        &self,
        spec: RequestSpec,
    ) -> Result<T, ApiClientError> {
        let response = self.dispatch(&spec).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    pub(crate) async fn request_unit(&self, spec: RequestSpec) -> Result<(), ApiClientError> {
        self.dispatch(&spec).await?;
        Ok(())
    }

    /// Runs one request through the outbound and inbound stages.
    ///
    /// The retry guard is the loop-local attempt flag: the first `401`
    /// marks the request as retried, refreshes the session and re-issues the
    /// request once. A `401` on the retried attempt, and every other failure
    /// status, pass through to the caller unchanged.
    async fn dispatch(&self, spec: &RequestSpec) -> Result<reqwest::Response, ApiClientError> {
        let mut retried = false;
        loop {
            let request = self.build_request(spec)?;
            let response = self.http.execute(request).await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::UNAUTHORIZED && !retried {
                retried = true;

                let Some(refresh_token) = self.session.read().refresh_token else {
                    return Err(error_from(response).await);
                };

                debug!(
                    "{} {} came back 401, attempting token refresh",
                    spec.method, spec.path
                );
                match self.refresh_session(&refresh_token).await {
                    Ok(_) => continue,
                    Err(refresh_err) => {
                        warn!("Token refresh failed, clearing session: {refresh_err}");
                        self.session.clear();
                        if let Some(handler) = &self.session_handler {
                            handler.on_session_expired();
                        }
                        return Err(refresh_err);
                    }
                }
            }

            return Err(error_from(response).await);
        }
    }

    /// Exchange the refresh token for a new access token and persist the
    /// result. Deliberately not bearer-authenticated: the access token this
    /// call replaces may already be expired.
    pub(crate) async fn refresh_session(
        &self,
        refresh_token: &str,
    ) -> Result<TokenEnvelope, ApiClientError> {
        let url = format!("{}{REFRESH_PATH}", self.base_url);
        let response = self
            .http
            .put(url)
            .json(&serde_json::json!({ "refreshToken": refresh_token }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_from(response).await);
        }

        let envelope: TokenEnvelope = serde_json::from_str(&response.text().await?)?;
        self.session.set_access_token(&envelope.access_token);
        if let Some(rotated) = &envelope.refresh_token {
            self.session.set_refresh_token(rotated);
        }
        debug!("Session refreshed");
        Ok(envelope)
    }

    /// Materialize a spec into a `reqwest::Request`, attaching the bearer
    /// token when one is stored. Called once per attempt so the retry picks
    /// up the refreshed token.
    fn build_request(&self, spec: &RequestSpec) -> Result<reqwest::Request, ApiClientError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, spec.path)).map_err(|e| {
            ApiClientError::InvalidUrl {
                error: e.to_string(),
            }
        })?;
        if let Some(query) = &spec.query {
            url.set_query(Some(query));
        }

        let mut builder = self.http.request(spec.method.clone(), url);

        if let Some(token) = self
            .session
            .read()
            .access_token
            .filter(|token| !token.is_empty())
        {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        for (name, value) in &spec.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ApiClientError::InvalidHeader {
                    error: e.to_string(),
                }
            })?;
            let value =
                HeaderValue::from_str(value).map_err(|e| ApiClientError::InvalidHeader {
                    error: e.to_string(),
                })?;
            builder = builder.header(name, value);
        }

        builder = match &spec.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(file) => {
                let part = multipart::Part::bytes(file.contents.clone())
                    .file_name(file.file_name.clone())
                    .mime_str(&file.mime_type)
                    .map_err(|e| ApiClientError::InvalidHeader {
                        error: e.to_string(),
                    })?;
                builder.multipart(multipart::Form::new().part(FOTO_FIELD, part))
            }
        };

        builder.build().map_err(ApiClientError::from)
    }
}

/// Normalize a non-success response, consuming its body.
async fn error_from(response: reqwest::Response) -> ApiClientError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    ApiClientError::from_response(status, &body)
}
