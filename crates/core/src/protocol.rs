use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Token envelope returned by the login and refresh endpoints.
///
/// The backend has used both snake_case and camelCase spellings for the
/// token fields, and only rotates the refresh token sometimes, so everything
/// past the access token is optional.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenEnvelope {
    #[serde(alias = "accessToken")]
    pub access_token: String,
    #[serde(default, alias = "refreshToken")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_expires_in: Option<u64>,
}

/// One page of a listing endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total: u64,
    #[serde(rename = "pageCount")]
    pub page_count: u32,
}

/// Error body the API attaches to non-success responses.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub errors: Option<HashMap<String, Vec<String>>>,
}

/// The signed-in user record persisted alongside the tokens. Opaque to the
/// request pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub nome: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perfil: Option<String>,
}
