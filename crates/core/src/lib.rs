//! Client-side core for the pet-manager administrative interface.
//!
//! The view layer consumes three things from here: a shared [ApiClient]
//! request pipeline (bearer-token injection plus a one-shot token refresh
//! and retry on `401`), a durable [SessionStore] for the auth state, and
//! thin typed services over the REST resources
//! ([services::PetsService], [services::TutoresService],
//! [services::AuthService]).

pub mod callbacks;
pub mod client;
pub mod error;
pub mod protocol;
pub mod services;

pub use client::{
    ApiClient, ClientConfiguration, FileUpload, LogLevel, Session, SessionStore,
};
pub use error::ApiClientError;
