use std::sync::Arc;

use futures::future::try_join_all;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::{
    client::{ApiClient, FileUpload, RequestSpec},
    error::ApiClientError,
    protocol::Paginated,
};

use super::pets::{Foto, Pet};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tutor {
    pub id: i64,
    pub nome: String,
    pub telefone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endereco: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foto: Option<Foto>,
}

/// Detail view: the tutor plus the pets linked to them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TutorCompleto {
    #[serde(flatten)]
    pub tutor: Tutor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pets: Option<Vec<Pet>>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct CreateTutor {
    pub nome: String,
    pub telefone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endereco: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpf: Option<String>,
}

/// The update payload carries the same fields as creation.
pub type UpdateTutor = CreateTutor;

/// Optional name/phone filters and page/size pagination for tutor listings.
/// Unset fields are omitted from the query string.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TutorFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telefone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

/// CRUD, photo and pet-link operations for `/v1/tutores`.
pub struct TutoresService {
    client: Arc<ApiClient>,
}

impl TutoresService {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub async fn list(&self, filters: &TutorFilters) -> Result<Paginated<Tutor>, ApiClientError> {
        self.client.request_json(list_spec(filters)?).await
    }

    pub async fn get(&self, id: i64) -> Result<TutorCompleto, ApiClientError> {
        self.client
            .request_json(RequestSpec::new(Method::GET, format!("/v1/tutores/{id}")))
            .await
    }

    pub async fn create(&self, data: &CreateTutor) -> Result<Tutor, ApiClientError> {
        self.client
            .request_json(
                RequestSpec::new(Method::POST, "/v1/tutores").json(serde_json::to_value(data)?),
            )
            .await
    }

    pub async fn update(&self, id: i64, data: &UpdateTutor) -> Result<Tutor, ApiClientError> {
        self.client
            .request_json(
                RequestSpec::new(Method::PUT, format!("/v1/tutores/{id}"))
                    .json(serde_json::to_value(data)?),
            )
            .await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiClientError> {
        self.client
            .request_unit(RequestSpec::new(Method::DELETE, format!("/v1/tutores/{id}")))
            .await
    }

    pub async fn add_foto(&self, id: i64, file: FileUpload) -> Result<Foto, ApiClientError> {
        self.client
            .request_json(
                RequestSpec::new(Method::POST, format!("/v1/tutores/{id}/fotos")).multipart(file),
            )
            .await
    }

    /// Uploads several photos concurrently, failing fast on the first error.
    pub async fn add_fotos(
        &self,
        id: i64,
        files: Vec<FileUpload>,
    ) -> Result<Vec<Foto>, ApiClientError> {
        try_join_all(files.into_iter().map(|file| self.add_foto(id, file))).await
    }

    pub async fn remove_foto(&self, tutor_id: i64, foto_id: i64) -> Result<(), ApiClientError> {
        self.client
            .request_unit(RequestSpec::new(
                Method::DELETE,
                format!("/v1/tutores/{tutor_id}/fotos/{foto_id}"),
            ))
            .await
    }

    /// Links an existing pet to this tutor.
    pub async fn link_pet(&self, tutor_id: i64, pet_id: i64) -> Result<(), ApiClientError> {
        self.client
            .request_unit(RequestSpec::new(
                Method::POST,
                format!("/v1/tutores/{tutor_id}/pets/{pet_id}"),
            ))
            .await
    }

    /// Removes the link between this tutor and a pet. The pet itself is
    /// untouched.
    pub async fn unlink_pet(&self, tutor_id: i64, pet_id: i64) -> Result<(), ApiClientError> {
        self.client
            .request_unit(RequestSpec::new(
                Method::DELETE,
                format!("/v1/tutores/{tutor_id}/pets/{pet_id}"),
            ))
            .await
    }
}

fn list_spec(filters: &TutorFilters) -> Result<RequestSpec, ApiClientError> {
    let query = serde_urlencoded::to_string(filters)?;
    Ok(RequestSpec::new(Method::GET, "/v1/tutores").query(query))
}
