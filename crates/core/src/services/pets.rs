use std::sync::Arc;

use futures::future::try_join_all;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::{
    client::{ApiClient, FileUpload, RequestSpec},
    error::ApiClientError,
    protocol::Paginated,
};

use super::tutores::Tutor;

/// Stored photo metadata returned by the upload endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Foto {
    pub id: i64,
    pub nome: String,
    #[serde(rename = "contentType")]
    pub content_type: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pet {
    pub id: i64,
    pub nome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raca: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idade: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foto: Option<Foto>,
}

/// Detail view: the pet plus the tutores responsible for it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PetCompleto {
    #[serde(flatten)]
    pub pet: Pet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tutores: Option<Vec<Tutor>>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct CreatePet {
    pub nome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raca: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idade: Option<u32>,
}

/// The update payload carries the same fields as creation.
pub type UpdatePet = CreatePet;

/// Optional name/breed filters and page/size pagination for pet listings.
/// Unset fields are omitted from the query string.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PetFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raca: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

/// CRUD and photo operations for `/v1/pets`. Each call is a single request
/// through the shared pipeline.
pub struct PetsService {
    client: Arc<ApiClient>,
}

impl PetsService {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub async fn list(&self, filters: &PetFilters) -> Result<Paginated<Pet>, ApiClientError> {
        self.client.request_json(list_spec(filters)?).await
    }

    pub async fn get(&self, id: i64) -> Result<PetCompleto, ApiClientError> {
        self.client
            .request_json(RequestSpec::new(Method::GET, format!("/v1/pets/{id}")))
            .await
    }

    pub async fn create(&self, data: &CreatePet) -> Result<Pet, ApiClientError> {
        self.client
            .request_json(
                RequestSpec::new(Method::POST, "/v1/pets").json(serde_json::to_value(data)?),
            )
            .await
    }

    pub async fn update(&self, id: i64, data: &UpdatePet) -> Result<Pet, ApiClientError> {
        self.client
            .request_json(
                RequestSpec::new(Method::PUT, format!("/v1/pets/{id}"))
                    .json(serde_json::to_value(data)?),
            )
            .await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiClientError> {
        self.client
            .request_unit(RequestSpec::new(Method::DELETE, format!("/v1/pets/{id}")))
            .await
    }

    pub async fn add_foto(&self, id: i64, file: FileUpload) -> Result<Foto, ApiClientError> {
        self.client
            .request_json(
                RequestSpec::new(Method::POST, format!("/v1/pets/{id}/fotos")).multipart(file),
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

    pub async fn remove_foto(&self, pet_id: i64, foto_id: i64) -> Result<(), ApiClientError> {
        self.client
            .request_unit(RequestSpec::new(
                Method::DELETE,
                format!("/v1/pets/{pet_id}/fotos/{foto_id}"),
            ))
            .await
    }
}

fn list_spec(filters: &PetFilters) -> Result<RequestSpec, ApiClientError> {
    let query = serde_urlencoded::to_string(filters)?;
    Ok(RequestSpec::new(Method::GET, "/v1/pets").query(query))
}

#[cfg(test)]
mod tests {
    use crate::client::RequestBody;

    use super::*;

    #[test]
    fn list_spec_with_no_filters_has_no_query() {
        let spec = list_spec(&PetFilters::default()).unwrap();
        assert_eq!(spec.method, Method::GET);
        assert_eq!(spec.path, "/v1/pets");
        assert!(spec.query.is_none());
    }

    #[test]
    fn list_spec_encodes_only_set_filters() {
        let filters = PetFilters {
            nome: Some("Rex".into()),
            raca: None,
            page: Some(0),
            size: Some(10),
        };
        let spec = list_spec(&filters).unwrap();
        assert_eq!(spec.query.as_deref(), Some("nome=Rex&page=0&size=10"));
    }

    #[test]
    fn list_spec_percent_encodes_values() {
        let filters = PetFilters {
            nome: Some("Totó Júnior".into()),
            ..Default::default()
        };
        let spec = list_spec(&filters).unwrap();
        assert_eq!(
            spec.query.as_deref(),
            Some("nome=Tot%C3%B3+J%C3%BAnior")
        );
    }

    #[test]
    fn create_pet_omits_unset_fields() {
        let data = CreatePet {
            nome: "Rex".into(),
            raca: None,
            idade: None,
        };
        let json = serde_json::to_string(&data).unwrap();
        assert_eq!(json, r#"{"nome":"Rex"}"#);
    }

    #[test]
    fn pet_completo_flattens_the_pet_fields() {
        let json = r#"{
            "id": 7,
            "nome": "Rex",
            "raca": "Labrador",
            "tutores": [
                {"id": 1, "nome": "Maria", "telefone": "11999990000"}
            ]
        }"#;
        let detail: PetCompleto = serde_json::from_str(json).unwrap();
        assert_eq!(detail.pet.id, 7);
        assert_eq!(detail.pet.raca.as_deref(), Some("Labrador"));
        let tutores = detail.tutores.unwrap();
        assert_eq!(tutores.len(), 1);
        assert_eq!(tutores[0].nome, "Maria");
    }

    #[test]
    fn foto_maps_content_type_field() {
        let json = r#"{"id":1,"nome":"rex.png","contentType":"image/png","url":"/fotos/1"}"#;
        let foto: Foto = serde_json::from_str(json).unwrap();
        assert_eq!(foto.content_type, "image/png");
    }

    #[test]
    fn multipart_spec_carries_the_upload() {
        let file = FileUpload {
            contents: vec![1, 2, 3],
            mime_type: "image/png".into(),
            file_name: "rex.png".into(),
        };
        let spec = RequestSpec::new(Method::POST, "/v1/pets/7/fotos").multipart(file);
        match spec.body {
            RequestBody::Multipart(file) => {
                assert_eq!(file.contents, vec![1, 2, 3]);
                assert_eq!(file.mime_type, "image/png");
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }
}
