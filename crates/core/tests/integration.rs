//! End-to-end tests against the in-process mock server.
//!
//! Each test boots the server on an ephemeral port and drives the public
//! client API over real HTTP, including the `401` recovery paths.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use mock_server::ApiState;
use pet_manager_core::{
    callbacks::{MemoryStore, SessionEventHandler},
    services::{
        AuthService, CreatePet, CreateTutor, Credentials, PetFilters, PetsService, TutorFilters,
        TutoresService,
    },
    ApiClient, ApiClientError, ClientConfiguration, FileUpload, Session,
};
use pretty_assertions::assert_eq;

async fn start_server() -> (String, ApiState) {
    let state = ApiState::default();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(mock_server::serve(listener, state.clone()));
    (format!("http://{addr}"), state)
}

fn build_client(base_url: &str, config: ClientConfiguration) -> Arc<ApiClient> {
    Arc::new(ApiClient::new(base_url, config).expect("Failed to build client"))
}

fn client(base_url: &str) -> Arc<ApiClient> {
    build_client(
        base_url,
        ClientConfiguration {
            persistence_provider: Some(Arc::new(MemoryStore::default())),
            ..Default::default()
        },
    )
}

fn admin() -> Credentials {
    Credentials {
        username: "admin".into(),
        password: "admin".into(),
    }
}

fn png_upload(file_name: &str) -> FileUpload {
    FileUpload {
        contents: vec![0x89, b'P', b'N', b'G'],
        mime_type: "image/png".into(),
        file_name: file_name.into(),
    }
}

async fn login(client: &Arc<ApiClient>) -> AuthService {
    let auth = AuthService::new(client.clone());
    auth.login(&admin()).await.expect("login failed");
    auth
}

#[derive(Default)]
struct ExpiredCounter(AtomicUsize);

impl SessionEventHandler for ExpiredCounter {
    fn on_session_expired(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn login_persists_session_then_logout_clears_it() {
    let (base, _state) = start_server().await;
    let client = client(&base);
    let auth = AuthService::new(client.clone());

    assert!(!auth.is_authenticated());

    let envelope = auth.login(&admin()).await.unwrap();
    assert!(!envelope.access_token.is_empty());
    assert_eq!(envelope.expires_in, Some(300));
    assert!(auth.is_authenticated());

    let session = auth.stored_tokens();
    assert_eq!(
        session.access_token.as_deref(),
        Some(envelope.access_token.as_str())
    );
    assert_eq!(session.refresh_token, envelope.refresh_token);
    assert_eq!(auth.stored_user().unwrap().nome, "admin");

    auth.logout();
    assert!(!auth.is_authenticated());
    assert_eq!(auth.stored_tokens(), Session::default());
}

#[tokio::test]
async fn rejected_credentials_surface_the_server_message() {
    let (base, state) = start_server().await;
    let client = client(&base);
    let auth = AuthService::new(client.clone());

    let err = auth
        .login(&Credentials {
            username: "admin".into(),
            password: "wrong".into(),
        })
        .await
        .unwrap_err();

    match err {
        ApiClientError::Http {
            status, message, ..
        } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Credenciais inválidas");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // no refresh token stored, so the 401 must pass straight through
    assert_eq!(state.refresh_call_count(), 0);
    assert!(!auth.is_authenticated());
}

#[tokio::test]
async fn unauthenticated_requests_carry_no_bearer_and_fail() {
    let (base, state) = start_server().await;
    let pets = PetsService::new(client(&base));

    let err = pets.list(&PetFilters::default()).await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(state.refresh_call_count(), 0);
}

#[tokio::test]
async fn pets_crud_lifecycle() {
    let (base, _state) = start_server().await;
    let client = client(&base);
    login(&client).await;
    let pets = PetsService::new(client.clone());

    let created = pets
        .create(&CreatePet {
            nome: "Rex".into(),
            raca: Some("Labrador".into()),
            idade: Some(3),
        })
        .await
        .unwrap();
    assert_eq!(created.nome, "Rex");
    assert_eq!(created.raca.as_deref(), Some("Labrador"));

    let page = pets
        .list(&PetFilters {
            nome: Some("re".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.content[0], created);

    let detail = pets.get(created.id).await.unwrap();
    assert_eq!(detail.pet, created);
    assert_eq!(detail.tutores.as_deref(), Some(&[][..]));

    let updated = pets
        .update(
            created.id,
            &CreatePet {
                nome: "Rex II".into(),
                raca: Some("Labrador".into()),
                idade: Some(4),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.nome, "Rex II");
    assert_eq!(updated.idade, Some(4));

    pets.delete(created.id).await.unwrap();
    let err = pets.get(created.id).await.unwrap_err();
    match err {
        ApiClientError::Http {
            status, message, ..
        } => {
            assert_eq!(status, 404);
            assert_eq!(message, "Pet não encontrado");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn listing_paginates_and_filters() {
    let (base, _state) = start_server().await;
    let client = client(&base);
    login(&client).await;
    let pets = PetsService::new(client.clone());

    for (nome, raca) in [
        ("Rex", "Labrador"),
        ("Rita", "Poodle"),
        ("Romeu", "Labrador"),
    ] {
        pets.create(&CreatePet {
            nome: nome.into(),
            raca: Some(raca.into()),
            idade: None,
        })
        .await
        .unwrap();
    }

    let first = pets
        .list(&PetFilters {
            page: Some(0),
            size: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(first.content.len(), 2);
    assert_eq!(first.total, 3);
    assert_eq!(first.page_count, 2);

    let second = pets
        .list(&PetFilters {
            page: Some(1),
            size: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(second.content.len(), 1);

    let labradors = pets
        .list(&PetFilters {
            raca: Some("labrador".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(labradors.total, 2);
}

#[tokio::test]
async fn expired_access_token_is_refreshed_once_and_the_call_retried() {
    let (base, state) = start_server().await;
    let client = client(&base);
    login(&client).await;
    let before = client.session().read();

    state.revoke_access_tokens();

    let pets = PetsService::new(client.clone());
    let page = pets.list(&PetFilters::default()).await.unwrap();
    assert_eq!(page.total, 0);

    assert_eq!(state.refresh_call_count(), 1);

    // both tokens rotated and persisted
    let after = client.session().read();
    assert_ne!(after.access_token, before.access_token);
    assert_ne!(after.refresh_token, before.refresh_token);

    // the rotated refresh token is usable for the next expiry
    state.revoke_access_tokens();
    pets.list(&PetFilters::default()).await.unwrap();
    assert_eq!(state.refresh_call_count(), 2);
}

#[tokio::test]
async fn retried_request_does_not_refresh_twice() {
    let (base, state) = start_server().await;
    let client = client(&base);
    login(&client).await;

    state.reject_every_bearer();

    let pets = PetsService::new(client.clone());
    let err = pets.list(&PetFilters::default()).await.unwrap_err();
    assert_eq!(err.status(), Some(401));

    // one refresh, one retry, then the 401 is surfaced
    assert_eq!(state.refresh_call_count(), 1);
    // the refresh itself succeeded, so the session survives
    assert!(client.session().is_authenticated());
}

#[tokio::test]
async fn failed_refresh_clears_the_session_and_notifies() {
    let (base, state) = start_server().await;
    let counter = Arc::new(ExpiredCounter::default());
    let client = build_client(
        &base,
        ClientConfiguration {
            persistence_provider: Some(Arc::new(MemoryStore::default())),
            session_handler: Some(counter.clone()),
            ..Default::default()
        },
    );
    login(&client).await;

    state.revoke_all_tokens();

    let pets = PetsService::new(client.clone());
    let err = pets.list(&PetFilters::default()).await.unwrap_err();
    // the surfaced error is the refresh failure
    match err {
        ApiClientError::Http {
            status, message, ..
        } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Sessão expirada");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(state.refresh_call_count(), 1);
    assert!(!client.session().is_authenticated());
    assert_eq!(client.session().read(), Session::default());
    assert_eq!(counter.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_refresh_token_propagates_the_original_401() {
    let (base, state) = start_server().await;
    let backing = Arc::new(MemoryStore::default());
    let client = build_client(
        &base,
        ClientConfiguration {
            persistence_provider: Some(backing.clone()),
            ..Default::default()
        },
    );
    login(&client).await;

    // lose the refresh token but keep a stale access token
    use pet_manager_core::callbacks::PersistentStore;
    backing.remove_entry("refresh_token".to_owned());
    state.revoke_access_tokens();

    let pets = PetsService::new(client.clone());
    let err = pets.list(&PetFilters::default()).await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(state.refresh_call_count(), 0);
    // nothing was cleared on this path
    assert!(client.session().is_authenticated());
}

#[tokio::test]
async fn validation_errors_carry_field_details() {
    let (base, _state) = start_server().await;
    let client = client(&base);
    login(&client).await;
    let pets = PetsService::new(client.clone());

    let err = pets
        .create(&CreatePet {
            nome: "  ".into(),
            raca: None,
            idade: None,
        })
        .await
        .unwrap_err();

    match err {
        ApiClientError::Http {
            status,
            message,
            field_errors,
        } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Dados inválidos");
            assert!(field_errors.unwrap().contains_key("nome"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn foto_upload_roundtrip() {
    let (base, _state) = start_server().await;
    let client = client(&base);
    login(&client).await;
    let pets = PetsService::new(client.clone());

    let pet = pets
        .create(&CreatePet {
            nome: "Rex".into(),
            raca: None,
            idade: None,
        })
        .await
        .unwrap();

    let foto = pets.add_foto(pet.id, png_upload("rex.png")).await.unwrap();
    assert_eq!(foto.nome, "rex.png");
    assert_eq!(foto.content_type, "image/png");
    assert!(foto.url.contains("/fotos/"));

    let detail = pets.get(pet.id).await.unwrap();
    assert_eq!(detail.pet.foto.as_ref(), Some(&foto));

    pets.remove_foto(pet.id, foto.id).await.unwrap();
    let err = pets.remove_foto(pet.id, foto.id).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn bulk_foto_upload_uploads_every_file() {
    let (base, _state) = start_server().await;
    let client = client(&base);
    login(&client).await;
    let pets = PetsService::new(client.clone());

    let pet = pets
        .create(&CreatePet {
            nome: "Rex".into(),
            raca: None,
            idade: None,
        })
        .await
        .unwrap();

    let fotos = pets
        .add_fotos(
            pet.id,
            vec![
                png_upload("a.png"),
                png_upload("b.png"),
                png_upload("c.png"),
            ],
        )
        .await
        .unwrap();
    assert_eq!(fotos.len(), 3);
}

#[tokio::test]
async fn tutores_crud_and_pet_linking() {
    let (base, _state) = start_server().await;
    let client = client(&base);
    login(&client).await;
    let pets = PetsService::new(client.clone());
    let tutores = TutoresService::new(client.clone());

    let tutor = tutores
        .create(&CreateTutor {
            nome: "Maria".into(),
            telefone: "11999990000".into(),
            email: Some("maria@example.com".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    let page = tutores
        .list(&TutorFilters {
            telefone: Some("11999990000".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 1);

    let pet = pets
        .create(&CreatePet {
            nome: "Rex".into(),
            raca: None,
            idade: None,
        })
        .await
        .unwrap();

    tutores.link_pet(tutor.id, pet.id).await.unwrap();

    let tutor_detail = tutores.get(tutor.id).await.unwrap();
    let linked = tutor_detail.pets.unwrap();
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].id, pet.id);

    let pet_detail = pets.get(pet.id).await.unwrap();
    let owners = pet_detail.tutores.unwrap();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].id, tutor.id);

    tutores.unlink_pet(tutor.id, pet.id).await.unwrap();
    let tutor_detail = tutores.get(tutor.id).await.unwrap();
    assert_eq!(tutor_detail.pets.as_deref(), Some(&[][..]));

    let err = tutores.unlink_pet(tutor.id, pet.id).await.unwrap_err();
    assert_eq!(err.status(), Some(404));

    let updated = tutores
        .update(
            tutor.id,
            &CreateTutor {
                nome: "Maria Silva".into(),
                telefone: "11999990000".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.nome, "Maria Silva");

    tutores.delete(tutor.id).await.unwrap();
    let err = tutores.get(tutor.id).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn tutor_foto_upload_roundtrip() {
    let (base, _state) = start_server().await;
    let client = client(&base);
    login(&client).await;
    let tutores = TutoresService::new(client.clone());

    let tutor = tutores
        .create(&CreateTutor {
            nome: "Maria".into(),
            telefone: "11999990000".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    let foto = tutores
        .add_foto(tutor.id, png_upload("maria.png"))
        .await
        .unwrap();
    assert_eq!(foto.content_type, "image/png");

    tutores.remove_foto(tutor.id, foto.id).await.unwrap();
}
