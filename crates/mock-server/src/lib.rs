//! In-process replica of the pet-manager REST API.
//!
//! Backs the core crate's integration tests: issues and rotates bearer
//! tokens, serves the `/v1` resources behind a bearer check, and exposes
//! knobs ([ApiState::revoke_access_tokens] and friends) for forcing the
//! `401` paths the client has to recover from.

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    sync::{Arc, Mutex},
};

use axum::{
    extract::{Multipart, Path, Query, Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;

#[derive(Clone, Debug, Serialize)]
pub struct Foto {
    pub id: i64,
    pub nome: String,
    #[serde(rename = "contentType")]
    pub content_type: String,
    pub url: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Pet {
    pub id: i64,
    pub nome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raca: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idade: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foto: Option<Foto>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Tutor {
    pub id: i64,
    pub nome: String,
    pub telefone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endereco: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpf: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foto: Option<Foto>,
}

#[derive(Serialize)]
struct Paginated<T> {
    content: Vec<T>,
    page: u32,
    size: u32,
    total: u64,
    #[serde(rename = "pageCount")]
    page_count: u32,
}

#[derive(Deserialize)]
struct LoginBody {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct RefreshBody {
    #[serde(rename = "refreshToken")]
    refresh_token: String,
}

#[derive(Deserialize, Default)]
struct ListParams {
    nome: Option<String>,
    raca: Option<String>,
    telefone: Option<String>,
    page: Option<u32>,
    size: Option<u32>,
}

#[derive(Deserialize)]
struct CreatePetBody {
    #[serde(default)]
    nome: String,
    raca: Option<String>,
    idade: Option<u32>,
}

#[derive(Deserialize)]
struct CreateTutorBody {
    #[serde(default)]
    nome: String,
    #[serde(default)]
    telefone: String,
    email: Option<String>,
    endereco: Option<String>,
    cpf: Option<String>,
}

#[derive(Clone, Debug)]
struct PetRecord {
    nome: String,
    raca: Option<String>,
    idade: Option<u32>,
    fotos: Vec<Foto>,
}

#[derive(Clone, Debug)]
struct TutorRecord {
    nome: String,
    telefone: String,
    email: Option<String>,
    endereco: Option<String>,
    cpf: Option<String>,
    fotos: Vec<Foto>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    issued: u64,
    refresh_calls: u64,
    reject_every_bearer: bool,
    access_tokens: HashSet<String>,
    refresh_tokens: HashSet<String>,
    pets: BTreeMap<i64, PetRecord>,
    tutores: BTreeMap<i64, TutorRecord>,
    /// (tutor_id, pet_id) pairs.
    links: BTreeSet<(i64, i64)>,
}

impl Inner {
    fn issue_tokens(&mut self) -> (String, String) {
        self.issued += 1;
        let access = format!("access-{}", self.issued);
        let refresh = format!("refresh-{}", self.issued);
        self.access_tokens.insert(access.clone());
        self.refresh_tokens.insert(refresh.clone());
        (access, refresh)
    }

    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn pet_wire(&self, id: i64, record: &PetRecord) -> Pet {
        Pet {
            id,
            nome: record.nome.clone(),
            raca: record.raca.clone(),
            idade: record.idade,
            foto: record.fotos.first().cloned(),
        }
    }

    fn tutor_wire(&self, id: i64, record: &TutorRecord) -> Tutor {
        Tutor {
            id,
            nome: record.nome.clone(),
            telefone: record.telefone.clone(),
            email: record.email.clone(),
            endereco: record.endereco.clone(),
            cpf: record.cpf.clone(),
            foto: record.fotos.first().cloned(),
        }
    }
}

/// Shared server state plus the test-facing control knobs.
#[derive(Clone, Default)]
pub struct ApiState(Arc<Mutex<Inner>>);

impl ApiState {
    /// Invalidates every outstanding access token. Refresh tokens stay
    /// valid, so the next authenticated call forces the refresh path.
    pub fn revoke_access_tokens(&self) {
        self.0.lock().unwrap().access_tokens.clear();
    }

    /// Invalidates access and refresh tokens alike, so a refresh attempt
    /// fails too.
    pub fn revoke_all_tokens(&self) {
        let mut inner = self.0.lock().unwrap();
        inner.access_tokens.clear();
        inner.refresh_tokens.clear();
    }

    /// Rejects every bearer, including tokens issued after this call.
    /// Refresh keeps succeeding - this simulates a retry that still comes
    /// back `401`.
    pub fn reject_every_bearer(&self) {
        self.0.lock().unwrap().reject_every_bearer = true;
    }

    /// Number of calls the refresh endpoint has served.
    pub fn refresh_call_count(&self) -> u64 {
        self.0.lock().unwrap().refresh_calls
    }
}

/// Router with a fresh state. Use [router] to keep a handle on the state.
pub fn app() -> Router {
    router(ApiState::default())
}

pub fn router(state: ApiState) -> Router {
    let protected = Router::new()
        .route("/pets", get(list_pets).post(create_pet))
        .route(
            "/pets/{id}",
            get(get_pet).put(update_pet).delete(delete_pet),
        )
        .route("/pets/{id}/fotos", post(add_pet_foto))
        .route("/pets/{id}/fotos/{foto_id}", axum::routing::delete(remove_pet_foto))
        .route("/tutores", get(list_tutores).post(create_tutor))
        .route(
            "/tutores/{id}",
            get(get_tutor).put(update_tutor).delete(delete_tutor),
        )
        .route("/tutores/{id}/fotos", post(add_tutor_foto))
        .route(
            "/tutores/{id}/fotos/{foto_id}",
            axum::routing::delete(remove_tutor_foto),
        )
        .route(
            "/tutores/{tutor_id}/pets/{pet_id}",
            post(link_pet).delete(unlink_pet),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer,
        ));

    Router::new()
        .route("/autenticacao/login", post(login))
        .route("/autenticacao/refresh", put(refresh))
        .nest("/v1", protected)
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Serve with an externally held [ApiState], so tests can flip the control
/// knobs while the server runs.
pub async fn serve(listener: TcpListener, state: ApiState) -> Result<(), std::io::Error> {
    axum::serve(listener, router(state)).await
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": message })),
    )
        .into_response()
}

fn not_found(message: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "message": message }))).into_response()
}

async fn require_bearer(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_owned);

    let valid = {
        let inner = state.0.lock().unwrap();
        !inner.reject_every_bearer
            && token
                .as_deref()
                .is_some_and(|token| inner.access_tokens.contains(token))
    };

    if !valid {
        return unauthorized("Token inválido");
    }
    next.run(request).await
}

async fn login(State(state): State<ApiState>, Json(body): Json<LoginBody>) -> Response {
    if body.username != "admin" || body.password != "admin" {
        return unauthorized("Credenciais inválidas");
    }

    let (access, refresh) = state.0.lock().unwrap().issue_tokens();
    Json(json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": 300,
        "refresh_expires_in": 1800,
    }))
    .into_response()
}

async fn refresh(State(state): State<ApiState>, Json(body): Json<RefreshBody>) -> Response {
    let mut inner = state.0.lock().unwrap();
    inner.refresh_calls += 1;

    if !inner.refresh_tokens.remove(&body.refresh_token) {
        return unauthorized("Sessão expirada");
    }

    let (access, refresh) = inner.issue_tokens();
    Json(json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": 300,
        "refresh_expires_in": 1800,
    }))
    .into_response()
}

fn paginate<T>(items: Vec<T>, page: u32, size: u32) -> Paginated<T> {
    let total = items.len() as u64;
    let size = size.max(1);
    let page_count = total.div_ceil(size as u64) as u32;
    let content = items
        .into_iter()
        .skip(page as usize * size as usize)
        .take(size as usize)
        .collect();
    Paginated {
        content,
        page,
        size,
        total,
        page_count,
    }
}

fn matches_filter(value: &str, filter: &Option<String>) -> bool {
    filter
        .as_deref()
        .is_none_or(|f| value.to_lowercase().contains(&f.to_lowercase()))
}

async fn list_pets(State(state): State<ApiState>, Query(params): Query<ListParams>) -> Response {
    let inner = state.0.lock().unwrap();
    let pets: Vec<Pet> = inner
        .pets
        .iter()
        .filter(|(_, record)| matches_filter(&record.nome, &params.nome))
        .filter(|(_, record)| {
            params.raca.is_none()
                || record
                    .raca
                    .as_deref()
                    .is_some_and(|raca| matches_filter(raca, &params.raca))
        })
        .map(|(id, record)| inner.pet_wire(*id, record))
        .collect();
    Json(paginate(
        pets,
        params.page.unwrap_or(0),
        params.size.unwrap_or(10),
    ))
    .into_response()
}

async fn create_pet(State(state): State<ApiState>, Json(body): Json<CreatePetBody>) -> Response {
    if body.nome.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "message": "Dados inválidos",
                "errors": { "nome": ["nome é obrigatório"] },
            })),
        )
            .into_response();
    }

    let mut inner = state.0.lock().unwrap();
    let id = inner.next_id();
    let record = PetRecord {
        nome: body.nome,
        raca: body.raca,
        idade: body.idade,
        fotos: Vec::new(),
    };
    let wire = inner.pet_wire(id, &record);
    inner.pets.insert(id, record);
    (StatusCode::CREATED, Json(wire)).into_response()
}

async fn get_pet(State(state): State<ApiState>, Path(id): Path<i64>) -> Response {
    let inner = state.0.lock().unwrap();
    let Some(record) = inner.pets.get(&id) else {
        return not_found("Pet não encontrado");
    };
    let mut wire = serde_json::to_value(inner.pet_wire(id, record)).unwrap();
    let tutores: Vec<Tutor> = inner
        .links
        .iter()
        .filter(|(_, pet_id)| *pet_id == id)
        .filter_map(|(tutor_id, _)| {
            inner
                .tutores
                .get(tutor_id)
                .map(|t| inner.tutor_wire(*tutor_id, t))
        })
        .collect();
    wire["tutores"] = serde_json::to_value(tutores).unwrap();
    Json(wire).into_response()
}

async fn update_pet(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(body): Json<CreatePetBody>,
) -> Response {
    let mut inner = state.0.lock().unwrap();
    let Some(record) = inner.pets.get_mut(&id) else {
        return not_found("Pet não encontrado");
    };
    record.nome = body.nome;
    record.raca = body.raca;
    record.idade = body.idade;
    let record = record.clone();
    Json(inner.pet_wire(id, &record)).into_response()
}

async fn delete_pet(State(state): State<ApiState>, Path(id): Path<i64>) -> Response {
    let mut inner = state.0.lock().unwrap();
    if inner.pets.remove(&id).is_none() {
        return not_found("Pet não encontrado");
    }
    inner.links.retain(|(_, pet_id)| *pet_id != id);
    StatusCode::NO_CONTENT.into_response()
}

async fn add_pet_foto(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Response {
    match read_foto_field(multipart).await {
        Ok((nome, content_type)) => {
            let mut inner = state.0.lock().unwrap();
            if !inner.pets.contains_key(&id) {
                return not_found("Pet não encontrado");
            }
            let foto_id = inner.next_id();
            let foto = Foto {
                id: foto_id,
                nome,
                content_type,
                url: format!("/v1/pets/{id}/fotos/{foto_id}"),
            };
            inner
                .pets
                .get_mut(&id)
                .expect("checked above")
                .fotos
                .push(foto.clone());
            (StatusCode::CREATED, Json(foto)).into_response()
        }
        Err(response) => response,
    }
}

async fn remove_pet_foto(
    State(state): State<ApiState>,
    Path((id, foto_id)): Path<(i64, i64)>,
) -> Response {
    let mut inner = state.0.lock().unwrap();
    let Some(record) = inner.pets.get_mut(&id) else {
        return not_found("Pet não encontrado");
    };
    let before = record.fotos.len();
    record.fotos.retain(|foto| foto.id != foto_id);
    if record.fotos.len() == before {
        return not_found("Foto não encontrada");
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn list_tutores(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> Response {
    let inner = state.0.lock().unwrap();
    let tutores: Vec<Tutor> = inner
        .tutores
        .iter()
        .filter(|(_, record)| matches_filter(&record.nome, &params.nome))
        .filter(|(_, record)| matches_filter(&record.telefone, &params.telefone))
        .map(|(id, record)| inner.tutor_wire(*id, record))
        .collect();
    Json(paginate(
        tutores,
        params.page.unwrap_or(0),
        params.size.unwrap_or(10),
    ))
    .into_response()
}

async fn create_tutor(
    State(state): State<ApiState>,
    Json(body): Json<CreateTutorBody>,
) -> Response {
    if body.nome.trim().is_empty() || body.telefone.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "message": "Dados inválidos",
                "errors": { "nome": ["nome e telefone são obrigatórios"] },
            })),
        )
            .into_response();
    }

    let mut inner = state.0.lock().unwrap();
    let id = inner.next_id();
    let record = TutorRecord {
        nome: body.nome,
        telefone: body.telefone,
        email: body.email,
        endereco: body.endereco,
        cpf: body.cpf,
        fotos: Vec::new(),
    };
    let wire = inner.tutor_wire(id, &record);
    inner.tutores.insert(id, record);
    (StatusCode::CREATED, Json(wire)).into_response()
}

async fn get_tutor(State(state): State<ApiState>, Path(id): Path<i64>) -> Response {
    let inner = state.0.lock().unwrap();
    let Some(record) = inner.tutores.get(&id) else {
        return not_found("Tutor não encontrado");
    };
    let mut wire = serde_json::to_value(inner.tutor_wire(id, record)).unwrap();
    let pets: Vec<Pet> = inner
        .links
        .iter()
        .filter(|(tutor_id, _)| *tutor_id == id)
        .filter_map(|(_, pet_id)| inner.pets.get(pet_id).map(|p| inner.pet_wire(*pet_id, p)))
        .collect();
    wire["pets"] = serde_json::to_value(pets).unwrap();
    Json(wire).into_response()
}

async fn update_tutor(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(body): Json<CreateTutorBody>,
) -> Response {
    let mut inner = state.0.lock().unwrap();
    let Some(record) = inner.tutores.get_mut(&id) else {
        return not_found("Tutor não encontrado");
    };
    record.nome = body.nome;
    record.telefone = body.telefone;
    record.email = body.email;
    record.endereco = body.endereco;
    record.cpf = body.cpf;
    let record = record.clone();
    Json(inner.tutor_wire(id, &record)).into_response()
}

async fn delete_tutor(State(state): State<ApiState>, Path(id): Path<i64>) -> Response {
    let mut inner = state.0.lock().unwrap();
    if inner.tutores.remove(&id).is_none() {
        return not_found("Tutor não encontrado");
    }
    inner.links.retain(|(tutor_id, _)| *tutor_id != id);
    StatusCode::NO_CONTENT.into_response()
}

async fn add_tutor_foto(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Response {
    match read_foto_field(multipart).await {
        Ok((nome, content_type)) => {
            let mut inner = state.0.lock().unwrap();
            if !inner.tutores.contains_key(&id) {
                return not_found("Tutor não encontrado");
            }
            let foto_id = inner.next_id();
            let foto = Foto {
                id: foto_id,
                nome,
                content_type,
                url: format!("/v1/tutores/{id}/fotos/{foto_id}"),
            };
            inner
                .tutores
                .get_mut(&id)
                .expect("checked above")
                .fotos
                .push(foto.clone());
            (StatusCode::CREATED, Json(foto)).into_response()
        }
        Err(response) => response,
    }
}

async fn remove_tutor_foto(
    State(state): State<ApiState>,
    Path((id, foto_id)): Path<(i64, i64)>,
) -> Response {
    let mut inner = state.0.lock().unwrap();
    let Some(record) = inner.tutores.get_mut(&id) else {
        return not_found("Tutor não encontrado");
    };
    let before = record.fotos.len();
    record.fotos.retain(|foto| foto.id != foto_id);
    if record.fotos.len() == before {
        return not_found("Foto não encontrada");
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn link_pet(
    State(state): State<ApiState>,
    Path((tutor_id, pet_id)): Path<(i64, i64)>,
) -> Response {
    let mut inner = state.0.lock().unwrap();
    if !inner.tutores.contains_key(&tutor_id) {
        return not_found("Tutor não encontrado");
    }
    if !inner.pets.contains_key(&pet_id) {
        return not_found("Pet não encontrado");
    }
    inner.links.insert((tutor_id, pet_id));
    StatusCode::NO_CONTENT.into_response()
}

async fn unlink_pet(
    State(state): State<ApiState>,
    Path((tutor_id, pet_id)): Path<(i64, i64)>,
) -> Response {
    let mut inner = state.0.lock().unwrap();
    if !inner.links.remove(&(tutor_id, pet_id)) {
        return not_found("Vínculo não encontrado");
    }
    StatusCode::NO_CONTENT.into_response()
}

/// Pulls the `foto` part out of the upload, returning its file name and
/// content type.
async fn read_foto_field(mut multipart: Multipart) -> Result<(String, String), Response> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": e.to_string() })),
        )
            .into_response()
    })? {
        if field.name() != Some("foto") {
            continue;
        }
        let nome = field.file_name().unwrap_or("foto").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        // consume the bytes so the body is fully read
        let _ = field.bytes().await.map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": e.to_string() })),
            )
                .into_response()
        })?;
        return Ok((nome, content_type));
    }
    Err((
        StatusCode::BAD_REQUEST,
        Json(json!({ "message": "campo foto ausente" })),
    )
        .into_response())
}
