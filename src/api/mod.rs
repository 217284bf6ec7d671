//! HTTP API
//!
//! JSON surface over the planner. Reads take the shared lock; every write
//! (assignment, transition, automatic run, reload) takes the exclusive one.

use crate::assignment::{IsoSemana, RutaCorta};
use crate::balance::BalanceRutaCorta;
use crate::conflicts::{Conflict, ConflictScope};
use crate::constraints::Eligibility;
use crate::error::PlanningError;
use crate::events::EventRecord;
use crate::planner::{AssignRequest, AutoAssignReport, CompletarRequest};
use crate::{db, metrics, AppState};

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Errors returned by the HTTP handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Planning(#[from] PlanningError),

    #[error("Servicio no disponible: {0}")]
    Unavailable(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Planning(PlanningError::Validation(format!(
            "Cuerpo de la solicitud inválido: {}",
            rejection.body_text()
        )))
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            ApiError::Planning(e) => match e {
                PlanningError::Validation(_) => (StatusCode::BAD_REQUEST, "Validation Error"),
                PlanningError::Eligibility(_) => (StatusCode::UNPROCESSABLE_ENTITY, "Eligibility Error"),
                PlanningError::DuplicateAssignment { .. } => (StatusCode::CONFLICT, "Duplicate Assignment"),
                PlanningError::NotFound(_) => (StatusCode::NOT_FOUND, "Not Found"),
                PlanningError::StateTransition { .. } => (StatusCode::CONFLICT, "Invalid State Transition"),
            },
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable"),
        };
        let code = match &self {
            ApiError::Planning(e) => e.code(),
            ApiError::Unavailable(_) => "SERVICE_UNAVAILABLE",
        };

        let body = ErrorResponse {
            error: error.to_string(),
            message: self.to_string(),
            code: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct AutoAsignarBody {
    pub fecha: NaiveDate,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IniciarBody {
    pub hora_inicio_real: Option<NaiveTime>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CancelarBody {
    pub motivo: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReagendarBody {
    pub fecha: NaiveDate,
    pub hora_inicio: Option<NaiveTime>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConflictosQuery {
    pub fecha: Option<NaiveDate>,
    pub anio: Option<i32>,
    pub semana: Option<u32>,
}

/// A route with its event history
#[derive(Debug, Serialize)]
pub struct RutaDetalle {
    pub ruta: RutaCorta,
    pub historial: Vec<EventRecord>,
}

#[derive(Debug, Serialize)]
pub struct RecargaResumen {
    pub tramos: usize,
    pub conductores: usize,
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/rutas-cortas", post(asignar))
        .route("/rutas-cortas/validar", post(validar))
        .route("/rutas-cortas/auto-asignar", post(auto_asignar))
        .route("/rutas-cortas/:id", get(obtener))
        .route("/rutas-cortas/:id/confirmar", post(confirmar))
        .route("/rutas-cortas/:id/iniciar", post(iniciar))
        .route("/rutas-cortas/:id/completar", post(completar))
        .route("/rutas-cortas/:id/cancelar", post(cancelar))
        .route("/rutas-cortas/:id/reagendar", post(reagendar))
        .route("/balances/:conductor/:anio/:semana", get(balance))
        .route("/conflictos", get(conflictos))
        .route("/catalogo/recargar", post(recargar))
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn metrics_handler() -> String {
    metrics::render()
}

async fn asignar(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AssignRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RutaCorta>), ApiError> {
    let Json(request) = payload?;
    let mut planner = state.planner.write().await;
    let ruta = planner.assign(request)?;
    Ok((StatusCode::CREATED, Json(ruta)))
}

async fn validar(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AssignRequest>, JsonRejection>,
) -> ApiResult<Eligibility> {
    let Json(request) = payload?;
    let planner = state.planner.read().await;
    Ok(Json(planner.validate(&request)))
}

async fn auto_asignar(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AutoAsignarBody>, JsonRejection>,
) -> ApiResult<AutoAssignReport> {
    let Json(body) = payload?;
    let mut planner = state.planner.write().await;
    Ok(Json(planner.auto_assign(body.fecha)))
}

async fn obtener(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult<RutaDetalle> {
    let planner = state.planner.read().await;
    let ruta = planner.ruta(&id)?.clone();
    let historial = planner.history(&id).into_iter().cloned().collect();
    Ok(Json(RutaDetalle { ruta, historial }))
}

async fn confirmar(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult<RutaCorta> {
    let mut planner = state.planner.write().await;
    Ok(Json(planner.confirmar(&id)?))
}

async fn iniciar(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Result<Json<IniciarBody>, JsonRejection>,
) -> ApiResult<RutaCorta> {
    let Json(body) = payload?;
    let mut planner = state.planner.write().await;
    Ok(Json(planner.iniciar(&id, body.hora_inicio_real)?))
}

async fn completar(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Result<Json<CompletarRequest>, JsonRejection>,
) -> ApiResult<RutaCorta> {
    let Json(body) = payload?;
    let mut planner = state.planner.write().await;
    Ok(Json(planner.completar(&id, body)?))
}

async fn cancelar(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Result<Json<CancelarBody>, JsonRejection>,
) -> ApiResult<RutaCorta> {
    let Json(body) = payload?;
    let mut planner = state.planner.write().await;
    Ok(Json(planner.cancelar(&id, body.motivo)?))
}

async fn reagendar(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Result<Json<ReagendarBody>, JsonRejection>,
) -> ApiResult<RutaCorta> {
    let Json(body) = payload?;
    let mut planner = state.planner.write().await;
    Ok(Json(planner.reagendar(&id, body.fecha, body.hora_inicio)?))
}

async fn balance(
    State(state): State<Arc<AppState>>,
    Path((conductor, anio, semana)): Path<(String, i32, u32)>,
) -> ApiResult<BalanceRutaCorta> {
    let semana = iso_semana(anio, semana)?;
    let planner = state.planner.read().await;
    if planner.fleet().get(&conductor).is_none() {
        return Err(PlanningError::NotFound(format!("Conductor {}", conductor)).into());
    }
    Ok(Json(planner.balance(&conductor, semana)))
}

async fn conflictos(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConflictosQuery>,
) -> ApiResult<Vec<Conflict>> {
    let scope = match (query.fecha, query.anio, query.semana) {
        (Some(fecha), _, _) => ConflictScope::Dia(fecha),
        (None, Some(anio), Some(semana)) => ConflictScope::Semana(iso_semana(anio, semana)?),
        _ => {
            return Err(PlanningError::Validation(
                "Se requiere fecha o anio y semana".to_string(),
            )
            .into())
        }
    };
    let planner = state.planner.read().await;
    Ok(Json(planner.conflicts(scope)))
}

async fn recargar(State(state): State<Arc<AppState>>) -> ApiResult<RecargaResumen> {
    let (catalog, fleet) = db::load_reference_data(&state.settings).await.map_err(|e| {
        error!("Reference data reload failed: {:#}", e);
        ApiError::Unavailable(e.to_string())
    })?;

    let resumen = RecargaResumen {
        tramos: catalog.len(),
        conductores: fleet.len(),
    };
    state.planner.write().await.reload(catalog, fleet);
    info!(tramos = resumen.tramos, conductores = resumen.conductores, "Reference data reloaded on request");
    Ok(Json(resumen))
}

fn iso_semana(anio: i32, semana: u32) -> Result<IsoSemana, PlanningError> {
    NaiveDate::from_isoywd_opt(anio, semana, Weekday::Mon)
        .map(IsoSemana::of)
        .ok_or_else(|| PlanningError::Validation(format!("Semana ISO inválida: {}-{}", anio, semana)))
}
