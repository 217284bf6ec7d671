//! Database Connectivity
//!
//! Loads the tramo catalog and conductor roster from SurrealDB.

use crate::catalog::{Direction, Tramo, TramoCatalog};
use crate::fleet::{Conductor, ConductorEstado, Fleet};
use crate::settings::Settings;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;
use tracing::{info, warn};

/// Raw tramo row from SurrealDB
#[derive(Debug, Deserialize)]
struct RawTramo {
    codigo: String,
    sentido: String,
    duracion_horas: f64,
    ingreso_base: f64,
    activo: Option<bool>,
}

/// Raw conductor row from SurrealDB
#[derive(Debug, Deserialize)]
struct RawConductor {
    codigo: String,
    nombre: String,
    origen: Option<String>,
    estado: Option<String>,
    descanso_hasta: Option<NaiveDate>,
    dias_trabajados: Option<u32>,
    ultimo_dia_trabajado: Option<NaiveDate>,
}

async fn connect(settings: &Settings) -> Result<Surreal<Client>> {
    let db = Surreal::new::<Ws>(settings.surrealdb_url.as_str())
        .await
        .context("Failed to connect to SurrealDB")?;

    db.signin(Root {
        username: &settings.surrealdb_user,
        password: &settings.surrealdb_pass,
    })
    .await
    .context("Failed to authenticate with SurrealDB")?;

    db.use_ns(settings.surrealdb_namespace.as_str())
        .use_db(settings.surrealdb_database.as_str())
        .await?;

    Ok(db)
}

/// Load tramos and conductores from SurrealDB
pub async fn load_reference_data(settings: &Settings) -> Result<(TramoCatalog, Fleet)> {
    let start = std::time::Instant::now();
    let db = connect(settings).await?;

    let tramos: Vec<RawTramo> = db
        .query("SELECT * FROM tramo")
        .await?
        .take(0)?;
    info!(count = tramos.len(), "Loaded tramos from SurrealDB");

    let mut catalog = TramoCatalog::new();
    for raw in tramos {
        match to_tramo(raw) {
            Ok(tramo) => {
                if let Err(e) = catalog.insert(tramo) {
                    warn!("Skipping invalid tramo: {}", e);
                }
            }
            Err(e) => warn!("Skipping tramo: {}", e),
        }
    }

    let conductores: Vec<RawConductor> = db
        .query("SELECT * FROM conductor WHERE estado != 'INACTIVO'")
        .await?
        .take(0)?;
    info!(count = conductores.len(), "Loaded conductores from SurrealDB");

    let fleet = Fleet::from_conductores(conductores.into_iter().map(to_conductor).collect());

    catalog.loaded_at = chrono::Utc::now();
    info!(
        tramos = catalog.len(),
        conductores = fleet.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Reference data loaded"
    );
    Ok((catalog, fleet))
}

fn to_tramo(raw: RawTramo) -> Result<Tramo> {
    let direction: Direction = raw.sentido.parse()?;
    let duration = Decimal::from_f64_retain(raw.duracion_horas)
        .with_context(|| format!("Invalid duration for tramo {}", raw.codigo))?
        .round_dp(2);
    let income = Decimal::from_f64_retain(raw.ingreso_base)
        .unwrap_or(Decimal::ZERO)
        .round_dp(2);

    Ok(Tramo {
        id: raw.codigo,
        direction,
        duration_hours: duration,
        base_income: income,
        active: raw.activo.unwrap_or(true),
    })
}

fn to_conductor(raw: RawConductor) -> Conductor {
    let estado = raw
        .estado
        .as_deref()
        .and_then(parse_estado)
        .unwrap_or(ConductorEstado::Disponible);

    Conductor {
        id: raw.codigo,
        nombre: raw.nombre,
        origen: raw.origen.unwrap_or_default(),
        estado,
        descanso_hasta: raw.descanso_hasta,
        dias_trabajados: raw.dias_trabajados.unwrap_or(0),
        ultimo_dia_trabajado: raw.ultimo_dia_trabajado,
    }
}

fn parse_estado(s: &str) -> Option<ConductorEstado> {
    match s.to_uppercase().as_str() {
        "DISPONIBLE" => Some(ConductorEstado::Disponible),
        "DESCANSO" => Some(ConductorEstado::Descanso),
        "INACTIVO" => Some(ConductorEstado::Inactivo),
        _ => None,
    }
}
