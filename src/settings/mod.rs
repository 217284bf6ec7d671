//! Service configuration
//!
//! Layered: serde defaults, then an optional `sipat.toml`, then `SIPAT_*`
//! environment variables (`SIPAT_RULES__MAX_RUTAS_POR_DIA=3`).

use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// How a route on the day after another route is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsecutivePolicy {
    /// Created with `es_consecutiva = true` and a warning
    Advertir,
    /// Rejected as an eligibility failure
    Bloquear,
}

/// Business rules for short-route assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningRules {
    pub max_rutas_por_dia: usize,
    pub objetivo_semanal_min: u32,
    pub objetivo_semanal_max: u32,
    pub politica_consecutiva: ConsecutivePolicy,
    pub ventana_inicio: NaiveTime,
    pub ventana_fin: NaiveTime,
    pub duracion_maxima_minutos: i64,
    pub hora_inicio_automatica: NaiveTime,
    pub descanso_entre_rutas_minutos: i64,
    pub cupos_por_tramo: usize,
    /// Consecutive worked days before a conductor is sent to rest (0 disables)
    pub dias_para_descanso: u32,
    pub dias_de_descanso: u32,
}

impl Default for PlanningRules {
    fn default() -> Self {
        PlanningRules {
            max_rutas_por_dia: 2,
            objetivo_semanal_min: 3,
            objetivo_semanal_max: 4,
            politica_consecutiva: ConsecutivePolicy::Advertir,
            ventana_inicio: NaiveTime::from_hms_opt(4, 0, 0).unwrap_or_default(),
            ventana_fin: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or_default(),
            duracion_maxima_minutos: 12 * 60,
            hora_inicio_automatica: NaiveTime::from_hms_opt(6, 0, 0).unwrap_or_default(),
            descanso_entre_rutas_minutos: 60,
            cupos_por_tramo: 1,
            dias_para_descanso: 6,
            dias_de_descanso: 1,
        }
    }
}

/// Application configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub http_port: u16,
    pub surrealdb_url: String,
    pub surrealdb_user: String,
    pub surrealdb_pass: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    /// Seconds between catalog reloads, 0 disables the background reload
    pub catalog_reload_interval_secs: u64,
    pub rules: PlanningRules,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            http_port: 8080,
            surrealdb_url: "localhost:8000".to_string(),
            surrealdb_user: "root".to_string(),
            surrealdb_pass: "sipat_dev_password".to_string(),
            surrealdb_namespace: "sipat".to_string(),
            surrealdb_database: "operaciones".to_string(),
            catalog_reload_interval_secs: 300,
            rules: PlanningRules::default(),
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("http_port", &self.http_port)
            .field("surrealdb_url", &self.surrealdb_url)
            .field("surrealdb_user", &self.surrealdb_user)
            .field("surrealdb_pass", &"***")
            .field("surrealdb_namespace", &self.surrealdb_namespace)
            .field("surrealdb_database", &self.surrealdb_database)
            .field("catalog_reload_interval_secs", &self.catalog_reload_interval_secs)
            .field("rules", &self.rules)
            .finish()
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let file = std::env::var("SIPAT_CONFIG").unwrap_or_else(|_| "sipat".to_string());
        Self::from_sources(
            config::File::with_name(&file).required(false),
            config::Environment::with_prefix("SIPAT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
    }

    fn from_sources<F, E>(file: F, env: E) -> Result<Self>
    where
        F: config::Source + Send + Sync + 'static,
        E: config::Source + Send + Sync + 'static,
    {
        let settings: Settings = config::Config::builder()
            .add_source(file)
            .add_source(env)
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        let rules = &self.rules;
        anyhow::ensure!(rules.max_rutas_por_dia > 0, "max_rutas_por_dia must be positive");
        anyhow::ensure!(
            rules.objetivo_semanal_min <= rules.objetivo_semanal_max,
            "objetivo_semanal_min ({}) exceeds objetivo_semanal_max ({})",
            rules.objetivo_semanal_min,
            rules.objetivo_semanal_max
        );
        anyhow::ensure!(
            rules.ventana_inicio <= rules.ventana_fin,
            "ventana_inicio must not be after ventana_fin"
        );
        Ok(())
    }
}
