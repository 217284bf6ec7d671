//! Planning errors
//!
//! Every failure is per-request and recoverable; the caller corrects its
//! input and retries.

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;
use uuid::Uuid;

use crate::assignment::RutaEstado;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanningError {
    /// Bad input shape: missing tramo, driver or date
    #[error("Datos inválidos: {0}")]
    Validation(String),

    /// Driver fails an availability rule; the reason is shown to the user as-is
    #[error("{0}")]
    Eligibility(String),

    #[error("Conductor {conductor_id} ya tiene una ruta corta el {fecha} a las {hora_inicio}")]
    DuplicateAssignment {
        conductor_id: String,
        fecha: NaiveDate,
        hora_inicio: NaiveTime,
    },

    #[error("No encontrado: {0}")]
    NotFound(String),

    #[error("No se puede {action} la ruta {ruta_id} en estado {from}")]
    StateTransition {
        ruta_id: Uuid,
        from: RutaEstado,
        action: &'static str,
    },
}

impl PlanningError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            PlanningError::Validation(_) => "VALIDATION_ERROR",
            PlanningError::Eligibility(_) => "ELIGIBILITY_ERROR",
            PlanningError::DuplicateAssignment { .. } => "DUPLICATE_ASSIGNMENT",
            PlanningError::NotFound(_) => "NOT_FOUND",
            PlanningError::StateTransition { .. } => "STATE_TRANSITION_ERROR",
        }
    }
}
