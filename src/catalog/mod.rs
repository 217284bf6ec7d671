//! Tramo Catalog
//!
//! In-memory catalog of the short-route segments (tramos) drivers can be
//! assigned to. Reference data only: loaded from the store, never mutated
//! by the planner.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use chrono::{DateTime, Utc};

use crate::error::PlanningError;

/// Direction of travel of a tramo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Norte,
    Sur,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Norte => write!(f, "NORTE"),
            Direction::Sur => write!(f, "SUR"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = PlanningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NORTE" => Ok(Direction::Norte),
            "SUR" => Ok(Direction::Sur),
            other => Err(PlanningError::Validation(format!(
                "Sentido de tramo desconocido: {}",
                other
            ))),
        }
    }
}

/// A route segment definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tramo {
    pub id: String, // e.g., "LIMA-ICA"
    pub direction: Direction,
    pub duration_hours: Decimal,
    pub base_income: Decimal,
    pub active: bool,
}

impl Tramo {
    pub fn new(
        id: impl Into<String>,
        direction: Direction,
        duration_hours: Decimal,
        base_income: Decimal,
    ) -> Self {
        Tramo {
            id: id.into(),
            direction,
            duration_hours,
            base_income,
            active: true,
        }
    }

    /// Duration rounded to whole minutes
    pub fn duration_minutes(&self) -> i64 {
        duration_to_minutes(self.duration_hours)
    }

    fn validate(&self) -> Result<(), PlanningError> {
        if self.id.trim().is_empty() {
            return Err(PlanningError::Validation(
                "El identificador del tramo es obligatorio".to_string(),
            ));
        }
        let minutes = self.duration_minutes();
        if minutes <= 0 || minutes >= 24 * 60 {
            return Err(PlanningError::Validation(format!(
                "Duración inválida para el tramo {}: {} h",
                self.id, self.duration_hours
            )));
        }
        if self.base_income < Decimal::ZERO {
            return Err(PlanningError::Validation(format!(
                "Ingreso base negativo para el tramo {}",
                self.id
            )));
        }
        Ok(())
    }
}

/// Convert a decimal hour amount to whole minutes
pub fn duration_to_minutes(hours: Decimal) -> i64 {
    (hours * Decimal::from(60)).round().to_i64().unwrap_or(0)
}

/// The tramo catalog
#[derive(Debug, Clone)]
pub struct TramoCatalog {
    tramos: BTreeMap<String, Tramo>,
    /// When the catalog was last loaded
    pub loaded_at: DateTime<Utc>,
}

impl TramoCatalog {
    /// Create a new empty catalog
    pub fn new() -> Self {
        TramoCatalog {
            tramos: BTreeMap::new(),
            loaded_at: Utc::now(),
        }
    }

    /// Build a catalog from a list of tramos, rejecting invalid or duplicated entries
    pub fn from_tramos(tramos: Vec<Tramo>) -> Result<Self, PlanningError> {
        let mut catalog = TramoCatalog::new();
        for tramo in tramos {
            if catalog.tramos.contains_key(&tramo.id) {
                return Err(PlanningError::Validation(format!(
                    "Tramo duplicado en el catálogo: {}",
                    tramo.id
                )));
            }
            catalog.insert(tramo)?;
        }
        Ok(catalog)
    }

    /// Add or replace a tramo
    pub fn insert(&mut self, tramo: Tramo) -> Result<(), PlanningError> {
        tramo.validate()?;
        self.tramos.insert(tramo.id.clone(), tramo);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Tramo> {
        self.tramos.get(id)
    }

    /// Active tramos in identifier order
    pub fn active(&self) -> impl Iterator<Item = &Tramo> {
        self.tramos.values().filter(|t| t.active)
    }

    pub fn len(&self) -> usize {
        self.tramos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tramos.is_empty()
    }
}

impl Default for TramoCatalog {
    fn default() -> Self {
        Self::new()
    }
}
