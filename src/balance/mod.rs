//! Weekly Balance Tracker
//!
//! Aggregates each conductor's short routes per ISO week against the weekly
//! target. Rows are upserted by (conductor, week, year) so recomputing a key
//! any number of times leaves exactly one row.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::assignment::{IsoSemana, RutaEstado};
use crate::events::RutaEvent;
use crate::ledger::RouteLedger;

/// Weekly aggregate for one conductor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRutaCorta {
    pub conductor_id: String,
    pub semana: u32,
    pub anio: i32,
    pub rutas_programadas: u32,
    pub rutas_completadas: u32,
    pub ingreso_total: Decimal,
    pub objetivo_cumplido: bool,
    pub recalculado_en: DateTime<Utc>,
}

impl BalanceRutaCorta {
    /// Non-cancelled routes counted towards the target
    pub fn total(&self) -> u32 {
        self.rutas_programadas + self.rutas_completadas
    }
}

/// Weekly balance store
#[derive(Debug, Clone)]
pub struct BalanceTracker {
    objetivo_min: u32,
    objetivo_max: u32,
    balances: HashMap<(String, IsoSemana), BalanceRutaCorta>,
}

impl BalanceTracker {
    pub fn new(objetivo_min: u32, objetivo_max: u32) -> Self {
        BalanceTracker {
            objetivo_min,
            objetivo_max,
            balances: HashMap::new(),
        }
    }

    pub fn objetivo_max(&self) -> u32 {
        self.objetivo_max
    }

    /// Compute the balance straight from the ledger without storing it
    pub fn compute(&self, ledger: &RouteLedger, conductor_id: &str, semana: IsoSemana) -> BalanceRutaCorta {
        let mut programadas = 0u32;
        let mut completadas = 0u32;
        let mut ingreso = Decimal::ZERO;

        for ruta in ledger.for_conductor_week(conductor_id, semana) {
            match ruta.estado {
                RutaEstado::Programada | RutaEstado::EnCurso => programadas += 1,
                RutaEstado::Completada => completadas += 1,
                RutaEstado::Cancelada => continue,
            }
            ingreso += ruta.ingreso_estimado;
        }

        let total = programadas + completadas;
        BalanceRutaCorta {
            conductor_id: conductor_id.to_string(),
            semana: semana.semana,
            anio: semana.anio,
            rutas_programadas: programadas,
            rutas_completadas: completadas,
            ingreso_total: ingreso,
            objetivo_cumplido: total >= self.objetivo_min && total <= self.objetivo_max,
            recalculado_en: Utc::now(),
        }
    }

    /// Recompute and upsert the balance row for a key. A row whose figures
    /// did not change is kept as stored, `recalculado_en` included.
    pub fn recompute(&mut self, ledger: &RouteLedger, conductor_id: &str, semana: IsoSemana) -> BalanceRutaCorta {
        let key = (conductor_id.to_string(), semana);
        let balance = self.compute(ledger, conductor_id, semana);
        if let Some(stored) = self.balances.get(&key) {
            let unchanged = BalanceRutaCorta {
                recalculado_en: stored.recalculado_en,
                ..balance.clone()
            };
            if *stored == unchanged {
                return unchanged;
            }
        }

        debug!(
            conductor = conductor_id,
            anio = semana.anio,
            semana = semana.semana,
            programadas = balance.rutas_programadas,
            completadas = balance.rutas_completadas,
            "Weekly balance recomputed"
        );
        self.balances.insert(key, balance.clone());
        balance
    }

    /// Consume a planner event, recomputing every week it touches
    pub fn handle(&mut self, event: &RutaEvent, ledger: &RouteLedger) {
        for semana in event.affected_weeks() {
            self.recompute(ledger, event.conductor_id(), semana);
        }
    }

    /// Stored balance, or an empty one for weeks without routes
    pub fn get(&self, conductor_id: &str, semana: IsoSemana) -> BalanceRutaCorta {
        self.balances
            .get(&(conductor_id.to_string(), semana))
            .cloned()
            .unwrap_or_else(|| BalanceRutaCorta {
                conductor_id: conductor_id.to_string(),
                semana: semana.semana,
                anio: semana.anio,
                rutas_programadas: 0,
                rutas_completadas: 0,
                ingreso_total: Decimal::ZERO,
                objetivo_cumplido: self.objetivo_min == 0,
                recalculado_en: Utc::now(),
            })
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

impl Default for BalanceTracker {
    fn default() -> Self {
        Self::new(3, 4)
    }
}
