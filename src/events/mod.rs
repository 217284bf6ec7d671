//! Planner events
//!
//! Every state-changing planner operation emits one event. Events feed the
//! weekly balance tracker and are kept in an append-only log keyed by
//! aggregate (route or conductor), which is the history of each record.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assignment::{IsoSemana, TipoAsignacion};

/// The record an event belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "tipo", content = "id", rename_all = "lowercase")]
pub enum Aggregate {
    Ruta(Uuid),
    Conductor(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "evento", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Asignada {
        tramo: String,
        fecha: NaiveDate,
        hora_inicio: NaiveTime,
        tipo: TipoAsignacion,
        es_consecutiva: bool,
    },
    Confirmada,
    Iniciada {
        hora_inicio_real: NaiveTime,
    },
    Completada {
        hora_inicio_real: NaiveTime,
        hora_fin_real: NaiveTime,
        duracion_real_horas: Decimal,
        ingreso: Decimal,
    },
    Cancelada {
        motivo: Option<String>,
    },
    Reagendada {
        desde_fecha: NaiveDate,
        desde_hora: NaiveTime,
        hacia_fecha: NaiveDate,
        hacia_hora: NaiveTime,
    },
    ConsecutivaActualizada {
        es_consecutiva: bool,
    },
    EnviadoADescanso {
        hasta: NaiveDate,
    },
}

/// An event emitted by the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RutaEvent {
    pub aggregate: Aggregate,
    conductor_id: String,
    /// Week of the aggregate after the change
    semana: Option<IsoSemana>,
    pub kind: EventKind,
}

impl RutaEvent {
    pub fn ruta(ruta_id: Uuid, conductor_id: &str, semana: IsoSemana, kind: EventKind) -> Self {
        RutaEvent {
            aggregate: Aggregate::Ruta(ruta_id),
            conductor_id: conductor_id.to_string(),
            semana: Some(semana),
            kind,
        }
    }

    pub fn conductor(conductor_id: &str, kind: EventKind) -> Self {
        RutaEvent {
            aggregate: Aggregate::Conductor(conductor_id.to_string()),
            conductor_id: conductor_id.to_string(),
            semana: None,
            kind,
        }
    }

    pub fn conductor_id(&self) -> &str {
        &self.conductor_id
    }

    /// Balance weeks whose figures may have changed
    pub fn affected_weeks(&self) -> Vec<IsoSemana> {
        let mut weeks: Vec<IsoSemana> = self.semana.into_iter().collect();
        if let EventKind::Reagendada { desde_fecha, .. } = &self.kind {
            let previous = IsoSemana::of(*desde_fecha);
            if !weeks.contains(&previous) {
                weeks.push(previous);
            }
        }
        if matches!(
            self.kind,
            EventKind::ConsecutivaActualizada { .. } | EventKind::Confirmada | EventKind::EnviadoADescanso { .. }
        ) {
            weeks.clear();
        }
        weeks
    }
}

/// A logged event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub event: RutaEvent,
}

/// Append-only event log
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, event: RutaEvent) -> &EventRecord {
        let seq = self.records.len() as u64 + 1;
        self.records.push(EventRecord {
            seq,
            at: Utc::now(),
            event,
        });
        &self.records[self.records.len() - 1]
    }

    /// Events of one aggregate in emission order
    pub fn history(&self, aggregate: &Aggregate) -> Vec<&EventRecord> {
        self.records
            .iter()
            .filter(|r| &r.event.aggregate == aggregate)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
