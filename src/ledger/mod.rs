//! Route Ledger
//!
//! In-memory store of short routes. Keeps a slot index over
//! (conductor, fecha, hora_inicio) for non-cancelled routes so the same
//! slot can never be booked twice.

use chrono::{NaiveDate, NaiveTime};
use std::collections::HashMap;
use uuid::Uuid;

use crate::assignment::{IsoSemana, RutaCorta};
use crate::error::PlanningError;

type SlotKey = (String, NaiveDate, NaiveTime);

fn slot_of(ruta: &RutaCorta) -> SlotKey {
    (ruta.conductor_id.clone(), ruta.fecha, ruta.hora_inicio)
}

#[derive(Debug, Clone, Default)]
pub struct RouteLedger {
    rutas: HashMap<Uuid, RutaCorta>,
    slots: HashMap<SlotKey, Uuid>,
}

impl RouteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &Uuid) -> Option<&RutaCorta> {
        self.rutas.get(id)
    }

    /// Insert or replace a route, keeping the slot index in sync.
    ///
    /// Fails with `DuplicateAssignment` when another non-cancelled route
    /// already holds the slot; the ledger is left untouched in that case.
    pub fn put(&mut self, ruta: RutaCorta) -> Result<(), PlanningError> {
        let key = slot_of(&ruta);
        if ruta.estado.is_active() {
            if let Some(holder) = self.slots.get(&key) {
                if *holder != ruta.id {
                    return Err(PlanningError::DuplicateAssignment {
                        conductor_id: ruta.conductor_id.clone(),
                        fecha: ruta.fecha,
                        hora_inicio: ruta.hora_inicio,
                    });
                }
            }
        }

        if let Some(previous) = self.rutas.get(&ruta.id) {
            let old_key = slot_of(previous);
            if self.slots.get(&old_key) == Some(&ruta.id) {
                self.slots.remove(&old_key);
            }
        }
        if ruta.estado.is_active() {
            self.slots.insert(key, ruta.id);
        }
        self.rutas.insert(ruta.id, ruta);
        Ok(())
    }

    /// Whether a non-cancelled route already holds this slot
    pub fn slot_taken(&self, conductor_id: &str, fecha: NaiveDate, hora: NaiveTime) -> Option<Uuid> {
        self.slots
            .get(&(conductor_id.to_string(), fecha, hora))
            .copied()
    }

    /// Non-cancelled routes of a conductor on a date
    pub fn active_for(&self, conductor_id: &str, fecha: NaiveDate) -> Vec<&RutaCorta> {
        self.rutas
            .values()
            .filter(|r| r.conductor_id == conductor_id && r.fecha == fecha && r.estado.is_active())
            .collect()
    }

    /// All routes of a conductor in an ISO week, cancelled ones included
    pub fn for_conductor_week(&self, conductor_id: &str, semana: IsoSemana) -> Vec<&RutaCorta> {
        self.rutas
            .values()
            .filter(|r| r.conductor_id == conductor_id && r.semana == semana)
            .collect()
    }

    /// Routes on a date, sorted by start time then conductor
    pub fn on_date(&self, fecha: NaiveDate) -> Vec<&RutaCorta> {
        let mut rutas: Vec<&RutaCorta> = self.rutas.values().filter(|r| r.fecha == fecha).collect();
        sort_for_display(&mut rutas);
        rutas
    }

    /// Routes in an ISO week, sorted by date, start time, conductor
    pub fn in_week(&self, semana: IsoSemana) -> Vec<&RutaCorta> {
        let mut rutas: Vec<&RutaCorta> = self.rutas.values().filter(|r| r.semana == semana).collect();
        sort_for_display(&mut rutas);
        rutas
    }

    pub fn len(&self) -> usize {
        self.rutas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rutas.is_empty()
    }
}

fn sort_for_display(rutas: &mut [&RutaCorta]) {
    rutas.sort_by(|a, b| {
        (a.fecha, a.hora_inicio, &a.conductor_id).cmp(&(b.fecha, b.hora_inicio, &b.conductor_id))
    });
}
