//! Fleet
//!
//! Conductor reference data. Owned by the conductor management side of
//! SIPAT; the planner only reads it, except for sending a conductor to rest
//! after too many consecutive worked days.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Operational state of a conductor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConductorEstado {
    Disponible,
    Descanso,
    Inactivo,
}

impl std::fmt::Display for ConductorEstado {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConductorEstado::Disponible => write!(f, "DISPONIBLE"),
            ConductorEstado::Descanso => write!(f, "DESCANSO"),
            ConductorEstado::Inactivo => write!(f, "INACTIVO"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conductor {
    pub id: String,
    pub nombre: String,
    pub origen: String,
    pub estado: ConductorEstado,
    /// Last day of the current rest period
    pub descanso_hasta: Option<NaiveDate>,
    /// Consecutive worked days ending at `ultimo_dia_trabajado`
    pub dias_trabajados: u32,
    pub ultimo_dia_trabajado: Option<NaiveDate>,
}

impl Conductor {
    pub fn new(id: impl Into<String>, nombre: impl Into<String>, origen: impl Into<String>) -> Self {
        Conductor {
            id: id.into(),
            nombre: nombre.into(),
            origen: origen.into(),
            estado: ConductorEstado::Disponible,
            descanso_hasta: None,
            dias_trabajados: 0,
            ultimo_dia_trabajado: None,
        }
    }

    /// Whether the conductor can work on `fecha`, with the reason when not
    pub fn disponible_en(&self, fecha: NaiveDate) -> Result<(), String> {
        match self.estado {
            ConductorEstado::Disponible => Ok(()),
            ConductorEstado::Inactivo => Err(format!("El conductor {} está inactivo", self.id)),
            ConductorEstado::Descanso => match self.descanso_hasta {
                Some(hasta) if hasta < fecha => Ok(()),
                Some(hasta) => Err(format!(
                    "El conductor {} está en descanso hasta el {}",
                    self.id, hasta
                )),
                None => Err(format!("El conductor {} está en descanso", self.id)),
            },
        }
    }

    /// Count `fecha` as a worked day. Returns true when the conductor crossed
    /// `umbral` and was sent to rest for `dias_descanso` days.
    pub fn registrar_dia_trabajado(
        &mut self,
        fecha: NaiveDate,
        umbral: u32,
        dias_descanso: u32,
    ) -> bool {
        if self.estado == ConductorEstado::Descanso && self.disponible_en(fecha).is_ok() {
            self.estado = ConductorEstado::Disponible;
            self.descanso_hasta = None;
        }

        match self.ultimo_dia_trabajado {
            Some(ultimo) if ultimo == fecha => return false,
            Some(ultimo) if ultimo + Duration::days(1) == fecha => self.dias_trabajados += 1,
            Some(ultimo) if ultimo > fecha => return false,
            _ => self.dias_trabajados = 1,
        }
        self.ultimo_dia_trabajado = Some(fecha);

        if umbral > 0 && self.dias_trabajados >= umbral {
            self.enviar_a_descanso(fecha, dias_descanso);
            return true;
        }
        false
    }

    /// Put the conductor in rest for the `dias` days following `desde`
    pub fn enviar_a_descanso(&mut self, desde: NaiveDate, dias: u32) {
        self.estado = ConductorEstado::Descanso;
        self.descanso_hasta = Some(desde + Duration::days(i64::from(dias)));
        self.dias_trabajados = 0;
    }

    /// Keep the rest window and worked-day streak tracked since `anterior`
    /// was loaded, unless this row is already ahead of them. An inactive
    /// row stays inactive.
    pub fn conservar_descanso(&mut self, anterior: &Conductor) {
        if self.estado != ConductorEstado::Inactivo
            && anterior.estado == ConductorEstado::Descanso
            && anterior.descanso_hasta > self.descanso_hasta
        {
            self.estado = ConductorEstado::Descanso;
            self.descanso_hasta = anterior.descanso_hasta;
        }
        if anterior.ultimo_dia_trabajado > self.ultimo_dia_trabajado {
            self.ultimo_dia_trabajado = anterior.ultimo_dia_trabajado;
            self.dias_trabajados = anterior.dias_trabajados;
        }
    }
}

/// Conductores known to the planner, keyed by id
#[derive(Debug, Clone, Default)]
pub struct Fleet {
    conductores: BTreeMap<String, Conductor>,
}

impl Fleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_conductores(conductores: Vec<Conductor>) -> Self {
        let mut fleet = Fleet::new();
        for c in conductores {
            fleet.upsert(c);
        }
        fleet
    }

    /// Carry in-memory rest state of `anterior` over conductores present in both
    pub fn conservar_descansos(&mut self, anterior: &Fleet) {
        for (id, conductor) in self.conductores.iter_mut() {
            if let Some(previo) = anterior.get(id) {
                conductor.conservar_descanso(previo);
            }
        }
    }

    pub fn upsert(&mut self, conductor: Conductor) {
        self.conductores.insert(conductor.id.clone(), conductor);
    }

    pub fn get(&self, id: &str) -> Option<&Conductor> {
        self.conductores.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Conductor> {
        self.conductores.get_mut(id)
    }

    /// All conductores in id order
    pub fn iter(&self) -> impl Iterator<Item = &Conductor> {
        self.conductores.values()
    }

    pub fn len(&self) -> usize {
        self.conductores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conductores.is_empty()
    }
}
