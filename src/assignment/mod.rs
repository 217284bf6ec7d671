//! Short-route assignments
//!
//! A `RutaCorta` binds one conductor to one tramo on one date and start
//! time. Tramo attributes are copied at creation so later catalog changes
//! never rewrite history.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{duration_to_minutes, Direction, Tramo};

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Lifecycle state of a short route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RutaEstado {
    Programada,
    EnCurso,
    Completada,
    Cancelada,
}

impl std::fmt::Display for RutaEstado {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RutaEstado::Programada => write!(f, "PROGRAMADA"),
            RutaEstado::EnCurso => write!(f, "EN_CURSO"),
            RutaEstado::Completada => write!(f, "COMPLETADA"),
            RutaEstado::Cancelada => write!(f, "CANCELADA"),
        }
    }
}

impl RutaEstado {
    /// Routes in this state count towards caps, slots and balances
    pub fn is_active(&self) -> bool {
        !matches!(self, RutaEstado::Cancelada)
    }
}

/// How the route was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TipoAsignacion {
    Manual,
    Automatica,
}

impl std::fmt::Display for TipoAsignacion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TipoAsignacion::Manual => write!(f, "MANUAL"),
            TipoAsignacion::Automatica => write!(f, "AUTOMATICA"),
        }
    }
}

/// ISO week key used to group balances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IsoSemana {
    pub anio: i32,
    pub semana: u32,
}

impl IsoSemana {
    pub fn of(fecha: NaiveDate) -> Self {
        let iso = fecha.iso_week();
        IsoSemana {
            anio: iso.year(),
            semana: iso.week(),
        }
    }

    pub fn contains(&self, fecha: NaiveDate) -> bool {
        IsoSemana::of(fecha) == *self
    }
}

/// A short-route assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RutaCorta {
    pub id: Uuid,
    pub conductor_id: String,
    pub tramo: String,
    pub direction: Direction,
    pub duration_hours: Decimal,
    pub fecha: NaiveDate,
    pub hora_inicio: NaiveTime,
    pub hora_fin: NaiveTime,
    /// End time falls on the day after `fecha`
    pub termina_dia_siguiente: bool,
    pub estado: RutaEstado,
    pub tipo: TipoAsignacion,
    pub semana: IsoSemana,
    /// 1 = Monday .. 7 = Sunday
    pub dia_semana: u32,
    pub es_consecutiva: bool,
    pub ingreso_estimado: Decimal,
    pub notas: Option<String>,
    pub confirmada_en: Option<DateTime<Utc>>,
    pub hora_inicio_real: Option<NaiveTime>,
    pub hora_fin_real: Option<NaiveTime>,
    pub duracion_real_horas: Option<Decimal>,
    pub motivo_cancelacion: Option<String>,
    pub creada_en: DateTime<Utc>,
    pub actualizada_en: DateTime<Utc>,
}

impl RutaCorta {
    /// Build a new PROGRAMADA route from a tramo
    pub fn new(
        conductor_id: impl Into<String>,
        tramo: &Tramo,
        fecha: NaiveDate,
        hora_inicio: NaiveTime,
        tipo: TipoAsignacion,
        notas: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let (hora_fin, termina_dia_siguiente) = end_time(hora_inicio, tramo.duration_minutes());

        RutaCorta {
            id: Uuid::new_v4(),
            conductor_id: conductor_id.into(),
            tramo: tramo.id.clone(),
            direction: tramo.direction,
            duration_hours: tramo.duration_hours,
            fecha,
            hora_inicio,
            hora_fin,
            termina_dia_siguiente,
            estado: RutaEstado::Programada,
            tipo,
            semana: IsoSemana::of(fecha),
            dia_semana: fecha.weekday().number_from_monday(),
            es_consecutiva: false,
            ingreso_estimado: tramo.base_income,
            notas,
            confirmada_en: None,
            hora_inicio_real: None,
            hora_fin_real: None,
            duracion_real_horas: None,
            motivo_cancelacion: None,
            creada_en: now,
            actualizada_en: now,
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        duration_to_minutes(self.duration_hours)
    }

    /// Move the route to a new slot, recomputing every date-derived field
    pub fn move_to(&mut self, fecha: NaiveDate, hora_inicio: NaiveTime) {
        let (hora_fin, next_day) = end_time(hora_inicio, self.duration_minutes());
        self.fecha = fecha;
        self.hora_inicio = hora_inicio;
        self.hora_fin = hora_fin;
        self.termina_dia_siguiente = next_day;
        self.semana = IsoSemana::of(fecha);
        self.dia_semana = fecha.weekday().number_from_monday();
    }

    /// Occupied interval in minutes relative to midnight of `dia`
    pub fn interval_relative_to(&self, dia: NaiveDate) -> (i64, i64) {
        let offset = (self.fecha - dia).num_days() * MINUTES_PER_DAY;
        let start = offset + minutes_of_day(self.hora_inicio);
        (start, start + self.duration_minutes())
    }

    pub fn touch(&mut self) {
        self.actualizada_en = Utc::now();
    }
}

/// Start time plus duration, wrapping past midnight
pub fn end_time(start: NaiveTime, duration_minutes: i64) -> (NaiveTime, bool) {
    let (end, wrapped_secs) = start.overflowing_add_signed(Duration::minutes(duration_minutes));
    (end, wrapped_secs != 0)
}

/// Minutes elapsed between two clock times, assuming `end` may be on the next day
pub fn elapsed_minutes(start: NaiveTime, end: NaiveTime) -> i64 {
    let diff = minutes_of_day(end) - minutes_of_day(start);
    if diff < 0 {
        diff + MINUTES_PER_DAY
    } else {
        diff
    }
}

pub fn minutes_of_day(t: NaiveTime) -> i64 {
    i64::from(t.hour()) * 60 + i64::from(t.minute())
}
