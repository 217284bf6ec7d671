//! Conflict Reporter
//!
//! Lists routes that need a second look: consecutive-day assignments and
//! cancellations. Read-only; dashboards and alerts consume the output.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::assignment::{IsoSemana, RutaCorta, RutaEstado};
use crate::ledger::RouteLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    Consecutiva,
    Cancelada,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictScope {
    Dia(NaiveDate),
    Semana(IsoSemana),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub ruta: RutaCorta,
    pub motivos: Vec<ConflictKind>,
}

impl Conflict {
    fn of(ruta: &RutaCorta) -> Option<Self> {
        let mut motivos = Vec::new();
        if ruta.es_consecutiva {
            motivos.push(ConflictKind::Consecutiva);
        }
        if ruta.estado == RutaEstado::Cancelada {
            motivos.push(ConflictKind::Cancelada);
        }
        if motivos.is_empty() {
            return None;
        }
        Some(Conflict {
            ruta: ruta.clone(),
            motivos,
        })
    }
}

/// Flagged routes in scope, by date, start time and conductor
pub fn find_conflicts(ledger: &RouteLedger, scope: ConflictScope) -> Vec<Conflict> {
    let rutas = match scope {
        ConflictScope::Dia(fecha) => ledger.on_date(fecha),
        ConflictScope::Semana(semana) => ledger.in_week(semana),
    };
    rutas.into_iter().filter_map(Conflict::of).collect()
}

/// Flagged routes among an explicit set, e.g. those created by one run
pub fn conflicts_among<'a>(rutas: impl IntoIterator<Item = &'a RutaCorta>) -> Vec<Conflict> {
    rutas.into_iter().filter_map(Conflict::of).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::TipoAsignacion;
    use crate::catalog::{Direction, Tramo};
    use chrono::NaiveTime;
    use rust_decimal::Decimal;

    fn ruta(conductor: &str, fecha: NaiveDate, hora: u32) -> RutaCorta {
        let tramo = Tramo::new("LIMA-ICA", Direction::Sur, Decimal::from(4), Decimal::from(150));
        RutaCorta::new(
            conductor,
            &tramo,
            fecha,
            NaiveTime::from_hms_opt(hora, 0, 0).unwrap(),
            TipoAsignacion::Manual,
            None,
        )
    }

    #[test]
    fn test_day_and_week_scopes() {
        let lunes = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let martes = NaiveDate::from_ymd_opt(2024, 6, 11).unwrap();
        let mut ledger = RouteLedger::new();

        ledger.put(ruta("C001", lunes, 6)).unwrap();
        let mut consecutive = ruta("C001", martes, 6);
        consecutive.es_consecutiva = true;
        ledger.put(consecutive).unwrap();
        let mut cancelled = ruta("C002", martes, 5);
        cancelled.estado = RutaEstado::Cancelada;
        cancelled.es_consecutiva = true;
        ledger.put(cancelled).unwrap();

        assert!(find_conflicts(&ledger, ConflictScope::Dia(lunes)).is_empty());

        let week = find_conflicts(&ledger, ConflictScope::Semana(IsoSemana::of(lunes)));
        assert_eq!(week.len(), 2);
        // Sorted by start time: C002 at 05:00 first
        assert_eq!(week[0].ruta.conductor_id, "C002");
        assert_eq!(week[0].motivos, vec![ConflictKind::Consecutiva, ConflictKind::Cancelada]);
        assert_eq!(week[1].motivos, vec![ConflictKind::Consecutiva]);
    }
}
