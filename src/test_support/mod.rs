//! Shared fixtures for unit tests

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::catalog::{Direction, Tramo, TramoCatalog};
use crate::fleet::{Conductor, Fleet};
use crate::planner::{AssignRequest, FixedClock, Planner};
use crate::settings::PlanningRules;

pub fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn t(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(s, "%H:%M").unwrap()
}

/// LIMA-ICA 4.5 h, ICA-LIMA 4.5 h, LIMA-HUACHO 2.75 h
pub fn catalog() -> TramoCatalog {
    TramoCatalog::from_tramos(vec![
        Tramo::new("LIMA-ICA", Direction::Sur, Decimal::new(45, 1), Decimal::from(150)),
        Tramo::new("ICA-LIMA", Direction::Norte, Decimal::new(45, 1), Decimal::from(150)),
        Tramo::new("LIMA-HUACHO", Direction::Norte, Decimal::new(275, 2), Decimal::from(95)),
    ])
    .unwrap()
}

/// Conductores C001..C00n, all available
pub fn fleet(n: usize) -> Fleet {
    Fleet::from_conductores(
        (1..=n)
            .map(|i| Conductor::new(format!("C{:03}", i), format!("Conductor {}", i), "LIMA"))
            .collect(),
    )
}

pub fn planner_with(rules: PlanningRules, hoy: &str) -> Planner {
    Planner::new(rules, catalog(), fleet(5), Arc::new(FixedClock(d(hoy))))
}

pub fn planner_at(hoy: &str) -> Planner {
    planner_with(PlanningRules::default(), hoy)
}

pub fn request(conductor: &str, tramo: &str, fecha: &str, hora: &str) -> AssignRequest {
    AssignRequest {
        conductor_id: conductor.to_string(),
        tramo_id: tramo.to_string(),
        fecha: Some(d(fecha)),
        hora_inicio: Some(t(hora)),
        notas: None,
        ingreso_estimado: None,
    }
}
