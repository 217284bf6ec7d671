//! Availability Rules
//!
//! Evaluates hard and soft rules deciding whether a conductor can take a
//! short route on a date (and, when known, in a concrete slot).
//! Pure queries over the ledger; nothing here mutates state.

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assignment::minutes_of_day;
use crate::catalog::Tramo;
use crate::fleet::Conductor;
use crate::ledger::RouteLedger;
use crate::settings::{ConsecutivePolicy, PlanningRules};

/// Result of a single rule evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule: RuleType,
    pub passed: bool,
    pub is_hard: bool,
    pub message: String,
}

/// Rules, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    DailyCap,
    Consecutive,
    PastDate,
    DriverState,
    TimeWindow,
    MaxDuration,
    Overlap,
}

impl std::fmt::Display for RuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleType::DailyCap => write!(f, "DAILY_CAP"),
            RuleType::Consecutive => write!(f, "CONSECUTIVE"),
            RuleType::PastDate => write!(f, "PAST_DATE"),
            RuleType::DriverState => write!(f, "DRIVER_STATE"),
            RuleType::TimeWindow => write!(f, "TIME_WINDOW"),
            RuleType::MaxDuration => write!(f, "MAX_DURATION"),
            RuleType::Overlap => write!(f, "OVERLAP"),
        }
    }
}

/// Outcome of an availability check, shaped for the pre-submission endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Eligibility {
    pub puede: bool,
    pub razon: String,
    pub advertencias: Vec<String>,
    pub rules: Vec<RuleResult>,
}

impl Eligibility {
    fn from_rules(rules: Vec<RuleResult>) -> Self {
        let failure = rules.iter().find(|r| r.is_hard && !r.passed);
        let advertencias: Vec<String> = rules
            .iter()
            .filter(|r| !r.is_hard && !r.passed)
            .map(|r| r.message.clone())
            .collect();

        let (puede, razon) = match failure {
            Some(rule) => (false, rule.message.clone()),
            None if advertencias.is_empty() => (true, "Conductor disponible".to_string()),
            None => (true, format!("Conductor disponible con advertencia: {}", advertencias.join("; "))),
        };

        Eligibility {
            puede,
            razon,
            advertencias,
            rules,
        }
    }

    /// Whether the consecutive-day rule flagged this check
    pub fn is_consecutive(&self) -> bool {
        self.rules
            .iter()
            .any(|r| r.rule == RuleType::Consecutive && !r.passed)
    }

    /// Fold slot rules into an existing date-level result
    pub fn with_rules(mut self, extra: Vec<RuleResult>) -> Self {
        self.rules.extend(extra);
        Eligibility::from_rules(self.rules)
    }
}

/// A concrete slot being considered for a conductor
#[derive(Debug, Clone, Copy)]
pub struct SlotRequest<'a> {
    pub tramo: &'a Tramo,
    pub hora_inicio: NaiveTime,
    /// Route being moved; ignored when looking for overlaps
    pub exclude: Option<Uuid>,
}

/// Availability rule engine
#[derive(Debug, Clone)]
pub struct EligibilityChecker {
    rules: PlanningRules,
}

impl EligibilityChecker {
    pub fn new(rules: PlanningRules) -> Self {
        EligibilityChecker { rules }
    }

    pub fn rules(&self) -> &PlanningRules {
        &self.rules
    }

    /// Evaluate date-level rules for a conductor
    pub fn evaluate(
        &self,
        conductor: &Conductor,
        fecha: NaiveDate,
        ledger: &RouteLedger,
        hoy: NaiveDate,
        exclude: Option<Uuid>,
    ) -> Eligibility {
        let results = vec![
            self.check_daily_cap(conductor, fecha, ledger, exclude),
            self.check_consecutive(conductor, fecha, ledger, exclude),
            self.check_past_date(fecha, hoy),
            self.check_driver_state(conductor, fecha),
        ];
        Eligibility::from_rules(results)
    }

    /// Evaluate date-level and slot-level rules together
    pub fn evaluate_slot(
        &self,
        conductor: &Conductor,
        fecha: NaiveDate,
        slot: SlotRequest<'_>,
        ledger: &RouteLedger,
        hoy: NaiveDate,
    ) -> Eligibility {
        let base = self.evaluate(conductor, fecha, ledger, hoy, slot.exclude);
        base.with_rules(vec![
            self.check_time_window(slot.hora_inicio),
            self.check_max_duration(slot.tramo),
            self.check_overlap(conductor, fecha, slot, ledger),
        ])
    }

    /// Check the daily route cap (HARD)
    fn check_daily_cap(
        &self,
        conductor: &Conductor,
        fecha: NaiveDate,
        ledger: &RouteLedger,
        exclude: Option<Uuid>,
    ) -> RuleResult {
        let count = ledger
            .active_for(&conductor.id, fecha)
            .into_iter()
            .filter(|r| Some(r.id) != exclude)
            .count();
        let passed = count < self.rules.max_rutas_por_dia;

        let message = if passed {
            format!("{} de {} rutas cortas el {}", count, self.rules.max_rutas_por_dia, fecha)
        } else {
            format!(
                "El conductor {} ya tiene {} rutas cortas el {} (máximo {} por día)",
                conductor.id, count, fecha, self.rules.max_rutas_por_dia
            )
        };

        RuleResult {
            rule: RuleType::DailyCap,
            passed,
            is_hard: true,
            message,
        }
    }

    /// Check for a route on the previous calendar day (SOFT unless policy blocks)
    fn check_consecutive(
        &self,
        conductor: &Conductor,
        fecha: NaiveDate,
        ledger: &RouteLedger,
        exclude: Option<Uuid>,
    ) -> RuleResult {
        let ayer = fecha - Duration::days(1);
        let passed = ledger
            .active_for(&conductor.id, ayer)
            .into_iter()
            .all(|r| Some(r.id) == exclude);

        let message = if passed {
            "Sin ruta corta el día anterior".to_string()
        } else {
            format!(
                "El conductor {} tiene una ruta corta el día anterior ({}): días consecutivos",
                conductor.id, ayer
            )
        };

        RuleResult {
            rule: RuleType::Consecutive,
            passed,
            is_hard: self.rules.politica_consecutiva == ConsecutivePolicy::Bloquear,
            message,
        }
    }

    /// Check the date is not in the past (HARD)
    fn check_past_date(&self, fecha: NaiveDate, hoy: NaiveDate) -> RuleResult {
        let passed = fecha >= hoy;
        let message = if passed {
            format!("Fecha {} vigente", fecha)
        } else {
            format!("La fecha {} ya pasó (hoy es {})", fecha, hoy)
        };

        RuleResult {
            rule: RuleType::PastDate,
            passed,
            is_hard: true,
            message,
        }
    }

    /// Check the conductor's operational state (HARD)
    fn check_driver_state(&self, conductor: &Conductor, fecha: NaiveDate) -> RuleResult {
        let (passed, message) = match conductor.disponible_en(fecha) {
            Ok(()) => (true, format!("Conductor {}", conductor.estado)),
            Err(razon) => (false, razon),
        };

        RuleResult {
            rule: RuleType::DriverState,
            passed,
            is_hard: true,
            message,
        }
    }

    /// Check the start time falls in the operating window (HARD)
    fn check_time_window(&self, hora_inicio: NaiveTime) -> RuleResult {
        let passed = hora_inicio >= self.rules.ventana_inicio && hora_inicio <= self.rules.ventana_fin;
        let message = if passed {
            format!("Hora de inicio {} dentro de la ventana", hora_inicio.format("%H:%M"))
        } else {
            format!(
                "La hora de inicio {} está fuera de la ventana {}-{}",
                hora_inicio.format("%H:%M"),
                self.rules.ventana_inicio.format("%H:%M"),
                self.rules.ventana_fin.format("%H:%M")
            )
        };

        RuleResult {
            rule: RuleType::TimeWindow,
            passed,
            is_hard: true,
            message,
        }
    }

    /// Check the tramo duration limit (HARD)
    fn check_max_duration(&self, tramo: &Tramo) -> RuleResult {
        let passed = tramo.duration_minutes() <= self.rules.duracion_maxima_minutos;
        let message = if passed {
            format!("Duración {} h permitida", tramo.duration_hours)
        } else {
            format!(
                "El tramo {} dura {} h, más que el máximo de {} minutos",
                tramo.id, tramo.duration_hours, self.rules.duracion_maxima_minutos
            )
        };

        RuleResult {
            rule: RuleType::MaxDuration,
            passed,
            is_hard: true,
            message,
        }
    }

    /// Check the slot does not overlap other routes of the conductor (HARD).
    /// Routes on adjacent days are included since they may cross midnight.
    fn check_overlap(
        &self,
        conductor: &Conductor,
        fecha: NaiveDate,
        slot: SlotRequest<'_>,
        ledger: &RouteLedger,
    ) -> RuleResult {
        let start = minutes_of_day(slot.hora_inicio);
        let end = start + slot.tramo.duration_minutes();

        let clash = [-1, 0, 1]
            .into_iter()
            .flat_map(|offset| ledger.active_for(&conductor.id, fecha + Duration::days(offset)))
            .filter(|r| Some(r.id) != slot.exclude)
            .find(|r| {
                let (s, e) = r.interval_relative_to(fecha);
                s < end && start < e
            });

        let (passed, message) = match clash {
            None => (true, "Sin cruce de horarios".to_string()),
            Some(r) => (
                false,
                format!(
                    "Cruce de horario con la ruta {} del {} ({}-{})",
                    r.tramo,
                    r.fecha,
                    r.hora_inicio.format("%H:%M"),
                    r.hora_fin.format("%H:%M")
                ),
            ),
        };

        RuleResult {
            rule: RuleType::Overlap,
            passed,
            is_hard: true,
            message,
        }
    }
}

impl Default for EligibilityChecker {
    fn default() -> Self {
        Self::new(PlanningRules::default())
    }
}
