//! Assignment Planner
//!
//! Creates short routes (one at a time or in bulk for a date), drives
//! their state machine and emits an event after every change. Events are
//! consumed by the weekly balance tracker and appended to the event log.

use crate::assignment::{elapsed_minutes, minutes_of_day, IsoSemana, RutaCorta, RutaEstado, TipoAsignacion};
use crate::balance::{BalanceRutaCorta, BalanceTracker};
use crate::catalog::{Tramo, TramoCatalog};
use crate::conflicts::{conflicts_among, find_conflicts, Conflict, ConflictScope};
use crate::constraints::{Eligibility, EligibilityChecker, SlotRequest};
use crate::error::PlanningError;
use crate::events::{Aggregate, EventKind, EventLog, EventRecord, RutaEvent};
use crate::fleet::{Conductor, Fleet};
use crate::ledger::RouteLedger;
use crate::metrics;
use crate::settings::PlanningRules;

use chrono::{Duration, Local, NaiveDate, NaiveTime, Utc};
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Source of "today" for the past-date rule
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Local calendar date of the host
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Always returns the same date
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Manual assignment / pre-check input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignRequest {
    #[serde(default)]
    pub conductor_id: String,
    #[serde(default)]
    pub tramo_id: String,
    pub fecha: Option<NaiveDate>,
    /// Next free slot of the conductor when absent
    pub hora_inicio: Option<NaiveTime>,
    pub notas: Option<String>,
    /// Overrides the tramo's base income
    pub ingreso_estimado: Option<Decimal>,
}

/// Real execution data recorded on completion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletarRequest {
    pub hora_inicio_real: Option<NaiveTime>,
    pub hora_fin_real: Option<NaiveTime>,
    pub ingreso_real: Option<Decimal>,
}

/// Per-conductor outcome of an automatic run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "resultado", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AutoAssignOutcome {
    Asignada {
        ruta_id: Uuid,
        tramo: String,
        hora_inicio: NaiveTime,
        es_consecutiva: bool,
    },
    Omitida {
        razon: String,
    },
    Fallida {
        codigo: String,
        razon: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutoAssignEntry {
    pub conductor_id: String,
    #[serde(flatten)]
    pub outcome: AutoAssignOutcome,
}

/// Summary of an automatic run for one date
#[derive(Debug, Clone, Serialize)]
pub struct AutoAssignReport {
    pub fecha: NaiveDate,
    pub success: bool,
    pub message: String,
    pub assigned_count: usize,
    pub skipped_count: usize,
    pub asignadas: Vec<RutaCorta>,
    pub report: Vec<AutoAssignEntry>,
    pub conflicts: Vec<Conflict>,
    pub elapsed_ms: u64,
}

impl AutoAssignReport {
    fn rejected(fecha: NaiveDate, message: String, skipped_count: usize) -> Self {
        AutoAssignReport {
            fecha,
            success: false,
            message,
            assigned_count: 0,
            skipped_count,
            asignadas: vec![],
            report: vec![],
            conflicts: vec![],
            elapsed_ms: 0,
        }
    }
}

/// Candidate state during an automatic run
struct Candidate {
    conductor_id: String,
    completadas: u32,
    weekly_total: u32,
}

/// The short-route planner
pub struct Planner {
    catalog: TramoCatalog,
    fleet: Fleet,
    ledger: RouteLedger,
    checker: EligibilityChecker,
    balances: BalanceTracker,
    log: EventLog,
    clock: Arc<dyn Clock>,
}

impl Planner {
    pub fn new(rules: PlanningRules, catalog: TramoCatalog, fleet: Fleet, clock: Arc<dyn Clock>) -> Self {
        Planner {
            balances: BalanceTracker::new(rules.objetivo_semanal_min, rules.objetivo_semanal_max),
            checker: EligibilityChecker::new(rules),
            catalog,
            fleet,
            ledger: RouteLedger::new(),
            log: EventLog::new(),
            clock,
        }
    }

    pub fn rules(&self) -> &PlanningRules {
        self.checker.rules()
    }

    pub fn catalog(&self) -> &TramoCatalog {
        &self.catalog
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn ledger(&self) -> &RouteLedger {
        &self.ledger
    }

    pub fn events(&self) -> &EventLog {
        &self.log
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Swap in freshly loaded reference data. Existing routes keep their
    /// copied tramo attributes; conductores keep rest periods and streaks
    /// recorded since the last load.
    pub fn reload(&mut self, catalog: TramoCatalog, mut fleet: Fleet) {
        fleet.conservar_descansos(&self.fleet);
        info!(
            tramos = catalog.len(),
            conductores = fleet.len(),
            "Reference data replaced"
        );
        self.catalog = catalog;
        self.fleet = fleet;
    }

    pub fn ruta(&self, id: &Uuid) -> Result<&RutaCorta, PlanningError> {
        self.ledger
            .get(id)
            .ok_or_else(|| PlanningError::NotFound(format!("Ruta corta {}", id)))
    }

    pub fn history(&self, id: &Uuid) -> Vec<&EventRecord> {
        self.log.history(&Aggregate::Ruta(*id))
    }

    /// Date-level availability of a conductor
    pub fn is_eligible(&self, conductor_id: &str, fecha: NaiveDate) -> Result<Eligibility, PlanningError> {
        let conductor = self.conductor(conductor_id)?;
        Ok(self
            .checker
            .evaluate(conductor, fecha, &self.ledger, self.today(), None))
    }

    /// Pre-submission check. Never fails: every problem becomes `puede = false`
    /// with the same reason `assign` would report.
    pub fn validate(&self, request: &AssignRequest) -> Eligibility {
        let tramo = if request.tramo_id.trim().is_empty() {
            Ok(None)
        } else {
            self.active_tramo(&request.tramo_id).map(Some)
        };

        let outcome = tramo.and_then(|tramo| {
            self.check(
                &request.conductor_id,
                tramo.as_ref(),
                request.fecha,
                request.hora_inicio,
                None,
            )
        });

        match outcome {
            Ok((eligibility, _)) => eligibility,
            Err(e) => Eligibility {
                puede: false,
                razon: e.to_string(),
                advertencias: vec![],
                rules: vec![],
            },
        }
    }

    /// Manual assignment of one route
    pub fn assign(&mut self, request: AssignRequest) -> Result<RutaCorta, PlanningError> {
        if request.tramo_id.trim().is_empty() {
            return Err(self.rejected(PlanningError::Validation("El tramo es obligatorio".to_string())));
        }
        let result = self.active_tramo(&request.tramo_id).and_then(|tramo| {
            self.create(
                &request.conductor_id,
                &tramo,
                request.fecha,
                request.hora_inicio,
                request.notas,
                request.ingreso_estimado,
                TipoAsignacion::Manual,
            )
        });
        result.map_err(|e| self.rejected(e))
    }

    /// Greedy bulk assignment for one date.
    ///
    /// Conductores with fewer completed routes this week go first (ties by
    /// id). Each round gives every candidate at most one route, up to the
    /// daily cap; a conductor never gets the same tramo twice in a day.
    /// Failures are collected per conductor and never abort the run.
    pub fn auto_assign(&mut self, fecha: NaiveDate) -> AutoAssignReport {
        let start_time = std::time::Instant::now();
        let hoy = self.today();
        let rules = self.rules().clone();

        if fecha < hoy {
            return AutoAssignReport::rejected(
                fecha,
                format!("La fecha {} ya pasó (hoy es {})", fecha, hoy),
                self.fleet.len(),
            );
        }

        let tramos: Vec<Tramo> = self.catalog.active().cloned().collect();
        if tramos.is_empty() {
            return AutoAssignReport::rejected(fecha, "No hay tramos activos".to_string(), self.fleet.len());
        }

        // Remaining daily slots per tramo, manual routes included
        let mut cupos: HashMap<String, usize> = tramos
            .iter()
            .map(|t| {
                let used = self
                    .ledger
                    .on_date(fecha)
                    .into_iter()
                    .filter(|r| r.estado.is_active() && r.tramo == t.id)
                    .count();
                (t.id.clone(), rules.cupos_por_tramo.saturating_sub(used))
            })
            .collect();

        let semana = IsoSemana::of(fecha);
        let mut report = Vec::new();

        // Read-only evaluation of every conductor
        let evaluated: Vec<(String, Eligibility, BalanceRutaCorta)> = {
            let conductores: Vec<&Conductor> = self.fleet.iter().collect();
            let checker = &self.checker;
            let ledger = &self.ledger;
            let balances = &self.balances;
            conductores
                .into_par_iter()
                .map(|c| {
                    (
                        c.id.clone(),
                        checker.evaluate(c, fecha, ledger, hoy, None),
                        balances.compute(ledger, &c.id, semana),
                    )
                })
                .collect()
        };

        let mut candidates = Vec::new();
        for (conductor_id, eligibility, balance) in evaluated {
            if !eligibility.puede {
                report.push(AutoAssignEntry {
                    conductor_id,
                    outcome: AutoAssignOutcome::Omitida { razon: eligibility.razon },
                });
            } else if balance.total() >= rules.objetivo_semanal_max {
                report.push(AutoAssignEntry {
                    conductor_id,
                    outcome: AutoAssignOutcome::Omitida {
                        razon: format!(
                            "Objetivo semanal alcanzado ({} rutas en la semana {})",
                            balance.total(),
                            semana.semana
                        ),
                    },
                });
            } else {
                candidates.push(Candidate {
                    conductor_id,
                    completadas: balance.rutas_completadas,
                    weekly_total: balance.total(),
                });
            }
        }

        candidates.sort_by(|a, b| {
            (a.completadas, &a.conductor_id).cmp(&(b.completadas, &b.conductor_id))
        });

        let mut created: Vec<RutaCorta> = Vec::new();
        let mut stopped: HashSet<String> = HashSet::new();
        let mut last_reason: HashMap<String, String> = HashMap::new();

        for round in 0..rules.max_rutas_por_dia {
            let mut progressed = false;

            for candidate in candidates.iter_mut() {
                if cupos.values().all(|&c| c == 0) {
                    break;
                }
                let id = candidate.conductor_id.clone();
                if stopped.contains(&id) {
                    continue;
                }

                let today: Vec<&RutaCorta> = self.ledger.active_for(&id, fecha);
                if today.len() >= rules.max_rutas_por_dia {
                    stopped.insert(id);
                    continue;
                }
                if candidate.weekly_total >= rules.objetivo_semanal_max {
                    last_reason.insert(id.clone(), "Objetivo semanal alcanzado".to_string());
                    stopped.insert(id);
                    continue;
                }

                let used: HashSet<&str> = today.iter().map(|r| r.tramo.as_str()).collect();
                let Some(tramo) = tramos
                    .iter()
                    .find(|t| cupos.get(&t.id).copied().unwrap_or(0) > 0 && !used.contains(t.id.as_str()))
                    .cloned()
                else {
                    last_reason.insert(id.clone(), "Sin cupos disponibles en los tramos activos".to_string());
                    continue;
                };

                match self.create(&id, &tramo, Some(fecha), None, None, None, TipoAsignacion::Automatica) {
                    Ok(ruta) => {
                        debug!(conductor = %id, tramo = %tramo.id, round, "Auto-assigned");
                        if let Some(c) = cupos.get_mut(&tramo.id) {
                            *c = c.saturating_sub(1);
                        }
                        candidate.weekly_total += 1;
                        progressed = true;
                        report.push(AutoAssignEntry {
                            conductor_id: id,
                            outcome: AutoAssignOutcome::Asignada {
                                ruta_id: ruta.id,
                                tramo: ruta.tramo.clone(),
                                hora_inicio: ruta.hora_inicio,
                                es_consecutiva: ruta.es_consecutiva,
                            },
                        });
                        created.push(ruta);
                    }
                    Err(e) => {
                        metrics::SOLICITUDES_RECHAZADAS
                            .with_label_values(&[e.code()])
                            .inc();
                        if round == 0 || !matches!(e, PlanningError::Eligibility(_)) {
                            warn!(conductor = %id, fecha = %fecha, error = %e, "Auto-assignment failed");
                        }
                        if created.iter().any(|r| r.conductor_id == id) {
                            // Already has a route from this run; a later slot not fitting is not a failure
                            stopped.insert(id);
                            continue;
                        }
                        report.push(AutoAssignEntry {
                            conductor_id: id.clone(),
                            outcome: AutoAssignOutcome::Fallida {
                                codigo: e.code().to_string(),
                                razon: e.to_string(),
                            },
                        });
                        stopped.insert(id);
                    }
                }
            }

            if !progressed {
                break;
            }
        }

        let served: HashSet<&str> = created.iter().map(|r| r.conductor_id.as_str()).collect();
        for candidate in &candidates {
            let id = candidate.conductor_id.as_str();
            let reported = report.iter().any(|e| e.conductor_id == id);
            if !served.contains(id) && !reported {
                report.push(AutoAssignEntry {
                    conductor_id: id.to_string(),
                    outcome: AutoAssignOutcome::Omitida {
                        razon: last_reason
                            .get(id)
                            .cloned()
                            .unwrap_or_else(|| "Sin cupos disponibles en los tramos activos".to_string()),
                    },
                });
            }
        }

        let skipped_count = self.fleet.len().saturating_sub(served.len());
        let conflicts = conflicts_among(&created);
        let elapsed_ms = start_time.elapsed().as_millis() as u64;

        info!(
            fecha = %fecha,
            asignadas = created.len(),
            omitidos = skipped_count,
            consecutivas = conflicts.len(),
            elapsed_ms,
            "Automatic assignment finished"
        );

        AutoAssignReport {
            fecha,
            success: true,
            message: format!(
                "{} rutas cortas asignadas para el {}, {} conductores sin asignación",
                created.len(),
                fecha,
                skipped_count
            ),
            assigned_count: created.len(),
            skipped_count,
            asignadas: created,
            report,
            conflicts,
            elapsed_ms,
        }
    }

    /// PROGRAMADA → PROGRAMADA, marking the route as confirmed
    pub fn confirmar(&mut self, id: &Uuid) -> Result<RutaCorta, PlanningError> {
        self.transition(id, "confirmar", &[RutaEstado::Programada], |ruta| {
            ruta.confirmada_en = Some(Utc::now());
            Ok(EventKind::Confirmada)
        })
    }

    /// PROGRAMADA → EN_CURSO
    pub fn iniciar(&mut self, id: &Uuid, hora_inicio_real: Option<NaiveTime>) -> Result<RutaCorta, PlanningError> {
        self.transition(id, "iniciar", &[RutaEstado::Programada], |ruta| {
            let real = hora_inicio_real.unwrap_or(ruta.hora_inicio);
            ruta.estado = RutaEstado::EnCurso;
            ruta.hora_inicio_real = Some(real);
            Ok(EventKind::Iniciada { hora_inicio_real: real })
        })
    }

    /// PROGRAMADA | EN_CURSO → COMPLETADA, recording real times and income
    pub fn completar(&mut self, id: &Uuid, datos: CompletarRequest) -> Result<RutaCorta, PlanningError> {
        if let Some(ingreso) = datos.ingreso_real {
            if ingreso < Decimal::ZERO {
                return Err(self.rejected(PlanningError::Validation(
                    "El ingreso real no puede ser negativo".to_string(),
                )));
            }
        }

        let ruta = self.transition(
            id,
            "completar",
            &[RutaEstado::Programada, RutaEstado::EnCurso],
            |ruta| {
                let inicio = datos
                    .hora_inicio_real
                    .or(ruta.hora_inicio_real)
                    .unwrap_or(ruta.hora_inicio);
                let fin = datos.hora_fin_real.unwrap_or(ruta.hora_fin);
                let duracion = (Decimal::from(elapsed_minutes(inicio, fin)) / Decimal::from(60)).round_dp(2);

                ruta.estado = RutaEstado::Completada;
                ruta.hora_inicio_real = Some(inicio);
                ruta.hora_fin_real = Some(fin);
                ruta.duracion_real_horas = Some(duracion);
                if let Some(ingreso) = datos.ingreso_real {
                    ruta.ingreso_estimado = ingreso;
                }

                Ok(EventKind::Completada {
                    hora_inicio_real: inicio,
                    hora_fin_real: fin,
                    duracion_real_horas: duracion,
                    ingreso: ruta.ingreso_estimado,
                })
            },
        )?;

        self.register_worked_day(&ruta.conductor_id, ruta.fecha);
        Ok(ruta)
    }

    /// PROGRAMADA | EN_CURSO → CANCELADA
    pub fn cancelar(&mut self, id: &Uuid, motivo: Option<String>) -> Result<RutaCorta, PlanningError> {
        let ruta = self.transition(
            id,
            "cancelar",
            &[RutaEstado::Programada, RutaEstado::EnCurso],
            |ruta| {
                ruta.estado = RutaEstado::Cancelada;
                ruta.motivo_cancelacion = motivo.clone();
                Ok(EventKind::Cancelada { motivo })
            },
        )?;

        self.refresh_consecutive(&ruta.conductor_id, ruta.fecha + Duration::days(1));
        Ok(ruta)
    }

    /// Move a PROGRAMADA or CANCELADA route to a new slot, re-opening it as PROGRAMADA
    pub fn reagendar(
        &mut self,
        id: &Uuid,
        fecha: NaiveDate,
        hora_inicio: Option<NaiveTime>,
    ) -> Result<RutaCorta, PlanningError> {
        let result = self.reschedule(id, fecha, hora_inicio);
        result.map_err(|e| self.rejected(e))
    }

    /// Stored weekly balance (empty when the week has no routes)
    pub fn balance(&self, conductor_id: &str, semana: IsoSemana) -> BalanceRutaCorta {
        self.balances.get(conductor_id, semana)
    }

    /// Recompute and upsert a weekly balance
    pub fn recompute_balance(&mut self, conductor_id: &str, semana: IsoSemana) -> BalanceRutaCorta {
        self.balances.recompute(&self.ledger, conductor_id, semana)
    }

    pub fn conflicts(&self, scope: ConflictScope) -> Vec<Conflict> {
        find_conflicts(&self.ledger, scope)
    }

    fn conductor(&self, id: &str) -> Result<&Conductor, PlanningError> {
        if id.trim().is_empty() {
            return Err(PlanningError::Validation("El conductor es obligatorio".to_string()));
        }
        self.fleet
            .get(id)
            .ok_or_else(|| PlanningError::NotFound(format!("Conductor {}", id)))
    }

    fn active_tramo(&self, id: &str) -> Result<Tramo, PlanningError> {
        let tramo = self
            .catalog
            .get(id)
            .ok_or_else(|| PlanningError::NotFound(format!("Tramo {}", id)))?;
        if !tramo.active {
            return Err(PlanningError::Validation(format!("El tramo {} no está activo", id)));
        }
        Ok(tramo.clone())
    }

    /// Shared by pre-check, assignment and rescheduling.
    ///
    /// Returns the eligibility (possibly `puede = false`) and the resolved
    /// start time when a tramo was given.
    fn check(
        &self,
        conductor_id: &str,
        tramo: Option<&Tramo>,
        fecha: Option<NaiveDate>,
        hora_inicio: Option<NaiveTime>,
        exclude: Option<Uuid>,
    ) -> Result<(Eligibility, Option<NaiveTime>), PlanningError> {
        let conductor = self.conductor(conductor_id)?;
        let fecha = fecha.ok_or_else(|| PlanningError::Validation("La fecha es obligatoria".to_string()))?;
        let hoy = self.today();

        let eligibility = self.checker.evaluate(conductor, fecha, &self.ledger, hoy, exclude);
        let Some(tramo) = tramo else {
            return Ok((eligibility, None));
        };
        if !eligibility.puede {
            return Ok((eligibility, None));
        }

        let hora = match hora_inicio {
            Some(h) => h,
            None => self.next_free_start(&conductor.id, fecha, exclude).ok_or_else(|| {
                PlanningError::Eligibility(format!(
                    "El conductor {} no tiene horario libre el {} dentro de la ventana {}-{}",
                    conductor.id,
                    fecha,
                    self.rules().ventana_inicio.format("%H:%M"),
                    self.rules().ventana_fin.format("%H:%M")
                ))
            })?,
        };

        if let Some(holder) = self.ledger.slot_taken(&conductor.id, fecha, hora) {
            if Some(holder) != exclude {
                return Err(PlanningError::DuplicateAssignment {
                    conductor_id: conductor.id.clone(),
                    fecha,
                    hora_inicio: hora,
                });
            }
        }

        let slot = SlotRequest {
            tramo,
            hora_inicio: hora,
            exclude,
        };
        let eligibility = self.checker.evaluate_slot(conductor, fecha, slot, &self.ledger, hoy);
        Ok((eligibility, Some(hora)))
    }

    /// Earliest automatic start after the conductor's routes that day
    fn next_free_start(&self, conductor_id: &str, fecha: NaiveDate, exclude: Option<Uuid>) -> Option<NaiveTime> {
        let rules = self.rules();
        let base = minutes_of_day(rules.hora_inicio_automatica).max(minutes_of_day(rules.ventana_inicio));

        let latest_end = [fecha - Duration::days(1), fecha]
            .into_iter()
            .flat_map(|dia| self.ledger.active_for(conductor_id, dia))
            .filter(|r| Some(r.id) != exclude)
            .map(|r| r.interval_relative_to(fecha).1)
            .filter(|&end| end > 0)
            .max();

        let start = match latest_end {
            Some(end) => base.max(end + rules.descanso_entre_rutas_minutos),
            None => base,
        };

        if start > minutes_of_day(rules.ventana_fin) || start >= 24 * 60 {
            return None;
        }
        NaiveTime::from_hms_opt((start / 60) as u32, (start % 60) as u32, 0)
    }

    #[allow(clippy::too_many_arguments)]
    fn create(
        &mut self,
        conductor_id: &str,
        tramo: &Tramo,
        fecha: Option<NaiveDate>,
        hora_inicio: Option<NaiveTime>,
        notas: Option<String>,
        ingreso: Option<Decimal>,
        tipo: TipoAsignacion,
    ) -> Result<RutaCorta, PlanningError> {
        if let Some(ingreso) = ingreso {
            if ingreso < Decimal::ZERO {
                return Err(PlanningError::Validation(
                    "El ingreso estimado no puede ser negativo".to_string(),
                ));
            }
        }

        let (eligibility, hora) = self.check(conductor_id, Some(tramo), fecha, hora_inicio, None)?;
        if !eligibility.puede {
            return Err(PlanningError::Eligibility(eligibility.razon));
        }
        let (Some(fecha), Some(hora)) = (fecha, hora) else {
            return Err(PlanningError::Validation("La fecha es obligatoria".to_string()));
        };

        let notas = notas.filter(|n| !n.trim().is_empty());
        let mut ruta = RutaCorta::new(conductor_id, tramo, fecha, hora, tipo, notas);
        ruta.es_consecutiva = eligibility.is_consecutive();
        if let Some(ingreso) = ingreso {
            ruta.ingreso_estimado = ingreso;
        }

        self.ledger.put(ruta.clone())?;

        info!(
            ruta_id = %ruta.id,
            conductor = %ruta.conductor_id,
            tramo = %ruta.tramo,
            fecha = %ruta.fecha,
            hora_inicio = %ruta.hora_inicio,
            tipo = %tipo,
            consecutiva = ruta.es_consecutiva,
            "Short route assigned"
        );
        metrics::RUTAS_ASIGNADAS
            .with_label_values(&[&tipo.to_string()])
            .inc();

        self.emit(RutaEvent::ruta(
            ruta.id,
            &ruta.conductor_id,
            ruta.semana,
            EventKind::Asignada {
                tramo: ruta.tramo.clone(),
                fecha: ruta.fecha,
                hora_inicio: ruta.hora_inicio,
                tipo,
                es_consecutiva: ruta.es_consecutiva,
            },
        ));
        self.refresh_consecutive(&ruta.conductor_id, fecha + Duration::days(1));

        Ok(ruta)
    }

    fn reschedule(
        &mut self,
        id: &Uuid,
        fecha: NaiveDate,
        hora_inicio: Option<NaiveTime>,
    ) -> Result<RutaCorta, PlanningError> {
        let mut ruta = self.ruta(id)?.clone();
        if !matches!(ruta.estado, RutaEstado::Programada | RutaEstado::Cancelada) {
            return Err(PlanningError::StateTransition {
                ruta_id: *id,
                from: ruta.estado,
                action: "reagendar",
            });
        }

        // Rules apply to the copied tramo attributes, not the live catalog
        let tramo = Tramo {
            id: ruta.tramo.clone(),
            direction: ruta.direction,
            duration_hours: ruta.duration_hours,
            base_income: ruta.ingreso_estimado,
            active: true,
        };
        let (eligibility, hora) = self.check(&ruta.conductor_id, Some(&tramo), Some(fecha), hora_inicio, Some(*id))?;
        if !eligibility.puede {
            return Err(PlanningError::Eligibility(eligibility.razon));
        }
        let hora = hora.unwrap_or(ruta.hora_inicio);

        let (desde_fecha, desde_hora) = (ruta.fecha, ruta.hora_inicio);
        ruta.move_to(fecha, hora);
        ruta.estado = RutaEstado::Programada;
        ruta.confirmada_en = None;
        ruta.motivo_cancelacion = None;
        ruta.es_consecutiva = eligibility.is_consecutive();
        ruta.touch();
        self.ledger.put(ruta.clone())?;

        info!(
            ruta_id = %ruta.id,
            conductor = %ruta.conductor_id,
            desde = %desde_fecha,
            hacia = %fecha,
            "Short route rescheduled"
        );
        metrics::TRANSICIONES.with_label_values(&["reagendar"]).inc();

        self.emit(RutaEvent::ruta(
            ruta.id,
            &ruta.conductor_id,
            ruta.semana,
            EventKind::Reagendada {
                desde_fecha,
                desde_hora,
                hacia_fecha: fecha,
                hacia_hora: hora,
            },
        ));
        self.refresh_consecutive(&ruta.conductor_id, desde_fecha + Duration::days(1));
        self.refresh_consecutive(&ruta.conductor_id, fecha + Duration::days(1));

        Ok(ruta)
    }

    fn transition<F>(
        &mut self,
        id: &Uuid,
        action: &'static str,
        allowed: &[RutaEstado],
        apply: F,
    ) -> Result<RutaCorta, PlanningError>
    where
        F: FnOnce(&mut RutaCorta) -> Result<EventKind, PlanningError>,
    {
        let result = self.apply_transition(id, action, allowed, apply);
        result.map_err(|e| self.rejected(e))
    }

    fn apply_transition<F>(
        &mut self,
        id: &Uuid,
        action: &'static str,
        allowed: &[RutaEstado],
        apply: F,
    ) -> Result<RutaCorta, PlanningError>
    where
        F: FnOnce(&mut RutaCorta) -> Result<EventKind, PlanningError>,
    {
        let mut ruta = self.ruta(id)?.clone();
        if !allowed.contains(&ruta.estado) {
            return Err(PlanningError::StateTransition {
                ruta_id: *id,
                from: ruta.estado,
                action,
            });
        }

        let from = ruta.estado;
        let kind = apply(&mut ruta)?;
        ruta.touch();
        self.ledger.put(ruta.clone())?;

        info!(
            ruta_id = %ruta.id,
            conductor = %ruta.conductor_id,
            from = %from,
            to = %ruta.estado,
            action,
            "Short route transition"
        );
        metrics::TRANSICIONES.with_label_values(&[action]).inc();

        self.emit(RutaEvent::ruta(ruta.id, &ruta.conductor_id, ruta.semana, kind));
        Ok(ruta)
    }

    /// Recompute `es_consecutiva` on a conductor's open routes of `fecha`
    fn refresh_consecutive(&mut self, conductor_id: &str, fecha: NaiveDate) {
        let previous_day = !self
            .ledger
            .active_for(conductor_id, fecha - Duration::days(1))
            .is_empty();

        let stale: Vec<RutaCorta> = self
            .ledger
            .active_for(conductor_id, fecha)
            .into_iter()
            .filter(|r| r.estado != RutaEstado::Completada && r.es_consecutiva != previous_day)
            .cloned()
            .collect();

        for mut ruta in stale {
            ruta.es_consecutiva = previous_day;
            ruta.touch();
            if let Err(e) = self.ledger.put(ruta.clone()) {
                warn!(ruta_id = %ruta.id, error = %e, "Failed to refresh consecutive flag");
                continue;
            }
            debug!(ruta_id = %ruta.id, consecutiva = previous_day, "Consecutive flag refreshed");
            self.emit(RutaEvent::ruta(
                ruta.id,
                &ruta.conductor_id,
                ruta.semana,
                EventKind::ConsecutivaActualizada {
                    es_consecutiva: previous_day,
                },
            ));
        }
    }

    fn register_worked_day(&mut self, conductor_id: &str, fecha: NaiveDate) {
        let umbral = self.rules().dias_para_descanso;
        let dias = self.rules().dias_de_descanso;
        let Some(conductor) = self.fleet.get_mut(conductor_id) else {
            warn!(conductor = conductor_id, "Completed route for a conductor missing from the fleet");
            return;
        };

        if conductor.registrar_dia_trabajado(fecha, umbral, dias) {
            let hasta = conductor.descanso_hasta.unwrap_or(fecha);
            info!(conductor = conductor_id, hasta = %hasta, "Conductor sent to rest");
            self.emit(RutaEvent::conductor(conductor_id, EventKind::EnviadoADescanso { hasta }));
        }
    }

    fn emit(&mut self, event: RutaEvent) {
        self.balances.handle(&event, &self.ledger);
        self.log.append(event);
    }

    fn rejected(&self, error: PlanningError) -> PlanningError {
        metrics::SOLICITUDES_RECHAZADAS
            .with_label_values(&[error.code()])
            .inc();
        debug!(code = error.code(), error = %error, "Planner request rejected");
        error
    }
}

#[cfg(test)]
mod tests;
